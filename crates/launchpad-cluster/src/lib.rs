//! launchpad-cluster — idempotent access to the single-node cluster.
//!
//! Desired state is described by plain descriptors ([`NamespaceSpec`],
//! [`DeploymentDescriptor`], [`IngressRoute`]) computed by [`DesiredState`]
//! from configuration. [`KubectlController`] renders them to JSON manifests
//! and applies them with `kubectl`; [`Retrying`] adds backoff for the
//! idempotent calls.

pub mod controller;
pub mod desired;
pub mod error;
pub mod kubectl;
pub mod manifest;
pub mod policy;
pub mod retry;
pub mod rollout;
pub mod types;

pub use controller::ClusterController;
pub use desired::DesiredState;
pub use error::{ClusterError, ClusterResult};
pub use kubectl::KubectlController;
pub use policy::{NetworkPolicySpec, QuotaSpec};
pub use retry::{RetryPolicy, Retrying};
pub use rollout::{RollingConfig, RolloutObservation, RolloutPhase, RolloutWatch, WatchAction};
pub use types::*;
