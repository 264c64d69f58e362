//! Retrying wrapper for any [`ClusterController`].
//!
//! Idempotent calls are retried with exponential backoff while the error is
//! transient. `reconcile_deployment` is passed through once: it already
//! waits for the rollout and a blind retry would restart the clock.
//! `pod_logs` is a long-lived stream and is not retried either.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, warn};

use launchpad_core::config::RetryConfig;
use launchpad_core::{AppName, Environment};

use crate::controller::ClusterController;
use crate::error::ClusterResult;
use crate::types::{DeploymentDescriptor, IngressRoute, LiveDeployment, NamespaceSpec, PodStatus};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            attempts: cfg.attempts.max(1),
            initial_backoff: Duration::from_millis(cfg.initial_backoff_ms),
            max_backoff: Duration::from_millis(cfg.max_backoff_ms),
            multiplier: cfg.multiplier.max(1.0),
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1` (1-based `attempt`).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis = (self.initial_backoff.as_millis() as f64 * factor) as u64;
        Duration::from_millis(millis).min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> ClusterResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ClusterResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient cluster error, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

pub struct Retrying<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: ClusterController> Retrying<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: ClusterController> ClusterController for Retrying<C> {
    async fn ensure_namespace(&self, spec: &NamespaceSpec) -> ClusterResult<()> {
        self.policy
            .run("ensure_namespace", || self.inner.ensure_namespace(spec))
            .await
    }

    async fn reconcile_deployment(&self, desc: &DeploymentDescriptor) -> ClusterResult<()> {
        self.inner.reconcile_deployment(desc).await
    }

    async fn route_ingress(&self, route: &IngressRoute) -> ClusterResult<()> {
        self.policy
            .run("route_ingress", || self.inner.route_ingress(route))
            .await
    }

    async fn current_image_tag(
        &self,
        app: &AppName,
        environment: Environment,
    ) -> ClusterResult<Option<LiveDeployment>> {
        self.policy
            .run("current_image_tag", || self.inner.current_image_tag(app, environment))
            .await
    }

    async fn pod_status(&self, app: &AppName, environment: Environment) -> ClusterResult<PodStatus> {
        self.policy
            .run("pod_status", || self.inner.pod_status(app, environment))
            .await
    }

    async fn pod_logs(
        &self,
        app: &AppName,
        environment: Environment,
        tail: u32,
    ) -> ClusterResult<mpsc::Receiver<String>> {
        self.inner.pod_logs(app, environment, tail).await
    }

    async fn delete_namespace(&self, namespace: &str) -> ClusterResult<()> {
        self.policy
            .run("delete_namespace", || self.inner.delete_namespace(namespace))
            .await
    }
}
