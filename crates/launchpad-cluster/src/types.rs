//! Desired-state descriptors and observed deployment state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use launchpad_core::{AppName, Environment, ImageTag};

use crate::policy::{NetworkPolicySpec, QuotaSpec};

/// A namespace together with its isolation policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSpec {
    pub name: String,
    pub app: AppName,
    pub quota: QuotaSpec,
    pub network_policy: NetworkPolicySpec,
    /// ConfigMap injected into every pod of the namespace.
    pub config_map: String,
    pub env: BTreeMap<String, String>,
}

/// Desired state of one environment's Deployment and Service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentDescriptor {
    pub app: AppName,
    pub namespace: String,
    pub environment: Environment,
    pub deployment_name: String,
    pub service_name: String,
    pub config_map: String,
    pub tag: ImageTag,
    /// Full registry reference, `<host>/<app>:<token>`.
    pub image: String,
    pub container_port: u16,
    pub health_path: String,
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
    pub max_pods: u32,
    pub replicas: u32,
    pub ingress_host: String,
}

/// Host-based route from the ingress controller to an environment's Service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRoute {
    pub namespace: String,
    pub name: String,
    pub host: String,
    pub service_name: String,
    pub service_port: u16,
    pub ingress_class: Option<String>,
}

/// What the cluster currently runs for one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveDeployment {
    /// Image reference declared by the Deployment's pod template.
    pub image: String,
    /// Parsed tag, `None` if the image is not one of ours.
    pub tag: Option<ImageTag>,
    /// Whether the latest rollout has completed.
    pub ready: bool,
}

impl LiveDeployment {
    pub fn new(image: impl Into<String>, ready: bool) -> Self {
        let image = image.into();
        Self {
            tag: ImageTag::from_reference(&image).ok(),
            image,
            ready,
        }
    }

    pub fn runs(&self, tag: &ImageTag) -> bool {
        self.tag.as_ref() == Some(tag)
    }
}

/// Pod-level view of one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStatus {
    /// Phase of the first pod, `Pending` when none exist yet.
    pub phase: String,
    /// Container restarts summed over all pods.
    pub restarts: u32,
    /// Every container of every pod is ready.
    pub ready: bool,
    pub pods: u32,
}

impl PodStatus {
    pub fn absent() -> Self {
        Self {
            phase: "Pending".to_string(),
            restarts: 0,
            ready: false,
            pods: 0,
        }
    }

    /// Summarize `kubectl get pods -o json`.
    pub fn from_pods_json(value: &Value) -> Self {
        let Some(items) = value["items"].as_array().filter(|items| !items.is_empty()) else {
            return Self::absent();
        };
        let mut restarts = 0;
        let mut ready = true;
        for pod in items {
            let containers = pod["status"]["containerStatuses"].as_array();
            match containers {
                Some(containers) if !containers.is_empty() => {
                    for c in containers {
                        restarts += c["restartCount"].as_u64().unwrap_or(0) as u32;
                        ready &= c["ready"].as_bool().unwrap_or(false);
                    }
                }
                _ => ready = false,
            }
        }
        Self {
            phase: items[0]["status"]["phase"].as_str().unwrap_or("Unknown").to_string(),
            restarts,
            ready,
            pods: items.len() as u32,
        }
    }
}
