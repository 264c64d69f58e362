//! Per-namespace isolation: resource quota and network policy.

use serde::{Deserialize, Serialize};

use launchpad_core::config::IsolationConfig;

/// Aggregate resource ceiling for one app namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSpec {
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
    pub max_pods: u32,
}

impl From<&IsolationConfig> for QuotaSpec {
    fn from(cfg: &IsolationConfig) -> Self {
        Self {
            cpu_request: cfg.cpu_request.clone(),
            cpu_limit: cfg.cpu_limit.clone(),
            memory_request: cfg.memory_request.clone(),
            memory_limit: cfg.memory_limit.clone(),
            max_pods: cfg.max_pods,
        }
    }
}

/// Ingress isolation for one namespace.
///
/// Pods accept traffic from their own namespace and from the listed
/// namespaces (the ingress controller). Egress is unrestricted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPolicySpec {
    pub namespace: String,
    pub allowed_namespaces: Vec<String>,
}

impl NetworkPolicySpec {
    pub fn new(namespace: impl Into<String>, ingress_namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            allowed_namespaces: vec![ingress_namespace.into()],
        }
    }

    /// Whether traffic from pods in `source_namespace` is admitted.
    pub fn admits(&self, source_namespace: &str) -> bool {
        source_namespace == self.namespace
            || self.allowed_namespaces.iter().any(|ns| ns == source_namespace)
    }

    /// Egress is never restricted.
    pub fn admits_egress(&self, _destination: &str) -> bool {
        true
    }
}
