//! Renders descriptors into cluster manifests (JSON, fed to `kubectl apply -f -`).

use serde_json::{Value, json};

use crate::rollout::RollingConfig;
use crate::types::{DeploymentDescriptor, IngressRoute, NamespaceSpec};

pub const MANAGED_BY: &str = "launchpad";
pub const CONTAINER_NAME: &str = "app";

/// Wrap manifests in a `v1/List` so one apply covers them all.
pub fn list(items: Vec<Value>) -> Value {
    json!({ "apiVersion": "v1", "kind": "List", "items": items })
}

pub fn namespace(spec: &NamespaceSpec) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": spec.name,
            "labels": {
                "app.kubernetes.io/managed-by": MANAGED_BY,
                "launchpad/app": spec.app.as_str(),
            }
        }
    })
}

/// Environment variables shared by every pod in the namespace.
pub fn config_map(spec: &NamespaceSpec) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": spec.config_map, "namespace": spec.name },
        "data": spec.env,
    })
}

pub fn resource_quota(spec: &NamespaceSpec) -> Value {
    let q = &spec.quota;
    json!({
        "apiVersion": "v1",
        "kind": "ResourceQuota",
        "metadata": { "name": "app-quota", "namespace": spec.name },
        "spec": {
            "hard": {
                "requests.cpu": q.cpu_request,
                "limits.cpu": q.cpu_limit,
                "requests.memory": q.memory_request,
                "limits.memory": q.memory_limit,
                "pods": q.max_pods.to_string(),
            }
        }
    })
}

/// Ingress restricted to the namespace itself plus the allowed namespaces.
/// Only `Ingress` is listed in `policyTypes`, so egress stays open.
pub fn network_policy(spec: &NamespaceSpec) -> Value {
    let mut from = vec![json!({ "podSelector": {} })];
    for ns in &spec.network_policy.allowed_namespaces {
        from.push(json!({
            "namespaceSelector": {
                "matchLabels": { "kubernetes.io/metadata.name": ns }
            }
        }));
    }
    json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "NetworkPolicy",
        "metadata": { "name": "app-isolation", "namespace": spec.name },
        "spec": {
            "podSelector": {},
            "policyTypes": ["Ingress"],
            "ingress": [{ "from": from }]
        }
    })
}

fn labels(desc: &DeploymentDescriptor) -> Value {
    json!({
        "app": desc.app.as_str(),
        "env": desc.environment.as_str(),
    })
}

pub fn deployment(desc: &DeploymentDescriptor, rolling: &RollingConfig) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": desc.deployment_name,
            "namespace": desc.namespace,
            "labels": {
                "app": desc.app.as_str(),
                "env": desc.environment.as_str(),
                "app.kubernetes.io/managed-by": MANAGED_BY,
            }
        },
        "spec": {
            "replicas": desc.replicas,
            "selector": { "matchLabels": labels(desc) },
            "strategy": {
                "type": "RollingUpdate",
                "rollingUpdate": {
                    "maxSurge": rolling.max_surge,
                    "maxUnavailable": rolling.max_unavailable,
                }
            },
            "template": {
                "metadata": { "labels": labels(desc) },
                "spec": {
                    "containers": [{
                        "name": CONTAINER_NAME,
                        "image": desc.image,
                        "ports": [{ "containerPort": desc.container_port }],
                        "envFrom": [{ "configMapRef": { "name": desc.config_map } }],
                        "readinessProbe": {
                            "httpGet": { "path": desc.health_path, "port": desc.container_port },
                            "initialDelaySeconds": 2,
                            "periodSeconds": 3,
                        },
                        "resources": {
                            "requests": { "cpu": desc.cpu_request, "memory": desc.memory_request },
                            "limits": { "cpu": desc.cpu_limit, "memory": desc.memory_limit },
                        }
                    }]
                }
            }
        }
    })
}

pub fn service(desc: &DeploymentDescriptor) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": { "name": desc.service_name, "namespace": desc.namespace },
        "spec": {
            "selector": labels(desc),
            "ports": [{ "port": desc.container_port, "targetPort": desc.container_port }]
        }
    })
}

pub fn ingress(route: &IngressRoute) -> Value {
    let mut spec = json!({
        "rules": [{
            "host": route.host,
            "http": {
                "paths": [{
                    "path": "/",
                    "pathType": "Prefix",
                    "backend": {
                        "service": {
                            "name": route.service_name,
                            "port": { "number": route.service_port }
                        }
                    }
                }]
            }
        }]
    });
    if let Some(class) = &route.ingress_class {
        spec["ingressClassName"] = json!(class);
    }
    json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "Ingress",
        "metadata": { "name": route.name, "namespace": route.namespace },
        "spec": spec
    })
}
