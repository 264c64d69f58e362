//! Deterministic names for per-app cluster objects.
//!
//! Every name is a pure function of `(app, environment)` so the desired
//! state can always be recomputed from the registry.

use crate::types::{AppName, Environment};

/// Namespace owned by an app.
pub fn namespace_for(app: &AppName) -> String {
    format!("app-{app}")
}

/// ConfigMap holding the environment variables injected into every pod.
pub fn config_map_name(app: &AppName) -> String {
    format!("{app}-env")
}

/// Label selector matching an environment's pods.
pub fn pod_selector(app: &AppName, env: Environment) -> String {
    format!("app={app},env={env}")
}

pub fn deployment_name(app: &AppName, env: Environment) -> String {
    format!("{app}-{env}")
}

pub fn service_name(app: &AppName, env: Environment) -> String {
    format!("{app}-{env}-svc")
}

pub fn ingress_name(app: &AppName, env: Environment) -> String {
    format!("{app}-{env}-ingress")
}

/// Public host for an environment, e.g. `demo-preview.10.0.0.5.nip.io`.
pub fn ingress_host(app: &AppName, env: Environment, base_domain: &str) -> String {
    match env {
        Environment::Preview => format!("{app}-preview.{base_domain}"),
        Environment::Production => format!("{app}.{base_domain}"),
    }
}

pub fn app_url(app: &AppName, env: Environment, base_domain: &str) -> String {
    format!("http://{}/", ingress_host(app, env, base_domain))
}
