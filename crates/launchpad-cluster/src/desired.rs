//! Computes descriptors from an app's identity plus configuration.
//!
//! Nothing here is persisted: the orchestrator asks for fresh descriptors on
//! every reconciliation.

use std::collections::BTreeMap;

use launchpad_core::config::{ContainerResources, IsolationConfig};
use launchpad_core::{AppName, Environment, ImageTag, LaunchpadConfig, TemplateKind, naming};

use crate::policy::{NetworkPolicySpec, QuotaSpec};
use crate::types::{DeploymentDescriptor, IngressRoute, NamespaceSpec};

#[derive(Debug, Clone)]
pub struct DesiredState {
    pub registry_host: String,
    pub base_domain: String,
    pub ingress_namespace: String,
    pub ingress_class: Option<String>,
    pub replicas: u32,
    pub container: ContainerResources,
    pub isolation: IsolationConfig,
}

impl DesiredState {
    pub fn from_config(config: &LaunchpadConfig) -> Self {
        Self {
            registry_host: config.registry.host.clone(),
            base_domain: config.cluster.base_domain(),
            ingress_namespace: config.cluster.ingress_namespace.clone(),
            ingress_class: config.cluster.ingress_class.clone(),
            replicas: config.cluster.replicas,
            container: config.cluster.container.clone(),
            isolation: config.cluster.isolation.clone(),
        }
    }

    pub fn namespace(&self, app: &AppName) -> NamespaceSpec {
        let name = naming::namespace_for(app);
        let env = BTreeMap::from([("APP_NAME".to_string(), app.to_string())]);
        NamespaceSpec {
            network_policy: NetworkPolicySpec::new(&name, &self.ingress_namespace),
            quota: QuotaSpec::from(&self.isolation),
            config_map: naming::config_map_name(app),
            env,
            app: app.clone(),
            name,
        }
    }

    pub fn deployment(
        &self,
        app: &AppName,
        template: TemplateKind,
        environment: Environment,
        tag: &ImageTag,
    ) -> DeploymentDescriptor {
        DeploymentDescriptor {
            app: app.clone(),
            namespace: naming::namespace_for(app),
            environment,
            deployment_name: naming::deployment_name(app, environment),
            service_name: naming::service_name(app, environment),
            config_map: naming::config_map_name(app),
            tag: tag.clone(),
            image: tag.reference(&self.registry_host),
            container_port: template.container_port(),
            health_path: template.health_path().to_string(),
            cpu_request: self.container.cpu_request.clone(),
            cpu_limit: self.container.cpu_limit.clone(),
            memory_request: self.container.memory_request.clone(),
            memory_limit: self.container.memory_limit.clone(),
            max_pods: self.isolation.max_pods,
            replicas: self.replicas,
            ingress_host: naming::ingress_host(app, environment, &self.base_domain),
        }
    }

    pub fn ingress(&self, app: &AppName, template: TemplateKind, environment: Environment) -> IngressRoute {
        IngressRoute {
            namespace: naming::namespace_for(app),
            name: naming::ingress_name(app, environment),
            host: naming::ingress_host(app, environment, &self.base_domain),
            service_name: naming::service_name(app, environment),
            service_port: template.container_port(),
            ingress_class: self.ingress_class.clone(),
        }
    }

    pub fn url(&self, app: &AppName, environment: Environment) -> String {
        naming::app_url(app, environment, &self.base_domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desired() -> DesiredState {
        let mut config = LaunchpadConfig::default();
        config.cluster.server_ip = "10.0.0.5".into();
        DesiredState::from_config(&config)
    }

    #[test]
    fn deployment_descriptor_is_fully_derived() {
        let app = AppName::parse("demo").unwrap();
        let tag: ImageTag = "demo:20260221.100000".parse().unwrap();
        let desc = desired().deployment(&app, TemplateKind::Api, Environment::Production, &tag);

        assert_eq!(desc.namespace, "app-demo");
        assert_eq!(desc.deployment_name, "demo-prod");
        assert_eq!(desc.service_name, "demo-prod-svc");
        assert_eq!(desc.image, "localhost:5050/demo:20260221.100000");
        assert_eq!(desc.ingress_host, "demo.10.0.0.5.nip.io");
        assert_eq!(desc.container_port, 8000);
        assert_eq!(desc.health_path, "/health");
        assert_eq!(desc.replicas, 1);
        assert_eq!(desc.max_pods, 6);
    }

    #[test]
    fn static_site_routes_to_port_80() {
        let app = AppName::parse("site").unwrap();
        let route = desired().ingress(&app, TemplateKind::StaticSite, Environment::Preview);
        assert_eq!(route.host, "site-preview.10.0.0.5.nip.io");
        assert_eq!(route.service_port, 80);
        assert_eq!(route.name, "site-preview-ingress");
        assert_eq!(route.ingress_class.as_deref(), Some("traefik"));
    }

    #[test]
    fn namespace_spec_carries_isolation() {
        let app = AppName::parse("demo").unwrap();
        let ns = desired().namespace(&app);
        assert_eq!(ns.name, "app-demo");
        assert!(ns.network_policy.admits("kube-system"));
        assert!(!ns.network_policy.admits("app-other"));
        assert_eq!(ns.quota.max_pods, 6);
        assert_eq!(ns.config_map, "demo-env");
        assert_eq!(ns.env.get("APP_NAME").map(String::as_str), Some("demo"));
    }
}
