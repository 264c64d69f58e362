use async_trait::async_trait;
use tokio::sync::mpsc;

use launchpad_core::{AppName, Environment};

use crate::error::ClusterResult;
use crate::types::{DeploymentDescriptor, IngressRoute, LiveDeployment, NamespaceSpec, PodStatus};

/// Idempotent operations against the cluster.
///
/// Every call is declarative: applying the same descriptor twice is a no-op.
#[async_trait]
pub trait ClusterController: Send + Sync {
    /// Create or update the namespace with its quota and network policy.
    async fn ensure_namespace(&self, spec: &NamespaceSpec) -> ClusterResult<()>;

    /// Apply the Deployment and Service, then wait for the rollout. On
    /// timeout the previously running image is restored before
    /// `RolloutTimeout` is returned.
    async fn reconcile_deployment(&self, desc: &DeploymentDescriptor) -> ClusterResult<()>;

    async fn route_ingress(&self, route: &IngressRoute) -> ClusterResult<()>;

    /// What the environment's Deployment currently declares, `None` if it
    /// does not exist.
    async fn current_image_tag(
        &self,
        app: &AppName,
        environment: Environment,
    ) -> ClusterResult<Option<LiveDeployment>>;

    /// Phase, restarts and readiness of the environment's pods.
    async fn pod_status(&self, app: &AppName, environment: Environment) -> ClusterResult<PodStatus>;

    /// Follow the environment's pod logs, starting with the last `tail`
    /// lines. The stream ends when the pods go away; dropping the receiver
    /// stops following.
    async fn pod_logs(
        &self,
        app: &AppName,
        environment: Environment,
        tail: u32,
    ) -> ClusterResult<mpsc::Receiver<String>>;

    /// Remove the namespace and everything in it. Missing namespaces are fine.
    async fn delete_namespace(&self, namespace: &str) -> ClusterResult<()>;
}

#[async_trait]
impl<T: ClusterController + ?Sized> ClusterController for std::sync::Arc<T> {
    async fn ensure_namespace(&self, spec: &NamespaceSpec) -> ClusterResult<()> {
        (**self).ensure_namespace(spec).await
    }

    async fn reconcile_deployment(&self, desc: &DeploymentDescriptor) -> ClusterResult<()> {
        (**self).reconcile_deployment(desc).await
    }

    async fn route_ingress(&self, route: &IngressRoute) -> ClusterResult<()> {
        (**self).route_ingress(route).await
    }

    async fn current_image_tag(
        &self,
        app: &AppName,
        environment: Environment,
    ) -> ClusterResult<Option<LiveDeployment>> {
        (**self).current_image_tag(app, environment).await
    }

    async fn pod_status(&self, app: &AppName, environment: Environment) -> ClusterResult<PodStatus> {
        (**self).pod_status(app, environment).await
    }

    async fn pod_logs(
        &self,
        app: &AppName,
        environment: Environment,
        tail: u32,
    ) -> ClusterResult<mpsc::Receiver<String>> {
        (**self).pod_logs(app, environment, tail).await
    }

    async fn delete_namespace(&self, namespace: &str) -> ClusterResult<()> {
        (**self).delete_namespace(namespace).await
    }
}
