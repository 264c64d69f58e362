//! `kubectl`-backed cluster controller.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use launchpad_core::config::ClusterConfig;
use launchpad_core::{AppName, Environment, naming};

use crate::controller::ClusterController;
use crate::error::{ClusterError, ClusterResult};
use crate::manifest;
use crate::rollout::{RollingConfig, RolloutObservation, RolloutPhase, RolloutWatch, WatchAction};
use crate::types::{DeploymentDescriptor, IngressRoute, LiveDeployment, NamespaceSpec, PodStatus};

const LOG_CHANNEL_CAPACITY: usize = 256;

pub struct KubectlController {
    kubectl: String,
    rolling: RollingConfig,
}

impl KubectlController {
    pub fn new(kubectl: impl Into<String>, rolling: RollingConfig) -> Self {
        Self {
            kubectl: kubectl.into(),
            rolling,
        }
    }

    pub fn from_config(cluster: &ClusterConfig) -> Self {
        Self::new(
            &cluster.kubectl,
            RollingConfig {
                timeout_secs: cluster.rollout_timeout_secs,
                poll_interval_ms: cluster.rollout_poll_ms,
                ..RollingConfig::default()
            },
        )
    }

    /// Run kubectl, returning stdout. A non-zero exit becomes `Api` with the
    /// stderr text.
    async fn run(&self, operation: &str, args: &[&str], stdin: Option<Vec<u8>>) -> ClusterResult<String> {
        debug!(operation, ?args, "kubectl");
        let mut child = Command::new(&self.kubectl)
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ClusterError::Command {
                program: self.kubectl.clone(),
                source,
            })?;

        if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(&bytes)
                .await
                .map_err(|source| ClusterError::Command {
                    program: self.kubectl.clone(),
                    source,
                })?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| ClusterError::Command {
                program: self.kubectl.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(ClusterError::api(operation, &String::from_utf8_lossy(&output.stderr)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn apply(&self, operation: &str, manifests: Value) -> ClusterResult<()> {
        let body = serde_json::to_vec(&manifests).map_err(|e| ClusterError::Decode(e.to_string()))?;
        self.run(operation, &["apply", "-f", "-"], Some(body)).await?;
        Ok(())
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> ClusterResult<Option<RolloutObservation>> {
        let result = self
            .run(
                "get deployment",
                &["get", "deployment", name, "-n", namespace, "-o", "json"],
                None,
            )
            .await;
        match result {
            Ok(stdout) => {
                let value: Value =
                    serde_json::from_str(&stdout).map_err(|e| ClusterError::Decode(e.to_string()))?;
                Ok(Some(RolloutObservation::from_deployment_json(&value)))
            }
            Err(ClusterError::Api { message, .. }) if is_not_found(&message) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn revert(&self, desc: &DeploymentDescriptor, previous: Option<&str>) {
        let Some(previous) = previous.filter(|p| *p != desc.image) else {
            warn!(deployment = %desc.deployment_name, "no previous image to restore");
            return;
        };
        let target = format!("deployment/{}", desc.deployment_name);
        let image = format!("{}={previous}", manifest::CONTAINER_NAME);
        let result = self
            .run(
                "restore previous image",
                &["set", "image", &target, &image, "-n", &desc.namespace],
                None,
            )
            .await;
        match result {
            Ok(_) => info!(deployment = %desc.deployment_name, %previous, "previous image restored"),
            Err(e) => warn!(deployment = %desc.deployment_name, error = %e, "failed to restore previous image"),
        }
    }
}

#[async_trait]
impl ClusterController for KubectlController {
    async fn ensure_namespace(&self, spec: &NamespaceSpec) -> ClusterResult<()> {
        self.apply("apply namespace", manifest::namespace(spec)).await?;
        self.apply("apply env config", manifest::config_map(spec)).await?;
        let policies = manifest::list(vec![
            manifest::resource_quota(spec),
            manifest::network_policy(spec),
        ]);
        self.apply("apply isolation policy", policies)
            .await
            .map_err(|e| match e {
                ClusterError::Api { message, .. } => ClusterError::PolicyApply {
                    namespace: spec.name.clone(),
                    message,
                },
                other => other,
            })?;
        debug!(namespace = %spec.name, "namespace ensured");
        Ok(())
    }

    async fn reconcile_deployment(&self, desc: &DeploymentDescriptor) -> ClusterResult<()> {
        let previous = self
            .get_deployment(&desc.namespace, &desc.deployment_name)
            .await?
            .and_then(|obs| obs.image);

        let manifests = manifest::list(vec![
            manifest::deployment(desc, &self.rolling),
            manifest::service(desc),
        ]);
        self.apply("apply deployment", manifests).await?;
        info!(
            namespace = %desc.namespace,
            deployment = %desc.deployment_name,
            tag = %desc.tag,
            "deployment applied"
        );

        let mut watch = RolloutWatch::new(&desc.deployment_name, &desc.image, self.rolling.timeout());
        watch.start(Instant::now());
        loop {
            let obs = match self.get_deployment(&desc.namespace, &desc.deployment_name).await {
                Ok(obs) => obs.unwrap_or_default(),
                Err(e) if e.is_transient() => {
                    warn!(deployment = %desc.deployment_name, error = %e, "status poll failed");
                    RolloutObservation::default()
                }
                Err(e) => return Err(e),
            };
            match watch.advance(&obs, Instant::now()) {
                WatchAction::Done => return Ok(()),
                WatchAction::Wait => tokio::time::sleep(self.rolling.poll_interval()).await,
                WatchAction::Revert => {
                    self.revert(desc, previous.as_deref()).await;
                    let last_status = match &watch.phase {
                        RolloutPhase::TimedOut { reason } => reason.clone(),
                        _ => obs.summary(),
                    };
                    return Err(ClusterError::RolloutTimeout {
                        namespace: desc.namespace.clone(),
                        deployment: desc.deployment_name.clone(),
                        waited_secs: watch.elapsed(Instant::now()).as_secs(),
                        last_status,
                    });
                }
            }
        }
    }

    async fn route_ingress(&self, route: &IngressRoute) -> ClusterResult<()> {
        self.apply("apply ingress", manifest::ingress(route)).await?;
        debug!(namespace = %route.namespace, host = %route.host, "ingress routed");
        Ok(())
    }

    async fn current_image_tag(
        &self,
        app: &AppName,
        environment: Environment,
    ) -> ClusterResult<Option<LiveDeployment>> {
        let namespace = naming::namespace_for(app);
        let name = naming::deployment_name(app, environment);
        let live = self.get_deployment(&namespace, &name).await?.and_then(|obs| {
            let ready = obs.is_complete();
            obs.image.map(|image| LiveDeployment::new(image, ready))
        });
        Ok(live)
    }

    async fn pod_status(&self, app: &AppName, environment: Environment) -> ClusterResult<PodStatus> {
        let namespace = naming::namespace_for(app);
        let selector = naming::pod_selector(app, environment);
        let result = self
            .run(
                "get pods",
                &["get", "pods", "-n", &namespace, "-l", &selector, "-o", "json"],
                None,
            )
            .await;
        match result {
            Ok(stdout) => {
                let value: Value =
                    serde_json::from_str(&stdout).map_err(|e| ClusterError::Decode(e.to_string()))?;
                Ok(PodStatus::from_pods_json(&value))
            }
            Err(ClusterError::Api { message, .. }) if is_not_found(&message) => Ok(PodStatus::absent()),
            Err(e) => Err(e),
        }
    }

    async fn pod_logs(
        &self,
        app: &AppName,
        environment: Environment,
        tail: u32,
    ) -> ClusterResult<mpsc::Receiver<String>> {
        let namespace = naming::namespace_for(app);
        let selector = naming::pod_selector(app, environment);
        let tail = format!("--tail={tail}");
        let args: [&str; 8] = ["logs", "-f", "--prefix", "-n", &namespace, "-l", &selector, &tail];
        debug!(operation = "logs", ?args, "kubectl");
        let mut child = Command::new(&self.kubectl)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ClusterError::Command {
                program: self.kubectl.clone(),
                source,
            })?;
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(ClusterError::Command {
                program: self.kubectl.clone(),
                source: std::io::Error::other("output pipes unavailable"),
            });
        };

        let (tx, rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut stdout = BufReader::new(stdout).lines();
            let mut stderr = BufReader::new(stderr).lines();
            let (mut out_open, mut err_open) = (true, true);
            while out_open || err_open {
                let line = tokio::select! {
                    line = stdout.next_line(), if out_open => match line {
                        Ok(Some(line)) => line,
                        _ => {
                            out_open = false;
                            continue;
                        }
                    },
                    line = stderr.next_line(), if err_open => match line {
                        Ok(Some(line)) => line,
                        _ => {
                            err_open = false;
                            continue;
                        }
                    },
                    _ = tx.closed() => break,
                };
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            // Killed on drop if still following.
            drop(child);
        });
        Ok(rx)
    }

    async fn delete_namespace(&self, namespace: &str) -> ClusterResult<()> {
        self.run(
            "delete namespace",
            &["delete", "namespace", namespace, "--ignore-not-found", "--wait=true"],
            None,
        )
        .await?;
        info!(%namespace, "namespace deleted");
        Ok(())
    }
}

fn is_not_found(stderr: &str) -> bool {
    stderr.contains("NotFound") || stderr.contains("not found")
}
