//! Rollout watcher — classifies Deployment status observations.
//!
//! The cluster performs the rolling update itself (`maxSurge 1`,
//! `maxUnavailable 0`); the watcher only decides, one observation at a time,
//! whether to keep waiting, declare success, or give up and revert.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Rolling-update parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingConfig {
    /// Extra pods allowed above the desired count during a rollout.
    pub max_surge: u32,
    /// Pods allowed to be unavailable during a rollout.
    pub max_unavailable: u32,
    /// Seconds to wait for the new ReplicaSet to become ready.
    pub timeout_secs: u64,
    /// Milliseconds between status polls.
    pub poll_interval_ms: u64,
}

impl Default for RollingConfig {
    fn default() -> Self {
        Self {
            max_surge: 1,
            max_unavailable: 0,
            timeout_secs: 90,
            poll_interval_ms: 2000,
        }
    }
}

impl RollingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// One snapshot of a Deployment's status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutObservation {
    pub generation: i64,
    pub observed_generation: i64,
    pub desired_replicas: u32,
    pub updated_replicas: u32,
    pub ready_replicas: u32,
    pub available_replicas: u32,
    pub unavailable_replicas: u32,
    /// Image declared by the pod template.
    pub image: Option<String>,
}

impl RolloutObservation {
    /// Parse the fields of interest from `kubectl get deployment -o json`.
    pub fn from_deployment_json(value: &serde_json::Value) -> Self {
        let int = |v: &serde_json::Value| v.as_i64().unwrap_or(0);
        let count = |v: &serde_json::Value| v.as_u64().unwrap_or(0) as u32;
        let status = &value["status"];
        Self {
            generation: int(&value["metadata"]["generation"]),
            observed_generation: int(&status["observedGeneration"]),
            desired_replicas: value["spec"]["replicas"].as_u64().unwrap_or(1) as u32,
            updated_replicas: count(&status["updatedReplicas"]),
            ready_replicas: count(&status["readyReplicas"]),
            available_replicas: count(&status["availableReplicas"]),
            unavailable_replicas: count(&status["unavailableReplicas"]),
            image: value["spec"]["template"]["spec"]["containers"][0]["image"]
                .as_str()
                .map(str::to_string),
        }
    }

    /// The controller has seen the latest spec and every replica runs it.
    pub fn is_complete(&self) -> bool {
        self.observed_generation >= self.generation
            && self.updated_replicas >= self.desired_replicas
            && self.ready_replicas >= self.desired_replicas
            && self.available_replicas >= self.desired_replicas
            && self.unavailable_replicas == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{}/{} updated, {}/{} ready",
            self.updated_replicas, self.desired_replicas, self.ready_replicas, self.desired_replicas
        )
    }
}

/// Current phase of a watched rollout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RolloutPhase {
    /// Not started.
    Pending,
    /// New pods are being brought up.
    Progressing { updated: u32, ready: u32, desired: u32 },
    /// Completed successfully.
    Completed,
    /// Gave up waiting.
    TimedOut { reason: String },
}

/// What the caller should do after an observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    /// Poll again after the interval.
    Wait,
    /// The rollout finished.
    Done,
    /// Re-apply the previous image and report a timeout.
    Revert,
}

#[derive(Debug, Clone)]
pub struct RolloutWatch {
    pub deployment: String,
    pub target_image: String,
    pub phase: RolloutPhase,
    timeout: Duration,
    started_at: Option<Instant>,
}

impl RolloutWatch {
    pub fn new(deployment: &str, target_image: &str, timeout: Duration) -> Self {
        Self {
            deployment: deployment.to_string(),
            target_image: target_image.to_string(),
            phase: RolloutPhase::Pending,
            timeout,
            started_at: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.started_at = Some(now);
        self.phase = RolloutPhase::Progressing {
            updated: 0,
            ready: 0,
            desired: 0,
        };
        info!(deployment = %self.deployment, image = %self.target_image, "watching rollout");
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.started_at
            .map(|s| now.saturating_duration_since(s))
            .unwrap_or_default()
    }

    /// Classify one observation taken at `now`.
    pub fn advance(&mut self, obs: &RolloutObservation, now: Instant) -> WatchAction {
        match &self.phase {
            RolloutPhase::Pending => WatchAction::Wait,
            RolloutPhase::Completed => WatchAction::Done,
            RolloutPhase::TimedOut { .. } => WatchAction::Revert,

            RolloutPhase::Progressing { .. } => {
                let on_target = obs.image.as_deref() == Some(self.target_image.as_str());
                if on_target && obs.is_complete() {
                    self.phase = RolloutPhase::Completed;
                    info!(deployment = %self.deployment, "rollout completed");
                    return WatchAction::Done;
                }

                if self.elapsed(now) >= self.timeout {
                    let reason = if on_target {
                        obs.summary()
                    } else {
                        format!("template still declares {:?}", obs.image)
                    };
                    warn!(deployment = %self.deployment, %reason, "rollout timed out");
                    self.phase = RolloutPhase::TimedOut { reason };
                    return WatchAction::Revert;
                }

                self.phase = RolloutPhase::Progressing {
                    updated: obs.updated_replicas,
                    ready: obs.ready_replicas,
                    desired: obs.desired_replicas,
                };
                debug!(deployment = %self.deployment, status = %obs.summary(), "rollout progressing");
                WatchAction::Wait
            }
        }
    }
}
