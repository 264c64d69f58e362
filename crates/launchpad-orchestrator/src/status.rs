//! Read-side views: status, drift and recovery reports.

use serde::Serialize;

use launchpad_cluster::{LiveDeployment, PodStatus};
use launchpad_core::{AppName, Environment, ImageTag};
use launchpad_state::{AppRecord, PendingKind};

/// Registry tag versus what the cluster runs, for one environment.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentStatus {
    pub environment: Environment,
    pub url: String,
    pub tag: Option<ImageTag>,
    pub live: Option<LiveDeployment>,
    pub drift: bool,
    /// Pod phase, restarts and readiness; absent when the cluster was not asked.
    pub pods: Option<PodStatus>,
}

impl EnvironmentStatus {
    pub fn new(environment: Environment, url: String, tag: Option<ImageTag>, live: Option<LiveDeployment>) -> Self {
        let drift = is_drift(tag.as_ref(), live.as_ref());
        Self {
            environment,
            url,
            tag,
            live,
            drift,
            pods: None,
        }
    }

    pub fn with_pods(mut self, pods: Option<PodStatus>) -> Self {
        self.pods = pods;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AppStatus {
    #[serde(flatten)]
    pub record: AppRecord,
    pub preview: EnvironmentStatus,
    pub production: EnvironmentStatus,
    /// An intent currently holds the app's lock.
    pub busy: bool,
    /// Set when the cluster could not be queried; live fields are then empty.
    pub cluster_error: Option<String>,
}

/// A mismatch between the registry and the live cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub app: AppName,
    pub environment: Environment,
    pub expected: Option<ImageTag>,
    pub live: Option<ImageTag>,
}

/// What startup recovery did for one app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// The cluster already runs the pending tag; the step was recorded.
    Completed { app: AppName, kind: PendingKind, tag: ImageTag },
    /// The marker was dropped and the environment restored to the registry tag.
    Reverted { app: AppName, kind: PendingKind, tag: ImageTag },
    /// The marker was dropped; nothing had reached the cluster.
    Cleared { app: AppName, kind: PendingKind, tag: ImageTag },
    /// An interrupted delete was finished.
    TornDown { app: AppName },
    Failed { app: AppName, error: String },
}

/// Drift exists when the registry expects a tag the cluster does not run, or
/// the cluster runs something the registry does not expect.
pub(crate) fn is_drift(expected: Option<&ImageTag>, live: Option<&LiveDeployment>) -> bool {
    match (expected, live) {
        (Some(tag), Some(live)) => !live.runs(tag),
        (Some(_), None) => true,
        (None, Some(_)) => true,
        (None, None) => false,
    }
}
