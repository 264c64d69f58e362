//! Lifecycle error taxonomy.
//!
//! Every variant names the app; variants for external steps also name the
//! step and carry the collaborator's output.

use thiserror::Error;

use launchpad_build::BuildError;
use launchpad_cluster::ClusterError;
use launchpad_core::{NameError, Step};
use launchpad_state::StateError;
use launchpad_vcs::VcsError;

pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("app {0} already exists")]
    DuplicateName(String),

    #[error("app {0} not found")]
    NotFound(String),

    #[error("app {app}: {reason}")]
    Conflict { app: String, reason: String },

    #[error(transparent)]
    InvalidName(#[from] NameError),

    #[error("app {app}: code generation failed: {message}")]
    GenerationFailure { app: String, message: String },

    #[error("app {app}: code generation cancelled")]
    Cancelled { app: String },

    #[error("app {app}: storage fault during {step}: {message}")]
    StorageFault { app: String, step: Step, message: String },

    #[error("app {app}: image build failed for {tag}")]
    BuildFailure { app: String, tag: String, log: String },

    #[error("app {app}: image push failed for {tag}")]
    PushFailure { app: String, tag: String, log: String },

    #[error("app {app}: rollout did not become ready: {message}")]
    RolloutTimeout { app: String, step: Step, message: String },

    #[error("app {app}: isolation policy could not be applied: {message}")]
    PolicyApplyFailure { app: String, message: String },

    #[error("app {app}: cluster error during {step}: {message}")]
    Cluster { app: String, step: Step, message: String },

    #[error("app {app}: rollback target {tag} is not in history")]
    RollbackTargetMissing { app: String, tag: String },
}

impl LifecycleError {
    /// Stable machine-readable kind, used by the HTTP surface.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleError::DuplicateName(_) => "duplicate_name",
            LifecycleError::NotFound(_) => "not_found",
            LifecycleError::Conflict { .. } => "conflict",
            LifecycleError::InvalidName(_) => "invalid_name",
            LifecycleError::GenerationFailure { .. } => "generation_failure",
            LifecycleError::Cancelled { .. } => "cancelled",
            LifecycleError::StorageFault { .. } => "storage_fault",
            LifecycleError::BuildFailure { .. } => "build_failure",
            LifecycleError::PushFailure { .. } => "push_failure",
            LifecycleError::RolloutTimeout { .. } => "rollout_timeout",
            LifecycleError::PolicyApplyFailure { .. } => "policy_apply_failure",
            LifecycleError::Cluster { .. } => "cluster",
            LifecycleError::RollbackTargetMissing { .. } => "rollback_target_missing",
        }
    }

    /// Captured tool output for build and push failures.
    pub fn log(&self) -> Option<&str> {
        match self {
            LifecycleError::BuildFailure { log, .. } | LifecycleError::PushFailure { log, .. } => Some(log),
            _ => None,
        }
    }

    pub(crate) fn conflict(app: impl ToString, reason: impl Into<String>) -> Self {
        LifecycleError::Conflict {
            app: app.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn state(app: impl ToString, step: Step, err: StateError) -> Self {
        let app = app.to_string();
        match err {
            StateError::NotFound(name) => LifecycleError::NotFound(name),
            StateError::DuplicateName(name) => LifecycleError::DuplicateName(name),
            StateError::Conflict { expected, actual, .. } => LifecycleError::Conflict {
                app,
                reason: format!("state changed concurrently (expected {expected}, found {actual})"),
            },
            other => LifecycleError::StorageFault {
                app,
                step,
                message: other.to_string(),
            },
        }
    }

    pub(crate) fn vcs(app: impl ToString, step: Step, err: VcsError) -> Self {
        LifecycleError::StorageFault {
            app: app.to_string(),
            step,
            message: err.to_string(),
        }
    }

    pub(crate) fn build(app: impl ToString, err: BuildError) -> Self {
        let app = app.to_string();
        match err {
            BuildError::BuildFailure { tag, log } => LifecycleError::BuildFailure { app, tag, log },
            BuildError::PushFailure { tag, log } => LifecycleError::PushFailure { app, tag, log },
            spawn @ BuildError::Spawn { .. } => LifecycleError::BuildFailure {
                app,
                tag: String::new(),
                log: spawn.to_string(),
            },
        }
    }

    pub(crate) fn cluster(app: impl ToString, step: Step, err: ClusterError) -> Self {
        let app = app.to_string();
        match err {
            timeout @ ClusterError::RolloutTimeout { .. } => LifecycleError::RolloutTimeout {
                app,
                step,
                message: timeout.to_string(),
            },
            ClusterError::PolicyApply { message, .. } => LifecycleError::PolicyApplyFailure { app, message },
            other => LifecycleError::Cluster {
                app,
                step,
                message: other.to_string(),
            },
        }
    }
}
