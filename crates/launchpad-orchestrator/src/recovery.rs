//! Startup recovery and drift detection.
//!
//! A pending marker means the process died between touching the cluster
//! and recording the result. Once a rollout has started the cluster is
//! authoritative: a ready Deployment running the pending tag completes the
//! step, anything else is rolled back to what the registry says. The
//! marker is dropped only after the rollback has been applied, so a failed
//! rollback is retried by the next pass.

use tracing::{debug, info, warn};

use launchpad_core::{AppName, Environment, ImageTag, LifecycleState, ProgressSink, Step};
use launchpad_state::{AppRecord, PendingKind, PendingStep};

use crate::error::{LifecycleError, LifecycleResult};
use crate::orchestrator::Orchestrator;
use crate::status::{DriftReport, RecoveryOutcome, is_drift};

impl Orchestrator {
    /// Settle every interrupted step left in the registry. Apps with a
    /// running intent are skipped; their marker belongs to that intent.
    pub async fn recover(&self) -> Vec<RecoveryOutcome> {
        let apps = match self.list() {
            Ok(apps) => apps,
            Err(e) => {
                warn!(error = %e, "recovery could not list apps");
                return Vec::new();
            }
        };

        let mut outcomes = Vec::new();
        for app in apps {
            if app.state != LifecycleState::Deleting && app.pending.is_none() {
                continue;
            }
            let Ok(_guard) = self.locks.try_acquire(&app.name) else {
                debug!(app = %app.name, "app busy, recovery deferred");
                continue;
            };
            // Re-read under the lock: an intent may have finished meanwhile.
            let app = match self.load(&app.name, Step::Rollout) {
                Ok(app) => app,
                Err(e) => {
                    outcomes.push(failed(&app.name, e));
                    continue;
                }
            };
            let outcome = match (&app.state, &app.pending) {
                (LifecycleState::Deleting, _) => Some(self.resume_teardown(&app).await),
                (_, Some(step)) => Some(self.settle(&app, step.clone()).await),
                _ => None,
            };
            if let Some(outcome) = outcome {
                match &outcome {
                    RecoveryOutcome::Failed { app, error } => warn!(app = %app, %error, "recovery failed"),
                    other => info!(outcome = ?other, "recovered"),
                }
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// Apps whose live Deployments disagree with the registry. Apps with an
    /// unsettled step are skipped.
    pub async fn check_drift(&self) -> LifecycleResult<Vec<DriftReport>> {
        let mut reports = Vec::new();
        for app in self.list()? {
            if app.state.is_terminal() || app.pending.is_some() || self.locks.is_busy(&app.name) {
                continue;
            }
            for env in [Environment::Preview, Environment::Production] {
                let expected = app.tag_for(env).cloned();
                let live = self
                    .cluster
                    .current_image_tag(&app.name, env)
                    .await
                    .map_err(|e| LifecycleError::cluster(&app.name, Step::Rollout, e))?;
                if is_drift(expected.as_ref(), live.as_ref()) {
                    warn!(app = %app.name, environment = %env, "drift detected");
                    reports.push(DriftReport {
                        app: app.name.clone(),
                        environment: env,
                        expected,
                        live: live.and_then(|l| l.tag),
                    });
                }
            }
        }
        Ok(reports)
    }

    async fn resume_teardown(&self, app: &AppRecord) -> RecoveryOutcome {
        match self.teardown(&app.name, &ProgressSink::discard()).await {
            Ok(_) => RecoveryOutcome::TornDown { app: app.name.clone() },
            Err(e) => failed(&app.name, e),
        }
    }

    async fn settle(&self, app: &AppRecord, step: PendingStep) -> RecoveryOutcome {
        let name = app.name.clone();
        let env = step.kind.environment();
        let live = match self.cluster.current_image_tag(&name, env).await {
            Ok(live) => live,
            Err(e) => return failed(&name, LifecycleError::cluster(&name, Step::Rollout, e)),
        };
        let declared = live.as_ref().is_some_and(|l| l.runs(&step.tag));
        let ready = live.as_ref().is_some_and(|l| l.ready);

        if declared && ready {
            return match self.complete(app, &step) {
                Ok(()) => RecoveryOutcome::Completed {
                    app: name,
                    kind: step.kind,
                    tag: step.tag,
                },
                Err(e) => failed(&name, e),
            };
        }

        let restore = app.tag_for(env).cloned();
        let reverted = match (declared, restore) {
            (true, Some(previous)) => match self.restore(app, env, &previous).await {
                Ok(()) => true,
                Err(e) => return failed(&name, e),
            },
            _ => false,
        };
        if let Err(e) = self.drop_marker(app) {
            return failed(&name, e);
        }
        if reverted {
            RecoveryOutcome::Reverted {
                app: name,
                kind: step.kind,
                tag: step.tag,
            }
        } else {
            RecoveryOutcome::Cleared {
                app: name,
                kind: step.kind,
                tag: step.tag,
            }
        }
    }

    fn drop_marker(&self, app: &AppRecord) -> LifecycleResult<()> {
        self.registry
            .transition(app.name.as_str(), app.state, |a| a.pending = None)
            .map_err(|e| LifecycleError::state(&app.name, Step::Rollout, e))?;
        Ok(())
    }

    /// Record a step the cluster already finished.
    fn complete(&self, app: &AppRecord, step: &PendingStep) -> LifecycleResult<()> {
        let limit = self.settings.history_limit;
        let built_at = self.clock.now().timestamp().max(0) as u64;
        let tag = step.tag.clone();
        let revision = step.revision;
        let kind = step.kind;
        self.registry
            .transition(app.name.as_str(), app.state, |a| {
                a.pending = None;
                match kind {
                    PendingKind::Build => {
                        a.preview_tag = Some(tag.clone());
                        if !a.has_tag(&tag) {
                            a.record_build(tag.clone(), revision.unwrap_or_default(), built_at, limit);
                        }
                        a.state = LifecycleState::PreviewBuilt;
                    }
                    PendingKind::Publish => {
                        a.prod_tag = Some(tag.clone());
                        a.state = LifecycleState::Published;
                    }
                    PendingKind::Rollback => a.prod_tag = Some(tag.clone()),
                }
            })
            .map_err(|e| LifecycleError::state(&app.name, Step::Rollout, e))?;
        Ok(())
    }

    async fn restore(&self, app: &AppRecord, env: Environment, tag: &ImageTag) -> LifecycleResult<()> {
        let desired = self.desired();
        self.cluster
            .reconcile_deployment(&desired.deployment(&app.name, app.template, env, tag))
            .await
            .map_err(|e| LifecycleError::cluster(&app.name, Step::Rollout, e))
    }
}

fn failed(app: &AppName, err: LifecycleError) -> RecoveryOutcome {
    RecoveryOutcome::Failed {
        app: app.clone(),
        error: err.to_string(),
    }
}
