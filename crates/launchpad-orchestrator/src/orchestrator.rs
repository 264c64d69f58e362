//! Lifecycle intents.
//!
//! ```text
//! create ──► Created ──generate──► Generated ──build_preview──► PreviewBuilt ──publish──► Published
//!                 ▲                   ▲  │                        │  ▲                     │
//!                 └── generate ───────┘  └──── build_preview ─────┘  └──── build_preview ──┘
//! any ──delete──► Deleting ──► Deleted
//! ```
//!
//! Rollback and resync do not change the lifecycle state.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use launchpad_build::{ImageBuilder, TagPolicy};
use launchpad_cluster::{ClusterController, DesiredState};
use launchpad_codegen::{CodeGenerator, GenerationEvent, GenerationRequest, scaffold};
use launchpad_core::{
    AppName, Environment, ImageTag, LifecycleState, Progress, ProgressSink, Step, TemplateKind,
};
use launchpad_state::{AppRecord, AppRegistry, PendingKind, PendingStep};
use launchpad_vcs::{FileSet, VersionStore};

use crate::clock::{Clock, SystemClock};
use crate::error::{LifecycleError, LifecycleResult};
use crate::locks::AppLocks;
use crate::settings::OrchestratorSettings;
use crate::status::{AppStatus, EnvironmentStatus};

/// The external systems the orchestrator drives.
pub struct Collaborators {
    pub vcs: Arc<dyn VersionStore>,
    pub builder: Arc<dyn ImageBuilder>,
    pub cluster: Arc<dyn ClusterController>,
    pub generator: Arc<dyn CodeGenerator>,
}

pub struct Orchestrator {
    pub(crate) registry: AppRegistry,
    pub(crate) vcs: Arc<dyn VersionStore>,
    pub(crate) builder: Arc<dyn ImageBuilder>,
    pub(crate) cluster: Arc<dyn ClusterController>,
    pub(crate) generator: Arc<dyn CodeGenerator>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) settings: OrchestratorSettings,
    pub(crate) locks: AppLocks,
}

const GENERATE_FROM: &[LifecycleState] = &[
    LifecycleState::Created,
    LifecycleState::Generated,
    LifecycleState::PreviewBuilt,
    LifecycleState::Published,
];

const BUILD_FROM: &[LifecycleState] = &[
    LifecycleState::Generated,
    LifecycleState::PreviewBuilt,
    LifecycleState::Published,
];

impl Orchestrator {
    pub fn new(registry: AppRegistry, collaborators: Collaborators, settings: OrchestratorSettings) -> Self {
        Self {
            registry,
            vcs: collaborators.vcs,
            builder: collaborators.builder,
            cluster: collaborators.cluster,
            generator: collaborators.generator,
            clock: Arc::new(SystemClock),
            settings,
            locks: AppLocks::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &AppRegistry {
        &self.registry
    }

    pub fn desired(&self) -> &DesiredState {
        &self.settings.desired
    }

    // ── Intents ────────────────────────────────────────────────────

    /// Register a new app and commit its template scaffold as the first
    /// revision. Nothing touches the cluster until the first build.
    pub async fn create(&self, raw_name: &str, template: TemplateKind) -> LifecycleResult<AppRecord> {
        let name = AppName::normalize(raw_name)?;
        let result = self.register(&name, template);
        if result.is_err() {
            self.locks.forget(&name);
        }
        result
    }

    fn register(&self, name: &AppName, template: TemplateKind) -> LifecycleResult<AppRecord> {
        let _guard = self.locks.try_acquire(name)?;

        if self
            .registry
            .find(name.as_str())
            .map_err(|e| LifecycleError::state(name, Step::Commit, e))?
            .is_some()
        {
            return Err(LifecycleError::DuplicateName(name.to_string()));
        }

        let files = scaffold(template, name).map_err(|e| LifecycleError::vcs(name, Step::Commit, e))?;
        // Leftovers from a create that died before registering belong to nobody.
        self.vcs
            .purge(name)
            .map_err(|e| LifecycleError::vcs(name, Step::Commit, e))?;
        let revision = self
            .vcs
            .commit(name, &files)
            .map_err(|e| LifecycleError::vcs(name, Step::Commit, e))?;

        let record = self
            .registry
            .create_app(name, template, Some(revision.sequence))
            .map_err(|e| LifecycleError::state(name, Step::Commit, e))?;
        info!(app = %name, %template, revision = revision.sequence, "app created");
        Ok(record)
    }

    /// Stream code generation for `description` and commit the result.
    ///
    /// Cancelling `cancel` before the commit abandons the run with no
    /// revision and no state change.
    pub async fn generate(
        &self,
        name: &str,
        description: &str,
        progress: &ProgressSink,
        cancel: CancellationToken,
    ) -> LifecycleResult<AppRecord> {
        let name = AppName::parse(name)?;
        let _guard = self.locks.try_acquire(&name)?;
        let app = self.load(&name, Step::Generate)?;
        require_state(&app, GENERATE_FROM, "generate")?;
        require_settled(&app)?;

        let existing = match app.latest_revision {
            Some(seq) => self
                .vcs
                .files(&name, seq)
                .map_err(|e| LifecycleError::vcs(&name, Step::Generate, e))?,
            None => FileSet::new(),
        };

        progress.step(Step::Generate, format!("generating {} code for {name}", app.template));
        let mut events = self.generator.generate(GenerationRequest {
            app: name.clone(),
            template: app.template,
            description: description.to_string(),
            existing: existing.clone(),
        });

        let generated = loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(app = %name, "generation cancelled");
                    return Err(LifecycleError::Cancelled { app: name.to_string() });
                }
                event = events.recv() => event,
            };
            match event {
                Some(Ok(GenerationEvent::Token(text))) => progress.send(Progress::Token { text }),
                Some(Ok(GenerationEvent::File { name: file, .. })) => {
                    debug!(app = %name, %file, "file generated");
                    progress.send(Progress::File { name: file });
                }
                Some(Ok(GenerationEvent::Complete { files })) => break files,
                Some(Err(e)) => {
                    warn!(app = %name, error = %e, "generation failed");
                    return Err(LifecycleError::GenerationFailure {
                        app: name.to_string(),
                        message: e.to_string(),
                    });
                }
                None => {
                    return Err(LifecycleError::GenerationFailure {
                        app: name.to_string(),
                        message: "generator stopped before completing".to_string(),
                    });
                }
            }
        };
        drop(events);

        if generated.is_empty() {
            return Err(LifecycleError::GenerationFailure {
                app: name.to_string(),
                message: "no files were generated".to_string(),
            });
        }
        if cancel.is_cancelled() {
            return Err(LifecycleError::Cancelled { app: name.to_string() });
        }

        let mut files = existing;
        files.merge(generated);
        progress.step(Step::Commit, format!("committing {} files", files.len()));
        let revision = self
            .vcs
            .commit(&name, &files)
            .map_err(|e| LifecycleError::vcs(&name, Step::Commit, e))?;

        let description = description.to_string();
        let record = self
            .registry
            .transition(name.as_str(), app.state, |a| {
                a.state = LifecycleState::Generated;
                a.latest_revision = Some(revision.sequence);
                a.description = Some(description);
            })
            .map_err(|e| LifecycleError::state(&name, Step::Commit, e))?;
        info!(app = %name, revision = revision.sequence, "generation committed");
        Ok(record)
    }

    /// Build the latest revision into a new image and deploy it to preview.
    pub async fn build_preview(&self, name: &str, progress: &ProgressSink) -> LifecycleResult<AppRecord> {
        let name = AppName::parse(name)?;
        let _guard = self.locks.try_acquire(&name)?;
        let app = self.load(&name, Step::Build)?;
        require_state(&app, BUILD_FROM, "build a preview")?;
        require_settled(&app)?;

        // Only a revision the registry acknowledged is buildable; a commit
        // whose registry update failed is ignored until it is regenerated.
        let revision = app
            .latest_revision
            .ok_or_else(|| LifecycleError::conflict(&name, "no committed revision to build"))?;
        let tag = TagPolicy::next(&name, app.newest_issued_tag(), self.clock.now());

        self.mark_pending(&app, PendingKind::Build, &tag, Some(revision))?;
        let outcome = self.deploy_preview(&app, &tag, revision, progress).await;
        if let Err(e) = outcome {
            warn!(app = %name, tag = %tag, error = %e, "preview build failed");
            self.clear_pending(&app);
            return Err(e);
        }

        let built_at = self.clock.now().timestamp().max(0) as u64;
        let limit = self.settings.history_limit;
        let record = self
            .registry
            .transition(name.as_str(), app.state, |a| {
                a.pending = None;
                a.preview_tag = Some(tag.clone());
                a.record_build(tag.clone(), revision, built_at, limit);
                a.state = LifecycleState::PreviewBuilt;
            })
            .map_err(|e| LifecycleError::state(&name, Step::Build, e))?;
        info!(app = %name, tag = %tag, revision, "preview built");
        Ok(record)
    }

    /// Promote the preview image to production. Never builds.
    pub async fn publish(&self, name: &str, progress: &ProgressSink) -> LifecycleResult<AppRecord> {
        let name = AppName::parse(name)?;
        let _guard = self.locks.try_acquire(&name)?;
        let app = self.load(&name, Step::Rollout)?;
        require_state(&app, &[LifecycleState::PreviewBuilt], "publish")?;
        require_settled(&app)?;
        let tag = app
            .preview_tag
            .clone()
            .ok_or_else(|| LifecycleError::conflict(&name, "no preview image to publish"))?;

        self.mark_pending(&app, PendingKind::Publish, &tag, app.revision_of(&tag))?;
        if let Err(e) = self.deploy(&app, Environment::Production, &tag, progress).await {
            warn!(app = %name, tag = %tag, error = %e, "publish failed");
            self.clear_pending(&app);
            return Err(e);
        }

        let record = self
            .registry
            .transition(name.as_str(), app.state, |a| {
                a.pending = None;
                a.prod_tag = Some(tag.clone());
                a.state = LifecycleState::Published;
            })
            .map_err(|e| LifecycleError::state(&name, Step::Rollout, e))?;
        info!(app = %name, tag = %tag, "published");
        Ok(record)
    }

    /// Point production at `target` (a full tag or a bare version token), or
    /// at the newest image older than the current production tag.
    pub async fn rollback(
        &self,
        name: &str,
        target: Option<&str>,
        progress: &ProgressSink,
    ) -> LifecycleResult<AppRecord> {
        let name = AppName::parse(name)?;
        let _guard = self.locks.try_acquire(&name)?;
        let app = self.load(&name, Step::Rollout)?;
        if app.state.is_terminal() {
            return Err(LifecycleError::conflict(&name, format!("app is {}", app.state)));
        }
        require_settled(&app)?;
        let current = app
            .prod_tag
            .clone()
            .ok_or_else(|| LifecycleError::conflict(&name, "nothing is in production"))?;

        let target = match target {
            Some(raw) => resolve_target(&app, raw)?,
            None => match app.previous_production_candidate() {
                Some(tag) => tag.clone(),
                None => {
                    info!(app = %name, tag = %current, "no older image to roll back to");
                    return Ok(app);
                }
            },
        };
        if target == current {
            debug!(app = %name, tag = %target, "already in production");
            return Ok(app);
        }

        self.mark_pending(&app, PendingKind::Rollback, &target, app.revision_of(&target))?;
        if let Err(e) = self.deploy(&app, Environment::Production, &target, progress).await {
            warn!(app = %name, tag = %target, error = %e, "rollback failed");
            self.clear_pending(&app);
            return Err(e);
        }

        let record = self
            .registry
            .transition(name.as_str(), app.state, |a| {
                a.pending = None;
                a.prod_tag = Some(target.clone());
            })
            .map_err(|e| LifecycleError::state(&name, Step::Rollout, e))?;
        info!(app = %name, from = %current, to = %target, "rolled back");
        Ok(record)
    }

    /// Tear down the app's namespace and revisions, leaving a tombstone so
    /// the name is never reused.
    pub async fn delete(&self, name: &str, progress: &ProgressSink) -> LifecycleResult<AppRecord> {
        let name = AppName::parse(name)?;
        let guard = self.locks.try_acquire(&name)?;
        let app = self.load(&name, Step::Teardown)?;
        let record = match app.state {
            LifecycleState::Deleted => app,
            LifecycleState::Deleting => self.teardown(&name, progress).await?,
            from => {
                self.registry
                    .transition(name.as_str(), from, |a| {
                        a.state = LifecycleState::Deleting;
                        a.pending = None;
                    })
                    .map_err(|e| LifecycleError::state(&name, Step::Teardown, e))?;
                self.teardown(&name, progress).await?
            }
        };
        drop(guard);
        self.locks.forget(&name);
        Ok(record)
    }

    /// Registry record plus what the cluster is actually running.
    pub async fn status(&self, name: &str) -> LifecycleResult<AppStatus> {
        let name = AppName::parse(name)?;
        let record = self.load(&name, Step::Rollout)?;
        let busy = self.locks.is_busy(&name);

        let mut cluster_error = None;
        let mut live = [None, None];
        let mut pods = [None, None];
        if !record.state.is_terminal() && (record.preview_tag.is_some() || record.prod_tag.is_some()) {
            for (i, env) in [Environment::Preview, Environment::Production].into_iter().enumerate() {
                let observed = match self.cluster.current_image_tag(&name, env).await {
                    Ok(found) => self.cluster.pod_status(&name, env).await.map(|p| (found, p)),
                    Err(e) => Err(e),
                };
                match observed {
                    Ok((found, pod_status)) => {
                        live[i] = found;
                        pods[i] = Some(pod_status);
                    }
                    Err(e) => {
                        warn!(app = %name, environment = %env, error = %e, "live status unavailable");
                        cluster_error = Some(e.to_string());
                        break;
                    }
                }
            }
        }
        let [live_preview, live_prod] = live;
        let [pods_preview, pods_prod] = pods;
        let desired = self.desired();
        Ok(AppStatus {
            preview: EnvironmentStatus::new(
                Environment::Preview,
                desired.url(&name, Environment::Preview),
                record.preview_tag.clone(),
                live_preview,
            )
            .with_pods(pods_preview),
            production: EnvironmentStatus::new(
                Environment::Production,
                desired.url(&name, Environment::Production),
                record.prod_tag.clone(),
                live_prod,
            )
            .with_pods(pods_prod),
            record,
            busy,
            cluster_error,
        })
    }

    /// Follow the logs of the pods serving `environment`, starting with the
    /// last `tail` lines. The stream ends when the pods go away or the
    /// receiver is dropped.
    pub async fn logs(
        &self,
        name: &str,
        environment: Environment,
        tail: u32,
    ) -> LifecycleResult<mpsc::Receiver<String>> {
        let name = AppName::parse(name)?;
        let record = self.load(&name, Step::Inspect)?;
        if record.state.is_terminal() {
            return Err(LifecycleError::conflict(&name, "app is deleted"));
        }
        if record.tag_for(environment).is_none() {
            return Err(LifecycleError::conflict(&name, format!("nothing is deployed to {environment}")));
        }
        debug!(app = %name, %environment, tail, "streaming pod logs");
        self.cluster
            .pod_logs(&name, environment, tail)
            .await
            .map_err(|e| LifecycleError::cluster(&name, Step::Inspect, e))
    }

    pub fn list(&self) -> LifecycleResult<Vec<AppRecord>> {
        self.registry
            .list()
            .map_err(|e| LifecycleError::state("*", Step::Commit, e))
    }

    /// Re-apply every environment's desired state from the registry.
    pub async fn resync(&self, name: &str, progress: &ProgressSink) -> LifecycleResult<AppRecord> {
        let name = AppName::parse(name)?;
        let _guard = self.locks.try_acquire(&name)?;
        let app = self.load(&name, Step::Rollout)?;
        if app.state.is_terminal() {
            return Err(LifecycleError::conflict(&name, format!("app is {}", app.state)));
        }
        require_settled(&app)?;
        for env in [Environment::Preview, Environment::Production] {
            if let Some(tag) = app.tag_for(env).cloned() {
                self.deploy(&app, env, &tag, progress).await?;
            }
        }
        info!(app = %name, "resynced");
        Ok(app)
    }

    // ── Steps ──────────────────────────────────────────────────────

    pub(crate) fn load(&self, name: &AppName, step: Step) -> LifecycleResult<AppRecord> {
        self.registry
            .get(name.as_str())
            .map_err(|e| LifecycleError::state(name, step, e))
    }

    fn mark_pending(
        &self,
        app: &AppRecord,
        kind: PendingKind,
        tag: &ImageTag,
        revision: Option<u64>,
    ) -> LifecycleResult<()> {
        let started_at = self.clock.now().timestamp().max(0) as u64;
        let step = PendingStep {
            kind,
            tag: tag.clone(),
            revision,
            started_at,
        };
        self.registry
            .transition(app.name.as_str(), app.state, |a| {
                if kind == PendingKind::Build {
                    a.last_issued_tag = Some(tag.clone());
                }
                a.pending = Some(step);
            })
            .map_err(|e| LifecycleError::state(&app.name, Step::Build, e))?;
        debug!(app = %app.name, tag = %tag, ?kind, "step pending");
        Ok(())
    }

    /// Drop the pending marker after a failed step. If even that fails the
    /// marker stays and startup recovery settles it.
    fn clear_pending(&self, app: &AppRecord) {
        if let Err(e) = self.registry.transition(app.name.as_str(), app.state, |a| a.pending = None) {
            warn!(app = %app.name, error = %e, "failed to clear pending step");
        }
    }

    async fn deploy_preview(
        &self,
        app: &AppRecord,
        tag: &ImageTag,
        revision: u64,
        progress: &ProgressSink,
    ) -> LifecycleResult<()> {
        let name = &app.name;
        progress.step(Step::Checkout, format!("checking out revision {revision}"));
        let context = self
            .vcs
            .checkout(name, revision)
            .map_err(|e| LifecycleError::vcs(name, Step::Checkout, e))?;

        progress.step(Step::Build, format!("building {tag}"));
        self.builder
            .build(&context, tag, progress)
            .await
            .map_err(|e| LifecycleError::build(name, e))?;

        progress.step(Step::Push, format!("pushing {tag}"));
        self.builder
            .push(tag, progress)
            .await
            .map_err(|e| LifecycleError::build(name, e))?;

        self.deploy(app, Environment::Preview, tag, progress).await
    }

    /// Namespace, ingress and rollout for one environment.
    ///
    /// The rollout is the last step that touches the cluster: once it
    /// succeeds the new image is serving, so nothing after it may fail
    /// without the pending marker still in place.
    pub(crate) async fn deploy(
        &self,
        app: &AppRecord,
        env: Environment,
        tag: &ImageTag,
        progress: &ProgressSink,
    ) -> LifecycleResult<()> {
        let name = &app.name;
        let desired = self.desired();

        progress.step(Step::Namespace, format!("ensuring namespace {}", app.namespace));
        self.cluster
            .ensure_namespace(&desired.namespace(name))
            .await
            .map_err(|e| LifecycleError::cluster(name, Step::Namespace, e))?;

        progress.step(Step::Ingress, format!("routing {}", desired.url(name, env)));
        self.cluster
            .route_ingress(&desired.ingress(name, app.template, env))
            .await
            .map_err(|e| LifecycleError::cluster(name, Step::Ingress, e))?;

        progress.step(Step::Rollout, format!("rolling out {tag} to {env}"));
        self.cluster
            .reconcile_deployment(&desired.deployment(name, app.template, env, tag))
            .await
            .map_err(|e| LifecycleError::cluster(name, Step::Rollout, e))?;
        Ok(())
    }

    pub(crate) async fn teardown(&self, name: &AppName, progress: &ProgressSink) -> LifecycleResult<AppRecord> {
        let namespace = launchpad_core::naming::namespace_for(name);
        progress.step(Step::Teardown, format!("deleting namespace {namespace}"));
        self.cluster
            .delete_namespace(&namespace)
            .await
            .map_err(|e| LifecycleError::cluster(name, Step::Teardown, e))?;
        self.vcs
            .purge(name)
            .map_err(|e| LifecycleError::vcs(name, Step::Teardown, e))?;

        let record = self
            .registry
            .transition(name.as_str(), LifecycleState::Deleting, |a| {
                a.state = LifecycleState::Deleted;
                a.preview_tag = None;
                a.prod_tag = None;
                a.pending = None;
            })
            .map_err(|e| LifecycleError::state(name, Step::Teardown, e))?;
        info!(app = %name, "app deleted");
        Ok(record)
    }
}

fn require_state(app: &AppRecord, allowed: &[LifecycleState], action: &str) -> LifecycleResult<()> {
    if allowed.contains(&app.state) {
        Ok(())
    } else {
        Err(LifecycleError::conflict(
            &app.name,
            format!("cannot {action} while {}", app.state),
        ))
    }
}

fn require_settled(app: &AppRecord) -> LifecycleResult<()> {
    match &app.pending {
        None => Ok(()),
        Some(step) => Err(LifecycleError::conflict(
            &app.name,
            format!("{:?} of {} was interrupted and has not been recovered", step.kind, step.tag),
        )),
    }
}

/// Accept `app:token` or a bare token; the tag must be in the app's history.
fn resolve_target(app: &AppRecord, raw: &str) -> LifecycleResult<ImageTag> {
    let missing = || LifecycleError::RollbackTargetMissing {
        app: app.name.to_string(),
        tag: raw.to_string(),
    };
    let raw = raw.trim();
    let tag = if raw.contains(':') {
        raw.parse::<ImageTag>().map_err(|_| missing())?
    } else if raw.is_empty() {
        return Err(missing());
    } else {
        ImageTag::new(app.name.clone(), raw)
    };
    if tag.app() != &app.name || !app.has_tag(&tag) {
        return Err(missing());
    }
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_with_history() -> AppRecord {
        let mut app = AppRecord::new(AppName::parse("demo").unwrap(), TemplateKind::Api, 0);
        app.record_build("demo:20260221.100000".parse().unwrap(), 1, 0, 10);
        app
    }

    #[test]
    fn resolves_full_and_bare_targets() {
        let app = app_with_history();
        let full = resolve_target(&app, "demo:20260221.100000").unwrap();
        let bare = resolve_target(&app, "20260221.100000").unwrap();
        assert_eq!(full, bare);
    }

    #[test]
    fn rejects_unknown_or_foreign_targets() {
        let app = app_with_history();
        for raw in ["20990101.000000", "other:20260221.100000", "", "bad tag:"] {
            assert!(
                matches!(resolve_target(&app, raw), Err(LifecycleError::RollbackTargetMissing { .. })),
                "{raw:?} accepted"
            );
        }
    }

    #[test]
    fn state_guard_names_the_action() {
        let app = app_with_history();
        let err = require_state(&app, &[LifecycleState::PreviewBuilt], "publish").unwrap_err();
        assert_eq!(err.to_string(), "app demo: cannot publish while created");
    }
}

#[cfg(all(test, feature = "testkit"))]
mod lock_tests {
    use crate::testkit::Harness;
    use launchpad_core::{ProgressSink, TemplateKind};

    #[tokio::test]
    async fn failed_create_drops_its_lock() {
        let h = Harness::new();
        h.vcs.fail_commits(true);
        h.orchestrator.create("demo", TemplateKind::Api).await.unwrap_err();
        h.orchestrator.create("9lives", TemplateKind::Api).await.unwrap_err();
        assert!(h.orchestrator.locks.is_empty());

        h.vcs.fail_commits(false);
        h.orchestrator.create("demo", TemplateKind::Api).await.unwrap();
        assert_eq!(h.orchestrator.locks.len(), 1);
    }

    #[tokio::test]
    async fn delete_drops_the_lock() {
        let h = Harness::new();
        h.generated("demo", TemplateKind::Api).await;
        h.orchestrator.delete("demo", &ProgressSink::discard()).await.unwrap();
        assert!(h.orchestrator.locks.is_empty());
    }
}
