//! Lifecycle regression tests.
//!
//! Drives the orchestrator through create, generate, build, publish,
//! rollback and delete against the in-process fakes.

use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use launchpad_cluster::{LiveDeployment, PodStatus};
use launchpad_core::{Environment, ImageTag, LifecycleState, Progress, ProgressSink, Step, TemplateKind};
use launchpad_orchestrator::testkit::{Harness, Script};
use launchpad_orchestrator::{LifecycleError, OrchestratorSettings};
use launchpad_vcs::{FileSet, VersionStore};

fn tag(raw: &str) -> ImageTag {
    raw.parse().unwrap()
}

fn quiet() -> ProgressSink {
    ProgressSink::discard()
}

// ── Create ─────────────────────────────────────────────────────────

#[tokio::test]
async fn create_normalizes_name_and_commits_scaffold() {
    let h = Harness::new();
    let app = h.orchestrator.create("  My App ", TemplateKind::Api).await.unwrap();

    assert_eq!(app.name.as_str(), "my-app");
    assert_eq!(app.namespace, "app-my-app");
    assert_eq!(app.state, LifecycleState::Created);
    assert_eq!(app.latest_revision, Some(1));

    let files = h.vcs.files(&app.name, 1).unwrap();
    assert!(files.contains("Dockerfile"));
    assert!(files.contains("app.py"));
    assert_eq!(h.cluster.calls("ensure_namespace"), 0, "create must not touch the cluster");
}

#[tokio::test]
async fn create_rejects_duplicates_and_bad_names() {
    let h = Harness::new();
    h.orchestrator.create("demo", TemplateKind::Api).await.unwrap();

    let err = h.orchestrator.create("DEMO", TemplateKind::Webhook).await.unwrap_err();
    assert!(matches!(err, LifecycleError::DuplicateName(ref n) if n == "demo"));
    assert_eq!(h.record("demo").template, TemplateKind::Api);

    let err = h.orchestrator.create("9lives", TemplateKind::Api).await.unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidName(_)));
    assert_eq!(h.orchestrator.list().unwrap().len(), 1);
}

// ── Generate ───────────────────────────────────────────────────────

#[tokio::test]
async fn generate_merges_onto_existing_files() {
    let h = Harness::new();
    let app = h.generated("demo", TemplateKind::Api).await;

    assert_eq!(app.state, LifecycleState::Generated);
    assert_eq!(app.latest_revision, Some(2));
    assert_eq!(app.description.as_deref(), Some("hello world"));

    let files = h.vcs.files(&app.name, 2).unwrap();
    assert_eq!(files.get("app.py"), Some("print('hello')\n"));
    assert!(files.contains("Dockerfile"), "scaffold files survive generation");

    let requests = h.generator.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].existing.contains("Dockerfile"));
}

#[tokio::test]
async fn generate_streams_tokens_and_files() {
    let h = Harness::new();
    h.orchestrator.create("demo", TemplateKind::Api).await.unwrap();
    h.generator.push(Script::Files(vec![
        ("app.py".into(), "a = 1\n".into()),
        ("lib/util.py".into(), "b = 2\n".into()),
    ]));

    let (sink, mut rx) = ProgressSink::channel();
    h.orchestrator
        .generate("demo", "two files", &sink, CancellationToken::new())
        .await
        .unwrap();
    drop(sink);

    let mut files = Vec::new();
    let mut tokens = 0;
    while let Some(event) = rx.recv().await {
        match event {
            Progress::File { name } => files.push(name),
            Progress::Token { .. } => tokens += 1,
            _ => {}
        }
    }
    assert_eq!(files, vec!["app.py", "lib/util.py"]);
    assert_eq!(tokens, 2);
}

#[tokio::test]
async fn generation_failure_leaves_app_untouched() {
    let h = Harness::new();
    h.orchestrator.create("demo", TemplateKind::Api).await.unwrap();
    h.generator.push(Script::Fail("overloaded".into()));

    let err = h
        .orchestrator
        .generate("demo", "anything", &quiet(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::GenerationFailure { ref message, .. } if message.contains("overloaded")));

    let app = h.record("demo");
    assert_eq!(app.state, LifecycleState::Created);
    assert_eq!(app.latest_revision, Some(1));
    assert_eq!(h.vcs.latest(&app.name).unwrap().unwrap().sequence, 1);
}

#[tokio::test]
async fn cancelled_generation_commits_nothing() {
    let h = Harness::new();
    h.orchestrator.create("demo", TemplateKind::Api).await.unwrap();
    h.generator.push(Script::Hang);

    let cancel = CancellationToken::new();
    let (sink, mut rx) = ProgressSink::channel();
    let orchestrator = h.orchestrator.clone();
    let token = cancel.clone();
    let task = tokio::spawn(async move { orchestrator.generate("demo", "slow", &sink, token).await });

    while let Some(event) = rx.recv().await {
        if matches!(event, Progress::Token { .. }) {
            break;
        }
    }
    cancel.cancel();

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, LifecycleError::Cancelled { .. }));
    let app = h.record("demo");
    assert_eq!(app.state, LifecycleState::Created);
    assert_eq!(app.latest_revision, Some(1));
}

#[tokio::test]
async fn storage_fault_during_commit_keeps_prior_state() {
    let h = Harness::new();
    h.orchestrator.create("demo", TemplateKind::Api).await.unwrap();
    h.vcs.fail_commits(true);
    h.generator.push(Script::file("app.py", "x = 1\n"));

    let err = h
        .orchestrator
        .generate("demo", "anything", &quiet(), CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "storage_fault");
    assert_eq!(h.record("demo").state, LifecycleState::Created);
}

// ── Build ──────────────────────────────────────────────────────────

#[tokio::test]
async fn build_requires_generated_code() {
    let h = Harness::new();
    h.orchestrator.create("demo", TemplateKind::Api).await.unwrap();
    let err = h.orchestrator.build_preview("demo", &quiet()).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Conflict { .. }));
    assert!(h.builder.built().is_empty());
}

#[tokio::test]
async fn history_grows_by_one_tag_per_build() {
    let h = Harness::new();
    h.generated("demo", TemplateKind::Api).await;

    let mut seen = Vec::new();
    for _ in 0..3 {
        let app = h.build("demo").await;
        let newest = app.history[0].tag.clone();
        assert_eq!(app.preview_tag.as_ref(), Some(&newest));
        assert_eq!(app.history.len(), seen.len() + 1);
        for old in &seen {
            assert!(app.has_tag(old), "{old} dropped from history");
        }
        seen.push(newest);
    }

    let app = h.record("demo");
    assert_eq!(app.state, LifecycleState::PreviewBuilt);
    assert_eq!(app.prod_tag, None);
    assert_eq!(h.builder.pushed(), seen);
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn build_deploys_preview_only() {
    let h = Harness::new();
    let app = h.generated("demo", TemplateKind::Api).await;
    let app_after = h.build("demo").await;
    let built = app_after.preview_tag.clone().unwrap();

    assert_eq!(h.cluster.live_tag(&app.name, Environment::Preview), Some(built));
    assert_eq!(h.cluster.live(&app.name, Environment::Production), None);
    assert!(h.cluster.ingress("demo-preview-ingress").is_some());
    assert!(h.cluster.ingress("demo-prod-ingress").is_none());
    assert_eq!(app_after.history[0].revision, 2);
}

#[tokio::test]
async fn build_failure_records_nothing() {
    let h = Harness::new();
    h.generated("demo", TemplateKind::Api).await;
    h.builder.fail_next_build("Step 2/4 : RUN pip install\nERROR: no matching distribution");

    let err = h.orchestrator.build_preview("demo", &quiet()).await.unwrap_err();
    assert_eq!(err.kind(), "build_failure");
    assert!(err.log().unwrap().contains("no matching distribution"));

    let app = h.record("demo");
    assert_eq!(app.state, LifecycleState::Generated);
    assert!(app.history.is_empty());
    assert!(app.pending.is_none());
    assert!(h.cluster.namespace("app-demo").is_none());
}

#[tokio::test]
async fn push_failure_records_nothing() {
    let h = Harness::new();
    h.generated("demo", TemplateKind::Api).await;
    h.builder.fail_next_push("denied: requested access to the resource is denied");

    let err = h.orchestrator.build_preview("demo", &quiet()).await.unwrap_err();
    assert!(matches!(err, LifecycleError::PushFailure { .. }));
    assert!(h.record("demo").history.is_empty());
}

#[tokio::test]
async fn failed_tag_is_never_reissued() {
    let h = Harness::new();
    h.generated("demo", TemplateKind::Api).await;
    h.clock.set(Utc.with_ymd_and_hms(2026, 2, 21, 11, 0, 0).unwrap());
    h.builder.fail_next_build("boom");
    h.orchestrator.build_preview("demo", &quiet()).await.unwrap_err();

    let app = h.orchestrator.build_preview("demo", &quiet()).await.unwrap();
    assert_eq!(app.preview_tag, Some(tag("demo:20260221.110001")));
}

#[tokio::test]
async fn transient_cluster_errors_are_retried() {
    let h = Harness::new();
    h.generated("demo", TemplateKind::Api).await;
    h.cluster.fail_transient(2);

    let app = h.build("demo").await;
    assert_eq!(app.state, LifecycleState::PreviewBuilt);
    assert_eq!(h.cluster.calls("ensure_namespace"), 3);
}

#[tokio::test]
async fn rollout_timeout_leaves_state_unchanged() {
    let h = Harness::new();
    h.generated("demo", TemplateKind::Api).await;
    let first = h.build("demo").await.preview_tag.unwrap();

    h.clock.set(Utc.with_ymd_and_hms(2026, 2, 21, 12, 0, 0).unwrap());
    h.cluster.time_out_on(&tag("demo:20260221.120000"));
    let err = h.orchestrator.build_preview("demo", &quiet()).await.unwrap_err();
    assert!(matches!(err, LifecycleError::RolloutTimeout { .. }));

    let app = h.record("demo");
    assert_eq!(app.state, LifecycleState::PreviewBuilt);
    assert_eq!(app.preview_tag, Some(first.clone()));
    assert_eq!(app.history.len(), 1);
    assert!(app.pending.is_none());
    assert_eq!(h.cluster.live_tag(&app.name, Environment::Preview), Some(first));
}

#[tokio::test]
async fn ingress_failure_never_rolls_out_the_build() {
    let h = Harness::new();
    let app = h.generated("demo", TemplateKind::Api).await;
    h.cluster.fail_ingress(true);

    let err = h.orchestrator.build_preview("demo", &quiet()).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Cluster { step: Step::Ingress, .. }), "{err:?}");

    let record = h.record("demo");
    assert_eq!(record.state, LifecycleState::Generated);
    assert_eq!(record.preview_tag, None);
    assert!(record.history.is_empty());
    assert!(record.pending.is_none());
    assert!(h.cluster.reconciles().is_empty());
    assert_eq!(h.cluster.live_tag(&app.name, Environment::Preview), None);
}

#[tokio::test]
async fn builds_the_registered_revision() {
    let h = Harness::new();
    let app = h.generated("demo", TemplateKind::Api).await;
    // A commit the registry never acknowledged.
    let stray = FileSet::from_pairs([("app.py", "stray = True\n")]).unwrap();
    let orphan = h.vcs.commit(&app.name, &stray).unwrap();
    assert!(orphan.sequence > app.latest_revision.unwrap());

    let built = h.build("demo").await;
    let tag = built.preview_tag.clone().unwrap();
    assert_eq!(built.revision_of(&tag), app.latest_revision);
}

#[tokio::test]
async fn policy_failure_is_reported() {
    let h = Harness::new();
    h.generated("demo", TemplateKind::Api).await;
    h.cluster.fail_policy(true);

    let err = h.orchestrator.build_preview("demo", &quiet()).await.unwrap_err();
    assert!(matches!(err, LifecycleError::PolicyApplyFailure { .. }));
    assert_eq!(h.record("demo").state, LifecycleState::Generated);
}

#[tokio::test]
async fn history_retention_keeps_pinned_tags() {
    let mut settings = OrchestratorSettings::default();
    settings.history_limit = 3;
    let h = Harness::with_settings(settings);
    h.generated("demo", TemplateKind::Api).await;

    h.build("demo").await;
    let prod = h.publish("demo").await.prod_tag.unwrap();
    for _ in 0..4 {
        h.build("demo").await;
    }

    let app = h.record("demo");
    assert_eq!(app.history.len(), 3);
    assert!(app.has_tag(&prod));
    assert_eq!(app.prod_tag, Some(prod));
    assert_eq!(app.preview_tag.as_ref(), Some(&app.history[0].tag));
}

// ── Publish & rollback ─────────────────────────────────────────────

#[tokio::test]
async fn publish_promotes_preview_without_building() {
    let h = Harness::new();
    h.generated("demo", TemplateKind::Api).await;
    let built = h.build("demo").await;
    let builds = h.builder.built().len();

    let app = h.publish("demo").await;
    assert_eq!(app.state, LifecycleState::Published);
    assert_eq!(app.prod_tag, built.preview_tag);
    assert_eq!(app.preview_tag, built.preview_tag);
    assert_eq!(app.history, built.history);
    assert_eq!(h.builder.built().len(), builds);
    assert_eq!(h.cluster.live_tag(&app.name, Environment::Production), app.prod_tag);
    assert!(h.cluster.ingress("demo-prod-ingress").is_some());
}

#[tokio::test]
async fn publish_with_failing_ingress_keeps_production_untouched() {
    let h = Harness::new();
    let app = h.generated("demo", TemplateKind::Api).await;
    h.build("demo").await;
    h.cluster.fail_ingress(true);

    h.orchestrator.publish("demo", &quiet()).await.unwrap_err();

    let record = h.record("demo");
    assert_eq!(record.state, LifecycleState::PreviewBuilt);
    assert_eq!(record.prod_tag, None);
    assert!(record.pending.is_none());
    assert_eq!(h.cluster.live(&app.name, Environment::Production), None);
}

#[tokio::test]
async fn publish_requires_a_preview() {
    let h = Harness::new();
    h.generated("demo", TemplateKind::Api).await;
    let err = h.orchestrator.publish("demo", &quiet()).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Conflict { .. }));
}

#[tokio::test]
async fn rollback_moves_production_within_history() {
    let h = Harness::new();
    h.generated("demo", TemplateKind::Api).await;
    let v1 = h.build("demo").await.preview_tag.unwrap();
    h.publish("demo").await;
    let v2 = h.build("demo").await.preview_tag.unwrap();
    h.publish("demo").await;
    let history = h.record("demo").history;

    let app = h.orchestrator.rollback("demo", None, &quiet()).await.unwrap();
    assert_eq!(app.prod_tag, Some(v1.clone()));
    assert_eq!(app.preview_tag, Some(v2.clone()));
    assert_eq!(app.history, history);
    assert_eq!(app.state, LifecycleState::Published);
    assert_eq!(h.cluster.live_tag(&app.name, Environment::Production), Some(v1));

    let app = h
        .orchestrator
        .rollback("demo", Some(v2.token()), &quiet())
        .await
        .unwrap();
    assert_eq!(app.prod_tag, Some(v2));
}

#[tokio::test]
async fn rollback_rejects_unknown_targets() {
    let h = Harness::new();
    h.generated("demo", TemplateKind::Api).await;
    h.build("demo").await;
    let prod = h.publish("demo").await.prod_tag;

    let err = h
        .orchestrator
        .rollback("demo", Some("demo:19990101.000000"), &quiet())
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::RollbackTargetMissing { .. }));
    assert_eq!(h.record("demo").prod_tag, prod);
}

#[tokio::test]
async fn rollback_without_production_is_a_conflict() {
    let h = Harness::new();
    h.generated("demo", TemplateKind::Api).await;
    h.build("demo").await;
    let err = h.orchestrator.rollback("demo", None, &quiet()).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Conflict { .. }));
}

// ── Delete ─────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_tears_down_and_keeps_tombstone() {
    let h = Harness::new();
    h.generated("demo", TemplateKind::Api).await;
    h.build("demo").await;
    h.publish("demo").await;

    let app = h.orchestrator.delete("demo", &quiet()).await.unwrap();
    assert_eq!(app.state, LifecycleState::Deleted);
    assert_eq!(app.prod_tag, None);
    assert_eq!(app.preview_tag, None);
    assert!(h.cluster.namespace("app-demo").is_none());
    assert!(h.cluster.live(&app.name, Environment::Production).is_none());
    assert!(h.vcs.latest(&app.name).unwrap().is_none());

    // Idempotent, and the name stays taken.
    h.orchestrator.delete("demo", &quiet()).await.unwrap();
    let err = h.orchestrator.create("demo", TemplateKind::Api).await.unwrap_err();
    assert!(matches!(err, LifecycleError::DuplicateName(_)));
    let err = h.orchestrator.build_preview("demo", &quiet()).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Conflict { .. }));
}

#[tokio::test]
async fn unknown_app_is_not_found() {
    let h = Harness::new();
    let err = h.orchestrator.publish("ghost", &quiet()).await.unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound(_)));
    let err = h.orchestrator.status("ghost").await.unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound(_)));
}

// ── Status, drift, isolation ───────────────────────────────────────

#[tokio::test]
async fn status_reports_live_tags_and_drift() {
    let h = Harness::new();
    let app = h.generated("demo", TemplateKind::Api).await;
    h.build("demo").await;
    h.publish("demo").await;

    let status = h.orchestrator.status("demo").await.unwrap();
    assert!(!status.preview.drift);
    assert!(!status.production.drift);
    assert!(!status.busy);
    assert!(status.production.url.starts_with("http://demo."));

    h.cluster.set_live(
        &app.name,
        Environment::Production,
        Some(LiveDeployment::new("localhost:5050/demo:hotfix", true)),
    );
    let status = h.orchestrator.status("demo").await.unwrap();
    assert!(status.production.drift);
    assert!(!status.preview.drift);

    let reports = h.orchestrator.check_drift().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].environment, Environment::Production);
    assert_eq!(reports[0].live, Some(tag("demo:hotfix")));

    h.orchestrator.resync("demo", &quiet()).await.unwrap();
    assert!(h.orchestrator.check_drift().await.unwrap().is_empty());
}

#[tokio::test]
async fn status_reports_pods_per_environment() {
    let h = Harness::new();
    let app = h.generated("demo", TemplateKind::Api).await;
    h.build("demo").await;
    h.cluster.set_pods(
        &app.name,
        Environment::Preview,
        PodStatus {
            phase: "Running".into(),
            restarts: 3,
            ready: false,
            pods: 1,
        },
    );

    let status = h.orchestrator.status("demo").await.unwrap();
    let pods = status.preview.pods.unwrap();
    assert_eq!(pods.restarts, 3);
    assert!(!pods.ready);
    assert_eq!(status.production.pods, Some(PodStatus::absent()));
}

#[tokio::test]
async fn logs_follow_the_deployed_environment() {
    let h = Harness::new();
    let app = h.generated("demo", TemplateKind::Api).await;

    let err = h.orchestrator.logs("demo", Environment::Preview, 10).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Conflict { .. }));

    h.build("demo").await;
    for line in ["booting", "listening on :8000", "GET / 200"] {
        h.cluster.push_log(&app.name, Environment::Preview, line);
    }
    let mut rx = h.orchestrator.logs("demo", Environment::Preview, 2).await.unwrap();
    let mut lines = Vec::new();
    while let Some(line) = rx.recv().await {
        lines.push(line);
    }
    assert_eq!(lines, ["listening on :8000", "GET / 200"]);

    let err = h.orchestrator.logs("demo", Environment::Production, 10).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Conflict { .. }));
}

#[tokio::test]
async fn status_survives_cluster_outage() {
    let h = Harness::new();
    h.generated("demo", TemplateKind::Api).await;
    h.build("demo").await;
    h.cluster.fail_transient(100);

    let status = h.orchestrator.status("demo").await.unwrap();
    assert!(status.cluster_error.is_some());
    assert_eq!(status.record.state, LifecycleState::PreviewBuilt);
}

#[tokio::test]
async fn namespace_policy_isolates_apps() {
    let h = Harness::new();
    h.generated("demo", TemplateKind::Api).await;
    h.generated("other", TemplateKind::StaticSite).await;
    h.build("demo").await;
    h.build("other").await;

    let ns = h.cluster.namespace("app-demo").unwrap();
    assert!(!ns.network_policy.admits("app-other"));
    assert!(ns.network_policy.admits("kube-system"));
    assert!(ns.network_policy.admits("app-demo"));
    assert_eq!(ns.quota.cpu_limit, "1000m");
    assert_eq!(ns.quota.max_pods, 6);
}

// ── Scenario ───────────────────────────────────────────────────────

#[tokio::test]
async fn demo_scenario() {
    let h = Harness::new();
    let ten = Utc.with_ymd_and_hms(2026, 2, 21, 10, 0, 0).unwrap();

    let app = h.generated("demo", TemplateKind::Api).await;
    assert_eq!(app.latest_revision, Some(2));

    h.clock.set(ten);
    let app = h.orchestrator.build_preview("demo", &quiet()).await.unwrap();
    let v1 = tag("demo:20260221.100000");
    assert_eq!(app.preview_tag, Some(v1.clone()));
    assert_eq!(app.prod_tag, None);

    let app = h.publish("demo").await;
    assert_eq!(app.prod_tag, Some(v1.clone()));

    h.clock.set(ten + chrono::Duration::minutes(30));
    let app = h.orchestrator.build_preview("demo", &quiet()).await.unwrap();
    let v2 = tag("demo:20260221.103000");
    assert_eq!(app.preview_tag, Some(v2.clone()));
    assert_eq!(app.prod_tag, Some(v1.clone()));

    // Nothing older than production exists, so rollback changes nothing.
    let app = h.orchestrator.rollback("demo", None, &quiet()).await.unwrap();
    assert_eq!(app.prod_tag, Some(v1.clone()));

    let app = h
        .orchestrator
        .rollback("demo", Some("demo:20260221.100000"), &quiet())
        .await
        .unwrap();
    assert_eq!(app.prod_tag, Some(v1.clone()));
    assert_eq!(app.preview_tag, Some(v2));
    assert_eq!(h.cluster.live_tag(&app.name, Environment::Production), Some(v1));

}
