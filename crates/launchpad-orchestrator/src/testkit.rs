//! In-process collaborators for tests.
//!
//! The fakes keep just enough state to observe what the orchestrator did and
//! to inject the failures a real cluster, docker daemon or model API produce:
//! transient API errors, rollout timeouts, failed builds, hung generation
//! and crashes between steps.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use launchpad_build::{BuildError, BuildResult, ImageBuilder};
use launchpad_cluster::{
    ClusterController, ClusterError, ClusterResult, DeploymentDescriptor, IngressRoute,
    LiveDeployment, NamespaceSpec, PodStatus, RetryPolicy, Retrying,
};
use launchpad_codegen::{
    CodeGenerator, GenerationError, GenerationEvent, GenerationRequest, GenerationResult,
};
use launchpad_core::{AppName, Environment, ImageTag, ProgressSink, TemplateKind, naming};
use launchpad_state::{AppRecord, AppRegistry};
use launchpad_vcs::{FileSet, FsVersionStore, Revision, VcsError, VcsResult, VersionStore};

use crate::clock::Clock;
use crate::orchestrator::{Collaborators, Orchestrator};
use crate::settings::OrchestratorSettings;

// ── Cluster ────────────────────────────────────────────────────────

#[derive(Default)]
struct ClusterState {
    namespaces: BTreeMap<String, NamespaceSpec>,
    deployments: BTreeMap<(AppName, Environment), LiveDeployment>,
    ingresses: BTreeMap<String, IngressRoute>,
    transient_failures: u32,
    timeout_tags: HashSet<ImageTag>,
    policy_failure: bool,
    ingress_failure: bool,
    pods: BTreeMap<(AppName, Environment), PodStatus>,
    logs: BTreeMap<(AppName, Environment), Vec<String>>,
    reconciles: Vec<DeploymentDescriptor>,
    calls: BTreeMap<&'static str, u32>,
}

/// A cluster that applies descriptors instantly.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<ClusterState>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` calls fail with a transient error.
    pub fn fail_transient(&self, n: u32) {
        self.state.lock().transient_failures = n;
    }

    /// Rollouts of `tag` never become ready; the previous image is restored.
    pub fn time_out_on(&self, tag: &ImageTag) {
        self.state.lock().timeout_tags.insert(tag.clone());
    }

    pub fn fail_policy(&self, fail: bool) {
        self.state.lock().policy_failure = fail;
    }

    /// Ingress routing fails permanently while set.
    pub fn fail_ingress(&self, fail: bool) {
        self.state.lock().ingress_failure = fail;
    }

    /// Override the pod view of an environment. Without an override, pods
    /// follow the live Deployment.
    pub fn set_pods(&self, app: &AppName, env: Environment, pods: PodStatus) {
        self.state.lock().pods.insert((app.clone(), env), pods);
    }

    /// Append a line to an environment's pod log.
    pub fn push_log(&self, app: &AppName, env: Environment, line: impl Into<String>) {
        self.state
            .lock()
            .logs
            .entry((app.clone(), env))
            .or_default()
            .push(line.into());
    }

    /// Overwrite what the cluster reports for an environment, as an
    /// out-of-band `kubectl` edit or a half-finished rollout would.
    pub fn set_live(&self, app: &AppName, env: Environment, live: Option<LiveDeployment>) {
        let mut state = self.state.lock();
        let key = (app.clone(), env);
        match live {
            Some(live) => state.deployments.insert(key, live),
            None => state.deployments.remove(&key),
        };
    }

    pub fn live(&self, app: &AppName, env: Environment) -> Option<LiveDeployment> {
        self.state.lock().deployments.get(&(app.clone(), env)).cloned()
    }

    pub fn live_tag(&self, app: &AppName, env: Environment) -> Option<ImageTag> {
        self.live(app, env).and_then(|l| l.tag)
    }

    pub fn namespace(&self, name: &str) -> Option<NamespaceSpec> {
        self.state.lock().namespaces.get(name).cloned()
    }

    pub fn ingress(&self, name: &str) -> Option<IngressRoute> {
        self.state.lock().ingresses.get(name).cloned()
    }

    pub fn reconciles(&self) -> Vec<DeploymentDescriptor> {
        self.state.lock().reconciles.clone()
    }

    pub fn calls(&self, operation: &str) -> u32 {
        self.state.lock().calls.get(operation).copied().unwrap_or(0)
    }

    fn enter(&self, operation: &'static str) -> ClusterResult<()> {
        let mut state = self.state.lock();
        *state.calls.entry(operation).or_default() += 1;
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(ClusterError::Unavailable(format!("{operation}: connection refused")));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterController for FakeCluster {
    async fn ensure_namespace(&self, spec: &NamespaceSpec) -> ClusterResult<()> {
        self.enter("ensure_namespace")?;
        let mut state = self.state.lock();
        if state.policy_failure {
            return Err(ClusterError::PolicyApply {
                namespace: spec.name.clone(),
                message: "admission webhook denied the request".into(),
            });
        }
        state.namespaces.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    async fn reconcile_deployment(&self, desc: &DeploymentDescriptor) -> ClusterResult<()> {
        self.enter("reconcile_deployment")?;
        let mut state = self.state.lock();
        if !state.namespaces.contains_key(&desc.namespace) {
            return Err(ClusterError::Api {
                operation: "apply deployment".into(),
                message: format!("namespaces \"{}\" not found", desc.namespace),
                transient: false,
            });
        }
        state.reconciles.push(desc.clone());
        if state.timeout_tags.contains(&desc.tag) {
            return Err(ClusterError::RolloutTimeout {
                namespace: desc.namespace.clone(),
                deployment: desc.deployment_name.clone(),
                waited_secs: 90,
                last_status: "0/1 updated replicas ready".into(),
            });
        }
        state.deployments.insert(
            (desc.app.clone(), desc.environment),
            LiveDeployment::new(desc.image.clone(), true),
        );
        Ok(())
    }

    async fn route_ingress(&self, route: &IngressRoute) -> ClusterResult<()> {
        self.enter("route_ingress")?;
        let mut state = self.state.lock();
        if state.ingress_failure {
            return Err(ClusterError::Api {
                operation: "apply ingress".into(),
                message: format!("admission webhook \"validate.ingress\" denied host {}", route.host),
                transient: false,
            });
        }
        state.ingresses.insert(route.name.clone(), route.clone());
        Ok(())
    }

    async fn current_image_tag(
        &self,
        app: &AppName,
        environment: Environment,
    ) -> ClusterResult<Option<LiveDeployment>> {
        self.enter("current_image_tag")?;
        Ok(self.live(app, environment))
    }

    async fn pod_status(&self, app: &AppName, environment: Environment) -> ClusterResult<PodStatus> {
        self.enter("pod_status")?;
        let state = self.state.lock();
        let key = (app.clone(), environment);
        if let Some(pods) = state.pods.get(&key) {
            return Ok(pods.clone());
        }
        Ok(match state.deployments.get(&key) {
            Some(live) => PodStatus {
                phase: if live.ready { "Running" } else { "Pending" }.to_string(),
                restarts: 0,
                ready: live.ready,
                pods: 1,
            },
            None => PodStatus::absent(),
        })
    }

    async fn pod_logs(
        &self,
        app: &AppName,
        environment: Environment,
        tail: u32,
    ) -> ClusterResult<mpsc::Receiver<String>> {
        self.enter("pod_logs")?;
        let lines = self
            .state
            .lock()
            .logs
            .get(&(app.clone(), environment))
            .cloned()
            .unwrap_or_default();
        let skip = lines.len().saturating_sub(tail as usize);
        let (tx, rx) = mpsc::channel(lines.len().max(1));
        for line in lines.into_iter().skip(skip) {
            let _ = tx.try_send(line);
        }
        Ok(rx)
    }

    async fn delete_namespace(&self, namespace: &str) -> ClusterResult<()> {
        self.enter("delete_namespace")?;
        let mut state = self.state.lock();
        state.namespaces.remove(namespace);
        state.deployments.retain(|(app, _), _| naming::namespace_for(app) != namespace);
        state
            .ingresses
            .retain(|_, route| route.namespace != namespace);
        Ok(())
    }
}

// ── Builder ────────────────────────────────────────────────────────

#[derive(Default)]
struct BuilderState {
    built: Vec<ImageTag>,
    pushed: Vec<ImageTag>,
    fail_build: Option<String>,
    fail_push: Option<String>,
}

/// Records builds and pushes. Optionally holds every build at a gate so
/// tests can observe in-flight builds.
#[derive(Default)]
pub struct FakeBuilder {
    state: Mutex<BuilderState>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next build fails with `log`.
    pub fn fail_next_build(&self, log: impl Into<String>) {
        self.state.lock().fail_build = Some(log.into());
    }

    /// The next push fails with `log`.
    pub fn fail_next_push(&self, log: impl Into<String>) {
        self.state.lock().fail_push = Some(log.into());
    }

    /// Hold builds until [`FakeBuilder::release`] hands out permits.
    pub fn hold(&self) {
        *self.gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, builds: usize) {
        if let Some(gate) = self.gate.lock().as_ref() {
            gate.add_permits(builds);
        }
    }

    /// Resolves once `builds` builds are inside the builder at the same time.
    pub async fn wait_in_flight(&self, builds: usize) {
        while self.in_flight.load(Ordering::SeqCst) < builds {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    pub fn built(&self) -> Vec<ImageTag> {
        self.state.lock().built.clone()
    }

    pub fn pushed(&self) -> Vec<ImageTag> {
        self.state.lock().pushed.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageBuilder for FakeBuilder {
    async fn build(&self, context: &Path, tag: &ImageTag, progress: &ProgressSink) -> BuildResult<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        progress.log(format!("Step 1/1 : build {tag}"));
        let mut state = self.state.lock();
        if let Some(log) = state.fail_build.take() {
            return Err(BuildError::BuildFailure {
                tag: tag.to_string(),
                log,
            });
        }
        if !context.join("Dockerfile").is_file() {
            return Err(BuildError::BuildFailure {
                tag: tag.to_string(),
                log: format!("no Dockerfile in {}", context.display()),
            });
        }
        state.built.push(tag.clone());
        Ok(())
    }

    async fn push(&self, tag: &ImageTag, progress: &ProgressSink) -> BuildResult<()> {
        progress.log(format!("pushing {tag}"));
        let mut state = self.state.lock();
        if let Some(log) = state.fail_push.take() {
            return Err(BuildError::PushFailure {
                tag: tag.to_string(),
                log,
            });
        }
        state.pushed.push(tag.clone());
        Ok(())
    }
}

// ── Generator ──────────────────────────────────────────────────────

/// What the next generation request does.
#[derive(Debug, Clone)]
pub enum Script {
    /// Stream these files, then complete.
    Files(Vec<(String, String)>),
    /// Fail with a stream error.
    Fail(String),
    /// Emit one token and never finish.
    Hang,
}

impl Script {
    pub fn file(path: &str, content: &str) -> Self {
        Script::Files(vec![(path.to_string(), content.to_string())])
    }
}

/// Plays back queued [`Script`]s, one per request.
#[derive(Default)]
pub struct ScriptedGenerator {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().push_back(script);
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

impl CodeGenerator for ScriptedGenerator {
    fn generate(&self, request: GenerationRequest) -> mpsc::Receiver<GenerationResult<GenerationEvent>> {
        let (tx, rx) = mpsc::channel(16);
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| Script::Fail("no script queued".into()));
        self.requests.lock().push(request);

        tokio::spawn(async move {
            match script {
                Script::Files(pairs) => {
                    let mut files = FileSet::new();
                    for (name, content) in pairs {
                        let _ = tx
                            .send(Ok(GenerationEvent::Token(format!("<file name=\"{name}\">"))))
                            .await;
                        if let Err(e) = files.insert(name.clone(), content.clone()) {
                            let _ = tx.send(Err(GenerationError::InvalidFile(e))).await;
                            return;
                        }
                        let _ = tx.send(Ok(GenerationEvent::File { name, content })).await;
                    }
                    let _ = tx.send(Ok(GenerationEvent::Complete { files })).await;
                }
                Script::Fail(message) => {
                    let _ = tx.send(Err(GenerationError::Stream(message))).await;
                }
                Script::Hang => {
                    let _ = tx.send(Ok(GenerationEvent::Token("thinking".into()))).await;
                    tx.closed().await;
                }
            }
        });
        rx
    }
}

// ── Version store ──────────────────────────────────────────────────

/// A filesystem store whose commits can be made to fail.
pub struct FailingVersionStore {
    inner: FsVersionStore,
    fail_commits: AtomicBool,
}

impl FailingVersionStore {
    pub fn open(root: impl Into<PathBuf>) -> VcsResult<Self> {
        Ok(Self {
            inner: FsVersionStore::open(root)?,
            fail_commits: AtomicBool::new(false),
        })
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn root(&self) -> &Path {
        self.inner.root()
    }
}

impl VersionStore for FailingVersionStore {
    fn commit(&self, app: &AppName, files: &FileSet) -> VcsResult<Revision> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(VcsError::StorageFault {
                app: app.to_string(),
                reason: "No space left on device (os error 28)".into(),
            });
        }
        self.inner.commit(app, files)
    }

    fn checkout(&self, app: &AppName, sequence: u64) -> VcsResult<PathBuf> {
        self.inner.checkout(app, sequence)
    }

    fn latest(&self, app: &AppName) -> VcsResult<Option<Revision>> {
        self.inner.latest(app)
    }

    fn files(&self, app: &AppName, sequence: u64) -> VcsResult<FileSet> {
        self.inner.files(app, sequence)
    }

    fn purge(&self, app: &AppName) -> VcsResult<()> {
        self.inner.purge(app)
    }
}

// ── Clock ──────────────────────────────────────────────────────────

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += chrono::Duration::from_std(by).unwrap_or_default();
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc.with_ymd_and_hms(2026, 2, 21, 10, 0, 0).single().unwrap_or_default())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ── Harness ────────────────────────────────────────────────────────

/// An orchestrator wired to fakes, with handles to each of them.
pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub registry: AppRegistry,
    pub cluster: Arc<FakeCluster>,
    pub builder: Arc<FakeBuilder>,
    pub generator: Arc<ScriptedGenerator>,
    pub vcs: Arc<FailingVersionStore>,
    pub clock: Arc<ManualClock>,
    settings: OrchestratorSettings,
    _dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(OrchestratorSettings::default())
    }

    pub fn with_settings(settings: OrchestratorSettings) -> Self {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let registry = AppRegistry::open_in_memory().unwrap_or_else(|e| panic!("registry: {e}"));
        let vcs = FailingVersionStore::open(dir.path().join("vcs")).unwrap_or_else(|e| panic!("vcs: {e}"));
        let cluster = Arc::new(FakeCluster::new());
        let builder = Arc::new(FakeBuilder::new());
        let generator = Arc::new(ScriptedGenerator::new());
        let vcs = Arc::new(vcs);
        let clock = Arc::new(ManualClock::default());
        let orchestrator = assemble(&registry, &vcs, &builder, &cluster, &generator, &clock, &settings);
        Self {
            orchestrator,
            registry,
            cluster,
            builder,
            generator,
            vcs,
            clock,
            settings,
            _dir: dir,
        }
    }

    /// Replace the orchestrator with a fresh one over the same registry,
    /// store and fakes, as a process restart would. In-memory locks are lost.
    pub fn restart(&mut self) {
        self.orchestrator = assemble(
            &self.registry,
            &self.vcs,
            &self.builder,
            &self.cluster,
            &self.generator,
            &self.clock,
            &self.settings,
        );
    }

    pub fn app(name: &str) -> AppName {
        AppName::parse(name).unwrap_or_else(|e| panic!("{name}: {e}"))
    }

    pub fn record(&self, name: &str) -> AppRecord {
        self.registry.get(name).unwrap_or_else(|e| panic!("{name}: {e}"))
    }

    /// Create an app and generate one file for it.
    pub async fn generated(&self, name: &str, template: TemplateKind) -> AppRecord {
        self.orchestrator
            .create(name, template)
            .await
            .unwrap_or_else(|e| panic!("create {name}: {e}"));
        self.generator.push(Script::file("app.py", "print('hello')\n"));
        self.orchestrator
            .generate(name, "hello world", &ProgressSink::discard(), CancellationToken::new())
            .await
            .unwrap_or_else(|e| panic!("generate {name}: {e}"))
    }

    /// Build a preview, advancing the clock first so every build gets a
    /// distinct tag.
    pub async fn build(&self, name: &str) -> AppRecord {
        self.clock.advance(Duration::from_secs(60));
        self.orchestrator
            .build_preview(name, &ProgressSink::discard())
            .await
            .unwrap_or_else(|e| panic!("build {name}: {e}"))
    }

    pub async fn publish(&self, name: &str) -> AppRecord {
        self.orchestrator
            .publish(name, &ProgressSink::discard())
            .await
            .unwrap_or_else(|e| panic!("publish {name}: {e}"))
    }
}

fn assemble(
    registry: &AppRegistry,
    vcs: &Arc<FailingVersionStore>,
    builder: &Arc<FakeBuilder>,
    cluster: &Arc<FakeCluster>,
    generator: &Arc<ScriptedGenerator>,
    clock: &Arc<ManualClock>,
    settings: &OrchestratorSettings,
) -> Arc<Orchestrator> {
    let cluster = Retrying::new(
        cluster.clone(),
        RetryPolicy {
            attempts: 4,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 2.0,
        },
    );
    let orchestrator = Orchestrator::new(
        registry.clone(),
        Collaborators {
            vcs: vcs.clone(),
            builder: builder.clone(),
            cluster: Arc::new(cluster),
            generator: generator.clone(),
        },
        settings.clone(),
    )
    .with_clock(clock.clone());
    Arc::new(orchestrator)
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
