//! launchpadd — the Launchpad daemon.
//!
//! Single binary that assembles every Launchpad subsystem:
//! - App registry (redb)
//! - Per-app version store
//! - Docker image builder
//! - Cluster controller (kubectl, with retries)
//! - Code generator (Anthropic messages API)
//! - Lifecycle orchestrator + startup recovery
//! - Drift monitor
//! - REST API
//!
//! # Usage
//!
//! ```text
//! launchpadd serve --config /etc/launchpad.toml --port 8080
//! launchpadd check-config --config /etc/launchpad.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use launchpad_build::DockerBuilder;
use launchpad_cluster::{KubectlController, RetryPolicy, Retrying};
use launchpad_codegen::AnthropicGenerator;
use launchpad_core::LaunchpadConfig;
use launchpad_orchestrator::{
    Collaborators, DriftMonitor, Orchestrator, OrchestratorSettings, RecoveryOutcome,
};
use launchpad_state::AppRegistry;
use launchpad_vcs::FsVersionStore;

#[derive(Parser)]
#[command(name = "launchpadd", about = "Launchpad daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the orchestrator and serve the REST API.
    Serve {
        /// Path to launchpad.toml. Defaults apply when omitted.
        #[arg(long, env = "LAUNCHPAD_CONFIG")]
        config: Option<PathBuf>,

        /// Port to listen on (overrides [server].port).
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for the registry and app sources (overrides [storage].data_dir).
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Emit logs as JSON lines.
        #[arg(long)]
        log_json: bool,
    },
    /// Load and validate the configuration, then print it (without the api key).
    CheckConfig {
        #[arg(long, env = "LAUNCHPAD_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            data_dir,
            log_json,
        } => {
            init_tracing(log_json);
            let mut config = load_config(config)?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.storage.data_dir = data_dir;
            }
            run_server(config).await
        }
        Command::CheckConfig { config } => {
            init_tracing(false);
            let config = load_config(config)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,launchpad=debug"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<LaunchpadConfig> {
    let config = LaunchpadConfig::load(path.as_deref())?;
    config.validate()?;
    Ok(config)
}

/// Wire the subsystems described by `config` into one orchestrator.
fn assemble(config: &LaunchpadConfig) -> anyhow::Result<Orchestrator> {
    let storage = &config.storage;
    std::fs::create_dir_all(&storage.data_dir)
        .with_context(|| format!("creating {}", storage.data_dir.display()))?;

    let registry_path = storage.registry_path();
    let registry = AppRegistry::open(&registry_path)?;
    info!(path = ?registry_path, "app registry opened");

    let vcs = FsVersionStore::open(storage.vcs_root())?;
    info!(root = ?storage.vcs_root(), "version store opened");

    let builder = DockerBuilder::from_config(&config.builder, &config.registry.host);
    info!(registry = %config.registry.host, "image builder initialized");

    let cluster = Retrying::new(
        KubectlController::from_config(&config.cluster),
        RetryPolicy::from(&config.cluster.retry),
    );
    info!(attempts = config.cluster.retry.attempts, "cluster controller initialized");

    let generator = AnthropicGenerator::from_config(&config.generation)
        .context("code generation credential missing")?;
    info!(model = %config.generation.model, "code generator initialized");

    Ok(Orchestrator::new(
        registry,
        Collaborators {
            vcs: Arc::new(vcs),
            builder: Arc::new(builder),
            cluster: Arc::new(cluster),
            generator: Arc::new(generator),
        },
        OrchestratorSettings::from_config(config),
    ))
}

async fn run_server(config: LaunchpadConfig) -> anyhow::Result<()> {
    info!("Launchpad daemon starting");

    let orchestrator = Arc::new(assemble(&config)?);

    // ── Startup recovery ───────────────────────────────────────

    let outcomes = orchestrator.recover().await;
    let failed = outcomes
        .iter()
        .filter(|o| matches!(o, RecoveryOutcome::Failed { .. }))
        .count();
    if failed > 0 {
        warn!(settled = outcomes.len() - failed, failed, "startup recovery left apps blocked");
    } else {
        info!(settled = outcomes.len(), "startup recovery finished");
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Background tasks ───────────────────────────────────────

    let drift_handle = if config.drift.interval_secs > 0 {
        let monitor = DriftMonitor::new(
            orchestrator.clone(),
            Duration::from_secs(config.drift.interval_secs),
            config.drift.heal,
        );
        let drift_shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            monitor.run(drift_shutdown).await;
        }))
    } else {
        info!("drift monitor disabled");
        None
    };

    // ── API server ─────────────────────────────────────────────

    let router = launchpad_api::build_router(orchestrator);
    let addr = format!("{}:{}", config.server.bind, config.server.port);

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    if let Some(handle) = drift_handle {
        let _ = handle.await;
    }

    info!("Launchpad daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_flags_parse() {
        let cli = Cli::try_parse_from([
            "launchpadd",
            "serve",
            "--port",
            "9090",
            "--data-dir",
            "/tmp/lp",
            "--log-json",
        ])
        .unwrap();
        match cli.command {
            Command::Serve {
                port,
                data_dir,
                log_json,
                ..
            } => {
                assert_eq!(port, Some(9090));
                assert_eq!(data_dir, Some(PathBuf::from("/tmp/lp")));
                assert!(log_json);
            }
            Command::CheckConfig { .. } => panic!("expected serve"),
        }
    }

    #[test]
    fn check_config_parses() {
        let cli = Cli::try_parse_from(["launchpadd", "check-config", "--config", "lp.toml"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::CheckConfig { config: Some(ref p) } if p == &PathBuf::from("lp.toml")
        ));
    }

    #[test]
    fn printed_config_omits_the_api_key() {
        let mut config = LaunchpadConfig::default();
        config.generation.api_key = Some("sk-secret".into());
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(json.contains("\"max_entries\": 50"));
    }

    #[test]
    fn assemble_opens_stores_under_data_dir() {
        let dir = std::env::temp_dir().join(format!("launchpadd-assemble-{}", std::process::id()));
        let mut config = LaunchpadConfig::default();
        config.storage.data_dir = dir.clone();
        config.generation.api_key = Some("sk-test".into());

        let orchestrator = assemble(&config).unwrap();
        assert!(orchestrator.list().unwrap().is_empty());
        assert!(config.storage.registry_path().exists());
        assert!(config.storage.vcs_root().is_dir());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn assemble_requires_generation_credential() {
        let dir = std::env::temp_dir().join(format!("launchpadd-nokey-{}", std::process::id()));
        let mut config = LaunchpadConfig::default();
        config.storage.data_dir = dir.clone();
        config.generation.api_key = None;
        assert!(assemble(&config).is_err());
        let _ = std::fs::remove_dir_all(dir);
    }
}
