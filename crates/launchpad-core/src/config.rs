//! launchpad.toml configuration parser.
//!
//! Every section is optional; missing keys fall back to the defaults below.
//! A handful of environment variables override the file so the daemon can
//! run from a container spec without a config file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ENV_REGISTRY_HOST: &str = "REGISTRY_HOST";
pub const ENV_SERVER_IP: &str = "SERVER_IP";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("code generation credential missing: set {var} or [generation].api_key", var = ENV_API_KEY)]
    MissingApiKey,
    #[error("invalid config value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchpadConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub registry: ImageRegistryConfig,
    pub builder: BuilderConfig,
    pub cluster: ClusterConfig,
    pub generation: GenerationConfig,
    pub history: HistoryConfig,
    pub drift: DriftConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/launchpad"),
        }
    }
}

impl StorageConfig {
    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("registry.redb")
    }

    pub fn vcs_root(&self) -> PathBuf {
        self.data_dir.join("apps")
    }
}

/// Container image registry the builder pushes to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageRegistryConfig {
    pub host: String,
}

impl Default for ImageRegistryConfig {
    fn default() -> Self {
        Self {
            host: "localhost:5050".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Container CLI used for build and push.
    pub docker: String,
    /// Lines of build output kept for failure reports.
    pub log_tail_lines: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            docker: "docker".to_string(),
            log_tail_lines: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub kubectl: String,
    pub server_ip: String,
    /// Defaults to `<server_ip>.nip.io`.
    pub base_domain: Option<String>,
    /// Namespace the ingress controller runs in; admitted by every NetworkPolicy.
    pub ingress_namespace: String,
    pub ingress_class: Option<String>,
    pub replicas: u32,
    pub rollout_timeout_secs: u64,
    pub rollout_poll_ms: u64,
    pub retry: RetryConfig,
    pub isolation: IsolationConfig,
    pub container: ContainerResources,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            kubectl: "kubectl".to_string(),
            server_ip: "127.0.0.1".to_string(),
            base_domain: None,
            ingress_namespace: "kube-system".to_string(),
            ingress_class: Some("traefik".to_string()),
            replicas: 1,
            rollout_timeout_secs: 90,
            rollout_poll_ms: 2000,
            retry: RetryConfig::default(),
            isolation: IsolationConfig::default(),
            container: ContainerResources::default(),
        }
    }
}

impl ClusterConfig {
    pub fn base_domain(&self) -> String {
        self.base_domain
            .clone()
            .unwrap_or_else(|| format!("{}.nip.io", self.server_ip))
    }
}

/// Backoff for idempotent cluster calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 4,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
            multiplier: 2.0,
        }
    }
}

/// Namespace-wide ResourceQuota applied at provisioning time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationConfig {
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
    pub max_pods: u32,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            cpu_request: "500m".to_string(),
            cpu_limit: "1000m".to_string(),
            memory_request: "256Mi".to_string(),
            memory_limit: "512Mi".to_string(),
            max_pods: 6,
        }
    }
}

/// Per-container requests/limits. Sized so preview + production + one surge
/// pod each fit inside the namespace quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerResources {
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
}

impl Default for ContainerResources {
    fn default() -> Self {
        Self {
            cpu_request: "100m".to_string(),
            cpu_limit: "250m".to_string(),
            memory_request: "64Mi".to_string(),
            memory_limit: "128Mi".to_string(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: "https://api.anthropic.com/v1/messages".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 8192,
        }
    }
}

impl std::fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Image history retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Oldest unpinned entries beyond this count are dropped.
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_entries: 50 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Seconds between drift checks, each preceded by a retry of unsettled
    /// recovery. 0 disables the monitor; recovery then runs only at startup.
    pub interval_secs: u64,
    /// Re-apply registry state when drift is found.
    pub heal: bool,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            heal: false,
        }
    }
}

impl LaunchpadConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load from an optional file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a variable lookup (injected for tests).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.trim().is_empty()) {
            self.generation.api_key = Some(key);
        }
        if let Some(host) = lookup(ENV_REGISTRY_HOST).filter(|v| !v.trim().is_empty()) {
            self.registry.host = host;
        }
        if let Some(ip) = lookup(ENV_SERVER_IP).filter(|v| !v.trim().is_empty()) {
            self.cluster.server_ip = ip;
        }
    }

    /// Startup-time validation. A missing generation credential is fatal here
    /// rather than on the first generate request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.generation.api_key {
            Some(key) if !key.trim().is_empty() => {}
            _ => return Err(ConfigError::MissingApiKey),
        }
        if self.cluster.replicas == 0 {
            return Err(ConfigError::Invalid {
                key: "cluster.replicas",
                reason: "must be at least 1".to_string(),
            });
        }
        // Two environments, each allowed one surge pod during a rollout.
        let peak_pods = 2 * (self.cluster.replicas + 1);
        if peak_pods > self.cluster.isolation.max_pods {
            return Err(ConfigError::Invalid {
                key: "cluster.isolation.max_pods",
                reason: format!(
                    "{} pods cannot fit preview + production rollouts ({peak_pods} needed)",
                    self.cluster.isolation.max_pods
                ),
            });
        }
        if self.history.max_entries == 0 {
            return Err(ConfigError::Invalid {
                key: "history.max_entries",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.cluster.rollout_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "cluster.rollout_timeout_secs",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = LaunchpadConfig::from_toml("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.cluster.isolation.cpu_request, "500m");
        assert_eq!(config.cluster.isolation.memory_limit, "512Mi");
        assert_eq!(config.cluster.isolation.max_pods, 6);
        assert_eq!(config.cluster.base_domain(), "127.0.0.1.nip.io");
        assert_eq!(config.history.max_entries, 50);
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = LaunchpadConfig::from_toml(
            r#"
[cluster]
server_ip = "10.0.0.5"
rollout_timeout_secs = 30

[cluster.isolation]
max_pods = 8

[history]
max_entries = 5
"#,
        )
        .unwrap();
        assert_eq!(config.cluster.base_domain(), "10.0.0.5.nip.io");
        assert_eq!(config.cluster.rollout_timeout_secs, 30);
        assert_eq!(config.cluster.isolation.max_pods, 8);
        assert_eq!(config.cluster.isolation.cpu_limit, "1000m");
        assert_eq!(config.history.max_entries, 5);
    }

    #[test]
    fn missing_api_key_is_a_startup_error() {
        let config = LaunchpadConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = LaunchpadConfig::default();
        config.apply_env(|key| match key {
            ENV_API_KEY => Some("sk-test".to_string()),
            ENV_REGISTRY_HOST => Some("registry.local:5000".to_string()),
            _ => None,
        });
        assert_eq!(config.generation.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.registry.host, "registry.local:5000");
        assert_eq!(config.cluster.server_ip, "127.0.0.1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = LaunchpadConfig::default();
        config.apply_env(|key| (key == ENV_API_KEY).then(|| "  ".to_string()));
        assert!(config.generation.api_key.is_none());
    }

    #[test]
    fn pod_cap_must_fit_both_rollouts() {
        let mut config = LaunchpadConfig::default();
        config.generation.api_key = Some("sk-test".to_string());
        config.cluster.replicas = 3;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                key: "cluster.isolation.max_pods",
                ..
            })
        ));
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launchpad.toml");
        std::fs::write(&path, "[server]\nport = 9000\n").unwrap();
        let config = LaunchpadConfig::from_file(&path).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut config = GenerationConfig::default();
        config.api_key = Some("sk-secret".to_string());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
    }
}
