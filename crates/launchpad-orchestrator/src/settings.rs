use launchpad_cluster::DesiredState;
use launchpad_core::LaunchpadConfig;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub desired: DesiredState,
    /// Image history entries kept per app.
    pub history_limit: usize,
}

impl OrchestratorSettings {
    pub fn from_config(config: &LaunchpadConfig) -> Self {
        Self {
            desired: DesiredState::from_config(config),
            history_limit: config.history.max_entries.max(1),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&LaunchpadConfig::default())
    }
}
