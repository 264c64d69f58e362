//! Periodic drift monitor and recovery retry.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use launchpad_core::{AppName, ProgressSink};

use crate::error::LifecycleResult;
use crate::orchestrator::Orchestrator;
use crate::status::DriftReport;

/// Compares live deployments with the registry on an interval and, when
/// `heal` is set, re-applies registry state to drifted apps.
pub struct DriftMonitor {
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    heal: bool,
}

impl DriftMonitor {
    pub fn new(orchestrator: Arc<Orchestrator>, interval: Duration, heal: bool) -> Self {
        Self {
            orchestrator,
            interval,
            heal,
        }
    }

    /// One pass. Settles steps left pending by an earlier failure, then
    /// returns the drift found, healed or not.
    pub async fn check_once(&self) -> LifecycleResult<Vec<DriftReport>> {
        self.orchestrator.recover().await;
        let reports = self.orchestrator.check_drift().await?;
        if self.heal {
            let apps: BTreeSet<&AppName> = reports.iter().map(|r| &r.app).collect();
            for app in apps {
                match self.orchestrator.resync(app.as_str(), &ProgressSink::discard()).await {
                    Ok(_) => info!(app = %app, "drift healed"),
                    Err(e) => warn!(app = %app, error = %e, "drift heal failed"),
                }
            }
        }
        Ok(reports)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            heal = self.heal,
            "drift monitor started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.check_once().await {
                        error!(error = %e, "drift check failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("drift monitor shutting down");
                    break;
                }
            }
        }
    }
}
