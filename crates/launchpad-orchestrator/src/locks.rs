//! Per-app operation locks.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use launchpad_core::AppName;

use crate::error::{LifecycleError, LifecycleResult};

/// One lock per app name. Acquisition never waits: a second intent for a
/// busy app is rejected rather than queued.
#[derive(Debug, Default)]
pub struct AppLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AppLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, app: &AppName) -> LifecycleResult<OwnedMutexGuard<()>> {
        let lock = self.locks.entry(app.to_string()).or_default().clone();
        lock.try_lock_owned().map_err(|_| LifecycleError::Conflict {
            app: app.to_string(),
            reason: "another operation is in progress".to_string(),
        })
    }

    pub fn is_busy(&self, app: &AppName) -> bool {
        self.locks
            .get(app.as_str())
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Drop the entry for `app` unless someone still holds or waits on it.
    pub fn forget(&self, app: &AppName) {
        self.locks
            .remove_if(app.as_str(), |_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
