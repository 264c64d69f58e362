//! AppRegistry — redb-backed persistence for app records.
//!
//! All values are JSON-serialized into redb's `&[u8]` value column. The
//! registry supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use launchpad_core::{AppName, LifecycleState, TemplateKind};

use crate::error::{StateError, StateResult};
use crate::tables::APPS;
use crate::types::AppRecord;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe app registry backed by redb.
#[derive(Clone)]
pub struct AppRegistry {
    db: Arc<Database>,
}

impl AppRegistry {
    /// Open (or create) a persistent registry at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let registry = Self { db: Arc::new(db) };
        registry.ensure_tables()?;
        debug!(?path, "app registry opened");
        Ok(registry)
    }

    /// Create an ephemeral in-memory registry (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let registry = Self { db: Arc::new(db) };
        registry.ensure_tables()?;
        debug!("in-memory app registry opened");
        Ok(registry)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(APPS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert a new app in state `Created`.
    ///
    /// Fails with `DuplicateName` if any record (including a deleted
    /// tombstone) already holds the name.
    pub fn create_app(
        &self,
        name: &AppName,
        template: TemplateKind,
        scaffold_revision: Option<u64>,
    ) -> StateResult<AppRecord> {
        let mut record = AppRecord::new(name.clone(), template, epoch_secs());
        record.latest_revision = scaffold_revision;
        let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(APPS).map_err(map_err!(Table))?;
            if table.get(name.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::DuplicateName(name.to_string()));
            }
            table
                .insert(name.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(app = %name, %template, "app created");
        Ok(record)
    }

    /// Get an app by name.
    pub fn get(&self, name: &str) -> StateResult<AppRecord> {
        self.find(name)?
            .ok_or_else(|| StateError::NotFound(name.to_string()))
    }

    /// Get an app by name, `None` if absent.
    pub fn find(&self, name: &str) -> StateResult<Option<AppRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(APPS).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: AppRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List all apps, tombstones included, ordered by name.
    pub fn list(&self) -> StateResult<Vec<AppRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(APPS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: AppRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    /// Atomically check the stored state and apply `mutation`.
    ///
    /// The read, the state check, the mutation and the write happen in one
    /// write transaction. The mutated record must still satisfy
    /// [`AppRecord::validate`]; otherwise nothing is written. `name`,
    /// `namespace` and `created_at` are restored after the mutation runs.
    pub fn transition<F>(
        &self,
        name: &str,
        expected: LifecycleState,
        mutation: F,
    ) -> StateResult<AppRecord>
    where
        F: FnOnce(&mut AppRecord),
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let record = {
            let mut table = txn.open_table(APPS).map_err(map_err!(Table))?;
            let current = table
                .get(name)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_vec())
                .ok_or_else(|| StateError::NotFound(name.to_string()))?;
            let mut record: AppRecord =
                serde_json::from_slice(&current).map_err(map_err!(Deserialize))?;

            if record.state != expected {
                return Err(StateError::Conflict {
                    name: name.to_string(),
                    expected,
                    actual: record.state,
                });
            }

            let (identity, namespace, created_at) =
                (record.name.clone(), record.namespace.clone(), record.created_at);
            let from = record.state;
            mutation(&mut record);
            record.name = identity;
            record.namespace = namespace;
            record.created_at = created_at;
            record.updated_at = epoch_secs().max(record.updated_at);

            record.validate().map_err(|reason| StateError::Invariant {
                name: name.to_string(),
                reason,
            })?;

            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            table
                .insert(name, value.as_slice())
                .map_err(map_err!(Write))?;
            debug!(app = %name, %from, to = %record.state, "app transitioned");
            record
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(record)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchpad_core::ImageTag;

    fn name(s: &str) -> AppName {
        AppName::parse(s).unwrap()
    }

    fn tag(s: &str) -> ImageTag {
        s.parse().unwrap()
    }

    // ── Create / get / list ────────────────────────────────────────

    #[test]
    fn create_and_get() {
        let registry = AppRegistry::open_in_memory().unwrap();
        let created = registry
            .create_app(&name("demo"), TemplateKind::Api, Some(1))
            .unwrap();

        let fetched = registry.get("demo").unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.state, LifecycleState::Created);
        assert_eq!(fetched.namespace, "app-demo");
        assert_eq!(fetched.latest_revision, Some(1));
    }

    #[test]
    fn duplicate_name_rejected() {
        let registry = AppRegistry::open_in_memory().unwrap();
        registry
            .create_app(&name("demo"), TemplateKind::Api, None)
            .unwrap();
        let err = registry
            .create_app(&name("demo"), TemplateKind::Webhook, None)
            .unwrap_err();
        assert!(matches!(err, StateError::DuplicateName(n) if n == "demo"));
        // The original record is untouched.
        assert_eq!(registry.get("demo").unwrap().template, TemplateKind::Api);
    }

    #[test]
    fn get_missing_is_not_found() {
        let registry = AppRegistry::open_in_memory().unwrap();
        assert!(matches!(registry.get("nope"), Err(StateError::NotFound(_))));
        assert!(registry.find("nope").unwrap().is_none());
    }

    #[test]
    fn list_returns_all_sorted() {
        let registry = AppRegistry::open_in_memory().unwrap();
        for n in ["zeta", "alpha", "mid"] {
            registry.create_app(&name(n), TemplateKind::Api, None).unwrap();
        }
        let names: Vec<_> = registry
            .list()
            .unwrap()
            .into_iter()
            .map(|a| a.name.to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    // ── Transition ─────────────────────────────────────────────────

    #[test]
    fn transition_applies_when_state_matches() {
        let registry = AppRegistry::open_in_memory().unwrap();
        registry.create_app(&name("demo"), TemplateKind::Api, None).unwrap();

        let updated = registry
            .transition("demo", LifecycleState::Created, |app| {
                app.state = LifecycleState::Generated;
                app.latest_revision = Some(2);
            })
            .unwrap();
        assert_eq!(updated.state, LifecycleState::Generated);

        // Visible to the next read immediately.
        let fetched = registry.get("demo").unwrap();
        assert_eq!(fetched.state, LifecycleState::Generated);
        assert_eq!(fetched.latest_revision, Some(2));
    }

    #[test]
    fn transition_conflicts_on_stale_state() {
        let registry = AppRegistry::open_in_memory().unwrap();
        registry.create_app(&name("demo"), TemplateKind::Api, None).unwrap();

        let err = registry
            .transition("demo", LifecycleState::Generated, |app| {
                app.state = LifecycleState::PreviewBuilt;
            })
            .unwrap_err();
        assert!(matches!(
            err,
            StateError::Conflict {
                expected: LifecycleState::Generated,
                actual: LifecycleState::Created,
                ..
            }
        ));
        assert_eq!(registry.get("demo").unwrap().state, LifecycleState::Created);
    }

    #[test]
    fn transition_rejects_invariant_violation() {
        let registry = AppRegistry::open_in_memory().unwrap();
        registry.create_app(&name("demo"), TemplateKind::Api, None).unwrap();

        let err = registry
            .transition("demo", LifecycleState::Created, |app| {
                app.prod_tag = Some(tag("demo:20260221.100000"));
            })
            .unwrap_err();
        assert!(matches!(err, StateError::Invariant { .. }));
        assert!(registry.get("demo").unwrap().prod_tag.is_none());
    }

    #[test]
    fn transition_cannot_rename_or_move_namespace() {
        let registry = AppRegistry::open_in_memory().unwrap();
        registry.create_app(&name("demo"), TemplateKind::Api, None).unwrap();

        let updated = registry
            .transition("demo", LifecycleState::Created, |app| {
                app.name = AppName::parse("other").unwrap();
                app.namespace = "app-other".to_string();
            })
            .unwrap();
        assert_eq!(updated.name.as_str(), "demo");
        assert_eq!(updated.namespace, "app-demo");
    }

    #[test]
    fn transition_missing_app() {
        let registry = AppRegistry::open_in_memory().unwrap();
        let err = registry
            .transition("ghost", LifecycleState::Created, |_| {})
            .unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("registry.redb");

        {
            let registry = AppRegistry::open(&db_path).unwrap();
            registry.create_app(&name("demo"), TemplateKind::Webhook, Some(1)).unwrap();
            registry
                .transition("demo", LifecycleState::Created, |app| {
                    app.state = LifecycleState::Generated;
                    app.record_build(tag("demo:20260221.100000"), 1, 1000, 10);
                    app.preview_tag = Some(tag("demo:20260221.100000"));
                })
                .unwrap();
        }

        let registry = AppRegistry::open(&db_path).unwrap();
        let app = registry.get("demo").unwrap();
        assert_eq!(app.state, LifecycleState::Generated);
        assert_eq!(app.template, TemplateKind::Webhook);
        assert_eq!(app.preview_tag, Some(tag("demo:20260221.100000")));
        assert_eq!(app.history.len(), 1);
    }
}
