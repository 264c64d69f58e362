//! Persisted registry records.

use serde::{Deserialize, Serialize};

use launchpad_core::naming;
use launchpad_core::{AppName, Environment, ImageTag, LifecycleState, TemplateKind};

// ── App ───────────────────────────────────────────────────────────

/// Durable record of one app.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppRecord {
    pub name: AppName,
    pub template: TemplateKind,
    pub state: LifecycleState,
    pub namespace: String,
    pub preview_tag: Option<ImageTag>,
    pub prod_tag: Option<ImageTag>,
    /// Built images, newest first.
    pub history: Vec<ImageRecord>,
    /// Externally-visible step that started but has not been settled.
    pub pending: Option<PendingStep>,
    /// Newest tag ever handed to the builder, recorded or not. Tag policy
    /// starts from here so a failed build's tag is never issued again.
    #[serde(default)]
    pub last_issued_tag: Option<ImageTag>,
    pub latest_revision: Option<u64>,
    pub description: Option<String>,
    /// Unix timestamp (seconds) when the app was created.
    pub created_at: u64,
    /// Unix timestamp (seconds) of the last transition.
    pub updated_at: u64,
}

/// One built image and the revision it was built from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageRecord {
    pub tag: ImageTag,
    pub revision: u64,
    pub built_at: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PendingKind {
    Build,
    Publish,
    Rollback,
}

impl PendingKind {
    /// Environment whose live Deployment the step touches.
    pub fn environment(&self) -> Environment {
        match self {
            PendingKind::Build => Environment::Preview,
            PendingKind::Publish | PendingKind::Rollback => Environment::Production,
        }
    }
}

/// Marker written before a build/publish/rollback touches anything outside
/// the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingStep {
    pub kind: PendingKind,
    pub tag: ImageTag,
    pub revision: Option<u64>,
    pub started_at: u64,
}

impl AppRecord {
    pub fn new(name: AppName, template: TemplateKind, now: u64) -> Self {
        Self {
            namespace: naming::namespace_for(&name),
            name,
            template,
            state: LifecycleState::Created,
            preview_tag: None,
            prod_tag: None,
            history: Vec::new(),
            pending: None,
            last_issued_tag: None,
            latest_revision: None,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_tag(&self, tag: &ImageTag) -> bool {
        self.history.iter().any(|r| &r.tag == tag)
    }

    pub fn history_tags(&self) -> impl Iterator<Item = &ImageTag> {
        self.history.iter().map(|r| &r.tag)
    }

    pub fn tag_for(&self, env: Environment) -> Option<&ImageTag> {
        match env {
            Environment::Preview => self.preview_tag.as_ref(),
            Environment::Production => self.prod_tag.as_ref(),
        }
    }

    /// Revision an image was built from.
    pub fn revision_of(&self, tag: &ImageTag) -> Option<u64> {
        self.history.iter().find(|r| &r.tag == tag).map(|r| r.revision)
    }

    /// Newest tag known for this app, used as the floor for the next tag.
    pub fn newest_issued_tag(&self) -> Option<&ImageTag> {
        let newest_built = self.history.first().map(|r| &r.tag);
        match (newest_built, self.last_issued_tag.as_ref()) {
            (Some(a), Some(b)) => Some(if a >= b { a } else { b }),
            (a, b) => a.or(b),
        }
    }

    /// Newest history tag strictly older than the production tag.
    pub fn previous_production_candidate(&self) -> Option<&ImageTag> {
        let prod = self.prod_tag.as_ref()?;
        self.history_tags().filter(|t| *t < prod).max()
    }

    /// Prepend a freshly built image and apply retention.
    pub fn record_build(&mut self, tag: ImageTag, revision: u64, now: u64, max_entries: usize) {
        self.history.insert(
            0,
            ImageRecord {
                tag,
                revision,
                built_at: now,
            },
        );
        self.prune_history(max_entries);
    }

    /// Drop the oldest entries beyond `max_entries`, never the tags that the
    /// preview or production environment currently serve.
    pub fn prune_history(&mut self, max_entries: usize) {
        while self.history.len() > max_entries {
            let victim = self.history.iter().rposition(|r| {
                Some(&r.tag) != self.preview_tag.as_ref() && Some(&r.tag) != self.prod_tag.as_ref()
            });
            match victim {
                Some(idx) => {
                    self.history.remove(idx);
                }
                None => break,
            }
        }
    }

    /// Record-level invariants checked on every write.
    pub fn validate(&self) -> Result<(), String> {
        if self.namespace != naming::namespace_for(&self.name) {
            return Err(format!(
                "namespace {} does not match app {}",
                self.namespace, self.name
            ));
        }
        if let Some(tag) = &self.prod_tag {
            if !self.has_tag(tag) {
                return Err(format!("production tag {tag} is not in history"));
            }
        }
        if let Some(tag) = &self.preview_tag {
            if !self.has_tag(tag) {
                return Err(format!("preview tag {tag} is not in history"));
            }
        }
        if let Some(tag) = self.history_tags().find(|t| t.app() != &self.name) {
            return Err(format!("history tag {tag} belongs to another app"));
        }
        Ok(())
    }
}
