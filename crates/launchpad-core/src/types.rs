//! Shared types used across Launchpad crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest app name accepted. Keeps `app-<name>` and `<name>-preview-svc`
/// inside the 63-character DNS label limit.
pub const MAX_APP_NAME_LEN: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("app name is empty")]
    Empty,
    #[error("app name '{0}' exceeds {max} characters", max = MAX_APP_NAME_LEN)]
    TooLong(String),
    #[error("app name '{0}' must start with a lowercase letter")]
    BadStart(String),
    #[error("app name '{0}' must not end with '-'")]
    BadEnd(String),
    #[error("app name '{name}' contains invalid character {ch:?}")]
    InvalidChar { name: String, ch: char },
}

/// A validated application name. Doubles as a DNS label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppName(String);

impl AppName {
    /// Validate a name exactly as given.
    pub fn parse(raw: &str) -> Result<Self, NameError> {
        if raw.is_empty() {
            return Err(NameError::Empty);
        }
        if raw.len() > MAX_APP_NAME_LEN {
            return Err(NameError::TooLong(raw.to_string()));
        }
        if let Some(ch) = raw
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
        {
            return Err(NameError::InvalidChar {
                name: raw.to_string(),
                ch,
            });
        }
        if !raw.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Err(NameError::BadStart(raw.to_string()));
        }
        if raw.ends_with('-') {
            return Err(NameError::BadEnd(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Normalize user input (trim, lowercase, spaces to dashes) and validate.
    pub fn normalize(raw: &str) -> Result<Self, NameError> {
        let normalized = raw.trim().to_lowercase().replace([' ', '_'], "-");
        Self::parse(&normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AppName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AppName> for String {
    fn from(name: AppName) -> Self {
        name.0
    }
}

impl AsRef<str> for AppName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ── Templates ─────────────────────────────────────────────────────

/// The kind of application scaffolded at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateKind {
    Api,
    StaticSite,
    Webhook,
    ScheduledJob,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown template '{0}' (expected one of: api, static-site, webhook, scheduled-job)")]
pub struct UnknownTemplate(pub String);

impl TemplateKind {
    pub const ALL: [TemplateKind; 4] = [
        TemplateKind::Api,
        TemplateKind::StaticSite,
        TemplateKind::Webhook,
        TemplateKind::ScheduledJob,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::Api => "api",
            TemplateKind::StaticSite => "static-site",
            TemplateKind::Webhook => "webhook",
            TemplateKind::ScheduledJob => "scheduled-job",
        }
    }

    /// Port the scaffolded container listens on.
    pub fn container_port(&self) -> u16 {
        match self {
            TemplateKind::StaticSite => 80,
            _ => 8000,
        }
    }

    /// Readiness probe path served by the scaffolded app.
    pub fn health_path(&self) -> &'static str {
        match self {
            TemplateKind::StaticSite => "/",
            _ => "/health",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateKind {
    type Err = UnknownTemplate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "api" | "simple-api" => Ok(TemplateKind::Api),
            "static-site" => Ok(TemplateKind::StaticSite),
            "webhook" => Ok(TemplateKind::Webhook),
            "scheduled-job" => Ok(TemplateKind::ScheduledJob),
            other => Err(UnknownTemplate(other.to_string())),
        }
    }
}

// ── Lifecycle ─────────────────────────────────────────────────────

/// Lifecycle state of an app as recorded in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Created,
    Generated,
    PreviewBuilt,
    Published,
    Deleting,
    Deleted,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Created => "created",
            LifecycleState::Generated => "generated",
            LifecycleState::PreviewBuilt => "preview_built",
            LifecycleState::Published => "published",
            LifecycleState::Deleting => "deleting",
            LifecycleState::Deleted => "deleted",
        }
    }

    /// Whether the app is being (or has been) torn down.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Deleting | LifecycleState::Deleted)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Preview,
    #[serde(rename = "prod")]
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Preview => "preview",
            Environment::Production => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Image tags ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("image tag '{0}' is missing the ':' separator")]
    MissingSeparator(String),
    #[error("image tag '{0}' has an empty version token")]
    EmptyToken(String),
    #[error("image tag '{tag}' has an invalid app name: {source}")]
    BadApp { tag: String, source: NameError },
}

/// An image tag `<app>:<version-token>`.
///
/// Version tokens sort lexicographically in build order, so `Ord` on the
/// token gives build order for tags of the same app.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageTag {
    app: AppName,
    token: String,
}

impl ImageTag {
    pub fn new(app: AppName, token: impl Into<String>) -> Self {
        Self {
            app,
            token: token.into(),
        }
    }

    pub fn app(&self) -> &AppName {
        &self.app
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Full image reference as pushed to the image registry.
    pub fn reference(&self, registry_host: &str) -> String {
        if registry_host.is_empty() {
            self.to_string()
        } else {
            format!("{}/{}", registry_host.trim_end_matches('/'), self)
        }
    }

    /// Parse an image reference (`host/app:token` or `app:token`) back into a tag.
    pub fn from_reference(reference: &str) -> Result<Self, TagError> {
        let short = reference.rsplit('/').next().unwrap_or(reference);
        short.parse()
    }
}

impl fmt::Display for ImageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.app, self.token)
    }
}

impl FromStr for ImageTag {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (app, token) = s
            .split_once(':')
            .ok_or_else(|| TagError::MissingSeparator(s.to_string()))?;
        if token.is_empty() {
            return Err(TagError::EmptyToken(s.to_string()));
        }
        let app = AppName::parse(app).map_err(|source| TagError::BadApp {
            tag: s.to_string(),
            source,
        })?;
        Ok(Self::new(app, token))
    }
}

impl TryFrom<String> for ImageTag {
    type Error = TagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ImageTag> for String {
    fn from(tag: ImageTag) -> Self {
        tag.to_string()
    }
}

impl PartialOrd for ImageTag {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ImageTag {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.app
            .cmp(&other.app)
            .then_with(|| self.token.cmp(&other.token))
    }
}
