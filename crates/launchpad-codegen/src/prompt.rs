//! System and user prompts for generation requests.

use launchpad_core::{AppName, TemplateKind};
use launchpad_vcs::FileSet;

const API: &str = include_str!("../templates/prompts/api.md");
const STATIC_SITE: &str = include_str!("../templates/prompts/static-site.md");
const WEBHOOK: &str = include_str!("../templates/prompts/webhook.md");
const SCHEDULED_JOB: &str = include_str!("../templates/prompts/scheduled-job.md");

pub const APP_NAME_PLACEHOLDER: &str = "{{APP_NAME}}";

pub fn system_prompt(template: TemplateKind, app: &AppName) -> String {
    let raw = match template {
        TemplateKind::Api => API,
        TemplateKind::StaticSite => STATIC_SITE,
        TemplateKind::Webhook => WEBHOOK,
        TemplateKind::ScheduledJob => SCHEDULED_JOB,
    };
    raw.replace(APP_NAME_PLACEHOLDER, app.as_str())
}

/// The user's description followed by the current files, if any.
pub fn user_message(description: &str, existing: &FileSet) -> String {
    if existing.is_empty() {
        return description.to_string();
    }
    let mut message = format!("{description}\n\nExisting files:\n");
    let blocks: Vec<String> = existing
        .iter()
        .map(|(name, content)| format!("<existing file=\"{name}\">\n{content}\n</existing>"))
        .collect();
    message.push_str(&blocks.join("\n"));
    message
}
