//! Starting files for each template, committed as revision 1 at create time.

use launchpad_core::{AppName, TemplateKind};
use launchpad_vcs::{FileSet, VcsResult};

use crate::prompt::APP_NAME_PLACEHOLDER;

const PYTHON_REQUIREMENTS: &str = include_str!("../templates/api/requirements.txt");

fn template_files(template: TemplateKind) -> Vec<(&'static str, &'static str)> {
    match template {
        TemplateKind::Api => vec![
            ("Dockerfile", include_str!("../templates/api/Dockerfile")),
            ("requirements.txt", PYTHON_REQUIREMENTS),
            ("app.py", include_str!("../templates/api/app.py")),
        ],
        TemplateKind::Webhook => vec![
            ("Dockerfile", include_str!("../templates/webhook/Dockerfile")),
            ("requirements.txt", include_str!("../templates/webhook/requirements.txt")),
            ("app.py", include_str!("../templates/webhook/app.py")),
        ],
        TemplateKind::ScheduledJob => vec![
            ("Dockerfile", include_str!("../templates/scheduled-job/Dockerfile")),
            ("requirements.txt", include_str!("../templates/scheduled-job/requirements.txt")),
            ("job.py", include_str!("../templates/scheduled-job/job.py")),
        ],
        TemplateKind::StaticSite => vec![
            ("Dockerfile", include_str!("../templates/static-site/Dockerfile")),
            ("site/index.html", include_str!("../templates/static-site/site/index.html")),
        ],
    }
}

/// Render the template's files for `app`.
pub fn scaffold(template: TemplateKind, app: &AppName) -> VcsResult<FileSet> {
    FileSet::from_pairs(
        template_files(template)
            .into_iter()
            .map(|(path, body)| (path, body.replace(APP_NAME_PLACEHOLDER, app.as_str()))),
    )
}
