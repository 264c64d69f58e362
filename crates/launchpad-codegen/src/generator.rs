use tokio::sync::mpsc;

use launchpad_core::{AppName, TemplateKind};
use launchpad_vcs::FileSet;

use crate::error::GenerationResult;

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub app: AppName,
    pub template: TemplateKind,
    pub description: String,
    /// Current files of the app, offered to the model as context.
    pub existing: FileSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    /// Raw model text.
    Token(String),
    /// A file block closed in the stream.
    File { name: String, content: String },
    /// The stream ended; `files` holds every file the model returned.
    Complete { files: FileSet },
}

/// Streams generation events for one request.
///
/// The receiver yields events until `Complete` or the first error. Dropping
/// the receiver stops generation.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self, request: GenerationRequest) -> mpsc::Receiver<GenerationResult<GenerationEvent>>;
}
