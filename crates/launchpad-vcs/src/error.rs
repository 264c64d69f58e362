use thiserror::Error;

pub type VcsResult<T> = Result<T, VcsError>;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("invalid file path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("refusing to commit an empty file set for {app}")]
    EmptyFileSet { app: String },

    #[error("revision {sequence} of {app} not found")]
    RevisionNotFound { app: String, sequence: u64 },

    #[error("version store fault for {app}: {reason}")]
    StorageFault { app: String, reason: String },
}

impl VcsError {
    pub(crate) fn fault(app: impl ToString, reason: impl ToString) -> Self {
        VcsError::StorageFault {
            app: app.to_string(),
            reason: reason.to_string(),
        }
    }
}
