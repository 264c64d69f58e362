use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("image build for {tag} failed:\n{log}")]
    BuildFailure { tag: String, log: String },

    #[error("image push for {tag} failed:\n{log}")]
    PushFailure { tag: String, log: String },
}

impl BuildError {
    /// Captured tool output, if any.
    pub fn log(&self) -> Option<&str> {
        match self {
            BuildError::BuildFailure { log, .. } | BuildError::PushFailure { log, .. } => Some(log),
            BuildError::Spawn { .. } => None,
        }
    }
}
