use thiserror::Error;

use launchpad_vcs::VcsError;

pub type GenerationResult<T> = Result<T, GenerationError>;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("model API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("model API request failed: {0}")]
    Transport(String),

    #[error("model stream error: {0}")]
    Stream(String),

    #[error("model response contained no files")]
    NoFiles,

    #[error("model produced an invalid file: {0}")]
    InvalidFile(#[from] VcsError),
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        GenerationError::Transport(e.to_string())
    }
}
