//! Error types for the app registry.

use launchpad_core::LifecycleState;
use thiserror::Error;

/// Result type alias for registry operations.
pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("app not found: {0}")]
    NotFound(String),

    #[error("app already exists: {0}")]
    DuplicateName(String),

    #[error("app {name} is {actual}, expected {expected}")]
    Conflict {
        name: String,
        expected: LifecycleState,
        actual: LifecycleState,
    },

    #[error("app {name} would violate an invariant: {reason}")]
    Invariant { name: String, reason: String },
}

impl StateError {
    /// Storage-level failures, as opposed to lookups and state checks.
    pub fn is_storage_fault(&self) -> bool {
        !matches!(
            self,
            StateError::NotFound(_)
                | StateError::DuplicateName(_)
                | StateError::Conflict { .. }
                | StateError::Invariant { .. }
        )
    }
}
