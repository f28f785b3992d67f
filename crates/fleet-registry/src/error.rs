//! Error types for the instance registry.

use thiserror::Error;

use crate::types::InstanceState;

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
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

    #[error("instance not found: {0}")]
    NotFound(String),

    #[error("instance name already exists: {0}")]
    DuplicateName(String),

    #[error("instance {name}: illegal transition {from} -> {to}")]
    InvalidTransition {
        name: String,
        from: InstanceState,
        to: InstanceState,
    },

    #[error("instance {name}: cannot be created in state {state}")]
    InvalidInitialState { name: String, state: InstanceState },
}

impl RegistryError {
    /// Whether this error reflects the caller's request rather than the
    /// storage backend.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            RegistryError::NotFound(_)
                | RegistryError::DuplicateName(_)
                | RegistryError::InvalidTransition { .. }
                | RegistryError::InvalidInitialState { .. }
        )
    }
}
