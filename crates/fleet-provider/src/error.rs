//! Provider error taxonomy.

use thiserror::Error;

/// A vendor API failure during create or destroy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("quota exceeded: {0}")]
    Quota(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    /// The instance does not exist on the vendor side.
    #[error("instance not found: {0}")]
    NotFound(String),

    /// The call was abandoned because the caller is shutting down.
    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Destroying something that is already gone counts as success.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }
}
