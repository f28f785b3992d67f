//! Scaler error types.

use thiserror::Error;

/// Failures that abort a tick.
///
/// Per-instance provider failures never show up here; they are recorded
/// on the instance and reported in the tick's `TickReport`.
#[derive(Debug, Error)]
pub enum ScalerError {
    #[error("registry error: {0}")]
    Registry(#[from] fleet_registry::RegistryError),

    #[error("provider task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("could not allocate a unique instance name after {0} attempts")]
    NameExhausted(u32),
}

pub type ScalerResult<T> = Result<T, ScalerError>;
