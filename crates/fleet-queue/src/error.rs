//! Queue source errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid queue address {0:?}")]
    InvalidAddress(String),

    #[error("queue unreachable: {0}")]
    Unreachable(String),

    #[error("queue returned HTTP {0}")]
    Status(u16),

    #[error("failed to decode queue response: {0}")]
    Decode(String),

    #[error("queue unavailable")]
    Unavailable,
}
