//! The queue source contract and a fixed-count implementation.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;

use crate::error::QueueError;

/// Supplies demand to the scaler.
#[async_trait]
pub trait QueueSource: Send + Sync {
    /// Jobs waiting for an agent.
    async fn pending_count(&self) -> Result<u32, QueueError>;

    /// Jobs one agent executes simultaneously.
    fn concurrency(&self) -> u32;
}

/// A queue whose pending count is set by hand.
///
/// Used for dry runs (`queue.kind = "static"`) and throughout the tests,
/// where it can also be switched to "unreachable".
#[derive(Debug)]
pub struct StaticQueue {
    pending: AtomicU32,
    concurrency: u32,
    unavailable: AtomicBool,
}

impl StaticQueue {
    pub fn new(pending: u32, concurrency: u32) -> Self {
        Self {
            pending: AtomicU32::new(pending),
            concurrency,
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_pending(&self, pending: u32) {
        self.pending.store(pending, Ordering::SeqCst);
    }

    /// Make subsequent `pending_count` calls fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl QueueSource for StaticQueue {
    async fn pending_count(&self) -> Result<u32, QueueError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable);
        }
        Ok(self.pending.load(Ordering::SeqCst))
    }

    fn concurrency(&self) -> u32 {
        self.concurrency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_what_was_set() {
        let queue = StaticQueue::new(3, 2);
        assert_eq!(queue.pending_count().await.unwrap(), 3);
        assert_eq!(queue.concurrency(), 2);

        queue.set_pending(11);
        assert_eq!(queue.pending_count().await.unwrap(), 11);
    }

    #[tokio::test]
    async fn can_be_made_unavailable() {
        let queue = StaticQueue::new(3, 2);
        queue.set_unavailable(true);
        assert!(matches!(
            queue.pending_count().await,
            Err(QueueError::Unavailable)
        ));
        queue.set_unavailable(false);
        assert!(queue.pending_count().await.is_ok());
    }
}
