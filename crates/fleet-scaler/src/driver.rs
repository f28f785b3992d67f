//! Periodic tick driver with graceful shutdown.
//!
//! Ticks fire on a fixed interval, the first one immediately. A tick that
//! outlasts the interval swallows the ticks it overlapped
//! ([`MissedTickBehavior::Skip`]); they are never queued up behind it.
//!
//! On shutdown the scaler's cancellation token fires first, so provider
//! calls in flight can give up and have their records marked `Error`. The
//! tick then gets `grace` to settle. If it does not, the tick future is
//! dropped, which aborts its provider tasks and leaves their records in
//! `Creating`/`Stopping` for the next start's [`Scaler::reconcile`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::ScalerResult;
use crate::scaler::{Scaler, TickOutcome};

pub const DEFAULT_GRACE: Duration = Duration::from_secs(30);

/// Owns the tick schedule for one [`Scaler`].
pub struct Driver {
    scaler: Arc<Scaler>,
    interval: Duration,
    grace: Duration,
}

impl Driver {
    pub fn new(scaler: Arc<Scaler>, interval: Duration) -> Self {
        Self {
            scaler,
            interval,
            grace: DEFAULT_GRACE,
        }
    }

    /// How long an in-flight tick may run on after shutdown is signalled.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Run on a background task until `shutdown` flips or its sender drops.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Tick until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            grace_secs = self.grace.as_secs(),
            "scaler driver started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            let tick = self.scaler.tick();
            tokio::pin!(tick);

            tokio::select! {
                biased;
                result = &mut tick => log_outcome(result),
                _ = shutdown.changed() => {
                    info!(
                        grace_secs = self.grace.as_secs(),
                        "shutdown during tick, cancelling in-flight calls"
                    );
                    self.scaler.cancellation_token().cancel();
                    match tokio::time::timeout(self.grace, &mut tick).await {
                        Ok(result) => log_outcome(result),
                        Err(_) => warn!(
                            "grace period elapsed, abandoning in-flight calls; \
                             their records will be reconciled on next start"
                        ),
                    }
                    break;
                }
            }
        }

        info!("scaler driver stopped");
    }
}

fn log_outcome(result: ScalerResult<TickOutcome>) {
    match result {
        Ok(TickOutcome::Completed(_)) => {}
        Ok(TickOutcome::Skipped) => debug!("tick skipped, another tick holds the lock"),
        Ok(TickOutcome::QueueUnavailable) => debug!("tick made no decision, queue unavailable"),
        Err(e) => error!(error = %e, "tick aborted"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{PoolPolicy, RoundingPolicy};
    use fleet_provider::MockProvider;
    use fleet_queue::StaticQueue;
    use fleet_registry::{InstanceState, RedbRegistry, Registry};

    fn scaler(provider: Arc<MockProvider>, registry: Arc<RedbRegistry>) -> Arc<Scaler> {
        let policy = PoolPolicy {
            min: 2,
            max: 4,
            min_age: Duration::from_secs(3600),
            rounding: RoundingPolicy::Ceil,
        };
        let queue = Arc::new(StaticQueue::new(0, 2));
        Arc::new(Scaler::new(registry, provider, queue, policy))
    }

    #[tokio::test]
    async fn first_tick_runs_immediately_and_stops_on_signal() {
        let registry = Arc::new(RedbRegistry::open_in_memory().unwrap());
        let provider = Arc::new(MockProvider::new());
        let driver = Driver::new(scaler(provider.clone(), registry.clone()), Duration::from_secs(3600));

        let (tx, rx) = watch::channel(false);
        let handle = driver.spawn(rx);

        tokio::time::timeout(Duration::from_secs(5), async {
            while provider.live_instances().await.len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(registry.list().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stops_when_sender_dropped() {
        let registry = Arc::new(RedbRegistry::open_in_memory().unwrap());
        let provider = Arc::new(MockProvider::new());
        let driver = Driver::new(scaler(provider, registry), Duration::from_secs(3600));

        let (tx, rx) = watch::channel(false);
        let handle = driver.spawn(rx);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    async fn shutdown_mid_tick(provider: MockProvider, grace: Duration) -> Vec<InstanceState> {
        let registry = Arc::new(RedbRegistry::open_in_memory().unwrap());
        let scaler = scaler(Arc::new(provider), registry.clone());
        let driver = Driver::new(scaler, Duration::from_secs(3600)).with_grace(grace);

        let (tx, rx) = watch::channel(false);
        let handle = driver.spawn(rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        registry.list().unwrap().into_iter().map(|r| r.state).collect()
    }

    #[tokio::test]
    async fn shutdown_cancels_in_flight_calls() {
        let provider = MockProvider::new().with_latency(Duration::from_secs(30));
        let states = shutdown_mid_tick(provider, Duration::from_secs(1)).await;
        assert_eq!(states, vec![InstanceState::Error, InstanceState::Error]);
    }

    #[tokio::test]
    async fn uninterruptible_calls_settle_within_grace() {
        let provider = MockProvider::new()
            .with_latency(Duration::from_millis(200))
            .ignoring_cancellation();
        let states = shutdown_mid_tick(provider, Duration::from_secs(5)).await;
        assert_eq!(states, vec![InstanceState::Running, InstanceState::Running]);
    }

    #[tokio::test]
    async fn calls_past_grace_leave_records_creating() {
        let provider = MockProvider::new()
            .with_latency(Duration::from_secs(30))
            .ignoring_cancellation();
        let states = shutdown_mid_tick(provider, Duration::from_millis(50)).await;
        assert_eq!(states, vec![InstanceState::Creating, InstanceState::Creating]);
    }
}
