//! In-process provider for tests and dry runs.
//!
//! Keeps a map of "live" instances, hands out addresses from 10.0.0.0/8
//! and can be told to fail upcoming calls or to take a while answering.
//! A slow call returns `Cancelled` as soon as its token fires, unless the
//! mock is built with [`MockProvider::ignoring_cancellation`].

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use fleet_registry::Instance;

use crate::error::ProviderError;
use crate::provider::{InstanceSpec, Provider, ProvisionedInstance};

#[derive(Default)]
struct MockState {
    /// name → address
    live: BTreeMap<String, String>,
    next_host: u32,
    create_failures: VecDeque<ProviderError>,
    destroy_failures: VecDeque<ProviderError>,
    create_calls: usize,
    destroy_calls: usize,
}

/// A provider that never leaves the process.
#[derive(Default)]
pub struct MockProvider {
    state: Mutex<MockState>,
    latency: Duration,
    ignore_cancellation: bool,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Keep waiting out the latency after cancellation, like a vendor SDK
    /// call that cannot be interrupted.
    pub fn ignoring_cancellation(mut self) -> Self {
        self.ignore_cancellation = true;
        self
    }

    /// Fail the next create call with `err`. Failures queue up.
    pub async fn fail_next_create(&self, err: ProviderError) {
        self.state.lock().await.create_failures.push_back(err);
    }

    /// Fail the next destroy call with `err`. Failures queue up.
    pub async fn fail_next_destroy(&self, err: ProviderError) {
        self.state.lock().await.destroy_failures.push_back(err);
    }

    /// Names of instances the mock currently considers live.
    pub async fn live_instances(&self) -> Vec<String> {
        self.state.lock().await.live.keys().cloned().collect()
    }

    pub async fn create_calls(&self) -> usize {
        self.state.lock().await.create_calls
    }

    pub async fn destroy_calls(&self) -> usize {
        self.state.lock().await.destroy_calls
    }

    /// Highest number of calls observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self, cancel: &CancellationToken) -> Result<(), ProviderError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = if self.ignore_cancellation {
            tokio::time::sleep(self.latency).await;
            Ok(())
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ProviderError::Cancelled("shutdown".into())),
                _ = tokio::time::sleep(self.latency) => Ok(()),
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn kind(&self) -> &str {
        "mock"
    }

    async fn create_instance(
        &self,
        spec: &InstanceSpec,
        cancel: &CancellationToken,
    ) -> Result<ProvisionedInstance, ProviderError> {
        let waited = self.simulate_latency(cancel).await;

        let mut state = self.state.lock().await;
        state.create_calls += 1;
        if let Err(err) = waited {
            debug!(name = %spec.name, "mock create cancelled");
            return Err(err);
        }
        if let Some(err) = state.create_failures.pop_front() {
            debug!(name = %spec.name, error = %err, "mock create failing");
            return Err(err);
        }

        state.next_host += 1;
        let host = state.next_host;
        let address = format!("10.{}.{}.{}", (host >> 16) & 0xff, (host >> 8) & 0xff, host & 0xff);
        state.live.insert(spec.name.clone(), address.clone());
        debug!(name = %spec.name, %address, "mock instance created");

        Ok(ProvisionedInstance {
            address,
            provider_id: Some(format!("mock-{host}")),
        })
    }

    async fn destroy_instance(
        &self,
        instance: &Instance,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        let waited = self.simulate_latency(cancel).await;

        let mut state = self.state.lock().await;
        state.destroy_calls += 1;
        if let Err(err) = waited {
            debug!(name = %instance.name, "mock destroy cancelled");
            return Err(err);
        }
        if let Some(err) = state.destroy_failures.pop_front() {
            debug!(name = %instance.name, error = %err, "mock destroy failing");
            return Err(err);
        }

        match state.live.remove(&instance.name) {
            Some(_) => {
                debug!(name = %instance.name, "mock instance destroyed");
                Ok(())
            }
            None => Err(ProviderError::NotFound(instance.name.clone())),
        }
    }
}
