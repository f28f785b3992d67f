//! Instance records and their lifecycle.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Unique, registry-wide instance name.
pub type InstanceName = String;

/// Lifecycle state of an agent instance.
///
/// ```text
/// Pending -> Creating -> Running -> Stopping -> Stopped
///               |                      |
///               +-------> Error <------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Pending,
    Creating,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl InstanceState {
    /// Counted toward the pool's active capacity.
    pub fn is_active(self) -> bool {
        matches!(self, InstanceState::Creating | InstanceState::Running)
    }

    /// No further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, InstanceState::Stopped | InstanceState::Error)
    }

    /// Whether `self -> next` is a legal lifecycle step.
    ///
    /// Re-writing a record in its current state is always allowed.
    pub fn can_transition_to(self, next: InstanceState) -> bool {
        use InstanceState::*;
        self == next
            || matches!(
                (self, next),
                (Pending, Creating)
                    | (Creating, Running)
                    | (Creating, Error)
                    | (Running, Stopping)
                    | (Stopping, Stopped)
                    | (Stopping, Error)
            )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Creating => "creating",
            InstanceState::Running => "running",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::Error => "error",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One provisioned or in-flight agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    pub name: InstanceName,
    /// Provider kind that owns this instance (e.g. "mock").
    pub provider: String,
    /// Vendor-side identifier, known once creation succeeds.
    pub provider_id: Option<String>,
    pub region: String,
    pub size: String,
    pub image: String,
    pub tags: Vec<String>,
    /// Public address; empty until the provider reports a live instance.
    pub address: Option<String>,
    /// Concurrent jobs this instance runs, fixed at creation time.
    pub capacity: u32,
    pub state: InstanceState,
    /// Last failure message, only set in `Error`.
    pub error: Option<String>,
    /// Unix timestamp (seconds) when the record was created.
    pub created_at: u64,
    /// Unix timestamp (seconds) when destruction was requested.
    pub stopped_at: Option<u64>,
    /// Unix timestamp (seconds) of the last write.
    pub updated_at: u64,
    /// Insertion sequence, assigned by the registry on create.
    #[serde(default)]
    pub seq: u64,
}

impl Instance {
    /// A fresh `Pending` record.
    pub fn new(name: impl Into<String>, capacity: u32, now: u64) -> Self {
        Self {
            name: name.into(),
            provider: String::new(),
            provider_id: None,
            region: String::new(),
            size: String::new(),
            image: String::new(),
            tags: Vec::new(),
            address: None,
            capacity,
            state: InstanceState::Pending,
            error: None,
            created_at: now,
            stopped_at: None,
            updated_at: now,
            seq: 0,
        }
    }

    /// Seconds since the record was created.
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }

    /// Running and at least `min_age` old.
    pub fn is_destroyable(&self, now: u64, min_age: Duration) -> bool {
        self.state == InstanceState::Running && self.age_secs(now) >= min_age.as_secs()
    }

    /// Capacity used for pool accounting; records written before capacity
    /// was tracked fall back to the current per-agent concurrency.
    pub fn effective_capacity(&self, fallback: u32) -> u32 {
        if self.capacity == 0 { fallback } else { self.capacity }
    }

    pub fn mark_creating(&mut self, now: u64) {
        self.state = InstanceState::Creating;
        self.updated_at = now;
    }

    pub fn mark_running(&mut self, address: String, provider_id: Option<String>, now: u64) {
        self.state = InstanceState::Running;
        self.address = Some(address);
        self.provider_id = provider_id;
        self.error = None;
        self.updated_at = now;
    }

    pub fn mark_stopping(&mut self, now: u64) {
        self.state = InstanceState::Stopping;
        self.stopped_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_stopped(&mut self, now: u64) {
        self.state = InstanceState::Stopped;
        self.updated_at = now;
    }

    pub fn mark_error(&mut self, message: impl Into<String>, now: u64) {
        self.state = InstanceState::Error;
        self.error = Some(message.into());
        self.updated_at = now;
    }
}
