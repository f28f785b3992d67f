//! Scaler — one reconciliation pass over the agent pool per tick.
//!
//! Every tick runs under a single lock. A tick that finds the lock taken
//! returns [`TickOutcome::Skipped`] immediately instead of queueing behind
//! the running one, so two ticks never decide against the same snapshot.
//!
//! Each instance is handled with a two-phase write: the record is stored
//! (`Creating` / `Stopping`) before the provider is called, and updated
//! again with the provider's answer. A crash between the two leaves a
//! durable trace that [`Scaler::reconcile`] picks up on the next start.
//!
//! Provider calls receive the scaler's cancellation token. Once it fires
//! (see [`Scaler::cancellation_token`]) adapters abandon their requests and
//! the affected records settle in `Error` instead of hanging mid-flight.

use std::future::Future;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use fleet_core::PoolPolicy;
use fleet_provider::{InstanceSpec, Provider, ProviderError};
use fleet_queue::QueueSource;
use fleet_registry::{Instance, InstanceName, InstanceState, Registry, RegistryError};

use crate::decision::{Decision, ScaleAction, decide};
use crate::error::{ScalerError, ScalerResult};
use crate::names::generate_name;

/// Source of "now" in unix seconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// How many fresh names to try before giving up on a create.
const NAME_ATTEMPTS: u32 = 5;

/// Provisioning parameters stamped onto every new instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceTemplate {
    pub region: String,
    pub size: String,
    pub image: String,
    pub tags: Vec<String>,
}

/// Per-instance results of one batch of provider calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: Vec<InstanceName>,
    /// Instance name and the provider's error message.
    pub failed: Vec<(InstanceName, String)>,
}

/// What a completed tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub decision: Decision,
    pub created: Vec<InstanceName>,
    pub destroyed: Vec<InstanceName>,
    pub failed: Vec<(InstanceName, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick held the lock.
    Skipped,
    /// Demand could not be read; nothing was decided.
    QueueUnavailable,
    Completed(TickReport),
}

/// How a single provider call ended, once its record was written.
enum Settled {
    Done,
    ProviderFailed(ProviderError),
}

type Settlement = (InstanceName, Result<Settled, RegistryError>);

/// The control loop's state: collaborators, policy and the tick lock.
pub struct Scaler {
    registry: Arc<dyn Registry>,
    provider: Arc<dyn Provider>,
    queue: Arc<dyn QueueSource>,
    policy: PoolPolicy,
    template: InstanceTemplate,
    max_in_flight: usize,
    clock: Clock,
    cancel: CancellationToken,
    lock: Mutex<()>,
}

impl Scaler {
    pub fn new(
        registry: Arc<dyn Registry>,
        provider: Arc<dyn Provider>,
        queue: Arc<dyn QueueSource>,
        policy: PoolPolicy,
    ) -> Self {
        Self {
            registry,
            provider,
            queue,
            policy,
            template: InstanceTemplate::default(),
            max_in_flight: 10,
            clock: Arc::new(epoch_secs),
            cancel: CancellationToken::new(),
            lock: Mutex::new(()),
        }
    }

    pub fn with_template(mut self, template: InstanceTemplate) -> Self {
        self.template = template;
        self
    }

    /// Bound the number of concurrent provider calls per batch.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &PoolPolicy {
        &self.policy
    }

    /// Token handed to every provider call.
    ///
    /// Cancelling it is one-way: in-flight calls give up, and any call
    /// started afterwards fails immediately. Meant for shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one tick unless another is already running.
    pub async fn tick(&self) -> ScalerResult<TickOutcome> {
        let Ok(_guard) = self.lock.try_lock() else {
            debug!("previous tick still running, skipping");
            return Ok(TickOutcome::Skipped);
        };
        self.tick_locked().await
    }

    async fn tick_locked(&self) -> ScalerResult<TickOutcome> {
        let pending = match self.queue.pending_count().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "cannot read queue, skipping tick");
                return Ok(TickOutcome::QueueUnavailable);
            }
        };
        let concurrency = self.queue.concurrency();
        if concurrency == 0 {
            warn!("queue reports zero per-agent concurrency, skipping tick");
            return Ok(TickOutcome::QueueUnavailable);
        }

        let instances = self.registry.list()?;
        let decision = decide(pending, concurrency, &instances, &self.policy, self.now());

        let (created, destroyed, failed) = match decision.action.clone() {
            ScaleAction::NoChange => (Vec::new(), Vec::new(), Vec::new()),
            ScaleAction::Create(count) => {
                debug!(count, "scaling up");
                let batch = self.provision(count, concurrency).await?;
                (batch.succeeded, Vec::new(), batch.failed)
            }
            ScaleAction::Destroy(names) => {
                debug!(count = names.len(), "scaling down");
                let batch = self.decommission(&names).await?;
                (Vec::new(), batch.succeeded, batch.failed)
            }
        };

        if decision.deferred > 0 {
            debug!(
                deferred = decision.deferred,
                min_age_secs = self.policy.min_age.as_secs(),
                "instances younger than min age held back from scale-down"
            );
        }
        info!(
            pending = decision.pending,
            concurrency = decision.concurrency,
            current = decision.current_count,
            capacity = decision.current_capacity,
            desired = decision.desired_count,
            created = created.len(),
            destroyed = destroyed.len(),
            failed = failed.len(),
            "tick complete"
        );

        Ok(TickOutcome::Completed(TickReport {
            decision,
            created,
            destroyed,
            failed,
        }))
    }

    /// Settle records a previous run left mid-flight.
    ///
    /// Anything still `Creating` or `Stopping` when the scaler starts was
    /// interrupted; its provider call will never report back. Those records
    /// move to `Error` so they stop counting toward capacity and surface
    /// for operator cleanup. Waits for the tick lock.
    pub async fn reconcile(&self) -> ScalerResult<Vec<InstanceName>> {
        let _guard = self.lock.lock().await;
        let now = self.now();

        let mut settled = Vec::new();
        for mut instance in self.registry.list()? {
            if !matches!(
                instance.state,
                InstanceState::Creating | InstanceState::Stopping
            ) {
                continue;
            }
            let was = instance.state;
            instance.mark_error(format!("interrupted while {was}"), now);
            self.registry.update(&instance)?;
            warn!(name = %instance.name, state = %was, "interrupted instance marked as error");
            settled.push(instance.name);
        }

        if !settled.is_empty() {
            info!(count = settled.len(), "reconciled interrupted instances");
        }
        Ok(settled)
    }

    /// Operator-initiated create of `count` agents, outside the decision.
    ///
    /// Waits for any running tick to finish rather than skipping.
    pub async fn create_instances(&self, count: u32) -> ScalerResult<BatchReport> {
        let _guard = self.lock.lock().await;
        info!(count, "manual create requested");
        self.provision(count, self.queue.concurrency()).await
    }

    /// Operator-initiated destroy of one agent, ignoring the age guard.
    pub async fn destroy_instance(&self, name: &str) -> ScalerResult<BatchReport> {
        let _guard = self.lock.lock().await;
        let instance = self.registry.find(name)?;
        if instance.state != InstanceState::Running {
            return Err(ScalerError::Registry(RegistryError::InvalidTransition {
                name: instance.name,
                from: instance.state,
                to: InstanceState::Stopping,
            }));
        }
        info!(%name, "manual destroy requested");
        self.decommission(&[instance.name]).await
    }

    /// Record and provision `count` new instances.
    async fn provision(&self, count: u32, capacity: u32) -> ScalerResult<BatchReport> {
        let mut records = Vec::with_capacity(count as usize);
        let mut aborted = None;
        for _ in 0..count {
            match self.record_new_instance(capacity) {
                Ok(record) => records.push(record),
                Err(e) => {
                    error!(error = %e, recorded = records.len(), "failed to record new instance");
                    aborted = Some(e);
                    break;
                }
            }
        }

        // Records already written are durable; see their provider calls through.
        let batch = self.fan_out(records, provision_one).await;
        match aborted {
            Some(e) => Err(e),
            None => batch,
        }
    }

    fn record_new_instance(&self, capacity: u32) -> ScalerResult<Instance> {
        for _ in 0..NAME_ATTEMPTS {
            let now = self.now();
            let mut instance = Instance::new(generate_name(), capacity, now);
            instance.provider = self.provider.kind().to_string();
            instance.region = self.template.region.clone();
            instance.size = self.template.size.clone();
            instance.image = self.template.image.clone();
            instance.tags = self.template.tags.clone();
            instance.mark_creating(now);

            match self.registry.create(&instance) {
                Ok(stored) => return Ok(stored),
                Err(RegistryError::DuplicateName(name)) => {
                    warn!(%name, "generated instance name already taken, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ScalerError::NameExhausted(NAME_ATTEMPTS))
    }

    /// Move running instances to `Stopping` and destroy them.
    async fn decommission(&self, names: &[InstanceName]) -> ScalerResult<BatchReport> {
        let now = self.now();
        let mut records = Vec::with_capacity(names.len());
        let mut aborted = None;

        for name in names {
            let marked = self.registry.find(name).and_then(|mut instance| {
                if instance.state != InstanceState::Running {
                    return Ok(None);
                }
                instance.mark_stopping(now);
                self.registry.update(&instance).map(|()| Some(instance))
            });
            match marked {
                Ok(Some(instance)) => records.push(instance),
                Ok(None) => warn!(%name, "instance no longer running, not destroying"),
                Err(e) => {
                    error!(%name, error = %e, "failed to mark instance stopping");
                    aborted = Some(ScalerError::from(e));
                    break;
                }
            }
        }

        let batch = self.fan_out(records, teardown_one).await;
        match aborted {
            Some(e) => Err(e),
            None => batch,
        }
    }

    /// Run `op` for every record concurrently, at most `max_in_flight` at
    /// a time, and wait for all of them.
    async fn fan_out<F, Fut>(&self, records: Vec<Instance>, op: F) -> ScalerResult<BatchReport>
    where
        F: Fn(Arc<dyn Provider>, Arc<dyn Registry>, Clock, CancellationToken, Instance) -> Fut,
        Fut: Future<Output = Settlement> + Send + 'static,
    {
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();
        for record in records {
            let permits = Arc::clone(&permits);
            let call = op(
                Arc::clone(&self.provider),
                Arc::clone(&self.registry),
                Arc::clone(&self.clock),
                self.cancel.clone(),
                record,
            );
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                call.await
            });
        }

        let mut batch = BatchReport::default();
        let mut first_err: Option<ScalerError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(Settled::Done))) => batch.succeeded.push(name),
                Ok((name, Ok(Settled::ProviderFailed(e)))) => {
                    warn!(%name, error = %e, "provider call failed");
                    batch.failed.push((name, e.to_string()));
                }
                Ok((name, Err(e))) => {
                    error!(%name, error = %e, "failed to record provider outcome");
                    first_err.get_or_insert(e.into());
                }
                Err(e) => {
                    error!(error = %e, "provider task did not complete");
                    first_err.get_or_insert(e.into());
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(batch),
        }
    }

    fn now(&self) -> u64 {
        (self.clock)()
    }
}

/// Create one recorded instance and write back the result.
async fn provision_one(
    provider: Arc<dyn Provider>,
    registry: Arc<dyn Registry>,
    clock: Clock,
    cancel: CancellationToken,
    mut instance: Instance,
) -> Settlement {
    let spec = InstanceSpec::from_instance(&instance);
    let settled = match provider.create_instance(&spec, &cancel).await {
        Ok(provisioned) => {
            info!(name = %instance.name, address = %provisioned.address, "instance created");
            instance.mark_running(provisioned.address, provisioned.provider_id, clock());
            Settled::Done
        }
        Err(e) => {
            instance.mark_error(e.to_string(), clock());
            Settled::ProviderFailed(e)
        }
    };
    let written = registry.update(&instance).map(|()| settled);
    (instance.name, written)
}

/// Destroy one stopping instance and write back the result.
async fn teardown_one(
    provider: Arc<dyn Provider>,
    registry: Arc<dyn Registry>,
    clock: Clock,
    cancel: CancellationToken,
    mut instance: Instance,
) -> Settlement {
    let settled = match provider.destroy_instance(&instance, &cancel).await {
        Ok(()) => {
            info!(name = %instance.name, "instance destroyed");
            instance.mark_stopped(clock());
            Settled::Done
        }
        Err(e) if e.is_not_found() => {
            info!(name = %instance.name, "instance already gone at provider");
            instance.mark_stopped(clock());
            Settled::Done
        }
        Err(e) => {
            instance.mark_error(e.to_string(), clock());
            Settled::ProviderFailed(e)
        }
    };
    let written = registry.update(&instance).map(|()| settled);
    (instance.name, written)
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
