//! `fleetd run` — wire the subsystems together and drive the scaler.
//!
//! 1. Load and validate the config (fatal on error)
//! 2. Open the registry (fatal on error)
//! 3. Build the provider and queue source
//! 4. Reconcile records interrupted by a previous run
//! 5. Tick until SIGINT or SIGTERM, then give in-flight calls the grace period

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};

use fleet_core::{ConfigError, FleetConfig, QueueKind};
use fleet_provider::{MockProvider, Provider};
use fleet_queue::{DroneQueue, QueueSource, StaticQueue};
use fleet_registry::RedbRegistry;
use fleet_scaler::{Driver, InstanceTemplate, Scaler};

pub async fn run(config_path: &Path, database: Option<PathBuf>) -> anyhow::Result<()> {
    let mut config = FleetConfig::from_file(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(path) = database {
        config.database.path = path;
    }
    crate::init_tracing(&config.logs)?;
    config.validate().context("invalid configuration")?;

    info!(config = %config_path.display(), "fleet daemon starting");

    let interval = config.interval()?;
    let grace = config.shutdown_grace()?;
    let policy = config.pool_policy()?;

    // ── Registry ───────────────────────────────────────────────
    if let Some(dir) = config.database.path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let registry = RedbRegistry::open(&config.database.path)
        .with_context(|| format!("opening registry {}", config.database.path.display()))?;
    info!(path = ?config.database.path, "registry opened");

    // ── Provider + queue ───────────────────────────────────────
    let provider = build_provider(&config)?;
    let queue = build_queue(&config)?;
    info!(
        provider = provider.kind(),
        queue = ?config.queue.kind,
        concurrency = queue.concurrency(),
        "collaborators initialized"
    );

    // ── Scaler ─────────────────────────────────────────────────
    let template = InstanceTemplate {
        region: config.provider.region.clone(),
        size: config.provider.size.clone(),
        image: config.provider.image.clone(),
        tags: config.provider.tags.clone(),
    };
    let scaler = Scaler::new(Arc::new(registry), provider, queue, policy)
        .with_template(template)
        .with_max_in_flight(config.scaler.max_in_flight);
    let scaler = Arc::new(scaler);

    let interrupted = scaler.reconcile().await.context("reconciling registry")?;
    if !interrupted.is_empty() {
        warn!(count = interrupted.len(), "records from an interrupted run marked as error");
    }

    info!(
        min = policy.min,
        max = policy.max,
        min_age_secs = policy.min_age.as_secs(),
        rounding = ?policy.rounding,
        "scaler initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let driver = Driver::new(scaler, interval).with_grace(grace).spawn(shutdown_rx);

    let signal = shutdown_signal().await?;
    info!(%signal, "shutdown signal received");
    let _ = shutdown_tx.send(true);

    driver.await?;
    info!("fleet daemon stopped");
    Ok(())
}

/// Wait for Ctrl-C or, on unix, SIGTERM from a service manager.
async fn shutdown_signal() -> anyhow::Result<&'static str> {
    #[cfg(unix)]
    let terminate = async {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        sigterm.recv().await;
        Ok::<(), std::io::Error>(())
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<std::io::Result<()>>();

    first_signal(tokio::signal::ctrl_c(), terminate).await
}

/// Resolve with the name of whichever signal arrives first.
async fn first_signal(
    interrupt: impl Future<Output = std::io::Result<()>>,
    terminate: impl Future<Output = std::io::Result<()>>,
) -> anyhow::Result<&'static str> {
    tokio::select! {
        res = interrupt => {
            res.context("installing SIGINT handler")?;
            Ok("SIGINT")
        }
        res = terminate => {
            res.context("installing SIGTERM handler")?;
            Ok("SIGTERM")
        }
    }
}

fn build_provider(config: &FleetConfig) -> anyhow::Result<Arc<dyn Provider>> {
    match config.provider.kind.as_str() {
        "mock" => Ok(Arc::new(MockProvider::new())),
        other => Err(ConfigError::UnknownProvider(other.to_string()).into()),
    }
}

fn build_queue(config: &FleetConfig) -> anyhow::Result<Arc<dyn QueueSource>> {
    let concurrency = config.agent.concurrency;
    match config.queue.kind {
        QueueKind::Static => Ok(Arc::new(StaticQueue::new(config.queue.pending, concurrency))),
        QueueKind::Drone => {
            let address = config
                .queue
                .address
                .as_deref()
                .ok_or(ConfigError::MissingQueueAddress)?;
            let queue = DroneQueue::new(
                address,
                config.queue.token.clone(),
                concurrency,
                config.queue_timeout()?,
            )?;
            Ok(Arc::new(queue))
        }
    }
}
