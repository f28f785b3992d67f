//! fleetd — the fleet autoscaler daemon.
//!
//! Runs the scaling loop against the configured provider and queue, and
//! hosts a few operator commands against the instance registry.
//!
//! # Usage
//!
//! ```text
//! fleetd run --config /etc/fleet/fleet.toml
//! fleetd check --config /etc/fleet/fleet.toml
//! fleetd list --database /var/lib/fleet/fleet.redb
//! fleetd purge --database /var/lib/fleet/fleet.redb agent-3f2a9c01b7de
//! ```

mod admin;
mod daemon;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fleet_core::LogsConfig;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,fleetd=debug,fleet=debug";

#[derive(Parser)]
#[command(name = "fleetd", about = "Elastic CI agent autoscaler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the autoscaler until interrupted.
    Run {
        /// Path to fleet.toml.
        #[arg(long, default_value = "fleet.toml")]
        config: PathBuf,

        /// Registry database, overriding `database.path`.
        #[arg(long)]
        database: Option<PathBuf>,
    },
    /// Validate a config file and print it with defaults filled in.
    Check {
        #[arg(long, default_value = "fleet.toml")]
        config: PathBuf,
    },
    /// Print every instance record as JSON.
    List {
        #[arg(long, default_value = "fleet.redb")]
        database: PathBuf,
    },
    /// Delete a stopped or errored instance record.
    Purge {
        #[arg(long, default_value = "fleet.redb")]
        database: PathBuf,

        /// Instance name.
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, database } => daemon::run(&config, database).await,
        Command::Check { config } => admin::check(&config),
        Command::List { database } => {
            init_tracing(&LogsConfig::default())?;
            admin::list(&database)
        }
        Command::Purge { database, name } => {
            init_tracing(&LogsConfig::default())?;
            admin::purge(&database, &name)
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the config.
pub(crate) fn init_tracing(logs: &LogsConfig) -> anyhow::Result<()> {
    let default = if logs.debug { "debug" } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logs.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
