//! fleet-core — shared configuration for the fleet autoscaler.
//!
//! The daemon reads a single TOML file into [`FleetConfig`]. Every field
//! has a default, so a missing section falls back to the values the
//! autoscaler has always shipped with (5 minute interval, pool of 2..4
//! agents, 60 minute minimum age).

pub mod config;
pub mod duration;
pub mod error;

pub use config::{
    AgentConfig, DatabaseConfig, FleetConfig, LogsConfig, PoolConfig, PoolPolicy, ProviderConfig,
    QueueConfig, QueueKind, RoundingPolicy, ScalerConfig,
};
pub use duration::parse_duration;
pub use error::{ConfigError, ConfigResult};
