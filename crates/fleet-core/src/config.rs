//! fleet.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;
use crate::error::{ConfigError, ConfigResult};

/// Provider kinds this build knows how to construct.
pub const KNOWN_PROVIDERS: &[&str] = &["mock"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FleetConfig {
    /// Time between scaling ticks (e.g. "5m").
    pub interval: String,
    pub pool: PoolConfig,
    pub agent: AgentConfig,
    pub provider: ProviderConfig,
    pub queue: QueueConfig,
    pub scaler: ScalerConfig,
    pub database: DatabaseConfig,
    pub logs: LogsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    pub min: u32,
    pub max: u32,
    /// Minimum uptime before an agent may be destroyed (e.g. "60m").
    pub min_age: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Jobs one agent runs at once.
    pub concurrency: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: String,
    pub region: String,
    pub size: String,
    pub image: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// Fixed pending count taken from `queue.pending`.
    Static,
    /// Drone-compatible HTTP queue endpoint.
    Drone,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub kind: QueueKind,
    /// Base address of the coordinator, e.g. "http://drone.internal:8080".
    pub address: Option<String>,
    pub token: Option<String>,
    /// Pending count reported by the static queue.
    pub pending: u32,
    /// Per-request timeout for the HTTP queue (e.g. "10s").
    pub timeout: String,
}

/// How `pending / concurrency` is rounded into a desired agent count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoundingPolicy {
    /// Provision enough agents for every pending job.
    #[default]
    Ceil,
    /// Only count fully occupied agents.
    Floor,
}

impl RoundingPolicy {
    /// Divide `pending` jobs over agents of `concurrency` slots each.
    ///
    /// `concurrency` must be non-zero.
    pub fn agents_for(self, pending: u32, concurrency: u32) -> u32 {
        match self {
            RoundingPolicy::Ceil => pending.div_ceil(concurrency),
            RoundingPolicy::Floor => pending / concurrency,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScalerConfig {
    pub rounding: RoundingPolicy,
    /// Upper bound on concurrent provider calls within one tick.
    pub max_in_flight: usize,
    /// How long shutdown waits for in-flight provider calls (e.g. "30s").
    pub shutdown_grace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LogsConfig {
    pub debug: bool,
    pub json: bool,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            interval: "5m".to_string(),
            pool: PoolConfig::default(),
            agent: AgentConfig::default(),
            provider: ProviderConfig::default(),
            queue: QueueConfig::default(),
            scaler: ScalerConfig::default(),
            database: DatabaseConfig::default(),
            logs: LogsConfig::default(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min: 2,
            max: 4,
            min_age: "60m".to_string(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { concurrency: 2 }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: "mock".to_string(),
            region: "local".to_string(),
            size: "small".to_string(),
            image: "agent".to_string(),
            tags: Vec::new(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            kind: QueueKind::Static,
            address: None,
            token: None,
            pending: 0,
            timeout: "10s".to_string(),
        }
    }
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            rounding: RoundingPolicy::Ceil,
            max_in_flight: 10,
            shutdown_grace: "30s".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("fleet.redb"),
        }
    }
}

/// The resolved pool bounds and age guard the scaler decides against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolPolicy {
    pub min: u32,
    pub max: u32,
    pub min_age: Duration,
    pub rounding: RoundingPolicy,
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Check every field the daemon depends on.
    pub fn validate(&self) -> ConfigResult<()> {
        let interval = self.interval()?;
        if interval.is_zero() {
            return Err(ConfigError::Invalid("interval must be non-zero".into()));
        }
        self.pool_policy()?;
        self.shutdown_grace()?;
        self.queue_timeout()?;

        if self.agent.concurrency == 0 {
            return Err(ConfigError::Invalid("agent.concurrency must be at least 1".into()));
        }
        if self.scaler.max_in_flight == 0 {
            return Err(ConfigError::Invalid("scaler.max_in_flight must be at least 1".into()));
        }
        if !KNOWN_PROVIDERS.contains(&self.provider.kind.as_str()) {
            return Err(ConfigError::UnknownProvider(self.provider.kind.clone()));
        }
        if self.queue.kind == QueueKind::Drone
            && self.queue.address.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigError::MissingQueueAddress);
        }
        Ok(())
    }

    pub fn interval(&self) -> ConfigResult<Duration> {
        duration_field("interval", &self.interval)
    }

    pub fn shutdown_grace(&self) -> ConfigResult<Duration> {
        duration_field("scaler.shutdown_grace", &self.scaler.shutdown_grace)
    }

    pub fn queue_timeout(&self) -> ConfigResult<Duration> {
        duration_field("queue.timeout", &self.queue.timeout)
    }

    pub fn pool_policy(&self) -> ConfigResult<PoolPolicy> {
        let PoolConfig { min, max, .. } = self.pool;
        if min > max {
            return Err(ConfigError::InvalidBounds { min, max });
        }
        if max == 0 {
            return Err(ConfigError::Invalid("pool.max must be at least 1".into()));
        }
        Ok(PoolPolicy {
            min,
            max,
            min_age: duration_field("pool.min_age", &self.pool.min_age)?,
            rounding: self.scaler.rounding,
        })
    }
}

fn duration_field(field: &'static str, value: &str) -> ConfigResult<Duration> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = FleetConfig::from_toml("").unwrap();
        assert_eq!(config, FleetConfig::default());
        config.validate().unwrap();

        let policy = config.pool_policy().unwrap();
        assert_eq!(policy.min, 2);
        assert_eq!(policy.max, 4);
        assert_eq!(policy.min_age, Duration::from_secs(3600));
        assert_eq!(config.interval().unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn parse_full_file() {
        let toml_str = r#"
interval = "30s"

[pool]
min = 1
max = 8
min_age = "10m"

[agent]
concurrency = 4

[provider]
kind = "mock"
region = "nyc3"
size = "s-1vcpu-1gb"
image = "docker-18-04"
tags = ["ci", "agent"]

[queue]
kind = "drone"
address = "http://drone.internal:8080"
token = "secret"

[scaler]
rounding = "floor"
max_in_flight = 3
shutdown_grace = "5s"

[database]
path = "/var/lib/fleet/fleet.redb"

[logs]
debug = true
json = true
"#;
        let config = FleetConfig::from_toml(toml_str).unwrap();
        config.validate().unwrap();

        assert_eq!(config.agent.concurrency, 4);
        assert_eq!(config.provider.tags, vec!["ci", "agent"]);
        assert_eq!(config.queue.kind, QueueKind::Drone);
        assert_eq!(config.scaler.rounding, RoundingPolicy::Floor);
        assert_eq!(config.shutdown_grace().unwrap(), Duration::from_secs(5));
        assert!(config.logs.json);
    }

    #[test]
    fn roundtrips_through_toml() {
        let config = FleetConfig::default();
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("min_age"));
        assert_eq!(FleetConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn rejects_inverted_bounds() {
        let mut config = FleetConfig::default();
        config.pool.min = 5;
        config.pool.max = 2;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBounds { min: 5, max: 2 })
        ));
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut config = FleetConfig::default();
        config.agent.concurrency = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_bad_duration() {
        let mut config = FleetConfig::default();
        config.pool.min_age = "an hour".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDuration { field: "pool.min_age", .. })
        ));

        config.pool.min_age = "307445734561825861m".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDuration { field: "pool.min_age", .. })
        ));
    }

    #[test]
    fn rejects_unknown_provider() {
        let mut config = FleetConfig::default();
        config.provider.kind = "digitalocean".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::UnknownProvider(_))));
    }

    #[test]
    fn drone_queue_requires_address() {
        let config = FleetConfig::from_toml("[queue]\nkind = \"drone\"\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::MissingQueueAddress)));
    }

    #[test]
    fn unknown_queue_kind_fails_to_parse() {
        let err = FleetConfig::from_toml("[queue]\nkind = \"sqs\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rounding_policies() {
        assert_eq!(RoundingPolicy::Ceil.agents_for(10, 2), 5);
        assert_eq!(RoundingPolicy::Ceil.agents_for(3, 2), 2);
        assert_eq!(RoundingPolicy::Floor.agents_for(3, 2), 1);
        assert_eq!(RoundingPolicy::Ceil.agents_for(0, 2), 0);
    }

    #[test]
    fn from_file_reports_missing_path() {
        let err = FleetConfig::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn shipped_example_is_valid() {
        let config = FleetConfig::from_toml(include_str!("../../../fleet.example.toml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.queue.kind, QueueKind::Drone);
        assert_eq!(config.provider.tags, vec!["ci", "autoscaled"]);
    }
}
