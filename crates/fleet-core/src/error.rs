//! Configuration errors.

use std::path::PathBuf;

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating the fleet configuration.
///
/// All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for `{field}`: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("invalid pool bounds: min {min} > max {max}")]
    InvalidBounds { min: u32, max: u32 },

    #[error("unknown provider kind: {0:?}")]
    UnknownProvider(String),

    #[error("queue kind `drone` requires `queue.address`")]
    MissingQueueAddress,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
