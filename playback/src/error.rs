//! Configuration error taxonomy.

use std::path::PathBuf;
use thiserror::Error;

/// A malformed or semantically invalid playback configuration.
///
/// Always raised at load or engine construction time, never while values
/// are being played back.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("collectPeriod must be a positive duration")]
    NonPositivePeriod,

    #[error("aggregationTemporalitySelector can be either delta or cumulative, got '{0}'")]
    InvalidTemporality(String),

    #[error("duplicate metric: {0}")]
    DuplicateMetric(String),

    #[error("unknown metric type '{kind}' for metric {name}")]
    UnknownMetricType { name: String, kind: String },

    #[error("unknown metric name '{0}' in valueSets section")]
    UnknownMetricName(String),

    #[error("metric {0} is never assigned a value in valueSets")]
    NeverAssigned(String),

    #[error("valueSets must contain at least one value set")]
    EmptySchedule,

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("failed to read configuration {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result alias for configuration loading.
pub type Result<T> = std::result::Result<T, ConfigError>;
