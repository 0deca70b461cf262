//! Metric value playback.
//!
//! Loads a declarative description of metrics and a schedule of value
//! snapshots, then answers "what is the next value of this metric" forever,
//! cycling through the schedule independently for each metric.
//!
//! ```
//! use playback::{Config, Engine};
//!
//! let config = Config::from_yaml_str(
//!     r#"
//! metrics:
//!   - name: g
//!     type: gauge
//! valueSets:
//!   - valueSet: [{ name: g, value: 1 }]
//!   - valueSet: [{ name: g, value: 2 }]
//! "#,
//! )
//! .unwrap();
//!
//! let engine = Engine::from_config(&config).unwrap();
//! assert_eq!(engine.next_value("g"), 1.0);
//! assert_eq!(engine.next_value("g"), 2.0);
//! assert_eq!(engine.next_value("g"), 1.0);
//! ```

pub mod config;
pub mod engine;
pub mod error;

pub use config::{
    Config, ConfigDocument, MetricDescriptor, MetricEntry, MetricKind, Step, Temporality,
    ValueAssignment, DEFAULT_COLLECT_PERIOD,
};
pub use engine::{Engine, PlaybackTable};
pub use error::ConfigError;
