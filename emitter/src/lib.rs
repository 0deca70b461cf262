//! Metric Emitter Library
//!
//! Plays a metric schedule into Prometheus instruments on a fixed collect
//! period. The binary wraps this with a CLI and a `/metrics` endpoint; the
//! library is also used directly by the integration tests.

pub mod harness;
pub mod instruments;

pub use harness::{Emitter, MetricGroup, PlaybackSummary};
pub use instruments::{export_name, temporality_prefix, Instrument, HISTOGRAM_BUCKETS};
pub use playback::{Config, Engine};

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Load and validate the playback configuration at `path`.
///
/// # Errors
///
/// Returns error if the file cannot be read or fails validation.
pub fn load_config(path: &Path) -> Result<Config> {
    // ---
    let config = Config::from_file(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;

    info!(
        "Loaded {} metrics and {} value sets from {}",
        config.metrics().len(),
        config.schedule().len(),
        path.display()
    );
    Ok(config)
}
