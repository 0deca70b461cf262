//! Metric emitter - CLI binary.
//!
//! Loads a playback configuration, replays its value sets into Prometheus
//! instruments every collect period, and serves them on `GET /metrics`.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use emitter::{load_config, Emitter};
use metric_playback_common::{
    init_tracing, ColorWhen, MetricsContext, MetricsServerConfig, ResourceLabels,
};

/// Application label attached to every series.
const APPLICATION: &str = "otel-playback-app";

/// Metric Emitter - Replay a metric schedule for collectors to scrape
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    // ---
    /// Playback configuration file (YAML)
    #[arg(short, long)]
    config: PathBuf,

    /// Prometheus metrics bind address (serves `GET /metrics`).
    #[arg(long, default_value = "127.0.0.1:9464")]
    metrics_bind: String,

    /// Service name attached to every series
    #[arg(long, default_value = "otel-playback-service")]
    service_name: String,

    /// Stop after this many ticks per metric group
    ///
    /// Without it the emitter replays the schedule until interrupted.
    #[arg(long)]
    ticks: Option<u64>,

    /// Coloring
    #[arg(long, value_enum, default_value = "auto")]
    color: ColorWhen,
}

/// Capture version number from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    let args = Args::parse();

    init_tracing(args.color)?;

    info!("Starting metric emitter v{VERSION}");
    info!("Config file: {}", args.config.display());
    info!("Service name: {}", args.service_name);
    info!("Metrics bind: {}", args.metrics_bind);

    let config = load_config(&args.config)?;

    let metrics = MetricsContext::new(ResourceLabels::new(&args.service_name, APPLICATION))?;
    let metrics_bind = args.metrics_bind.parse().context("invalid metrics bind")?;
    let mut metrics_task = metrics.spawn_metrics_server(MetricsServerConfig::new(metrics_bind));

    let emitter = Emitter::new(&config, &metrics).context("failed to set up instruments")?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };
    let summary = emitter
        .run_serving(args.ticks, shutdown, &mut metrics_task)
        .await?;

    metrics_task.abort();
    info!(
        "Playback complete: {} ticks across {} groups",
        summary.ticks.iter().map(|(_, n)| n).sum::<u64>(),
        summary.ticks.len()
    );

    Ok(())
}
