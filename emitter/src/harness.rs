//! Periodic playback into the exported instruments.
//!
//! Metrics are grouped by kind and each group runs on its own timer. Every
//! tick plays exactly one value per metric in the group. All groups share
//! one [`Engine`].

use crate::instruments::Instrument;
use anyhow::{anyhow, Context, Result};
use metric_playback_common::MetricsContext;
use playback::{Config, Engine, MetricKind, Temporality};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Metrics of one kind and their instruments, played on a shared timer.
pub struct MetricGroup {
    // ---
    kind: MetricKind,
    members: Vec<(String, Instrument)>,

    /// Completed ticks.
    ticks: AtomicU64,
}

impl MetricGroup {
    // ---
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Declared names of the metrics in this group, in document order.
    pub fn metric_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.members.iter().map(|(name, _)| name.as_str())
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Play one value for every metric in the group.
    pub fn play(&self, engine: &Engine) {
        // ---
        for (name, instrument) in &self.members {
            let value = engine.next_value(name);
            instrument.record(name, value);
            debug!(kind = %self.kind, name, value, "played value");
        }
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }
}

/// Ticks completed per group when playback stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackSummary {
    // ---
    pub ticks: Vec<(MetricKind, u64)>,
}

impl PlaybackSummary {
    // ---
    /// Ticks completed by the group of `kind`, if that group exists.
    pub fn ticks_for(&self, kind: MetricKind) -> Option<u64> {
        // ---
        self.ticks.iter().find(|(k, _)| *k == kind).map(|(_, n)| *n)
    }
}

/// Drives an [`Engine`] into registered instruments on the collect period.
pub struct Emitter {
    // ---
    engine: Arc<Engine>,
    groups: Vec<Arc<MetricGroup>>,
    collect_period: Duration,
    temporality: Temporality,
}

impl Emitter {
    // ---
    /// Build the engine and register one instrument per declared metric.
    ///
    /// Kinds with no declared metrics get no group.
    pub fn new(config: &Config, metrics: &MetricsContext) -> Result<Self> {
        // ---
        let engine = Engine::from_config(config).context("failed to build playback engine")?;

        let mut groups = Vec::new();
        for kind in MetricKind::ALL {
            let members = config
                .metrics_of_kind(kind)
                .map(|metric| {
                    Instrument::register(metrics, metric, config.temporality())
                        .map(|instrument| (metric.name.clone(), instrument))
                })
                .collect::<Result<Vec<_>>>()?;

            if !members.is_empty() {
                groups.push(Arc::new(MetricGroup {
                    kind,
                    members,
                    ticks: AtomicU64::new(0),
                }));
            }
        }

        Ok(Self {
            engine: Arc::new(engine),
            groups,
            collect_period: config.collect_period(),
            temporality: config.temporality(),
        })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn groups(&self) -> &[Arc<MetricGroup>] {
        &self.groups
    }

    /// Run every group on its own timer until each has completed
    /// `max_ticks` ticks, or until `shutdown` resolves.
    ///
    /// With `max_ticks = None` only `shutdown` stops playback, even when no
    /// metrics are declared.
    pub async fn run<F>(&self, max_ticks: Option<u64>, shutdown: F) -> Result<PlaybackSummary>
    where
        F: Future<Output = ()>,
    {
        // ---
        info!(
            groups = self.groups.len(),
            steps = self.engine.step_count(),
            period = ?self.collect_period,
            temporality = %self.temporality,
            "Starting playback"
        );

        if self.groups.is_empty() && max_ticks.is_none() {
            info!("No metrics declared, idling until shutdown");
            shutdown.await;
            return Ok(PlaybackSummary::default());
        }

        let mut tasks = JoinSet::new();
        for group in &self.groups {
            tasks.spawn(drive_group(
                Arc::clone(&self.engine),
                Arc::clone(group),
                self.collect_period,
                max_ticks,
            ));
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok(kind)) => debug!(%kind, "group finished"),
                    Some(Err(e)) => return Err(anyhow!("playback task failed: {e}")),
                    None => break,
                },
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping playback");
                    tasks.shutdown().await;
                    break;
                }
            }
        }

        let summary = PlaybackSummary {
            ticks: self.groups.iter().map(|g| (g.kind(), g.ticks())).collect(),
        };
        for (kind, ticks) in &summary.ticks {
            info!("Played {ticks} ticks of {kind} metrics");
        }
        Ok(summary)
    }

    /// Like [`Emitter::run`], but fails as soon as the scrape endpoint
    /// `server` stops, e.g. because its address could not be bound.
    pub async fn run_serving<F>(
        &self,
        max_ticks: Option<u64>,
        shutdown: F,
        server: &mut JoinHandle<Result<()>>,
    ) -> Result<PlaybackSummary>
    where
        F: Future<Output = ()>,
    {
        // ---
        tokio::select! {
            summary = self.run(max_ticks, shutdown) => summary,
            served = server => match served {
                Ok(Ok(())) => Err(anyhow!("metrics server stopped unexpectedly")),
                Ok(Err(e)) => Err(e.context("metrics server failed")),
                Err(e) => Err(anyhow!("metrics server task failed: {e}")),
            },
        }
    }
}

async fn drive_group(
    engine: Arc<Engine>,
    group: Arc<MetricGroup>,
    period: Duration,
    max_ticks: Option<u64>,
) -> MetricKind {
    // ---
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while max_ticks.map_or(true, |max| group.ticks() < max) {
        interval.tick().await;
        group.play(&engine);
    }
    group.kind()
}
