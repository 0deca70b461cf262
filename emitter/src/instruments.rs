//! Exported instruments, one per declared metric.
//!
//! Naming and instrument choice follow the aggregation temporality:
//! gauges keep their declared name, sums and histograms get a `cum_` or
//! `delta_` prefix.

use anyhow::Result;
use metric_playback_common::MetricsContext;
use playback::{MetricDescriptor, MetricKind, Temporality};
use prometheus::{Counter, Gauge, Histogram};
use tracing::warn;

/// Explicit bucket upper bounds shared by every histogram.
pub const HISTOGRAM_BUCKETS: [f64; 4] = [1.0, 2.0, 5.0, 10.0];

/// Name prefix for sums and histograms under `temporality`.
pub fn temporality_prefix(temporality: Temporality) -> &'static str {
    // ---
    match temporality {
        Temporality::Cumulative => "cum_",
        Temporality::Delta => "delta_",
    }
}

/// Name a metric is exported under.
pub fn export_name(metric: &MetricDescriptor, temporality: Temporality) -> String {
    // ---
    match metric.kind {
        MetricKind::Gauge => metric.name.clone(),
        MetricKind::Sum | MetricKind::Histogram => {
            format!("{}{}", temporality_prefix(temporality), metric.name)
        }
    }
}

/// A registered instrument that records played values.
#[derive(Clone)]
pub enum Instrument {
    /// Last played value.
    Gauge(Gauge),

    /// Running total of played values.
    CumulativeSum(Counter),

    /// Played value as the amount added during the last interval.
    DeltaSum(Gauge),

    /// Distribution of played values.
    Histogram(Histogram),
}

impl Instrument {
    // ---
    /// Register the instrument for `metric` in `ctx`.
    ///
    /// # Errors
    ///
    /// Fails if the exported name is not a valid Prometheus metric name or
    /// is already registered.
    pub fn register(
        ctx: &MetricsContext,
        metric: &MetricDescriptor,
        temporality: Temporality,
    ) -> Result<Self> {
        // ---
        let name = export_name(metric, temporality);
        let help = format!("{} {} played back from the schedule", temporality, metric.kind);

        let instrument = match (metric.kind, temporality) {
            (MetricKind::Gauge, _) => Instrument::Gauge(ctx.register_gauge(&name, &help)?),
            (MetricKind::Sum, Temporality::Cumulative) => {
                Instrument::CumulativeSum(ctx.register_counter(&name, &help)?)
            }
            (MetricKind::Sum, Temporality::Delta) => {
                Instrument::DeltaSum(ctx.register_gauge(&name, &help)?)
            }
            (MetricKind::Histogram, _) => {
                Instrument::Histogram(ctx.register_histogram(&name, &help, &HISTOGRAM_BUCKETS)?)
            }
        };
        Ok(instrument)
    }

    /// Record one played value.
    ///
    /// Counters only move forward, so a negative value for a cumulative sum
    /// is dropped with a warning.
    pub fn record(&self, name: &str, value: f64) {
        // ---
        match self {
            Instrument::Gauge(gauge) | Instrument::DeltaSum(gauge) => gauge.set(value),
            Instrument::CumulativeSum(counter) => {
                if value >= 0.0 {
                    counter.inc_by(value);
                } else {
                    warn!(name, value, "skipping negative value for cumulative sum");
                }
            }
            Instrument::Histogram(histogram) => histogram.observe(value),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use metric_playback_common::ResourceLabels;

    fn descriptor(name: &str, kind: MetricKind) -> MetricDescriptor {
        // ---
        MetricDescriptor {
            name: name.to_string(),
            kind,
        }
    }

    #[test]
    fn names_follow_temporality() {
        // ---
        let gauge = descriptor("depth", MetricKind::Gauge);
        let sum = descriptor("requests", MetricKind::Sum);
        let histogram = descriptor("latency", MetricKind::Histogram);

        assert_eq!(export_name(&gauge, Temporality::Delta), "depth");
        assert_eq!(export_name(&sum, Temporality::Cumulative), "cum_requests");
        assert_eq!(export_name(&sum, Temporality::Delta), "delta_requests");
        assert_eq!(export_name(&histogram, Temporality::Delta), "delta_latency");
    }

    #[test]
    fn cumulative_sum_accumulates_and_skips_negatives() {
        // ---
        let ctx = MetricsContext::new(ResourceLabels::default()).expect("registry");
        let sum = descriptor("requests", MetricKind::Sum);
        let instrument =
            Instrument::register(&ctx, &sum, Temporality::Cumulative).expect("register");

        instrument.record("requests", 2.0);
        instrument.record("requests", -5.0);
        instrument.record("requests", 3.5);

        match instrument {
            Instrument::CumulativeSum(counter) => assert_eq!(counter.get(), 5.5),
            _ => panic!("expected a counter"),
        }
    }

    #[test]
    fn delta_sum_reports_last_value() {
        // ---
        let ctx = MetricsContext::new(ResourceLabels::default()).expect("registry");
        let sum = descriptor("requests", MetricKind::Sum);
        let instrument = Instrument::register(&ctx, &sum, Temporality::Delta).expect("register");

        instrument.record("requests", 2.0);
        instrument.record("requests", -1.0);

        match instrument {
            Instrument::DeltaSum(gauge) => assert_eq!(gauge.get(), -1.0),
            _ => panic!("expected a gauge"),
        }
    }

    #[test]
    fn histogram_counts_observations() {
        // ---
        let ctx = MetricsContext::new(ResourceLabels::default()).expect("registry");
        let histogram = descriptor("latency", MetricKind::Histogram);
        let instrument =
            Instrument::register(&ctx, &histogram, Temporality::Cumulative).expect("register");

        instrument.record("latency", 0.5);
        instrument.record("latency", 7.0);

        match instrument {
            Instrument::Histogram(h) => {
                assert_eq!(h.get_sample_count(), 2);
                assert_eq!(h.get_sample_sum(), 7.5);
            }
            _ => panic!("expected a histogram"),
        }
    }

    #[test]
    fn invalid_export_name_fails_registration() {
        // ---
        let ctx = MetricsContext::new(ResourceLabels::default()).expect("registry");
        let bad = descriptor("has space", MetricKind::Gauge);
        assert!(Instrument::register(&ctx, &bad, Temporality::Cumulative).is_err());
    }
}
