//! Shared utilities for the metric playback binaries.
//!
//! Centralizes CLI color policy, tracing setup and the Prometheus
//! exposition layer so every binary behaves the same.

pub mod cli;
pub mod observability;

pub use cli::ColorWhen;
pub use observability::{init_tracing, MetricsContext, MetricsServerConfig, ResourceLabels};
