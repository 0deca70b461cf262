//! Playback configuration: strict YAML decoding, defaulting and validation.
//!
//! A [`ConfigDocument`] mirrors the YAML file field for field. Calling
//! [`ConfigDocument::validate`] turns it into a [`Config`], which the engine
//! and the emitter trust without re-checking.
//!
//! ```yaml
//! collectPeriod: 10s
//! aggregationTemporalitySelector: cumulative
//! metrics:
//!   - name: requests
//!     type: sum
//! valueSets:
//!   - valueSet:
//!       - name: requests
//!         value: 3
//! ```

use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Collection period used when the document leaves `collectPeriod` unset.
pub const DEFAULT_COLLECT_PERIOD: Duration = Duration::from_secs(10);

/// Kind of instrument a metric is exported as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Gauge,
    Sum,
    Histogram,
}

impl MetricKind {
    // ---
    /// All kinds, in the order the emitter groups them.
    pub const ALL: [MetricKind; 3] = [MetricKind::Gauge, MetricKind::Sum, MetricKind::Histogram];

    /// Parse the `type` field of a metric entry.
    pub fn from_name(name: &str) -> Option<Self> {
        // ---
        match name {
            "gauge" => Some(MetricKind::Gauge),
            "sum" => Some(MetricKind::Sum),
            "histogram" => Some(MetricKind::Histogram),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        // ---
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Sum => "sum",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether exported sums and histograms report running totals or deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Temporality {
    #[default]
    Cumulative,
    Delta,
}

impl Temporality {
    // ---
    /// Parse the `aggregationTemporalitySelector` field.
    pub fn from_name(name: &str) -> Option<Self> {
        // ---
        match name {
            "cumulative" => Some(Temporality::Cumulative),
            "delta" => Some(Temporality::Delta),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        // ---
        match self {
            Temporality::Cumulative => "cumulative",
            Temporality::Delta => "delta",
        }
    }
}

impl fmt::Display for Temporality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared metric as written in the document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricEntry {
    // ---
    pub name: String,

    /// One of `gauge`, `sum` or `histogram`; checked by validation.
    #[serde(rename = "type")]
    pub kind: String,
}

impl MetricEntry {
    // ---
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        // ---
        Self {
            name: name.into(),
            kind: kind.into(),
        }
    }
}

/// "As of this step, this metric takes this value."
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValueAssignment {
    // ---
    /// Name of the metric being assigned.
    pub name: String,
    pub value: f64,
}

impl ValueAssignment {
    // ---
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        // ---
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One point in the playback schedule.
///
/// Assignments are sparse: a metric left out keeps the value it was last
/// assigned. Later assignments to the same metric within a step win.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    // ---
    #[serde(rename = "valueSet", default)]
    pub assignments: Vec<ValueAssignment>,
}

impl Step {
    // ---
    pub fn new(assignments: Vec<ValueAssignment>) -> Self {
        // ---
        Self { assignments }
    }
}

impl FromIterator<(&'static str, f64)> for Step {
    fn from_iter<I: IntoIterator<Item = (&'static str, f64)>>(iter: I) -> Self {
        // ---
        Self::new(
            iter.into_iter()
                .map(|(name, value)| ValueAssignment::new(name, value))
                .collect(),
        )
    }
}

/// Raw configuration document, decoded strictly from YAML.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ConfigDocument {
    // ---
    /// How often values are played. Unset means [`DEFAULT_COLLECT_PERIOD`];
    /// an explicit zero is rejected.
    #[serde(default, with = "humantime_serde")]
    pub collect_period: Option<Duration>,

    /// `cumulative` or `delta`. Unset, null or empty means `cumulative`.
    #[serde(default)]
    pub aggregation_temporality_selector: Option<String>,

    #[serde(default)]
    pub metrics: Vec<MetricEntry>,

    #[serde(default)]
    pub value_sets: Vec<Step>,
}

impl ConfigDocument {
    // ---
    /// Apply defaults and validate, reporting the first violation found.
    ///
    /// Checks run in this order: collect period, temporality, duplicate
    /// metric names, metric types, undeclared names in value sets, empty
    /// schedule, declared metrics that are never assigned.
    pub fn validate(self) -> Result<Config> {
        // ---
        let collect_period = self.collect_period.unwrap_or(DEFAULT_COLLECT_PERIOD);
        if collect_period.is_zero() {
            return Err(ConfigError::NonPositivePeriod);
        }

        let temporality = match self.aggregation_temporality_selector.as_deref() {
            None | Some("") => Temporality::default(),
            Some(name) => Temporality::from_name(name)
                .ok_or_else(|| ConfigError::InvalidTemporality(name.to_string()))?,
        };

        let mut declared = HashSet::with_capacity(self.metrics.len());
        for entry in &self.metrics {
            if !declared.insert(entry.name.as_str()) {
                return Err(ConfigError::DuplicateMetric(entry.name.clone()));
            }
        }

        let mut metrics = Vec::with_capacity(self.metrics.len());
        for entry in &self.metrics {
            let kind = MetricKind::from_name(&entry.kind).ok_or_else(|| {
                ConfigError::UnknownMetricType {
                    name: entry.name.clone(),
                    kind: entry.kind.clone(),
                }
            })?;
            metrics.push(MetricDescriptor {
                name: entry.name.clone(),
                kind,
            });
        }

        let mut assigned = HashSet::new();
        for assignment in self.value_sets.iter().flat_map(|step| &step.assignments) {
            if !declared.contains(assignment.name.as_str()) {
                return Err(ConfigError::UnknownMetricName(assignment.name.clone()));
            }
            assigned.insert(assignment.name.as_str());
        }

        if self.value_sets.is_empty() {
            return Err(ConfigError::EmptySchedule);
        }

        if let Some(missing) = metrics.iter().find(|m| !assigned.contains(m.name.as_str())) {
            return Err(ConfigError::NeverAssigned(missing.name.clone()));
        }

        debug!(
            metrics = metrics.len(),
            steps = self.value_sets.len(),
            ?collect_period,
            %temporality,
            "validated playback configuration"
        );

        Ok(Config {
            collect_period,
            temporality,
            metrics,
            schedule: self.value_sets,
        })
    }
}

/// A declared metric after validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricDescriptor {
    // ---
    pub name: String,
    pub kind: MetricKind,
}

/// Validated, immutable playback configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    // ---
    collect_period: Duration,
    temporality: Temporality,
    metrics: Vec<MetricDescriptor>,
    schedule: Vec<Step>,
}

impl Config {
    // ---
    /// Decode, default and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        // ---
        serde_yaml::from_str::<ConfigDocument>(yaml)?.validate()
    }

    /// Decode, default and validate a YAML document from a reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        // ---
        serde_yaml::from_reader::<_, ConfigDocument>(reader)?.validate()
    }

    /// Read and validate a YAML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        // ---
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file)
    }

    /// How often the emitter plays one step for every metric.
    pub fn collect_period(&self) -> Duration {
        self.collect_period
    }

    pub fn temporality(&self) -> Temporality {
        self.temporality
    }

    /// Declared metrics, in document order.
    pub fn metrics(&self) -> &[MetricDescriptor] {
        &self.metrics
    }

    /// Declared metrics of one kind, in document order.
    pub fn metrics_of_kind(
        &self,
        kind: MetricKind,
    ) -> impl Iterator<Item = &MetricDescriptor> + '_ {
        self.metrics.iter().filter(move |m| m.kind == kind)
    }

    /// The playback schedule. Never empty.
    pub fn schedule(&self) -> &[Step] {
        &self.schedule
    }
}
