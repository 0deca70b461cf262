//! Metric value playback.
//!
//! The [`PlaybackTable`] is the forward-filled, dense view of the schedule.
//! The [`Engine`] walks it with one cursor per metric, wrapping back to the
//! first step after the last.

use crate::config::{Config, Step};
use crate::error::{ConfigError, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Forward-filled values for every `(metric, step)` pair.
///
/// A cell is `None` only when the metric has not been assigned yet at that
/// step, i.e. it lies before the metric's first assignment in the schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackTable {
    // ---
    step_count: usize,

    /// Keyed by metric name; each series holds exactly `step_count` cells.
    series: HashMap<String, Vec<Option<f64>>>,
}

impl PlaybackTable {
    // ---
    /// Build the table by forward-filling sparse assignments.
    pub fn build(schedule: &[Step]) -> Self {
        // ---
        let step_count = schedule.len();
        let mut latest: HashMap<&str, f64> = HashMap::new();
        let mut series: HashMap<String, Vec<Option<f64>>> = HashMap::new();

        for (step, assignments) in schedule.iter().enumerate() {
            for assignment in &assignments.assignments {
                latest.insert(assignment.name.as_str(), assignment.value);
            }
            for (&name, &value) in &latest {
                let cells = series
                    .entry(name.to_string())
                    .or_insert_with(|| vec![None; step_count]);
                cells[step] = Some(value);
            }
        }

        Self { step_count, series }
    }

    /// Number of steps in the schedule this table was built from.
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Value of `name` at `step`, if the metric has been assigned by then.
    pub fn get(&self, name: &str, step: usize) -> Option<f64> {
        // ---
        self.series.get(name)?.get(step).copied().flatten()
    }

    /// All cells for `name`, in step order.
    pub fn series(&self, name: &str) -> Option<&[Option<f64>]> {
        self.series.get(name).map(Vec::as_slice)
    }

    /// Names of every metric assigned at least once.
    pub fn metric_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.series.keys().map(String::as_str)
    }
}

/// Plays back the schedule, one value per call, independently per metric.
///
/// The table is immutable after construction and read without locking.
/// A single mutex guards the cursor map; its critical section is one
/// read and one modulo increment.
#[derive(Debug)]
pub struct Engine {
    // ---
    table: PlaybackTable,

    /// Index of the step holding each metric's next value, in
    /// `0..step_count`.
    cursors: Mutex<HashMap<String, usize>>,
}

impl Engine {
    // ---
    /// Build an engine over `schedule`, with every cursor at step 0.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptySchedule`] if `schedule` has no steps.
    pub fn new(schedule: &[Step]) -> Result<Self> {
        // ---
        if schedule.is_empty() {
            return Err(ConfigError::EmptySchedule);
        }

        let table = PlaybackTable::build(schedule);
        let cursors = table
            .metric_names()
            .map(|name| (name.to_string(), 0))
            .collect::<HashMap<_, _>>();

        debug!(
            steps = table.step_count(),
            metrics = cursors.len(),
            "built playback engine"
        );

        Ok(Self {
            table,
            cursors: Mutex::new(cursors),
        })
    }

    /// Build an engine over a validated configuration's schedule.
    pub fn from_config(config: &Config) -> Result<Self> {
        // ---
        Self::new(config.schedule())
    }

    /// Returns the next value for `name` and advances its cursor.
    ///
    /// Not idempotent: successive calls for one metric yield its
    /// forward-filled values in step order, wrapping forever. Calls for the
    /// same metric are serialized, so concurrent callers never observe the
    /// same cursor twice within a cycle.
    ///
    /// Never fails. A name the schedule never assigns, or a step before the
    /// metric's first assignment, yields `0.0`; an unknown name does not
    /// gain a cursor.
    pub fn next_value(&self, name: &str) -> f64 {
        // ---
        let Some(step) = self.advance(name) else {
            trace!(name, "next value requested for unassigned metric");
            return 0.0;
        };

        self.table.get(name, step).unwrap_or_else(|| {
            trace!(name, step, "metric not yet assigned at step");
            0.0
        })
    }

    /// Current cursor of `name`, without advancing it.
    pub fn cursor(&self, name: &str) -> Option<usize> {
        // ---
        self.lock_cursors().get(name).copied()
    }

    /// Number of steps each metric cycles through.
    pub fn step_count(&self) -> usize {
        self.table.step_count()
    }

    /// Read the cursor and move it one step forward, wrapping at the end.
    fn advance(&self, name: &str) -> Option<usize> {
        // ---
        let mut cursors = self.lock_cursors();
        let cursor = cursors.get_mut(name)?;
        let current = *cursor;
        *cursor = (current + 1) % self.table.step_count();
        Some(current)
    }

    fn lock_cursors(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        // Cursor updates cannot leave the map half-written, so a poisoned
        // lock still holds consistent state.
        self.cursors.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn step(assignments: &[(&'static str, f64)]) -> Step {
        // ---
        assignments.iter().copied().collect()
    }

    #[test]
    fn forward_fill_carries_last_value() {
        // ---
        let table = PlaybackTable::build(&[
            step(&[("A", 1.0)]),
            step(&[("B", 2.0)]),
            step(&[("A", 3.0)]),
        ]);

        assert_eq!(table.step_count(), 3);
        assert_eq!(table.series("A"), Some(&[Some(1.0), Some(1.0), Some(3.0)][..]));
        assert_eq!(table.series("B"), Some(&[None, Some(2.0), Some(2.0)][..]));
        assert_eq!(table.get("B", 0), None);
        assert_eq!(table.get("A", 3), None);
        assert_eq!(table.series("C"), None);
    }

    #[test]
    fn later_assignment_in_step_wins() {
        // ---
        let table = PlaybackTable::build(&[step(&[("A", 1.0), ("A", 4.0)])]);
        assert_eq!(table.get("A", 0), Some(4.0));
    }

    #[test]
    fn empty_schedule_is_rejected() {
        // ---
        assert!(matches!(Engine::new(&[]), Err(ConfigError::EmptySchedule)));
    }

    #[test]
    fn values_cycle_through_the_schedule() {
        // ---
        let engine = Engine::new(&[step(&[("g", 1.0)]), step(&[("g", 2.0)]), step(&[("g", 3.0)])])
            .expect("engine");

        let played: Vec<f64> = (0..7).map(|_| engine.next_value("g")).collect();
        assert_eq!(played, [1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0]);
        assert_eq!(engine.cursor("g"), Some(1));
    }

    #[test]
    fn cursors_are_independent() {
        // ---
        let engine = Engine::new(&[
            step(&[("A", 1.0), ("B", 10.0)]),
            step(&[("A", 2.0), ("B", 20.0)]),
        ])
        .expect("engine");

        assert_eq!(engine.next_value("A"), 1.0);
        assert_eq!(engine.next_value("A"), 2.0);
        assert_eq!(engine.next_value("A"), 1.0);
        assert_eq!(engine.cursor("B"), Some(0));
        assert_eq!(engine.next_value("B"), 10.0);
        assert_eq!(engine.next_value("B"), 20.0);
    }

    #[test]
    fn unassigned_lookups_yield_zero() {
        // ---
        let engine = Engine::new(&[step(&[("A", 1.0)]), step(&[("B", 2.0)])]).expect("engine");

        assert_eq!(engine.next_value("B"), 0.0);
        assert_eq!(engine.next_value("B"), 2.0);
        assert_eq!(engine.next_value("missing"), 0.0);
        assert_eq!(engine.cursor("missing"), None);
    }

    #[test]
    fn single_step_repeats_forever() {
        // ---
        let engine = Engine::new(&[step(&[("A", 7.5)])]).expect("engine");
        for _ in 0..5 {
            assert_eq!(engine.next_value("A"), 7.5);
        }
        assert_eq!(engine.cursor("A"), Some(0));
    }

    #[test]
    fn poisoned_cursor_lock_keeps_playing() {
        // ---
        let engine = Engine::new(&[step(&[("A", 1.0)]), step(&[("A", 2.0)])]).expect("engine");
        assert_eq!(engine.next_value("A"), 1.0);

        let joined = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _cursors = engine.lock_cursors();
                    panic!("panic while holding the cursor lock");
                })
                .join()
        });
        assert!(joined.is_err());
        assert!(engine.cursors.is_poisoned());

        assert_eq!(engine.next_value("A"), 2.0);
        assert_eq!(engine.next_value("A"), 1.0);
        assert_eq!(engine.cursor("A"), Some(1));
    }
}
