//! Telemetry hooks for plan generation.
//!
//! The planner reports progress through a [`PlanObserver`] instead of
//! writing anywhere itself. Every method defaults to a no-op, so an observer
//! only implements what it cares about. Observers are shared across rayon
//! workers and must be `Send + Sync`.

use crate::layout::EngineState;
use crate::policy::Reward;

/// Summary of one engine iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationEvent<'a> {
    /// Hierarchy path of the unit being planned, e.g. `b0/f1/s2`.
    pub unit: &'a str,
    pub iteration: u32,
    pub placed: usize,
    pub requested: usize,
    /// Sum of region rectangularities, `None` if the plan was discarded.
    pub score: Option<f64>,
    pub relaxed: bool,
}

pub trait PlanObserver: Send + Sync {
    fn iteration_finished(&self, _event: &IterationEvent<'_>) {}

    fn reward_recorded(&self, _unit: &str, _category: &str, _reward: Reward) {}

    fn unit_finished(&self, _unit: &str, _state: EngineState) {}

    /// A floor was copied from a larger pattern and lost `removed` units.
    fn pattern_copied(&self, _floor: &str, _removed: u32) {}
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PlanObserver for NoopObserver {}

/// Forwards events to the `log` facade at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl PlanObserver for LogObserver {
    fn iteration_finished(&self, event: &IterationEvent<'_>) {
        log::debug!(
            "{} iteration {}: {}/{} placed, score {:?}{}",
            event.unit,
            event.iteration,
            event.placed,
            event.requested,
            event.score,
            if event.relaxed { " (relaxed)" } else { "" }
        );
    }

    fn reward_recorded(&self, unit: &str, category: &str, reward: Reward) {
        log::trace!("{unit}: {category} -> {reward:?}");
    }

    fn unit_finished(&self, unit: &str, state: EngineState) {
        log::debug!("{unit} finished {state:?}");
    }

    fn pattern_copied(&self, floor: &str, removed: u32) {
        log::debug!("{floor} copied from pattern, {removed} surplus removed");
    }
}
