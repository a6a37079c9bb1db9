//! Error types surfaced by the planner.
//!
//! Only unit-level failures leave the crate as errors. A rejected region
//! inside an engine iteration is recovered locally (see
//! [`crate::layout::RejectReason`]) and a trimmed pattern copy is a normal
//! outcome reported through the observer.

use thiserror::Error;

/// Top-level error type for plan generation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanError {
    /// Caller input that cannot be planned at all.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The requested apartment area cannot fit the occupancy threshold.
    #[error(
        "{unit}: requested area {requested_area:.1} exceeds capacity {capacity:.1}; \
         reduce by at least {reduction:.1}"
    )]
    InfeasibleQuota {
        unit: String,
        requested_area: f64,
        capacity: f64,
        reduction: f64,
    },

    /// The engine used its whole budget without producing a plan.
    #[error("{unit}: no valid layout after {iterations} iterations")]
    AllocationExhausted { unit: String, iterations: u32 },
}

impl PlanError {
    /// Minimum area reduction carried by an infeasibility diagnostic.
    pub fn reduction(&self) -> Option<f64> {
        match self {
            PlanError::InfeasibleQuota { reduction, .. } => Some(*reduction),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PlanError>;
