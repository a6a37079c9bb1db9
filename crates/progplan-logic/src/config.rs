//! Planner configuration and validation.
//!
//! Callers build a [`PlannerConfig`] (usually from defaults plus a few
//! overrides, or from JSON), check it with [`validate_config`], then hand it
//! to [`crate::hierarchy::generate_territory`].
//!
//! ```
//! use progplan_logic::config::{validate_config, PlannerConfig};
//!
//! let mut config = PlannerConfig::default();
//! config.seed = Some(7);
//! config.cell_size = 1.5;
//! assert!(validate_config(&config).is_empty());
//! ```

use serde::{Deserialize, Serialize};

/// Order in which BFS frontier neighbours are queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NeighborOrder {
    /// Cells with the fewest free neighbours first: fills concavities and
    /// hugs walls before reaching into open space.
    #[default]
    FewestFreeFirst,
    /// Cells with the most free neighbours first.
    MostFreeFirst,
}

/// Epsilon-greedy Q-learning parameters for category selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Probability of a uniformly random choice.
    pub epsilon: f64,
    /// Learning rate.
    pub alpha: f64,
    /// Discount applied to the best value of the next state.
    pub gamma: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.2,
            alpha: 0.5,
            gamma: 0.9,
        }
    }
}

/// Budget and acceptance rules for one hierarchy level's layout engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hard cap on generate/validate iterations.
    pub max_iterations: u32,
    /// Wall-clock budget per unit, checked between iterations.
    pub time_budget_ms: u64,
    /// Iteration after which a unit with no valid plan switches to relaxed mode.
    pub relax_checkpoint: u32,
    /// Skip the exact-count check altogether.
    pub relax_count_check: bool,
    /// Regions a relaxed-mode plan may be short of the requested total.
    ///
    /// Relaxed mode does not drop the count check outright: it only widens
    /// it to this shortfall. Set `relax_count_check` to accept any count.
    pub relaxed_shortfall: u32,
    /// Fall back to the attempt that placed the most regions.
    pub auto_adjust: bool,
    /// Consecutive failures after which a category is dropped for the iteration.
    pub max_category_failures: u32,
    /// Rectangularity treated as "good enough" (allocator acceptance and early stop).
    pub rect_tolerance: f64,
    /// Minimum boundary length a region must share with free space.
    pub min_contact_length: f64,
    pub neighbor_order: NeighborOrder,
    /// Grow regions through diagonal neighbours as well as orthogonal ones.
    pub diagonal_expansion: bool,
    pub policy: PolicyConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 40,
            time_budget_ms: 3_000,
            relax_checkpoint: 20,
            relax_count_check: false,
            relaxed_shortfall: 1,
            auto_adjust: true,
            max_category_failures: 4,
            rect_tolerance: 0.01,
            min_contact_length: 2.0,
            neighbor_order: NeighborOrder::FewestFreeFirst,
            diagonal_expansion: false,
            policy: PolicyConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults tuned for subdividing one apartment into rooms.
    pub fn for_rooms() -> Self {
        Self {
            max_iterations: 15,
            time_budget_ms: 1_000,
            relax_checkpoint: 8,
            min_contact_length: 1.0,
            ..Self::default()
        }
    }
}

/// Occupancy thresholds for the feasibility pre-check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeasibilityConfig {
    /// Fraction of the footprint a single-floor building may fill.
    pub single_floor_occupancy: f64,
    /// Share of the footprint credited for the ground floor of a multi-floor building.
    pub ground_floor_occupancy: f64,
    /// Share of the footprint credited for every upper floor.
    pub upper_floor_occupancy: f64,
    /// Fraction of a section's area its apartments may fill.
    pub section_occupancy: f64,
}

impl Default for FeasibilityConfig {
    fn default() -> Self {
        Self {
            single_floor_occupancy: 0.65,
            ground_floor_occupancy: 0.5,
            upper_floor_occupancy: 0.7,
            section_occupancy: 0.7,
        }
    }
}

/// Top-level planner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Side of a section-level grid cell in world units.
    pub cell_size: f64,
    /// Side of a room-level grid cell in world units.
    pub room_cell_size: f64,
    /// Permit the count-relaxation fallback at every level.
    pub auto_adjust: bool,
    /// Deterministic seed (None = draw one at random).
    pub seed: Option<u64>,
    /// Plan rooms inside every apartment.
    pub plan_rooms: bool,
    /// Relative slack applied to room programme area shares.
    pub room_area_tolerance: f64,
    /// Derive dominated floor patterns from an already generated one.
    pub reuse_dominating_patterns: bool,
    pub section_engine: EngineConfig,
    pub room_engine: EngineConfig,
    pub feasibility: FeasibilityConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            cell_size: 1.0,
            room_cell_size: 0.5,
            auto_adjust: true,
            seed: None,
            plan_rooms: true,
            room_area_tolerance: 0.25,
            reuse_dominating_patterns: true,
            section_engine: EngineConfig::default(),
            room_engine: EngineConfig::for_rooms(),
            feasibility: FeasibilityConfig::default(),
        }
    }
}

impl PlannerConfig {
    /// Section engine settings with the top-level `auto_adjust` applied.
    pub fn section_engine(&self) -> EngineConfig {
        EngineConfig {
            auto_adjust: self.auto_adjust,
            ..self.section_engine.clone()
        }
    }

    /// Room engine settings with the top-level `auto_adjust` applied.
    pub fn room_engine(&self) -> EngineConfig {
        EngineConfig {
            auto_adjust: self.auto_adjust,
            ..self.room_engine.clone()
        }
    }
}

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Cell size must be positive and finite.
    InvalidCellSize(f64),
    /// Room cell size must be positive and finite.
    InvalidRoomCellSize(f64),
    /// An engine with no iterations can never produce a plan.
    ZeroIterations(&'static str),
    /// Probability or rate outside `[0, 1]`.
    RateOutOfRange(&'static str, f64),
    /// Occupancy fraction outside `(0, 1]`.
    OccupancyOutOfRange(&'static str, f64),
    /// Negative tolerance.
    NegativeTolerance(&'static str, f64),
}

fn validate_engine(label: &'static str, engine: &EngineConfig, errors: &mut Vec<ConfigError>) {
    if engine.max_iterations == 0 {
        errors.push(ConfigError::ZeroIterations(label));
    }
    for (name, value) in [
        ("epsilon", engine.policy.epsilon),
        ("alpha", engine.policy.alpha),
        ("gamma", engine.policy.gamma),
    ] {
        if !(0.0..=1.0).contains(&value) {
            errors.push(ConfigError::RateOutOfRange(name, value));
        }
    }
    if engine.rect_tolerance < 0.0 {
        errors.push(ConfigError::NegativeTolerance(
            "rect_tolerance",
            engine.rect_tolerance,
        ));
    }
    if engine.min_contact_length < 0.0 {
        errors.push(ConfigError::NegativeTolerance(
            "min_contact_length",
            engine.min_contact_length,
        ));
    }
}

/// Validate a planner configuration, returning all errors found.
pub fn validate_config(config: &PlannerConfig) -> Vec<ConfigError> {
    let mut errors = Vec::new();

    if !(config.cell_size.is_finite() && config.cell_size > 0.0) {
        errors.push(ConfigError::InvalidCellSize(config.cell_size));
    }
    if !(config.room_cell_size.is_finite() && config.room_cell_size > 0.0) {
        errors.push(ConfigError::InvalidRoomCellSize(config.room_cell_size));
    }
    if config.room_area_tolerance < 0.0 {
        errors.push(ConfigError::NegativeTolerance(
            "room_area_tolerance",
            config.room_area_tolerance,
        ));
    }

    validate_engine("section_engine", &config.section_engine, &mut errors);
    validate_engine("room_engine", &config.room_engine, &mut errors);

    let f = &config.feasibility;
    for (name, value) in [
        ("single_floor_occupancy", f.single_floor_occupancy),
        ("ground_floor_occupancy", f.ground_floor_occupancy),
        ("upper_floor_occupancy", f.upper_floor_occupancy),
        ("section_occupancy", f.section_occupancy),
    ] {
        if !(value > 0.0 && value <= 1.0) {
            errors.push(ConfigError::OccupancyOutOfRange(name, value));
        }
    }

    errors
}
