//! Generate → validate → score → retry loop for one hierarchy level.
//!
//! A [`LayoutEngine`] owns the grid of one unit (a section, or an apartment
//! when planning rooms) and repeatedly fills it with regions, keeping the
//! plan with the lowest total rectangularity. The run ends in one of three
//! states:
//!
//! | State | Meaning |
//! |-------|---------|
//! | `Accepted` | every requested region placed |
//! | `Degraded` | a relaxed or alternative plan (some regions missing) |
//! | `Exhausted` | nothing usable within the budget; the plan is empty |

use std::time::{Duration, Instant};

use geo::{Area, Line, Polygon, Rect};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::allocator::{AllocationRequest, RegionAllocator};
use crate::config::EngineConfig;
use crate::error::PlanError;
use crate::geometry::{is_single_simple, union_all};
use crate::grid::{CellCoord, PolygonGrid};
use crate::observer::{IterationEvent, PlanObserver};
use crate::policy::{state_of, HeuristicPolicy, Reward};
use crate::quota::QuotaTable;
use crate::shape::{
    classify_sides, is_outsider, plan_rectangularity, rectangularity, sides_of_kind, SideKind,
};

/// Per-category demand expressed in cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTarget {
    pub name: String,
    pub count: u32,
    pub min_cells: usize,
    pub max_cells: usize,
}

/// Convert a quota table into cell-count targets for a grid of `cell_area`.
pub fn targets_from_quota(table: &QuotaTable, cell_area: f64) -> Vec<CategoryTarget> {
    table
        .iter()
        .map(|(name, q)| {
            let min_cells = ((q.area_min / cell_area).ceil().max(1.0)) as usize;
            let max_cells = ((q.area_max / cell_area).floor() as usize).max(min_cells);
            CategoryTarget {
                name: name.clone(),
                count: q.target_count,
                min_cells,
                max_cells,
            }
        })
        .collect()
}

/// Engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Idle,
    Iterating,
    Accepted,
    Degraded,
    Exhausted,
}

/// Why a single placement attempt was rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Too few free cells reachable from the seed.
    NotFound,
    /// Too little contact with the remaining free space.
    Outsider,
    /// Cells do not merge into one polygon without holes.
    NotSimple,
}

impl RejectReason {
    pub fn reward(self) -> Reward {
        match self {
            RejectReason::NotFound => Reward::NotFound,
            RejectReason::Outsider | RejectReason::NotSimple => Reward::Disconnected,
        }
    }
}

/// One placed region with its derived geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub id: u32,
    pub category: String,
    pub cells: Vec<CellCoord>,
    pub polygon: Polygon<f64>,
    pub rectangularity: f64,
    /// Boundary runs facing unassigned space.
    pub free_sides: Vec<Line<f64>>,
    /// Boundary runs on the exterior of the outermost polygon.
    pub outer_sides: Vec<Line<f64>>,
    /// Boundary runs facing the rest of the containing unit.
    pub parent_sides: Vec<Line<f64>>,
}

impl Region {
    pub fn area(&self) -> f64 {
        self.polygon.unsigned_area()
    }
}

/// The regions of one attempt and their total rectangularity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    pub regions: Vec<Region>,
    pub score: f64,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Outcome of [`LayoutEngine::run`].
#[derive(Debug, Clone)]
pub struct LayoutResult {
    pub state: EngineState,
    pub plan: Plan,
    pub iterations: u32,
    pub requested: usize,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
struct Placement {
    category: usize,
    cells: Vec<CellCoord>,
    polygon: Polygon<f64>,
    rectangularity: f64,
}

#[derive(Debug, Clone, Default)]
struct Attempt {
    placements: Vec<Placement>,
    score: f64,
}

/// Merge a region's cells into its polygon. Full cells are merged into row
/// runs before the boolean union; clipped cells contribute their fragment.
fn region_polygon(grid: &PolygonGrid, cells: &[CellCoord]) -> Option<Polygon<f64>> {
    let full_area = grid.cell_area() * (1.0 - 1e-9);
    let mut sorted = cells.to_vec();
    sorted.sort_by_key(|c| (c.j, c.i));

    let mut pieces = Vec::new();
    let mut run: Option<(CellCoord, i32)> = None;
    let flush = |run: &mut Option<(CellCoord, i32)>, pieces: &mut Vec<Polygon<f64>>| {
        if let Some((start, len)) = run.take() {
            let origin = grid.lattice_point(start.i, start.j);
            let end = grid.lattice_point(start.i + len, start.j + 1);
            pieces.push(Rect::new(origin, end).to_polygon());
        }
    };

    for &c in &sorted {
        let cell = grid.cell(c)?;
        if cell.fragment.unsigned_area() < full_area {
            flush(&mut run, &mut pieces);
            pieces.push(cell.fragment.clone());
            continue;
        }
        match &mut run {
            Some((start, len)) if start.j == c.j && start.i + *len == c.i => *len += 1,
            _ => {
                flush(&mut run, &mut pieces);
                run = Some((c, 1));
            }
        }
    }
    flush(&mut run, &mut pieces);

    let merged = union_all(pieces);
    if is_single_simple(&merged) {
        merged.0.into_iter().next()
    } else {
        None
    }
}

/// Fills one grid with regions for a set of category targets.
pub struct LayoutEngine<'a> {
    unit: String,
    grid: PolygonGrid,
    targets: Vec<CategoryTarget>,
    config: EngineConfig,
    observer: &'a dyn PlanObserver,
    state: EngineState,
}

impl<'a> LayoutEngine<'a> {
    pub fn new(
        unit: impl Into<String>,
        grid: PolygonGrid,
        targets: Vec<CategoryTarget>,
        config: EngineConfig,
        observer: &'a dyn PlanObserver,
    ) -> Self {
        Self {
            unit: unit.into(),
            grid,
            targets,
            config,
            observer,
            state: EngineState::Idle,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// The grid, holding the chosen plan's cell owners after `run`.
    pub fn grid(&self) -> &PolygonGrid {
        &self.grid
    }

    pub fn targets(&self) -> &[CategoryTarget] {
        &self.targets
    }

    pub fn requested(&self) -> usize {
        self.targets.iter().map(|t| t.count as usize).sum()
    }

    fn validate(&self, cells: &[CellCoord]) -> Result<Polygon<f64>, RejectReason> {
        if is_outsider(&self.grid, cells, self.config.min_contact_length) {
            return Err(RejectReason::Outsider);
        }
        region_polygon(&self.grid, cells).ok_or(RejectReason::NotSimple)
    }

    /// One full iteration: reset, then place until demand is met or every
    /// remaining category is blocked.
    fn attempt<R: Rng + ?Sized>(
        &mut self,
        allocator: &mut RegionAllocator,
        policy: &mut HeuristicPolicy,
        rng: &mut R,
    ) -> Attempt {
        self.grid.reset();
        allocator.reset();

        let n = self.targets.len();
        let mut remaining: Vec<u32> = self.targets.iter().map(|t| t.count).collect();
        let mut failures = vec![0u32; n];
        let mut blocked = vec![false; n];
        let mut attempt = Attempt::default();

        loop {
            let actions: Vec<usize> = (0..n)
                .filter(|&k| remaining[k] > 0 && !blocked[k])
                .collect();
            let state = state_of(&remaining);
            let Some(k) = policy.choose(&state, &actions, rng) else {
                break;
            };
            let target = &self.targets[k];
            let request = AllocationRequest::new(target.min_cells, target.max_cells);

            let outcome = match allocator.allocate(&mut self.grid, request, rng) {
                None => Err(RejectReason::NotFound),
                Some(cells) => match self.validate(&cells) {
                    Ok(polygon) => Ok((cells, polygon)),
                    Err(reason) => {
                        allocator.release(&mut self.grid, &cells);
                        Err(reason)
                    }
                },
            };

            let reward = match outcome {
                Ok((cells, polygon)) => {
                    let id = attempt.placements.len() as u32;
                    for &c in &cells {
                        self.grid.set_owner(c, Some(id));
                    }
                    allocator.note_placed(&mut self.grid, &cells);
                    remaining[k] -= 1;
                    failures[k] = 0;
                    attempt.placements.push(Placement {
                        category: k,
                        cells,
                        rectangularity: rectangularity(&polygon),
                        polygon,
                    });
                    Reward::Placed
                }
                Err(reason) => {
                    failures[k] += 1;
                    if failures[k] >= self.config.max_category_failures.max(1) {
                        blocked[k] = true;
                    }
                    reason.reward()
                }
            };

            policy.update(&state, k, reward, &state_of(&remaining));
            self.observer
                .reward_recorded(&self.unit, &self.targets[k].name, reward);
        }
        attempt.score = plan_rectangularity(attempt.placements.iter().map(|p| &p.polygon));
        attempt
    }

    /// Re-apply a chosen attempt to the grid and derive region sides.
    fn finalize(&mut self, attempt: Attempt) -> Plan {
        self.grid.reset();
        for (id, p) in attempt.placements.iter().enumerate() {
            for &c in &p.cells {
                self.grid.set_owner(c, Some(id as u32));
            }
        }
        let regions = attempt
            .placements
            .into_iter()
            .enumerate()
            .map(|(id, p)| {
                let sides = classify_sides(&self.grid, &p.cells);
                Region {
                    id: id as u32,
                    category: self.targets[p.category].name.clone(),
                    free_sides: sides_of_kind(&sides, SideKind::Free),
                    outer_sides: sides_of_kind(&sides, SideKind::Outer),
                    parent_sides: sides_of_kind(&sides, SideKind::Parent),
                    cells: p.cells,
                    polygon: p.polygon,
                    rectangularity: p.rectangularity,
                }
            })
            .collect();
        Plan {
            regions,
            score: attempt.score,
        }
    }

    /// Run the retry loop until a good plan, the iteration cap or the deadline.
    pub fn run<R: Rng + ?Sized>(&mut self, rng: &mut R) -> LayoutResult {
        let requested = self.requested();
        if requested == 0 {
            self.state = EngineState::Accepted;
            self.observer.unit_finished(&self.unit, self.state);
            return LayoutResult {
                state: self.state,
                plan: Plan::default(),
                iterations: 0,
                requested,
                message: None,
            };
        }

        self.state = EngineState::Iterating;
        let deadline = Instant::now() + Duration::from_millis(self.config.time_budget_ms);
        let mut allocator = RegionAllocator::new(&self.config);
        let mut policy = HeuristicPolicy::new(self.config.policy.clone());

        // (attempt, shortfall)
        let mut best: Option<(Attempt, usize)> = None;
        let mut alternative: Option<Attempt> = None;
        let mut iterations = 0;

        while iterations < self.config.max_iterations {
            if iterations > 0 && Instant::now() >= deadline {
                log::debug!("{}: deadline reached after {iterations} iterations", self.unit);
                break;
            }
            iterations += 1;

            let relaxed = best.is_none() && iterations > self.config.relax_checkpoint;
            let attempt = self.attempt(&mut allocator, &mut policy, rng);
            let placed = attempt.placements.len();
            let shortfall = requested.saturating_sub(placed);

            let passes = shortfall == 0
                || self.config.relax_count_check
                || (relaxed && shortfall <= self.config.relaxed_shortfall as usize);

            self.observer.iteration_finished(&IterationEvent {
                unit: &self.unit,
                iteration: iterations,
                placed,
                requested,
                score: passes.then_some(attempt.score),
                relaxed,
            });

            if passes {
                let better = best.as_ref().map_or(true, |(b, b_short)| {
                    (shortfall, attempt.score) < (*b_short, b.score)
                });
                if better {
                    best = Some((attempt, shortfall));
                }
            } else if placed > 0 {
                let better = alternative.as_ref().map_or(true, |a| {
                    placed > a.placements.len()
                        || (placed == a.placements.len() && attempt.score < a.score)
                });
                if better {
                    alternative = Some(attempt);
                }
            }

            if let Some((b, 0)) = &best {
                if b.score <= self.config.rect_tolerance {
                    break;
                }
            }
        }

        let (state, chosen, message) = match best {
            Some((attempt, 0)) => (EngineState::Accepted, Some(attempt), None),
            Some((attempt, shortfall)) => (
                EngineState::Degraded,
                Some(attempt),
                Some(format!("{}: {shortfall} of {requested} regions not placed", self.unit)),
            ),
            None => match alternative {
                Some(attempt) if self.config.auto_adjust => {
                    let missing = requested - attempt.placements.len();
                    (
                        EngineState::Degraded,
                        Some(attempt),
                        Some(format!(
                            "{}: fell back to best partial plan, {missing} of {requested} regions not placed",
                            self.unit
                        )),
                    )
                }
                _ => (
                    EngineState::Exhausted,
                    None,
                    Some(
                        PlanError::AllocationExhausted {
                            unit: self.unit.clone(),
                            iterations,
                        }
                        .to_string(),
                    ),
                ),
            },
        };

        let plan = match chosen {
            Some(attempt) => self.finalize(attempt),
            None => {
                self.grid.reset();
                Plan::default()
            }
        };

        match state {
            EngineState::Exhausted | EngineState::Degraded => {
                log::warn!("{}", message.as_deref().unwrap_or(&self.unit));
            }
            _ => log::debug!(
                "{}: accepted {} regions, score {:.3}, {iterations} iterations",
                self.unit,
                plan.len(),
                plan.score
            ),
        }

        self.state = state;
        self.observer.unit_finished(&self.unit, state);
        LayoutResult {
            state,
            plan,
            iterations,
            requested,
            message,
        }
    }
}
