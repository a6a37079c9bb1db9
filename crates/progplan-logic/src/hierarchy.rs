//! Territory → building → floor → section → apartment → room composition.
//!
//! Each level runs the same recipe: build a grid for its polygon, split the
//! parent's quota among its children, and let a [`LayoutEngine`] place them.
//! Sibling subtrees share nothing mutable and run in parallel; every unit
//! derives its RNG seed from the run seed and its position in the tree, so a
//! seeded run is reproducible regardless of scheduling.

use geo::{Area, Line, Polygon};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{validate_config, PlannerConfig};
use crate::constants::room_types;
use crate::error::{PlanError, Result};
use crate::geometry::{clip_to, lines_overlap, polygon_from_vertices, split_by_cuts};
use crate::grid::{CellCoord, PolygonGrid};
use crate::layout::{targets_from_quota, EngineState, LayoutEngine, Region};
use crate::observer::PlanObserver;
use crate::quota::{
    deduplicate_patterns, distribute_to_floors, distribute_to_sections, generation_order,
    trim_surplus, validate_initial_planning, validate_section_planning, Pattern, QuotaTable,
};
use crate::rooms::room_quota;
use crate::shape::rectangularity;
use crate::stats::{building_stats, territory_average_error, BuildingStats};

// ── Input ───────────────────────────────────────────────────────────────

fn one_floor() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingInput {
    pub name: String,
    /// Footprint ring, closing vertex optional.
    pub footprint: Vec<[f64; 2]>,
    /// Polylines splitting the footprint into sections.
    #[serde(default)]
    pub section_cuts: Vec<Vec<[f64; 2]>>,
    pub quota: QuotaTable,
    #[serde(default = "one_floor")]
    pub floors: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerritoryInput {
    pub buildings: Vec<BuildingInput>,
}

// ── Output ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub category: String,
    pub polygon: Polygon<f64>,
    pub area: f64,
    /// Room sides on the apartment's window segments; empty for wet rooms.
    pub windows: Vec<Line<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Apartment {
    pub id: u32,
    pub category: String,
    pub cells: Vec<CellCoord>,
    pub polygon: Polygon<f64>,
    pub area: f64,
    pub rectangularity: f64,
    /// Sides facing unallocated space of the section.
    pub free_sides: Vec<Line<f64>>,
    /// Window segments: the free sides plus the facade.
    pub windows: Vec<Line<f64>>,
    pub rooms: Vec<Room>,
    /// Outcome of room planning, `None` when rooms were not planned.
    pub room_state: Option<EngineState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionPlan {
    pub index: usize,
    pub polygon: Polygon<f64>,
    pub area: f64,
    /// What this section was asked to hold.
    pub quota: QuotaTable,
    pub state: EngineState,
    pub apartments: Vec<Apartment>,
    pub message: Option<String>,
}

impl SectionPlan {
    fn empty(index: usize, polygon: &Polygon<f64>) -> Self {
        Self {
            index,
            polygon: polygon.clone(),
            area: polygon.unsigned_area(),
            quota: QuotaTable::new(),
            state: EngineState::Accepted,
            apartments: Vec::new(),
            message: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloorPlan {
    pub index: usize,
    /// Index into [`BuildingPlan::patterns`]; `None` for an empty ground floor.
    pub pattern: Option<usize>,
    /// Pattern whose layout this floor was trimmed from.
    pub copied_from: Option<usize>,
    pub sections: Vec<SectionPlan>,
}

impl FloorPlan {
    pub fn apartments(&self) -> impl Iterator<Item = &Apartment> {
        self.sections.iter().flat_map(|s| s.apartments.iter())
    }

    pub fn apartment_count(&self) -> usize {
        self.sections.iter().map(|s| s.apartments.len()).sum()
    }
}

/// A message about a unit that was not (fully) generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub unit: String,
    pub message: String,
    /// Minimum area reduction that would make the request feasible.
    pub reduction: Option<f64>,
}

impl Diagnostic {
    pub fn from_error(unit: &str, err: &PlanError) -> Self {
        Self {
            unit: unit.to_string(),
            message: err.to_string(),
            reduction: err.reduction(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingPlan {
    pub name: String,
    pub footprint: Polygon<f64>,
    pub floors: Vec<FloorPlan>,
    /// Distinct floor patterns in generation order.
    pub patterns: Vec<Pattern>,
    pub requested_count: u32,
    pub stats: BuildingStats,
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildingPlan {
    pub fn apartments(&self) -> impl Iterator<Item = &Apartment> {
        self.floors.iter().flat_map(|f| f.apartments())
    }

    pub fn apartment_count(&self) -> usize {
        self.floors.iter().map(|f| f.apartment_count()).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerritoryPlan {
    /// Seed the run used; feed it back through the config to reproduce.
    pub seed: u64,
    pub buildings: Vec<BuildingPlan>,
    /// Buildings rejected before or during generation.
    pub diagnostics: Vec<Diagnostic>,
    pub average_error: f64,
}

// ── Seeds ───────────────────────────────────────────────────────────────

/// Seed for the unit at `path` below a run seeded with `base`.
pub fn unit_seed(base: u64, path: &[u64]) -> u64 {
    path.iter().fold(base, |s, &i| {
        let mut h = s
            .wrapping_mul(6364136223846793005)
            .wrapping_add(i.wrapping_add(1));
        h ^= h >> 33;
        h = h.wrapping_mul(0xff51afd7ed558ccd);
        h ^= h >> 33;
        h
    })
}

// ── Generation ──────────────────────────────────────────────────────────

struct Context<'a> {
    config: &'a PlannerConfig,
    observer: &'a dyn PlanObserver,
}

fn plan_rooms(
    ctx: &Context<'_>,
    unit: &str,
    section: &Polygon<f64>,
    apartment: &Apartment,
    seed: u64,
) -> (Vec<Room>, EngineState) {
    let config = ctx.config;
    let table = room_quota(&apartment.category, apartment.area, config.room_area_tolerance);
    let grid = match PolygonGrid::build(&apartment.polygon, config.room_cell_size, Some(section)) {
        Ok(grid) => grid,
        Err(err) => {
            log::warn!("{unit}: {err}");
            return (Vec::new(), EngineState::Exhausted);
        }
    };
    let targets = targets_from_quota(&table, grid.cell_area());
    let mut engine = LayoutEngine::new(unit, grid, targets, config.room_engine(), ctx.observer);
    let result = engine.run(&mut StdRng::seed_from_u64(seed));

    let tol = config.room_cell_size / 2.0;
    let rooms = result
        .plan
        .regions
        .into_iter()
        .filter_map(|region| {
            let polygon = clip_to(&region.polygon, section)?;
            let windows = if room_types::is_wet(&region.category) {
                Vec::new()
            } else {
                region
                    .outer_sides
                    .into_iter()
                    .chain(region.parent_sides)
                    .filter(|side| apartment.windows.iter().any(|w| lines_overlap(side, w, tol)))
                    .collect()
            };
            Some(Room {
                category: region.category,
                area: polygon.unsigned_area(),
                polygon,
                windows,
            })
        })
        .collect();
    (rooms, result.state)
}

fn build_apartment(
    ctx: &Context<'_>,
    unit: &str,
    section: &Polygon<f64>,
    region: Region,
    seed: u64,
) -> Apartment {
    let polygon = clip_to(&region.polygon, section).unwrap_or_else(|| region.polygon.clone());
    let mut apartment = Apartment {
        id: region.id,
        category: region.category,
        cells: region.cells,
        area: polygon.unsigned_area(),
        rectangularity: rectangularity(&polygon),
        polygon,
        windows: region
            .free_sides
            .iter()
            .chain(&region.outer_sides)
            .copied()
            .collect(),
        free_sides: region.free_sides,
        rooms: Vec::new(),
        room_state: None,
    };
    if ctx.config.plan_rooms {
        let room_unit = format!("{unit}/a{}", apartment.id);
        let (rooms, state) = plan_rooms(ctx, &room_unit, section, &apartment, seed);
        apartment.rooms = rooms;
        apartment.room_state = Some(state);
    }
    apartment
}

fn plan_section(
    ctx: &Context<'_>,
    unit: String,
    footprint: &Polygon<f64>,
    section: &Polygon<f64>,
    index: usize,
    table: QuotaTable,
    seed: u64,
) -> SectionPlan {
    let config = ctx.config;
    let mut plan = SectionPlan::empty(index, section);
    plan.quota = table.clone();
    if table.is_empty() {
        return plan;
    }

    if let Err(err) = validate_section_planning(&unit, plan.area, &table, &config.feasibility) {
        log::warn!("{err}");
        plan.state = EngineState::Exhausted;
        plan.message = Some(err.to_string());
        return plan;
    }

    let grid = match PolygonGrid::build(section, config.cell_size, Some(footprint)) {
        Ok(grid) => grid,
        Err(err) => {
            plan.state = EngineState::Exhausted;
            plan.message = Some(format!("{unit}: {err}"));
            return plan;
        }
    };
    let targets = targets_from_quota(&table, grid.cell_area());
    let mut engine = LayoutEngine::new(unit.clone(), grid, targets, config.section_engine(), ctx.observer);
    let result = engine.run(&mut StdRng::seed_from_u64(seed));

    plan.state = result.state;
    plan.message = result.message;
    plan.apartments = result
        .plan
        .regions
        .into_par_iter()
        .enumerate()
        .map(|(k, region)| {
            build_apartment(ctx, &unit, section, region, unit_seed(seed, &[k as u64]))
        })
        .collect();
    plan
}

fn plan_pattern(
    ctx: &Context<'_>,
    building: &str,
    footprint: &Polygon<f64>,
    sections: &[Polygon<f64>],
    pattern: &Pattern,
    seed: u64,
) -> Vec<SectionPlan> {
    let areas: Vec<f64> = sections.iter().map(|s| s.unsigned_area()).collect();
    let floor = pattern.floors.first().copied().unwrap_or(0);
    let tables = distribute_to_sections(&pattern.table, &areas);
    sections
        .par_iter()
        .zip(tables)
        .enumerate()
        .map(|(s, (polygon, table))| {
            plan_section(
                ctx,
                format!("{building}/f{floor}/s{s}"),
                footprint,
                polygon,
                s,
                table,
                unit_seed(seed, &[floor as u64, s as u64]),
            )
        })
        .collect()
}

/// Derive a dominated pattern's sections from an already generated template.
fn copy_pattern(template: &[SectionPlan], pattern: &Pattern) -> (Vec<SectionPlan>, u32) {
    let mut sections = template.to_vec();
    let areas: Vec<f64> = sections.iter().map(|s| s.area).collect();
    let mut lists: Vec<Vec<Apartment>> = sections
        .iter_mut()
        .map(|s| std::mem::take(&mut s.apartments))
        .collect();
    let removed = trim_surplus(&mut lists, &pattern.counts, |a: &Apartment| a.category.as_str());
    let tables = distribute_to_sections(&pattern.table, &areas);
    for ((section, apartments), table) in sections.iter_mut().zip(lists).zip(tables) {
        // the template's outcome and message belong to the template's floor
        section.state = if apartments.len() == table.total_count() as usize {
            EngineState::Accepted
        } else if apartments.is_empty() {
            EngineState::Exhausted
        } else {
            EngineState::Degraded
        };
        section.message = None;
        section.apartments = apartments;
        section.quota = table;
    }
    (sections, removed.values().sum())
}

/// Generate one building. Fails only for invalid input or an infeasible quota.
pub fn generate_building(
    input: &BuildingInput,
    config: &PlannerConfig,
    seed: u64,
    observer: &dyn PlanObserver,
) -> Result<BuildingPlan> {
    let footprint = polygon_from_vertices(&input.footprint)
        .map_err(|err| PlanError::InvalidInput(format!("{}: {err}", input.name)))?;
    if input.floors == 0 {
        return Err(PlanError::InvalidInput(format!(
            "{}: a building needs at least one floor",
            input.name
        )));
    }
    validate_initial_planning(
        &input.name,
        footprint.unsigned_area(),
        &input.quota,
        input.floors,
        &config.feasibility,
    )?;

    let ctx = Context { config, observer };
    let sections = split_by_cuts(&footprint, &input.section_cuts);
    let floor_tables = distribute_to_floors(&input.quota, input.floors)?;
    let patterns = generation_order(deduplicate_patterns(&floor_tables));
    log::info!(
        "{}: {} floors, {} sections, {} patterns, {} apartments requested",
        input.name,
        input.floors,
        sections.len(),
        patterns.len(),
        input.quota.total_count()
    );

    let mut generated: Vec<Vec<SectionPlan>> = Vec::with_capacity(patterns.len());
    let mut sources: Vec<Option<usize>> = Vec::with_capacity(patterns.len());
    for (p, pattern) in patterns.iter().enumerate() {
        let template = if config.reuse_dominating_patterns {
            (0..p).find(|&q| sources[q].is_none() && patterns[q].dominates(pattern))
        } else {
            None
        };
        let sections_plan = match template {
            Some(q) => {
                let (copy, removed) = copy_pattern(&generated[q], pattern);
                let floor = format!("{}/f{}", input.name, pattern.floors.first().copied().unwrap_or(0));
                log::info!("{floor}: copied from pattern {q}, {removed} surplus apartments removed");
                observer.pattern_copied(&floor, removed);
                copy
            }
            None => plan_pattern(&ctx, &input.name, &footprint, &sections, pattern, seed),
        };
        generated.push(sections_plan);
        sources.push(template);
    }

    let mut floors: Vec<FloorPlan> = (0..input.floors as usize)
        .map(|index| FloorPlan {
            index,
            pattern: None,
            copied_from: None,
            sections: Vec::new(),
        })
        .collect();
    for (p, pattern) in patterns.iter().enumerate() {
        for &f in &pattern.floors {
            floors[f].pattern = Some(p);
            floors[f].copied_from = sources[p];
            floors[f].sections = generated[p].clone();
        }
    }
    // ground floor (and any floor without demand) last, with empty sections
    for floor in floors.iter_mut().filter(|f| f.pattern.is_none()) {
        floor.sections = sections
            .iter()
            .enumerate()
            .map(|(s, polygon)| SectionPlan::empty(s, polygon))
            .collect();
    }

    let diagnostics: Vec<Diagnostic> = patterns
        .iter()
        .zip(&generated)
        .flat_map(|(pattern, sections)| {
            let floor = pattern.floors.first().copied().unwrap_or(0);
            sections.iter().filter_map(move |s| {
                s.message.as_ref().map(|message| Diagnostic {
                    unit: format!("{}/f{floor}/s{}", input.name, s.index),
                    message: message.clone(),
                    reduction: None,
                })
            })
        })
        .collect();

    let mut plan = BuildingPlan {
        name: input.name.clone(),
        footprint,
        floors,
        patterns,
        requested_count: input.quota.total_count(),
        stats: BuildingStats::default(),
        diagnostics,
    };
    plan.stats = building_stats(
        &input.quota,
        plan.apartments().map(|a| (a.category.as_str(), a.area)),
    );
    log::info!(
        "{}: {} of {} apartments placed, average error {:.2}%",
        plan.name,
        plan.apartment_count(),
        plan.requested_count,
        plan.stats.average_error
    );
    Ok(plan)
}

/// Generate every building of a territory.
///
/// Buildings that fail the feasibility gate or have invalid input are
/// reported as diagnostics; the rest are generated in parallel.
pub fn generate_territory(
    input: &TerritoryInput,
    config: &PlannerConfig,
    observer: &dyn PlanObserver,
) -> Result<TerritoryPlan> {
    let errors = validate_config(config);
    if !errors.is_empty() {
        return Err(PlanError::InvalidInput(format!(
            "invalid configuration: {errors:?}"
        )));
    }
    let seed = config.seed.unwrap_or_else(rand::random);

    let results: Vec<(String, Result<BuildingPlan>)> = input
        .buildings
        .par_iter()
        .enumerate()
        .map(|(k, building)| {
            let result = generate_building(building, config, unit_seed(seed, &[k as u64]), observer);
            (building.name.clone(), result)
        })
        .collect();

    let mut buildings = Vec::new();
    let mut diagnostics = Vec::new();
    for (name, result) in results {
        match result {
            Ok(plan) => buildings.push(plan),
            Err(err) => {
                log::info!("{name} not generated: {err}");
                diagnostics.push(Diagnostic::from_error(&name, &err));
            }
        }
    }

    let average_error = territory_average_error(buildings.iter().map(|b| &b.stats));
    Ok(TerritoryPlan {
        seed,
        buildings,
        diagnostics,
        average_error,
    })
}
