//! Integration tests for the full plan generation pipeline.
//!
//! Exercises: TerritoryInput → feasibility → floor distribution → patterns
//! → section layout → apartments → rooms → statistics → validation
//!
//! All tests are pure logic, with no rendering and no files.

use progplan_logic::config::PlannerConfig;
use progplan_logic::constants::apartment_types::{FOUR_ROOM, ONE_ROOM, STUDIO, THREE_ROOM, TWO_ROOM};
use progplan_logic::constants::room_types;
use progplan_logic::hierarchy::{generate_building, generate_territory, BuildingInput, TerritoryInput};
use progplan_logic::layout::EngineState;
use progplan_logic::observer::{NoopObserver, PlanObserver};
use progplan_logic::quota::{CategoryQuota, QuotaTable};
use progplan_logic::validation::{validate_building, Severity};
use std::sync::atomic::{AtomicU32, Ordering};

// ── Helpers ────────────────────────────────────────────────────────────

fn scenario_quota() -> QuotaTable {
    let mut quota = QuotaTable::new();
    quota.insert(STUDIO, CategoryQuota::new(25.0, 35.0, 10.0, 24));
    quota.insert(ONE_ROOM, CategoryQuota::new(35.0, 45.0, 20.0, 36));
    quota.insert(TWO_ROOM, CategoryQuota::new(50.0, 65.0, 20.0, 24));
    quota.insert(THREE_ROOM, CategoryQuota::new(70.0, 85.0, 15.0, 14));
    quota.insert(FOUR_ROOM, CategoryQuota::new(90.0, 110.0, 35.0, 24));
    quota
}

fn rectangle(w: f64, h: f64) -> Vec<[f64; 2]> {
    vec![[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]]
}

fn scenario_building() -> BuildingInput {
    BuildingInput {
        name: "Block A".into(),
        footprint: rectangle(42.0, 38.0),
        section_cuts: Vec::new(),
        quota: scenario_quota(),
        floors: 9,
    }
}

fn test_config(seed: u64) -> PlannerConfig {
    let mut config = PlannerConfig {
        seed: Some(seed),
        ..PlannerConfig::default()
    };
    config.section_engine.max_iterations = 20;
    config.room_engine.max_iterations = 5;
    config
}

/// Iteration-capped only, so results cannot depend on machine speed.
fn deterministic_config(seed: u64) -> PlannerConfig {
    let mut config = test_config(seed);
    config.plan_rooms = false;
    config.section_engine.max_iterations = 8;
    config.section_engine.time_budget_ms = 600_000;
    config
}

#[derive(Default)]
struct CopyCounter {
    copies: AtomicU32,
    finished: AtomicU32,
}

impl PlanObserver for CopyCounter {
    fn unit_finished(&self, _unit: &str, _state: EngineState) {
        self.finished.fetch_add(1, Ordering::Relaxed);
    }

    fn pattern_copied(&self, _floor: &str, _removed: u32) {
        self.copies.fetch_add(1, Ordering::Relaxed);
    }
}

// ── End-to-end scenario ────────────────────────────────────────────────

#[test]
fn scenario_building_end_to_end() {
    let input = TerritoryInput {
        buildings: vec![scenario_building()],
    };
    let observer = CopyCounter::default();
    let plan = generate_territory(&input, &test_config(42), &observer).unwrap();

    assert!(plan.diagnostics.is_empty(), "{:?}", plan.diagnostics);
    assert_eq!(plan.buildings.len(), 1);
    let building = &plan.buildings[0];

    assert_eq!(building.floors.len(), 9);
    assert_eq!(building.floors[0].apartment_count(), 0, "ground floor is reserved");
    assert!(building.floors[1..].iter().any(|f| f.apartment_count() > 0));

    let requested = building.requested_count as usize;
    let placed = building.apartment_count();
    assert_eq!(requested, 122);
    assert!(placed <= requested, "{placed} > {requested}");
    assert!(requested - placed <= 1, "{placed} of {requested} placed");

    let errors: Vec<_> = validate_building(building)
        .into_iter()
        .filter(|e| e.severity == Severity::Error)
        .collect();
    assert!(errors.is_empty(), "{errors:?}");

    for apartment in building.apartments() {
        if !apartment.free_sides.is_empty() {
            assert!(
                !apartment.windows.is_empty(),
                "apartment {} has free sides but no window",
                apartment.id
            );
        }
        for side in &apartment.free_sides {
            assert!(apartment.windows.contains(side));
        }
    }

    assert!(observer.finished.load(Ordering::Relaxed) > 0);
    assert!(plan.average_error.is_finite());
    assert_eq!(building.stats.actual_count() as usize, placed);
}

#[test]
fn apartments_have_rooms_and_facades() {
    let mut input = scenario_building();
    input.floors = 2;
    let mut quota = QuotaTable::new();
    quota.insert(STUDIO, CategoryQuota::new(25.0, 35.0, 40.0, 3));
    quota.insert(TWO_ROOM, CategoryQuota::new(50.0, 65.0, 60.0, 3));
    input.quota = quota;
    input.footprint = rectangle(30.0, 14.0);

    let building = generate_building(&input, &test_config(7), 11, &NoopObserver).unwrap();
    let apartments: Vec<_> = building.apartments().collect();
    assert!(!apartments.is_empty());
    for apartment in &apartments {
        assert!(apartment.area > 0.0);
        assert!(apartment.room_state.is_some(), "rooms are planned by default");
        let room_area: f64 = apartment.rooms.iter().map(|r| r.area).sum();
        assert!(room_area <= apartment.area + 1e-6);
        for room in apartment.rooms.iter().filter(|r| room_types::is_wet(&r.category)) {
            assert!(room.windows.is_empty(), "{} has a window", room.category);
        }
    }
    // a 14 m deep block: every apartment reaches at least one facade
    assert!(apartments.iter().any(|a| !a.windows.is_empty()));
}

// ── Sections ───────────────────────────────────────────────────────────

#[test]
fn section_cuts_split_every_floor() {
    let mut input = scenario_building();
    input.footprint = rectangle(40.0, 16.0);
    input.section_cuts = vec![vec![[20.0, -1.0], [20.0, 17.0]]];
    input.floors = 2;
    let mut quota = QuotaTable::new();
    quota.insert(STUDIO, CategoryQuota::new(25.0, 35.0, 50.0, 4));
    quota.insert(ONE_ROOM, CategoryQuota::new(35.0, 45.0, 50.0, 4));
    input.quota = quota;

    let building = generate_building(&input, &deterministic_config(3), 5, &NoopObserver).unwrap();
    for floor in &building.floors {
        assert_eq!(floor.sections.len(), 2);
    }
    let upper = &building.floors[1];
    let requested: u32 = upper.sections.iter().map(|s| s.quota.total_count()).sum();
    assert_eq!(requested, 8, "section quotas reconcile with the floor");
    assert_eq!(upper.sections[0].quota.total_count(), 4);
}

// ── Feasibility ────────────────────────────────────────────────────────

#[test]
fn infeasible_building_reports_reduction() {
    let mut small = scenario_building();
    small.name = "Tiny".into();
    small.footprint = rectangle(20.0, 20.0);
    small.floors = 2;
    let input = TerritoryInput {
        buildings: vec![small],
    };
    let plan = generate_territory(&input, &deterministic_config(1), &NoopObserver).unwrap();
    assert!(plan.buildings.is_empty());
    assert_eq!(plan.diagnostics.len(), 1);
    assert_eq!(plan.diagnostics[0].unit, "Tiny");
    assert!(plan.diagnostics[0].reduction.unwrap() > 0.0);
}

// ── Reproducibility ────────────────────────────────────────────────────

#[test]
fn same_seed_same_territory() {
    let mut input = scenario_building();
    input.floors = 3;
    input.footprint = rectangle(30.0, 20.0);
    let mut quota = QuotaTable::new();
    quota.insert(STUDIO, CategoryQuota::new(25.0, 35.0, 30.0, 6));
    quota.insert(TWO_ROOM, CategoryQuota::new(50.0, 65.0, 70.0, 4));
    input.quota = quota;
    let territory = TerritoryInput {
        buildings: vec![input.clone(), input],
    };

    let a = generate_territory(&territory, &deterministic_config(99), &NoopObserver).unwrap();
    let b = generate_territory(&territory, &deterministic_config(99), &NoopObserver).unwrap();
    let cells = |plan: &progplan_logic::TerritoryPlan| -> Vec<Vec<_>> {
        plan.buildings
            .iter()
            .flat_map(|b| b.apartments().map(|a| a.cells.clone()))
            .collect()
    };
    assert_eq!(a.seed, 99);
    assert_eq!(cells(&a), cells(&b));
}

#[test]
fn plan_serialises_to_json() {
    let mut input = scenario_building();
    input.floors = 2;
    input.footprint = rectangle(16.0, 12.0);
    let mut quota = QuotaTable::new();
    quota.insert(STUDIO, CategoryQuota::new(25.0, 35.0, 100.0, 2));
    input.quota = quota;
    let territory = TerritoryInput {
        buildings: vec![input],
    };
    let plan = generate_territory(&territory, &deterministic_config(5), &NoopObserver).unwrap();
    let json = serde_json::to_string(&plan).unwrap();
    assert!(json.contains("\"buildings\""));
    assert!(json.contains("\"studio\""));
}

#[test]
fn territory_input_from_json() {
    let json = r#"{
        "buildings": [{
            "name": "JSON",
            "footprint": [[0, 0], [12, 0], [12, 10], [0, 10], [0, 0]],
            "quota": {
                "studio": { "area_min": 25, "area_max": 35, "target_percent": 100, "target_count": 2 },
                "4room":  { "area_min": 90, "area_max": 110, "target_count": 0 }
            }
        }]
    }"#;
    let input: TerritoryInput = serde_json::from_str(json).unwrap();
    let building = &input.buildings[0];
    assert_eq!(building.floors, 1);
    assert_eq!(building.quota.len(), 1, "zero-count categories are pruned");
    assert!(building.section_cuts.is_empty());
}
