//! ProgPlan Headless Generation Harness
//!
//! Runs the reference scenario through the whole planning pipeline and
//! checks the result. Runs entirely in-process, with no rendering and no
//! files read at runtime.
//!
//! Usage:
//!   cargo run -p progplan-simtest
//!   cargo run -p progplan-simtest -- --verbose
//!   cargo run -p progplan-simtest -- --json plan.json

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use progplan_logic::config::{validate_config, PlannerConfig};
use progplan_logic::constants::apartment_types;
use progplan_logic::geometry::polygon_from_vertices;
use progplan_logic::hierarchy::{generate_territory, TerritoryInput, TerritoryPlan};
use progplan_logic::layout::EngineState;
use progplan_logic::observer::PlanObserver;
use progplan_logic::quota::{
    deduplicate_patterns, distribute_to_floors, distribute_to_sections, validate_initial_planning,
    CategoryQuota, QuotaTable,
};
use progplan_logic::validation::{validate_territory, Severity};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

// ── Reference scenario (same JSON the integration tests mirror) ─────────
const SCENARIO_JSON: &str = include_str!("../../../data/scenario.json");

#[derive(Debug, Deserialize)]
struct Scenario {
    name: String,
    #[serde(default)]
    config: PlannerConfig,
    territory: TerritoryInput,
}

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

/// Counts section engine outcomes while the territory is generated.
#[derive(Default)]
struct OutcomeCounter {
    accepted: AtomicU32,
    degraded: AtomicU32,
    exhausted: AtomicU32,
    room_units: AtomicU32,
    copies: AtomicU32,
    trimmed: AtomicU32,
}

impl PlanObserver for OutcomeCounter {
    fn unit_finished(&self, unit: &str, state: EngineState) {
        // room engines are named `<section>/a<id>`
        if unit.rsplit('/').next().is_some_and(|leaf| leaf.starts_with('a')) {
            self.room_units.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let slot = match state {
            EngineState::Accepted => &self.accepted,
            EngineState::Degraded => &self.degraded,
            EngineState::Exhausted => &self.exhausted,
            EngineState::Idle | EngineState::Iterating => return,
        };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    fn pattern_copied(&self, _floor: &str, removed: u32) {
        self.copies.fetch_add(1, Ordering::Relaxed);
        self.trimmed.fetch_add(removed, Ordering::Relaxed);
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose");
    let json_path = args
        .iter()
        .position(|a| a == "--json")
        .map(|i| args.get(i + 1).cloned().unwrap_or_else(|| "plan.json".into()));
    println!("=== ProgPlan Generation Harness ===\n");

    let mut results = Vec::new();

    // 1. Scenario parse
    let (scenario_results, scenario) = validate_scenario(verbose);
    results.extend(scenario_results);

    // 2. Quota distribution sweep
    results.extend(validate_quota_sweep(verbose));

    if let Some(scenario) = scenario {
        // 3. Feasibility gate probe
        results.extend(validate_feasibility(&scenario, verbose));

        // 4. Full generation
        let (generation_results, plan) = validate_generation(&scenario, verbose);
        results.extend(generation_results);

        if let Some(plan) = plan {
            // 5. Structural validators
            results.extend(validate_plan(&plan, verbose));

            // 6. Per-category statistics
            results.extend(validate_statistics(&plan, verbose));

            if let Some(path) = json_path {
                results.push(write_plan(&plan, &path));
            }
        }
    }

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

// ── 1. Scenario ─────────────────────────────────────────────────────────

fn validate_scenario(verbose: bool) -> (Vec<TestResult>, Option<Scenario>) {
    println!("--- Scenario ---");
    let mut results = Vec::new();

    let scenario: Scenario = match serde_json::from_str(SCENARIO_JSON) {
        Ok(s) => s,
        Err(e) => {
            results.push(TestResult {
                name: "scenario_parse".into(),
                passed: false,
                detail: format!("JSON parse error: {}", e),
            });
            return (results, None);
        }
    };

    results.push(TestResult {
        name: "scenario_parse".into(),
        passed: !scenario.territory.buildings.is_empty(),
        detail: format!(
            "'{}': {} buildings loaded",
            scenario.name,
            scenario.territory.buildings.len()
        ),
    });

    let config_errors = validate_config(&scenario.config);
    results.push(TestResult {
        name: "scenario_config_valid".into(),
        passed: config_errors.is_empty(),
        detail: if config_errors.is_empty() {
            format!("seed={:?} cell={}", scenario.config.seed, scenario.config.cell_size)
        } else {
            format!("{:?}", config_errors)
        },
    });

    let bad_footprints: Vec<_> = scenario
        .territory
        .buildings
        .iter()
        .filter(|b| polygon_from_vertices(&b.footprint).is_err())
        .map(|b| b.name.as_str())
        .collect();
    results.push(TestResult {
        name: "scenario_footprints".into(),
        passed: bad_footprints.is_empty(),
        detail: if bad_footprints.is_empty() {
            "all footprints are valid polygons".into()
        } else {
            format!("invalid footprints: {}", bad_footprints.join(", "))
        },
    });

    let unknown: Vec<_> = scenario
        .territory
        .buildings
        .iter()
        .flat_map(|b| b.quota.iter().map(|(k, _)| k.as_str()))
        .filter(|k| !apartment_types::ALL.contains(k))
        .collect();
    results.push(TestResult {
        name: "scenario_known_categories".into(),
        passed: unknown.is_empty(),
        detail: if unknown.is_empty() {
            "all quota categories are known apartment types".into()
        } else {
            format!("unknown categories: {}", unknown.join(", "))
        },
    });

    let bad_ranges: Vec<_> = scenario
        .territory
        .buildings
        .iter()
        .flat_map(|b| b.quota.iter())
        .filter(|(_, q)| q.area_min <= 0.0 || q.area_max < q.area_min)
        .map(|(k, _)| k.as_str())
        .collect();
    results.push(TestResult {
        name: "scenario_area_ranges".into(),
        passed: bad_ranges.is_empty(),
        detail: if bad_ranges.is_empty() {
            "all area ranges are positive and ordered".into()
        } else {
            format!("bad ranges: {}", bad_ranges.join(", "))
        },
    });

    if verbose {
        for b in &scenario.territory.buildings {
            println!(
                "  {}: {} floors, {} apartments requested",
                b.name,
                b.floors,
                b.quota.total_count()
            );
        }
    }

    (results, Some(scenario))
}

// ── 2. Quota Distribution ───────────────────────────────────────────────

fn random_table(rng: &mut StdRng) -> QuotaTable {
    let mut table = QuotaTable::new();
    for (i, category) in apartment_types::ALL.iter().enumerate() {
        let area_min = 25.0 + 20.0 * i as f64;
        let count = rng.gen_range(0..60);
        table.insert(
            *category,
            CategoryQuota::new(area_min, area_min + 15.0, rng.gen_range(0.0..40.0), count),
        );
    }
    table
}

fn validate_quota_sweep(verbose: bool) -> Vec<TestResult> {
    println!("--- Quota Distribution ---");
    let mut results = Vec::new();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let trials = 300;

    let mut floor_mismatch = 0;
    let mut ground_occupied = 0;
    let mut unbalanced = 0;
    let mut pattern_mismatch = 0;
    let mut section_mismatch = 0;
    let mut max_patterns = 0;

    for _ in 0..trials {
        let table = random_table(&mut rng);
        let floors = rng.gen_range(1..=16u32);
        let tables = match distribute_to_floors(&table, floors) {
            Ok(t) => t,
            Err(_) => {
                floor_mismatch += 1;
                continue;
            }
        };

        // Floors sum back to the building
        for (category, quota) in table.iter() {
            let sum: u32 = tables
                .iter()
                .map(|t| t.get(category).map_or(0, |q| q.target_count))
                .sum();
            if sum != quota.target_count {
                floor_mismatch += 1;
            }

            // Upper floors differ by at most one unit per category
            let upper: Vec<u32> = tables
                .iter()
                .skip(usize::from(floors > 1))
                .map(|t| t.get(category).map_or(0, |q| q.target_count))
                .collect();
            let lo = upper.iter().min().copied().unwrap_or(0);
            let hi = upper.iter().max().copied().unwrap_or(0);
            if hi - lo > 1 {
                unbalanced += 1;
            }
        }
        if floors > 1 && !tables[0].is_empty() {
            ground_occupied += 1;
        }

        // Patterns cover every non-empty floor exactly once
        let patterns = deduplicate_patterns(&tables);
        max_patterns = max_patterns.max(patterns.len());
        let covered: usize = patterns.iter().map(|p| p.repeat_count).sum();
        let nonempty = tables.iter().filter(|t| !t.is_empty()).count();
        let pattern_units: u32 = patterns
            .iter()
            .map(|p| p.total_count() * p.repeat_count as u32)
            .sum();
        if covered != nonempty || pattern_units != table.total_count() {
            pattern_mismatch += 1;
        }

        // Sections sum back to their floor
        let sections = rng.gen_range(1..=4usize);
        let areas: Vec<f64> = (0..sections).map(|_| rng.gen_range(50.0..800.0)).collect();
        for floor in &tables {
            let parts = distribute_to_sections(floor, &areas);
            let total: u32 = parts.iter().map(|p| p.total_count()).sum();
            if parts.len() != sections || total != floor.total_count() {
                section_mismatch += 1;
            }
        }
    }

    results.push(TestResult {
        name: "quota_floors_reconcile".into(),
        passed: floor_mismatch == 0,
        detail: format!("{} mismatches over {} random tables", floor_mismatch, trials),
    });
    results.push(TestResult {
        name: "quota_ground_floor_empty".into(),
        passed: ground_occupied == 0,
        detail: format!("{} multi-floor splits with an occupied ground floor", ground_occupied),
    });
    results.push(TestResult {
        name: "quota_floors_balanced".into(),
        passed: unbalanced == 0,
        detail: format!("{} categories spread by more than one unit", unbalanced),
    });
    results.push(TestResult {
        name: "quota_patterns_cover_floors".into(),
        passed: pattern_mismatch == 0,
        detail: format!("{} pattern sets lose or duplicate floors", pattern_mismatch),
    });
    results.push(TestResult {
        name: "quota_sections_reconcile".into(),
        passed: section_mismatch == 0,
        detail: format!("{} section splits lose units", section_mismatch),
    });

    if verbose {
        println!("  {} trials, at most {} distinct patterns per building", trials, max_patterns);
    }

    results
}

// ── 3. Feasibility ──────────────────────────────────────────────────────

fn validate_feasibility(scenario: &Scenario, verbose: bool) -> Vec<TestResult> {
    println!("--- Feasibility ---");
    let mut results = Vec::new();
    let cfg = &scenario.config.feasibility;

    for building in &scenario.territory.buildings {
        let Ok(footprint) = polygon_from_vertices(&building.footprint) else {
            continue;
        };
        let area = geo::Area::unsigned_area(&footprint);

        let gate = validate_initial_planning(&building.name, area, &building.quota, building.floors, cfg);
        results.push(TestResult {
            name: format!("feasibility_{}_fits", slug(&building.name)),
            passed: gate.is_ok(),
            detail: match &gate {
                Ok(()) => format!(
                    "{:.0} m² requested on {:.0} m² footprint",
                    building.quota.mean_potential_area(),
                    area
                ),
                Err(e) => e.to_string(),
            },
        });

        // Triple the demand: the gate must refuse it and name a reduction
        let mut counts: BTreeMap<String, u32> = building.quota.counts();
        counts.values_mut().for_each(|n| *n *= 3);
        let inflated = building.quota.with_counts(&counts);
        let refused = validate_initial_planning(&building.name, area, &inflated, building.floors, cfg);
        let reduction = refused.as_ref().err().and_then(|e| e.reduction());
        results.push(TestResult {
            name: format!("feasibility_{}_rejects_3x", slug(&building.name)),
            passed: reduction.is_some_and(|r| r > 0.0),
            detail: match reduction {
                Some(r) => format!("reduce by at least {:.1} m²", r),
                None => "tripled quota was accepted".into(),
            },
        });

        if verbose {
            if let Err(e) = refused {
                println!("  {}", e);
            }
        }
    }

    results
}

fn slug(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

// ── 4. Generation ───────────────────────────────────────────────────────

fn validate_generation(scenario: &Scenario, verbose: bool) -> (Vec<TestResult>, Option<TerritoryPlan>) {
    println!("--- Generation ---");
    let mut results = Vec::new();
    let observer = OutcomeCounter::default();

    let start = Instant::now();
    let plan = match generate_territory(&scenario.territory, &scenario.config, &observer) {
        Ok(p) => p,
        Err(e) => {
            results.push(TestResult {
                name: "generation_runs".into(),
                passed: false,
                detail: e.to_string(),
            });
            return (results, None);
        }
    };
    let elapsed = start.elapsed();

    results.push(TestResult {
        name: "generation_runs".into(),
        passed: plan.diagnostics.is_empty(),
        detail: if plan.diagnostics.is_empty() {
            format!("{} buildings in {:.2?}", plan.buildings.len(), elapsed)
        } else {
            plan.diagnostics
                .iter()
                .map(|d| format!("{}: {}", d.unit, d.message))
                .collect::<Vec<_>>()
                .join("; ")
        },
    });

    results.push(TestResult {
        name: "generation_all_buildings".into(),
        passed: plan.buildings.len() == scenario.territory.buildings.len(),
        detail: format!(
            "{}/{} buildings planned",
            plan.buildings.len(),
            scenario.territory.buildings.len()
        ),
    });

    for building in &plan.buildings {
        let requested = building.requested_count as usize;
        let placed = building.apartment_count();
        let floors = building.floors.len();
        results.push(TestResult {
            name: format!("generation_{}_count", slug(&building.name)),
            passed: placed <= requested && requested - placed <= 1,
            detail: format!("{} of {} apartments placed on {} floors", placed, requested, floors),
        });
    }

    let exhausted = observer.exhausted.load(Ordering::Relaxed);
    results.push(TestResult {
        name: "generation_no_exhausted_sections".into(),
        passed: exhausted == 0,
        detail: format!(
            "accepted={} degraded={} exhausted={}",
            observer.accepted.load(Ordering::Relaxed),
            observer.degraded.load(Ordering::Relaxed),
            exhausted
        ),
    });

    if verbose {
        println!(
            "  seed {} | {} room plans | {} pattern copies, {} surplus apartments trimmed",
            plan.seed,
            observer.room_units.load(Ordering::Relaxed),
            observer.copies.load(Ordering::Relaxed),
            observer.trimmed.load(Ordering::Relaxed)
        );
        for building in &plan.buildings {
            for floor in &building.floors {
                let source = match (floor.pattern, floor.copied_from) {
                    (None, _) => "-".to_string(),
                    (Some(p), None) => format!("pattern {}", p),
                    (Some(p), Some(from)) => format!("pattern {} (copy of floor {})", p, from),
                };
                println!(
                    "  {} floor {}: {} apartments, {}",
                    building.name,
                    floor.index,
                    floor.apartment_count(),
                    source
                );
            }
        }
    }

    (results, Some(plan))
}

// ── 5. Plan Validation ──────────────────────────────────────────────────

fn validate_plan(plan: &TerritoryPlan, verbose: bool) -> Vec<TestResult> {
    println!("--- Plan Validation ---");
    let mut results = Vec::new();

    let issues = validate_territory(plan);
    let errors: Vec<_> = issues
        .iter()
        .filter(|e| e.severity == Severity::Error)
        .collect();
    let warnings = issues.len() - errors.len();

    for category in ["disjoint", "connectivity", "containment", "count", "ground_floor"] {
        let hits: Vec<_> = errors.iter().filter(|e| e.category == category).collect();
        results.push(TestResult {
            name: format!("plan_{}", category),
            passed: hits.is_empty(),
            detail: match hits.first() {
                None => "no errors".into(),
                Some(first) => format!("{} errors, first: {}", hits.len(), first.message),
            },
        });
    }

    let planned: Vec<_> = plan
        .buildings
        .iter()
        .flat_map(|b| b.apartments())
        .filter(|a| a.room_state.is_some())
        .collect();
    let roomless = planned.iter().filter(|a| a.rooms.is_empty()).count();
    results.push(TestResult {
        name: "plan_apartments_have_rooms".into(),
        passed: roomless * 10 <= planned.len(),
        detail: format!("{}/{} room plans came back empty", roomless, planned.len()),
    });

    let lit: usize = plan
        .buildings
        .iter()
        .flat_map(|b| b.apartments())
        .filter(|a| !a.windows.is_empty())
        .count();
    let total: usize = plan.buildings.iter().map(|b| b.apartment_count()).sum();
    results.push(TestResult {
        name: "plan_window_access".into(),
        passed: total == 0 || lit > 0,
        detail: format!("{}/{} apartments have a window segment", lit, total),
    });

    let unlit_free: usize = plan
        .buildings
        .iter()
        .flat_map(|b| b.apartments())
        .filter(|a| !a.free_sides.is_empty() && a.windows.is_empty())
        .count();
    results.push(TestResult {
        name: "plan_free_sides_have_windows".into(),
        passed: unlit_free == 0,
        detail: format!("{} apartments with free sides lack windows", unlit_free),
    });

    if verbose {
        println!("  {} errors, {} warnings", errors.len(), warnings);
        for w in issues.iter().filter(|e| e.severity == Severity::Warning) {
            println!("    warn [{}] {}", w.category, w.message);
        }
    }

    results
}

// ── 6. Statistics ───────────────────────────────────────────────────────

fn validate_statistics(plan: &TerritoryPlan, verbose: bool) -> Vec<TestResult> {
    println!("--- Statistics ---");
    let mut results = Vec::new();

    for building in &plan.buildings {
        let stats = &building.stats;
        results.push(TestResult {
            name: format!("stats_{}_counts", slug(&building.name)),
            passed: stats.actual_count() as usize == building.apartment_count(),
            detail: format!(
                "{} counted, {} placed",
                stats.actual_count(),
                building.apartment_count()
            ),
        });

        let percent_sum: f64 = stats.categories.iter().map(|c| c.actual_percent).sum();
        results.push(TestResult {
            name: format!("stats_{}_percent_sum", slug(&building.name)),
            passed: stats.total_area == 0.0 || (percent_sum - 100.0).abs() < 1e-6,
            detail: format!("actual shares sum to {:.3}%", percent_sum),
        });

        if verbose {
            println!("  {} (avg error {:.2}%):", building.name, stats.average_error);
            for c in &stats.categories {
                println!(
                    "    {:6}: {:3}/{:3} units, avg {:6.1} m², {:5.1}% of {:5.1}% requested",
                    c.category,
                    c.actual_count,
                    c.requested_count,
                    c.average_area,
                    c.actual_percent,
                    c.requested_percent
                );
            }
        }
    }

    results.push(TestResult {
        name: "stats_territory_error".into(),
        passed: plan.average_error.is_finite() && (0.0..=100.0).contains(&plan.average_error),
        detail: format!("territory average error {:.2}%", plan.average_error),
    });

    results
}

// ── Output ──────────────────────────────────────────────────────────────

fn write_plan(plan: &TerritoryPlan, path: &str) -> TestResult {
    let outcome = serde_json::to_string_pretty(plan)
        .map_err(|e| e.to_string())
        .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
    TestResult {
        name: "plan_json_written".into(),
        passed: outcome.is_ok(),
        detail: match outcome {
            Ok(()) => format!("plan written to {}", path),
            Err(e) => e,
        },
    }
}
