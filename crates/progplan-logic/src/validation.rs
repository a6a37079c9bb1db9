//! Structural validation of generated plans.
//!
//! Pure functions that take plan output and return validation errors.

use std::collections::{BTreeMap, HashSet};

use geo::{Area, BooleanOps, MultiPolygon};

use crate::hierarchy::{BuildingPlan, FloorPlan, TerritoryPlan};
use crate::layout::EngineState;
use crate::shape::is_connected;

/// Area (world units²) tolerated as numerical overlap or spill.
const AREA_TOLERANCE: f64 = 1e-3;

/// A plan validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub category: &'static str,
    pub severity: Severity,
    pub message: String,
}

/// Error severity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Severity {
    Error,
    Warning,
}

fn floor_label(building: &BuildingPlan, floor: &FloorPlan) -> String {
    format!("{}/f{}", building.name, floor.index)
}

// ── A. Regions ──────────────────────────────────────────────────────────

/// No two apartments of a section share a cell, and no two apartments of a
/// floor overlap in area.
pub fn check_disjoint(building: &BuildingPlan) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for floor in &building.floors {
        let label = floor_label(building, floor);
        for section in &floor.sections {
            let mut seen = HashSet::new();
            for apartment in &section.apartments {
                for c in &apartment.cells {
                    if !seen.insert(*c) {
                        errors.push(ValidationError {
                            category: "disjoint",
                            severity: Severity::Error,
                            message: format!(
                                "{label}/s{}: cell ({}, {}) allocated twice",
                                section.index, c.i, c.j
                            ),
                        });
                    }
                }
            }
        }

        let apartments: Vec<_> = floor.apartments().collect();
        for i in 0..apartments.len() {
            for j in (i + 1)..apartments.len() {
                let (a, b) = (apartments[i], apartments[j]);
                let shared = a.polygon.intersection(&b.polygon).unsigned_area();
                if shared > AREA_TOLERANCE {
                    errors.push(ValidationError {
                        category: "disjoint",
                        severity: Severity::Error,
                        message: format!(
                            "{label}: apartments #{} and #{} overlap by {shared:.3}",
                            a.id, b.id
                        ),
                    });
                }
            }
        }
    }
    errors
}

/// Every apartment's cell set is 8-connected.
pub fn check_connected(building: &BuildingPlan) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for floor in &building.floors {
        for apartment in floor.apartments() {
            if !is_connected(&apartment.cells) {
                errors.push(ValidationError {
                    category: "connectivity",
                    severity: Severity::Error,
                    message: format!(
                        "{}: apartment #{} ({}) is not contiguous",
                        floor_label(building, floor),
                        apartment.id,
                        apartment.category
                    ),
                });
            }
        }
    }
    errors
}

/// Apartments and rooms stay inside their section polygon.
pub fn check_within_section(building: &BuildingPlan) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for floor in &building.floors {
        for section in &floor.sections {
            let outline = MultiPolygon::new(vec![section.polygon.clone()]);
            for apartment in &section.apartments {
                let spill = |p: &geo::Polygon<f64>| {
                    MultiPolygon::new(vec![p.clone()])
                        .difference(&outline)
                        .unsigned_area()
                };
                let outside = spill(&apartment.polygon);
                if outside > AREA_TOLERANCE {
                    errors.push(ValidationError {
                        category: "containment",
                        severity: Severity::Error,
                        message: format!(
                            "{}/s{}: apartment #{} extends {outside:.3} outside its section",
                            floor_label(building, floor),
                            section.index,
                            apartment.id
                        ),
                    });
                }
                for room in &apartment.rooms {
                    let outside = spill(&room.polygon);
                    if outside > AREA_TOLERANCE {
                        errors.push(ValidationError {
                            category: "containment",
                            severity: Severity::Error,
                            message: format!(
                                "{}/s{}: {} of apartment #{} extends {outside:.3} outside its section",
                                floor_label(building, floor),
                                section.index,
                                room.category,
                                apartment.id
                            ),
                        });
                    }
                }
            }
        }
    }
    errors
}

// ── B. Quota conformance ────────────────────────────────────────────────

/// Per-floor counts never exceed the floor's pattern; shortfalls are
/// warnings. Freshly generated sections that were accepted must match their
/// quota exactly.
pub fn check_counts(building: &BuildingPlan) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for floor in &building.floors {
        let label = floor_label(building, floor);
        let Some(pattern) = floor.pattern.and_then(|p| building.patterns.get(p)) else {
            continue;
        };

        let mut realised: BTreeMap<&str, u32> = BTreeMap::new();
        for apartment in floor.apartments() {
            *realised.entry(apartment.category.as_str()).or_default() += 1;
        }
        for (category, &have) in &realised {
            let want = pattern.counts.get(*category).copied().unwrap_or(0);
            if have > want {
                errors.push(ValidationError {
                    category: "count",
                    severity: Severity::Error,
                    message: format!("{label}: {have} {category} placed, {want} requested"),
                });
            }
        }
        for (category, &want) in &pattern.counts {
            let have = realised.get(category.as_str()).copied().unwrap_or(0);
            if have < want {
                errors.push(ValidationError {
                    category: "count",
                    severity: Severity::Warning,
                    message: format!("{label}: {have} of {want} {category} placed"),
                });
            }
        }

        if floor.copied_from.is_some() {
            continue;
        }
        for section in &floor.sections {
            let requested = section.quota.total_count() as usize;
            if section.state == EngineState::Accepted && section.apartments.len() != requested {
                errors.push(ValidationError {
                    category: "count",
                    severity: Severity::Error,
                    message: format!(
                        "{label}/s{}: accepted with {} apartments, {requested} requested",
                        section.index,
                        section.apartments.len()
                    ),
                });
            }
        }
    }
    errors
}

/// The ground floor of a multi-floor building holds no apartments.
pub fn check_ground_floor(building: &BuildingPlan) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if building.floors.len() > 1 {
        if let Some(ground) = building.floors.first() {
            let count = ground.apartment_count();
            if count > 0 {
                errors.push(ValidationError {
                    category: "ground_floor",
                    severity: Severity::Error,
                    message: format!("{}: ground floor has {count} apartments", building.name),
                });
            }
        }
    }
    errors
}

// ── Master validation ───────────────────────────────────────────────────

/// Run all building validations and return combined results.
pub fn validate_building(building: &BuildingPlan) -> Vec<ValidationError> {
    let mut all = Vec::new();
    all.extend(check_disjoint(building));
    all.extend(check_connected(building));
    all.extend(check_within_section(building));
    all.extend(check_counts(building));
    all.extend(check_ground_floor(building));
    all
}

/// Validate every building of a territory.
pub fn validate_territory(territory: &TerritoryPlan) -> Vec<ValidationError> {
    territory
        .buildings
        .iter()
        .flat_map(validate_building)
        .collect()
}
