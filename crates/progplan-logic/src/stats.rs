//! Per-category statistics of a generated building.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::quota::QuotaTable;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub category: String,
    pub requested_count: u32,
    pub actual_count: u32,
    /// Mean area of the realised units (0 when none).
    pub average_area: f64,
    pub requested_percent: f64,
    /// Share of all allocated area, in percent.
    pub actual_percent: f64,
    /// `|actual_percent − requested_percent|`.
    pub error: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingStats {
    pub categories: Vec<CategoryStats>,
    pub total_area: f64,
    pub average_error: f64,
}

impl BuildingStats {
    pub fn category(&self, name: &str) -> Option<&CategoryStats> {
        self.categories.iter().find(|c| c.category == name)
    }

    pub fn actual_count(&self) -> u32 {
        self.categories.iter().map(|c| c.actual_count).sum()
    }
}

/// Requested area share per category. Tables without any target percent
/// fall back to each category's share of the mean potential area.
fn requested_percents(quota: &QuotaTable) -> BTreeMap<String, f64> {
    let explicit: f64 = quota.iter().map(|(_, q)| q.target_percent).sum();
    if explicit > 0.0 {
        return quota
            .iter()
            .map(|(k, q)| (k.clone(), q.target_percent))
            .collect();
    }
    let potential = quota.mean_potential_area();
    quota
        .iter()
        .map(|(k, q)| {
            let share = if potential > 0.0 {
                f64::from(q.target_count) * q.mean_area() / potential * 100.0
            } else {
                0.0
            };
            (k.clone(), share)
        })
        .collect()
}

/// Compare realised `(category, area)` units against the requested table.
pub fn building_stats<'a>(
    quota: &QuotaTable,
    units: impl IntoIterator<Item = (&'a str, f64)>,
) -> BuildingStats {
    let mut realised: BTreeMap<String, (u32, f64)> = BTreeMap::new();
    for (category, area) in units {
        let entry = realised.entry(category.to_string()).or_default();
        entry.0 += 1;
        entry.1 += area;
    }
    let total_area: f64 = realised.values().map(|(_, a)| a).sum();
    let requested = requested_percents(quota);

    let mut names: Vec<String> = quota.iter().map(|(k, _)| k.clone()).collect();
    for k in realised.keys() {
        if !names.contains(k) {
            names.push(k.clone());
        }
    }

    let categories: Vec<CategoryStats> = names
        .into_iter()
        .map(|category| {
            let (actual_count, area) = realised.get(&category).copied().unwrap_or_default();
            let requested_percent = requested.get(&category).copied().unwrap_or(0.0);
            let actual_percent = if total_area > 0.0 {
                area / total_area * 100.0
            } else {
                0.0
            };
            CategoryStats {
                requested_count: quota.get(&category).map_or(0, |q| q.target_count),
                actual_count,
                average_area: if actual_count > 0 {
                    area / f64::from(actual_count)
                } else {
                    0.0
                },
                requested_percent,
                actual_percent,
                error: (actual_percent - requested_percent).abs(),
                category,
            }
        })
        .collect();

    let average_error = if categories.is_empty() {
        0.0
    } else {
        categories.iter().map(|c| c.error).sum::<f64>() / categories.len() as f64
    };

    BuildingStats {
        categories,
        total_area,
        average_error,
    }
}

/// Mean of the buildings' average errors.
pub fn territory_average_error<'a>(buildings: impl IntoIterator<Item = &'a BuildingStats>) -> f64 {
    let (sum, n) = buildings
        .into_iter()
        .fold((0.0, 0usize), |(s, n), b| (s + b.average_error, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}
