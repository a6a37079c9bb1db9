//! Quota tables and their distribution down the hierarchy.
//!
//! A building's table is split across floors (ground floor reserved), floors
//! with identical results collapse into [`Pattern`]s, and each pattern's
//! table is split across sections by area. Every split reconciles exactly:
//! the children's counts always sum to the parent's.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::FeasibilityConfig;
use crate::error::{PlanError, Result};

/// Targets for one category of unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryQuota {
    pub area_min: f64,
    pub area_max: f64,
    /// Requested share of allocated area, in percent.
    #[serde(default)]
    pub target_percent: f64,
    pub target_count: u32,
}

impl CategoryQuota {
    pub fn new(area_min: f64, area_max: f64, target_percent: f64, target_count: u32) -> Self {
        Self {
            area_min,
            area_max,
            target_percent,
            target_count,
        }
    }

    pub fn mean_area(&self) -> f64 {
        (self.area_min + self.area_max) / 2.0
    }

    fn with_count(&self, target_count: u32) -> Self {
        Self {
            target_count,
            ..self.clone()
        }
    }
}

/// Category name → quota. Zero-count entries never survive construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, CategoryQuota>",
    into = "BTreeMap<String, CategoryQuota>"
)]
pub struct QuotaTable {
    entries: BTreeMap<String, CategoryQuota>,
}

impl From<BTreeMap<String, CategoryQuota>> for QuotaTable {
    fn from(mut entries: BTreeMap<String, CategoryQuota>) -> Self {
        entries.retain(|_, q| q.target_count > 0);
        Self { entries }
    }
}

impl From<QuotaTable> for BTreeMap<String, CategoryQuota> {
    fn from(table: QuotaTable) -> Self {
        table.entries
    }
}

impl FromIterator<(String, CategoryQuota)> for QuotaTable {
    fn from_iter<I: IntoIterator<Item = (String, CategoryQuota)>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<BTreeMap<_, _>>())
    }
}

impl QuotaTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a category; a zero count removes it.
    pub fn insert(&mut self, category: impl Into<String>, quota: CategoryQuota) {
        let category = category.into();
        if quota.target_count == 0 {
            self.entries.remove(&category);
        } else {
            self.entries.insert(category, quota);
        }
    }

    pub fn get(&self, category: &str) -> Option<&CategoryQuota> {
        self.entries.get(category)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CategoryQuota)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Category → count, the pattern signature of the table.
    pub fn counts(&self) -> BTreeMap<String, u32> {
        self.entries
            .iter()
            .map(|(k, q)| (k.clone(), q.target_count))
            .collect()
    }

    pub fn total_count(&self) -> u32 {
        self.entries.values().map(|q| q.target_count).sum()
    }

    /// `Σ (area_min·n + area_max·n) / 2` over categories.
    pub fn mean_potential_area(&self) -> f64 {
        self.entries
            .values()
            .map(|q| f64::from(q.target_count) * q.mean_area())
            .sum()
    }

    /// Same categories and area ranges with new counts. Categories missing
    /// from `counts` or mapped to zero are dropped.
    pub fn with_counts(&self, counts: &BTreeMap<String, u32>) -> Self {
        self.entries
            .iter()
            .filter_map(|(k, q)| {
                let n = counts.get(k).copied().unwrap_or(0);
                (n > 0).then(|| (k.clone(), q.with_count(n)))
            })
            .collect()
    }
}

// ── Floors ──────────────────────────────────────────────────────────────

/// Split a building table across `floors` floors. Index 0 is the ground
/// floor, which is empty whenever there is more than one floor.
pub fn distribute_to_floors(table: &QuotaTable, floors: u32) -> Result<Vec<QuotaTable>> {
    if floors == 0 {
        return Err(PlanError::InvalidInput("a building needs at least one floor".into()));
    }
    if floors == 1 {
        return Ok(vec![table.clone()]);
    }

    let upper = (floors - 1) as usize;
    let mut counts: Vec<BTreeMap<String, u32>> = vec![BTreeMap::new(); upper];
    let mut loads = vec![0u32; upper];
    let mut remainders: BTreeMap<String, u32> = BTreeMap::new();

    for (category, quota) in table.iter() {
        let base = quota.target_count / upper as u32;
        for (floor, load) in counts.iter_mut().zip(loads.iter_mut()) {
            floor.insert(category.clone(), base);
            *load += base;
        }
        remainders.insert(category.clone(), quota.target_count % upper as u32);
    }

    loop {
        // largest remainder first; equal remainders in name order
        let Some((category, r)) = remainders
            .iter()
            .filter(|(_, &r)| r > 0)
            .fold(None, |best: Option<(&String, u32)>, (k, &r)| match best {
                Some((_, b)) if b >= r => best,
                _ => Some((k, r)),
            })
            .map(|(k, r)| (k.clone(), r))
        else {
            break;
        };

        let k = (r as usize).min(upper);
        let share = r / k as u32;
        let mut order: Vec<usize> = (0..upper).collect();
        order.sort_by_key(|&f| (loads[f], f));
        for &f in order.iter().take(k) {
            *counts[f].entry(category.clone()).or_default() += share;
            loads[f] += share;
        }
        remainders.insert(category, r - share * k as u32);
    }

    let mut tables = Vec::with_capacity(floors as usize);
    tables.push(QuotaTable::new());
    tables.extend(counts.iter().map(|c| table.with_counts(c)));
    Ok(tables)
}

// ── Patterns ────────────────────────────────────────────────────────────

/// A floor table shared by one or more floors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub counts: BTreeMap<String, u32>,
    pub table: QuotaTable,
    /// Floor indices using this pattern, ascending.
    pub floors: Vec<usize>,
    pub repeat_count: usize,
}

impl Pattern {
    pub fn total_count(&self) -> u32 {
        self.counts.values().sum()
    }

    /// At least as many units as `other` in every category.
    pub fn dominates(&self, other: &Pattern) -> bool {
        other
            .counts
            .iter()
            .all(|(k, &n)| self.counts.get(k).copied().unwrap_or(0) >= n)
    }
}

/// Collapse floors with equal count maps into patterns, in order of first
/// appearance. Empty floors are not patterns.
pub fn deduplicate_patterns(floors: &[QuotaTable]) -> Vec<Pattern> {
    let mut patterns: Vec<Pattern> = Vec::new();
    for (index, table) in floors.iter().enumerate() {
        if table.is_empty() {
            continue;
        }
        let counts = table.counts();
        match patterns.iter_mut().find(|p| p.counts == counts) {
            Some(p) => {
                p.floors.push(index);
                p.repeat_count += 1;
            }
            None => patterns.push(Pattern {
                counts,
                table: table.clone(),
                floors: vec![index],
                repeat_count: 1,
            }),
        }
    }
    patterns
}

/// Patterns sorted by descending total count, so that larger templates are
/// generated before the patterns they dominate.
pub fn generation_order(mut patterns: Vec<Pattern>) -> Vec<Pattern> {
    patterns.sort_by(|a, b| b.total_count().cmp(&a.total_count()));
    patterns
}

// ── Sections ────────────────────────────────────────────────────────────

/// Split `total` proportionally to `areas`. All but the last part get
/// `floor(total · ratio)`; the last gets the exact remainder.
pub fn split_by_area(total: u32, areas: &[f64]) -> Vec<u32> {
    let Some(last) = areas.len().checked_sub(1) else {
        return Vec::new();
    };
    let sum: f64 = areas.iter().map(|a| a.max(0.0)).sum();
    let mut parts = Vec::with_capacity(areas.len());
    let mut assigned = 0u32;
    for &area in &areas[..last] {
        let ratio = if sum > 0.0 {
            area.max(0.0) / sum
        } else {
            1.0 / areas.len() as f64
        };
        let share = ((f64::from(total) * ratio).floor() as u32).min(total - assigned);
        parts.push(share);
        assigned += share;
    }
    parts.push(total - assigned);
    parts
}

/// Split a floor table across sections by section area.
pub fn distribute_to_sections(table: &QuotaTable, areas: &[f64]) -> Vec<QuotaTable> {
    let mut counts: Vec<BTreeMap<String, u32>> = vec![BTreeMap::new(); areas.len()];
    for (category, quota) in table.iter() {
        for (section, n) in split_by_area(quota.target_count, areas).into_iter().enumerate() {
            counts[section].insert(category.clone(), n);
        }
    }
    counts.iter().map(|c| table.with_counts(c)).collect()
}

// ── Feasibility ─────────────────────────────────────────────────────────

/// Area a building's apartments may occupy across all its floors.
pub fn building_capacity(area: f64, floors: u32, cfg: &FeasibilityConfig) -> f64 {
    if floors <= 1 {
        cfg.single_floor_occupancy * area
    } else {
        area * (cfg.ground_floor_occupancy + cfg.upper_floor_occupancy * f64::from(floors - 1))
    }
}

fn check_capacity(unit: &str, table: &QuotaTable, capacity: f64) -> Result<()> {
    let requested_area = table.mean_potential_area();
    if requested_area > capacity {
        return Err(PlanError::InfeasibleQuota {
            unit: unit.to_string(),
            requested_area,
            capacity,
            reduction: requested_area - capacity,
        });
    }
    Ok(())
}

/// Reject a building table that cannot fit before any allocation starts.
pub fn validate_initial_planning(
    unit: &str,
    area: f64,
    table: &QuotaTable,
    floors: u32,
    cfg: &FeasibilityConfig,
) -> Result<()> {
    check_capacity(unit, table, building_capacity(area, floors, cfg))
}

/// Section-level gate: `section_occupancy · area`.
pub fn validate_section_planning(
    unit: &str,
    area: f64,
    table: &QuotaTable,
    cfg: &FeasibilityConfig,
) -> Result<()> {
    check_capacity(unit, table, cfg.section_occupancy * area)
}

// ── Pattern copies ──────────────────────────────────────────────────────

/// Remove surplus units so each category's count drops to `target`.
///
/// The unit removed is always the last one of that category in the section
/// currently holding the most of it (lowest index on ties). Returns the
/// number removed per category.
pub fn trim_surplus<T, F>(
    sections: &mut [Vec<T>],
    target: &BTreeMap<String, u32>,
    category_of: F,
) -> BTreeMap<String, u32>
where
    F: Fn(&T) -> &str,
{
    let mut realised: BTreeMap<String, u32> = BTreeMap::new();
    for unit in sections.iter().flatten() {
        *realised.entry(category_of(unit).to_string()).or_default() += 1;
    }

    let mut removed = BTreeMap::new();
    for (category, have) in realised {
        let want = target.get(&category).copied().unwrap_or(0);
        for _ in want..have {
            let holding = |s: &Vec<T>| s.iter().filter(|u| category_of(u) == category).count();
            let Some(section) = (0..sections.len())
                .filter(|&k| holding(&sections[k]) > 0)
                .max_by_key(|&k| (holding(&sections[k]), std::cmp::Reverse(k)))
            else {
                break;
            };
            if let Some(pos) = sections[section]
                .iter()
                .rposition(|u| category_of(u) == category)
            {
                sections[section].remove(pos);
                *removed.entry(category.clone()).or_default() += 1;
            }
        }
    }
    removed
}
