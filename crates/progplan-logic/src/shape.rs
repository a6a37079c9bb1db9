//! Shape quality and connectivity metrics for regions.
//!
//! Rectangularity compares a region to its bounding envelope; contact and
//! side classification are evaluated on the lattice, where region boundaries
//! are runs of cell edges.

use std::collections::{BTreeMap, HashSet, VecDeque};

use geo::{Area, BoundingRect, Line, Polygon};
use serde::{Deserialize, Serialize};

use crate::constants::EPSILON;
use crate::grid::{CellCoord, Outside, PolygonGrid, DIAGONAL, ORTHOGONAL};

/// `|area(envelope) − area| / area`: 0 for an exact rectangle.
pub fn rectangularity(polygon: &Polygon<f64>) -> f64 {
    let area = polygon.unsigned_area();
    if area <= EPSILON {
        return f64::INFINITY;
    }
    let envelope = polygon
        .bounding_rect()
        .map_or(0.0, |r| r.width() * r.height());
    (envelope - area).abs() / area
}

/// Sum of region rectangularities; the plan score to minimise.
pub fn plan_rectangularity<'a>(polygons: impl IntoIterator<Item = &'a Polygon<f64>>) -> f64 {
    polygons.into_iter().map(rectangularity).sum()
}

/// Running lattice bounding box of a growing cell set.
#[derive(Debug, Clone, Copy, Default)]
pub struct CellBounds {
    min_i: i32,
    max_i: i32,
    min_j: i32,
    max_j: i32,
    count: usize,
}

impl CellBounds {
    pub fn push(&mut self, c: CellCoord) {
        if self.count == 0 {
            self.min_i = c.i;
            self.max_i = c.i;
            self.min_j = c.j;
            self.max_j = c.j;
        } else {
            self.min_i = self.min_i.min(c.i);
            self.max_i = self.max_i.max(c.i);
            self.min_j = self.min_j.min(c.j);
            self.max_j = self.max_j.max(c.j);
        }
        self.count += 1;
    }

    /// Lattice rectangularity of the cells pushed so far.
    pub fn rectangularity(&self) -> f64 {
        if self.count == 0 {
            return f64::INFINITY;
        }
        let w = i64::from(self.max_i - self.min_i + 1);
        let h = i64::from(self.max_j - self.min_j + 1);
        let envelope = (w * h) as f64;
        (envelope - self.count as f64) / self.count as f64
    }
}

/// Length of region boundary shared with unassigned cells.
///
/// Expects the region's own cells to be marked assigned in `grid`.
pub fn contact_length(grid: &PolygonGrid, cells: &[CellCoord]) -> f64 {
    let edges = cells
        .iter()
        .flat_map(|c| ORTHOGONAL.iter().map(move |&(di, dj)| c.offset(di, dj)))
        .filter(|&n| grid.is_free(n))
        .count();
    edges as f64 * grid.cell_size()
}

/// A region is an outsider when its contact with remaining free space is
/// empty, a point, or shorter than `min_contact`. With no free space left on
/// the level there is nothing to be cut off from.
pub fn is_outsider(grid: &PolygonGrid, cells: &[CellCoord], min_contact: f64) -> bool {
    if grid.unassigned_count() == 0 {
        return false;
    }
    let contact = contact_length(grid, cells);
    contact <= EPSILON || contact + EPSILON < min_contact
}

/// What a boundary segment of a region faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SideKind {
    /// Another region at the same level.
    Sibling,
    /// Unassigned space at the same level.
    Free,
    /// The rest of the parent unit (e.g. another section).
    Parent,
    /// Outside the outermost polygon.
    Outer,
}

/// A maximal straight run of region boundary facing one kind of neighbour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Side {
    pub kind: SideKind,
    pub line: Line<f64>,
}

/// Classify and merge the boundary edges of a region.
pub fn classify_sides(grid: &PolygonGrid, cells: &[CellCoord]) -> Vec<Side> {
    let members: HashSet<CellCoord> = cells.iter().copied().collect();
    // (kind, direction, fixed lattice line) -> run starts along the line
    let mut runs: BTreeMap<(SideKind, usize, i32), Vec<i32>> = BTreeMap::new();

    for &c in cells {
        for (dir, &(di, dj)) in ORTHOGONAL.iter().enumerate() {
            let n = c.offset(di, dj);
            if members.contains(&n) {
                continue;
            }
            let kind = if grid.contains(n) {
                if grid.is_free(n) {
                    SideKind::Free
                } else {
                    SideKind::Sibling
                }
            } else {
                match grid.outside_kind(n) {
                    Outside::Parent => SideKind::Parent,
                    Outside::Outer => SideKind::Outer,
                }
            };
            let (fixed, start) = match dir {
                0 => (c.i + 1, c.j),
                1 => (c.i, c.j),
                2 => (c.j + 1, c.i),
                _ => (c.j, c.i),
            };
            runs.entry((kind, dir, fixed)).or_default().push(start);
        }
    }

    let mut sides = Vec::new();
    for ((kind, dir, fixed), mut starts) in runs {
        starts.sort_unstable();
        let mut k = 0;
        while k < starts.len() {
            let from = starts[k];
            let mut to = from + 1;
            while k + 1 < starts.len() && starts[k + 1] == to {
                to += 1;
                k += 1;
            }
            let line = if dir < 2 {
                Line::new(grid.lattice_point(fixed, from), grid.lattice_point(fixed, to))
            } else {
                Line::new(grid.lattice_point(from, fixed), grid.lattice_point(to, fixed))
            };
            sides.push(Side { kind, line });
            k += 1;
        }
    }
    sides
}

/// Lines of the given kind, in classification order.
pub fn sides_of_kind(sides: &[Side], kind: SideKind) -> Vec<Line<f64>> {
    sides
        .iter()
        .filter(|s| s.kind == kind)
        .map(|s| s.line)
        .collect()
}

/// Whether a cell set is connected under 8-adjacency.
pub fn is_connected(cells: &[CellCoord]) -> bool {
    let Some(&start) = cells.first() else {
        return true;
    };
    let members: HashSet<CellCoord> = cells.iter().copied().collect();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    seen.insert(start);
    queue.push_back(start);
    while let Some(c) = queue.pop_front() {
        for &(di, dj) in ORTHOGONAL.iter().chain(DIAGONAL.iter()) {
            let n = c.offset(di, dj);
            if members.contains(&n) && seen.insert(n) {
                queue.push_back(n);
            }
        }
    }
    seen.len() == members.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{polygon_from_vertices, square, union_all};

    fn block(i0: i32, j0: i32, w: i32, h: i32) -> Vec<CellCoord> {
        let mut cells = Vec::new();
        for i in i0..i0 + w {
            for j in j0..j0 + h {
                cells.push(CellCoord::new(i, j));
            }
        }
        cells
    }

    fn lattice_rectangularity(cells: &[CellCoord]) -> f64 {
        let mut bounds = CellBounds::default();
        for &c in cells {
            bounds.push(c);
        }
        bounds.rectangularity()
    }

    fn rect_grid(w: f64, h: f64) -> PolygonGrid {
        let p = polygon_from_vertices(&[[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]]).unwrap();
        PolygonGrid::build(&p, 1.0, None).unwrap()
    }

    #[test]
    fn rectangle_scores_zero() {
        let cells = block(0, 0, 3, 2);
        assert!(lattice_rectangularity(&cells).abs() < 1e-12);
        let merged = union_all(
            cells
                .iter()
                .map(|c| square(f64::from(c.i), f64::from(c.j), 1.0))
                .collect(),
        );
        assert!(rectangularity(&merged.0[0]).abs() < 1e-9);
    }

    #[test]
    fn l_shape_scores_positive() {
        let mut cells = block(0, 0, 3, 1);
        cells.push(CellCoord::new(0, 1));
        cells.push(CellCoord::new(0, 2));
        // 5 cells in a 3x3 envelope
        assert!((lattice_rectangularity(&cells) - 0.8).abs() < 1e-12);
        let l = polygon_from_vertices(&[
            [0.0, 0.0],
            [3.0, 0.0],
            [3.0, 1.0],
            [1.0, 1.0],
            [1.0, 3.0],
            [0.0, 3.0],
        ])
        .unwrap();
        assert!(rectangularity(&l) > 0.0);
    }

    #[test]
    fn plan_score_sums_regions() {
        let a = square(0.0, 0.0, 2.0);
        let l = polygon_from_vertices(&[
            [0.0, 0.0],
            [2.0, 0.0],
            [2.0, 1.0],
            [1.0, 1.0],
            [1.0, 2.0],
            [0.0, 2.0],
        ])
        .unwrap();
        let score = plan_rectangularity([&a, &l]);
        assert!((score - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn contact_with_free_space() {
        let mut grid = rect_grid(6.0, 4.0);
        let region = block(0, 0, 2, 2);
        for &c in &region {
            grid.set_owner(c, Some(0));
        }
        // right side (2 edges) and top side (2 edges)
        assert!((contact_length(&grid, &region) - 4.0).abs() < 1e-12);
        assert!(!is_outsider(&grid, &region, 2.0));
    }

    #[test]
    fn enclosed_region_is_outsider() {
        let mut grid = rect_grid(4.0, 1.0);
        for i in 1..4 {
            grid.set_owner(CellCoord::new(i, 0), Some(1));
        }
        let region = vec![CellCoord::new(0, 0)];
        grid.set_owner(region[0], Some(0));
        // no free cells at all: vacuous
        assert!(!is_outsider(&grid, &region, 2.0));

        let mut grid = rect_grid(5.0, 1.0);
        grid.set_owner(CellCoord::new(1, 0), Some(1));
        grid.set_owner(CellCoord::new(0, 0), Some(0));
        assert!(is_outsider(&grid, &[CellCoord::new(0, 0)], 2.0));
    }

    #[test]
    fn short_contact_is_outsider() {
        let mut grid = rect_grid(4.0, 4.0);
        let region = block(0, 0, 1, 4);
        for &c in &region {
            grid.set_owner(c, Some(0));
        }
        for j in 0..3 {
            grid.set_owner(CellCoord::new(1, j), Some(1));
        }
        assert!((contact_length(&grid, &region) - 1.0).abs() < 1e-12);
        assert!(is_outsider(&grid, &region, 2.0));
        assert!(!is_outsider(&grid, &region, 1.0));
    }

    #[test]
    fn sides_are_classified_and_merged() {
        let mut grid = rect_grid(6.0, 4.0);
        let region = block(0, 0, 2, 2);
        for &c in &region {
            grid.set_owner(c, Some(0));
        }
        grid.set_owner(CellCoord::new(2, 0), Some(1));
        let sides = classify_sides(&grid, &region);

        let outer = sides_of_kind(&sides, SideKind::Outer);
        assert_eq!(outer.len(), 2, "left and bottom facade: {outer:?}");
        let free = sides_of_kind(&sides, SideKind::Free);
        assert_eq!(free.len(), 2, "top run and upper right edge");
        let sibling = sides_of_kind(&sides, SideKind::Sibling);
        assert_eq!(sibling.len(), 1);

        let bottom = outer
            .iter()
            .find(|l| l.start.y.abs() < 1e-12 && l.end.y.abs() < 1e-12)
            .unwrap();
        assert!(((bottom.end.x - bottom.start.x).abs() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn connectivity_flood_fill() {
        assert!(is_connected(&block(0, 0, 3, 3)));
        assert!(is_connected(&[CellCoord::new(0, 0), CellCoord::new(1, 1)]));
        assert!(!is_connected(&[CellCoord::new(0, 0), CellCoord::new(2, 0)]));
        assert!(is_connected(&[]));
    }
}
