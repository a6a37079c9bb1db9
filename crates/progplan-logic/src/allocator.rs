//! Contiguous region growth by prioritised breadth-first search.
//!
//! The allocator owns no cells; it flips `assigned` flags on the grid it is
//! handed and restores them on failure. Seeds are chosen from, in order, the
//! corner queue fed by earlier placements, build-time corners on the outer
//! boundary, perimeter cells clear of other regions, and anything free.

use std::cmp::Reverse;
use std::collections::{HashMap, VecDeque};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::{EngineConfig, NeighborOrder};
use crate::grid::{CellCoord, PolygonGrid, ORTHOGONAL};
use crate::shape::CellBounds;

/// Target size of one region, in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationRequest {
    pub min_cells: usize,
    pub max_cells: usize,
}

impl AllocationRequest {
    pub fn new(min_cells: usize, max_cells: usize) -> Self {
        let min_cells = min_cells.max(1);
        Self {
            min_cells,
            max_cells: max_cells.max(min_cells),
        }
    }
}

/// Grows one region at a time on a [`PolygonGrid`].
#[derive(Debug, Clone)]
pub struct RegionAllocator {
    order: NeighborOrder,
    diagonal_expansion: bool,
    rect_tolerance: f64,
    corner_queue: VecDeque<CellCoord>,
    /// Free cells reachable from a seed when it last failed. Placements only
    /// shrink free space, so a request larger than this cannot succeed there.
    reach: HashMap<CellCoord, usize>,
}

impl RegionAllocator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            order: config.neighbor_order,
            diagonal_expansion: config.diagonal_expansion,
            rect_tolerance: config.rect_tolerance,
            corner_queue: VecDeque::new(),
            reach: HashMap::new(),
        }
    }

    /// Forget per-iteration state. Call together with `PolygonGrid::reset`.
    pub fn reset(&mut self) {
        self.corner_queue.clear();
        self.reach.clear();
    }

    fn viable(&self, c: CellCoord, min_cells: usize) -> bool {
        self.reach.get(&c).map_or(true, |&r| r >= min_cells)
    }

    /// Choose the start cell for the next region.
    pub fn pick_seed<R: Rng + ?Sized>(
        &mut self,
        grid: &PolygonGrid,
        min_cells: usize,
        rng: &mut R,
    ) -> Option<CellCoord> {
        while let Some(c) = self.corner_queue.pop_front() {
            if grid.is_free(c) && self.viable(c, min_cells) {
                return Some(c);
            }
        }

        let free: Vec<_> = grid
            .cells()
            .iter()
            .filter(|cell| !cell.assigned && self.viable(cell.coord, min_cells))
            .collect();
        if free.is_empty() {
            return None;
        }

        let outer_corners: Vec<CellCoord> = free
            .iter()
            .filter(|cell| cell.is_corner && cell.on_outer_boundary)
            .map(|cell| cell.coord)
            .collect();
        if let Some(&c) = outer_corners.choose(rng) {
            return Some(c);
        }

        let clear_perimeter: Vec<CellCoord> = free
            .iter()
            .filter(|cell| {
                cell.on_perimeter && cell.neighbors.iter().all(|&n| grid.is_free(n))
            })
            .map(|cell| cell.coord)
            .collect();
        if let Some(&c) = clear_perimeter.choose(rng) {
            return Some(c);
        }

        free.choose(rng).map(|cell| cell.coord)
    }

    fn expansion(&self, grid: &PolygonGrid, c: CellCoord) -> Vec<CellCoord> {
        if self.diagonal_expansion {
            grid.cell(c)
                .map(|cell| cell.neighbors.clone())
                .unwrap_or_default()
        } else {
            ORTHOGONAL
                .iter()
                .map(|&(di, dj)| c.offset(di, dj))
                .filter(|&n| grid.contains(n))
                .collect()
        }
    }

    /// Grow a region of `request` size from the next seed.
    ///
    /// Returns the cells (marked assigned) or `None` with the grid untouched
    /// when fewer than `min_cells` are reachable.
    pub fn allocate<R: Rng + ?Sized>(
        &mut self,
        grid: &mut PolygonGrid,
        request: AllocationRequest,
        rng: &mut R,
    ) -> Option<Vec<CellCoord>> {
        let AllocationRequest {
            min_cells,
            max_cells,
        } = request;
        let seed = self.pick_seed(grid, min_cells, rng)?;

        let mut region = Vec::with_capacity(max_cells);
        let mut bounds = CellBounds::default();
        let mut queue = VecDeque::from([seed]);

        while let Some(c) = queue.pop_front() {
            if !grid.is_free(c) {
                continue;
            }
            grid.set_assigned(c, true);
            region.push(c);
            bounds.push(c);

            if region.len() >= max_cells {
                break;
            }
            if region.len() >= min_cells && bounds.rectangularity() <= self.rect_tolerance {
                break;
            }

            let mut next: Vec<(usize, CellCoord)> = self
                .expansion(grid, c)
                .into_iter()
                .filter(|&n| grid.is_free(n))
                .map(|n| (grid.free_neighbor_count(n), n))
                .collect();
            match self.order {
                NeighborOrder::FewestFreeFirst => next.sort_by_key(|&(k, n)| (k, n)),
                NeighborOrder::MostFreeFirst => next.sort_by_key(|&(k, n)| (Reverse(k), n)),
            }
            queue.extend(next.into_iter().map(|(_, n)| n));
        }

        if region.len() < min_cells {
            self.reach.insert(seed, region.len());
            self.release(grid, &region);
            return None;
        }
        Some(region)
    }

    /// Return cells to the free pool.
    pub fn release(&self, grid: &mut PolygonGrid, cells: &[CellCoord]) {
        for &c in cells {
            grid.set_assigned(c, false);
        }
    }

    /// Queue free cells next to a committed region that have become corners:
    /// blocked both horizontally and vertically.
    pub fn note_placed(&mut self, grid: &mut PolygonGrid, cells: &[CellCoord]) {
        let mut fresh = Vec::new();
        for &c in cells {
            for &(di, dj) in &ORTHOGONAL {
                let n = c.offset(di, dj);
                if !grid.is_free(n) || fresh.contains(&n) {
                    continue;
                }
                if grid.cell(n).is_some_and(|cell| cell.is_corner) {
                    continue;
                }
                let blocked = |m: CellCoord| !grid.is_free(m);
                let horizontal = blocked(n.offset(1, 0)) || blocked(n.offset(-1, 0));
                let vertical = blocked(n.offset(0, 1)) || blocked(n.offset(0, -1));
                if horizontal && vertical {
                    fresh.push(n);
                }
            }
        }
        for n in fresh {
            grid.mark_corner(n);
            self.corner_queue.push_back(n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::polygon_from_vertices;
    use crate::shape::is_connected;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rect_grid(w: f64, h: f64) -> PolygonGrid {
        let p = polygon_from_vertices(&[[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]]).unwrap();
        PolygonGrid::build(&p, 1.0, None).unwrap()
    }

    fn allocator() -> RegionAllocator {
        RegionAllocator::new(&EngineConfig::default())
    }

    #[test]
    fn grows_region_within_range() {
        let mut grid = rect_grid(10.0, 8.0);
        let mut alloc = allocator();
        let mut rng = StdRng::seed_from_u64(1);
        let region = alloc
            .allocate(&mut grid, AllocationRequest::new(12, 16), &mut rng)
            .unwrap();
        assert!(region.len() >= 12 && region.len() <= 16);
        assert!(is_connected(&region));
        assert_eq!(grid.unassigned_count(), 80 - region.len());
    }

    #[test]
    fn first_seed_is_an_outer_corner() {
        let grid = rect_grid(10.0, 8.0);
        let mut alloc = allocator();
        let mut rng = StdRng::seed_from_u64(2);
        let seed = alloc.pick_seed(&grid, 1, &mut rng).unwrap();
        assert!(grid.cell(seed).unwrap().is_corner);
    }

    #[test]
    fn failure_rolls_back_everything() {
        let mut grid = rect_grid(3.0, 3.0);
        let mut alloc = allocator();
        let mut rng = StdRng::seed_from_u64(3);
        assert!(alloc
            .allocate(&mut grid, AllocationRequest::new(20, 30), &mut rng)
            .is_none());
        assert_eq!(grid.unassigned_count(), 9);
    }

    #[test]
    fn exhausted_grid_yields_none() {
        let mut grid = rect_grid(2.0, 2.0);
        let mut alloc = allocator();
        let mut rng = StdRng::seed_from_u64(4);
        let all = alloc
            .allocate(&mut grid, AllocationRequest::new(4, 4), &mut rng)
            .unwrap();
        assert_eq!(all.len(), 4);
        assert!(alloc
            .allocate(&mut grid, AllocationRequest::new(1, 1), &mut rng)
            .is_none());
    }

    #[test]
    fn regions_never_share_cells() {
        let mut grid = rect_grid(12.0, 10.0);
        let mut alloc = allocator();
        let mut rng = StdRng::seed_from_u64(5);
        let mut seen = std::collections::HashSet::new();
        for id in 0..6 {
            let Some(region) = alloc.allocate(&mut grid, AllocationRequest::new(10, 14), &mut rng)
            else {
                continue;
            };
            for &c in &region {
                assert!(seen.insert(c), "cell {c:?} allocated twice");
                grid.set_owner(c, Some(id));
            }
            alloc.note_placed(&mut grid, &region);
        }
        assert!(!seen.is_empty());
    }

    #[test]
    fn exact_rectangle_stops_early() {
        // A 2-wide corridor fills as 2x2 blocks; 4 cells is a perfect square.
        let mut grid = rect_grid(2.0, 6.0);
        let mut alloc = allocator();
        let mut rng = StdRng::seed_from_u64(6);
        let region = alloc
            .allocate(&mut grid, AllocationRequest::new(2, 10), &mut rng)
            .unwrap();
        assert!(region.len() <= 10);
        assert!(is_connected(&region));
    }

    #[test]
    fn placement_creates_queued_corners() {
        let mut grid = rect_grid(6.0, 6.0);
        let mut alloc = allocator();
        let region: Vec<CellCoord> = (0..3).map(|i| CellCoord::new(i, 0)).collect();
        for &c in &region {
            grid.set_owner(c, Some(0));
        }
        alloc.note_placed(&mut grid, &region);
        // (3,0) is blocked on the left by the region and below by the boundary.
        assert!(grid.cell(CellCoord::new(3, 0)).unwrap().is_corner);
        assert!(alloc.corner_queue.contains(&CellCoord::new(3, 0)));
        let mut rng = StdRng::seed_from_u64(7);
        let seed = alloc.pick_seed(&grid, 1, &mut rng).unwrap();
        assert!(grid.is_free(seed));
        assert!(grid.cell(seed).unwrap().is_corner);
    }

    #[test]
    fn known_small_pockets_are_skipped() {
        let mut grid = rect_grid(5.0, 1.0);
        let mut alloc = allocator();
        let mut rng = StdRng::seed_from_u64(8);
        grid.set_owner(CellCoord::new(1, 0), Some(0));
        // pocket of one cell at (0,0), then a run of three
        let mut failures = 0;
        for _ in 0..5 {
            if alloc
                .allocate(&mut grid, AllocationRequest::new(3, 3), &mut rng)
                .is_none()
            {
                failures += 1;
            } else {
                break;
            }
        }
        assert!(failures <= 1, "the single-cell pocket is tried at most once");
    }
}
