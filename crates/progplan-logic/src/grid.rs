//! Polygon rasterisation into a cell adjacency graph.
//!
//! `PolygonGrid` is an arena: a flat `Vec<Cell>` plus a coordinate index.
//! Neighbour links are stored as coordinates and resolved through the index,
//! so cells never hold references to each other.

use std::collections::HashMap;

use geo::{
    Area, BooleanOps, BoundingRect, Contains, Coord, Intersects, Line, LineString, Polygon,
    Simplify,
};
use serde::{Deserialize, Serialize};

use crate::constants::{BOUNDARY_SIMPLIFY_TOLERANCE, EPSILON, MIN_FRAGMENT_FRACTION};
use crate::error::{PlanError, Result};
use crate::geometry::{largest_part, square};

/// Offsets of the four edge-sharing neighbours.
pub const ORTHOGONAL: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
/// Offsets of the four corner-sharing neighbours.
pub const DIAGONAL: [(i32, i32); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];

/// Integer lattice coordinate of a cell, relative to the grid origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    pub i: i32,
    pub j: i32,
}

impl CellCoord {
    pub const fn new(i: i32, j: i32) -> Self {
        Self { i, j }
    }

    pub fn offset(self, di: i32, dj: i32) -> Self {
        Self::new(self.i + di, self.j + dj)
    }

    /// Chebyshev adjacency (8-neighbourhood).
    pub fn touches(self, other: CellCoord) -> bool {
        self != other && (self.i - other.i).abs() <= 1 && (self.j - other.j).abs() <= 1
    }
}

/// One square of the lattice, clipped to the polygon it covers.
#[derive(Debug, Clone)]
pub struct Cell {
    pub coord: CellCoord,
    /// Square ∩ polygon (∩ containment).
    pub fragment: Polygon<f64>,
    pub assigned: bool,
    /// Region that owns this cell once an allocation is committed.
    pub owner: Option<u32>,
    pub on_perimeter: bool,
    /// Touches the exterior of the outermost polygon (containment if any).
    pub on_outer_boundary: bool,
    pub is_corner: bool,
    pub neighbors: Vec<CellCoord>,
    corner_at_build: bool,
}

/// What lies beyond a grid edge with no cell on the other side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outside {
    /// Inside the containment polygon but outside this grid's polygon.
    Parent,
    /// Outside everything this grid knows about.
    Outer,
}

/// Cell graph for one polygon at one hierarchy level.
#[derive(Debug, Clone)]
pub struct PolygonGrid {
    cell_size: f64,
    origin: Coord<f64>,
    cells: Vec<Cell>,
    index: HashMap<CellCoord, usize>,
    polygon: Polygon<f64>,
    containment: Option<Polygon<f64>>,
}

fn square_inside(sq: &Polygon<f64>, polygon: &Polygon<f64>) -> bool {
    let Some(bounds) = sq.bounding_rect() else {
        return false;
    };
    let (min, max) = (bounds.min(), bounds.max());
    let corners = [
        min,
        Coord { x: max.x, y: min.y },
        max,
        Coord { x: min.x, y: max.y },
    ];
    if !corners.iter().all(|c| polygon.contains(c)) {
        return false;
    }
    // A notch cutting into the square must put one of its vertices inside it.
    let strictly_inside =
        |c: &Coord<f64>| c.x > min.x && c.x < max.x && c.y > min.y && c.y < max.y;
    !polygon.exterior().coords().any(strictly_inside)
        && !polygon
            .interiors()
            .iter()
            .any(|ring| ring.coords().any(strictly_inside))
}

fn clip_fragment(piece: &Polygon<f64>, polygon: &Polygon<f64>, min_area: f64) -> Option<Polygon<f64>> {
    if square_inside(piece, polygon) {
        return Some(piece.clone());
    }
    largest_part(piece.intersection(polygon)).filter(|p| p.unsigned_area() > min_area)
}

fn boundary_edges(ring: &LineString<f64>) -> Vec<Line<f64>> {
    ring.simplify(&BOUNDARY_SIMPLIFY_TOLERANCE)
        .lines()
        .filter(|l| {
            let d = l.delta();
            d.x.abs() > EPSILON || d.y.abs() > EPSILON
        })
        .collect()
}

impl PolygonGrid {
    /// Rasterise `polygon` into `cell_size` squares.
    ///
    /// A cell is kept when its square overlaps the polygon (and the optional
    /// containment polygon) with positive area.
    pub fn build(
        polygon: &Polygon<f64>,
        cell_size: f64,
        containment: Option<&Polygon<f64>>,
    ) -> Result<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(PlanError::InvalidInput(format!(
                "cell size must be positive, got {cell_size}"
            )));
        }
        let bounds = polygon
            .bounding_rect()
            .ok_or_else(|| PlanError::InvalidInput("polygon has no vertices".into()))?;
        let origin = bounds.min();
        let cols = (bounds.width() / cell_size - EPSILON).ceil().max(1.0) as i32;
        let rows = (bounds.height() / cell_size - EPSILON).ceil().max(1.0) as i32;
        let min_area = cell_size * cell_size * MIN_FRAGMENT_FRACTION;

        let mut cells = Vec::new();
        let mut index = HashMap::new();
        for i in 0..cols {
            for j in 0..rows {
                let sq = square(
                    origin.x + f64::from(i) * cell_size,
                    origin.y + f64::from(j) * cell_size,
                    cell_size,
                );
                let Some(mut fragment) = clip_fragment(&sq, polygon, min_area) else {
                    continue;
                };
                if let Some(outer) = containment {
                    match clip_fragment(&fragment, outer, min_area) {
                        Some(inner) => fragment = inner,
                        None => continue,
                    }
                }
                let coord = CellCoord::new(i, j);
                index.insert(coord, cells.len());
                cells.push(Cell {
                    coord,
                    fragment,
                    assigned: false,
                    owner: None,
                    on_perimeter: false,
                    on_outer_boundary: false,
                    is_corner: false,
                    neighbors: Vec::new(),
                    corner_at_build: false,
                });
            }
        }

        let mut grid = Self {
            cell_size,
            origin,
            cells,
            index,
            polygon: polygon.clone(),
            containment: containment.cloned(),
        };
        grid.link_neighbors();
        grid.tag_boundary();
        Ok(grid)
    }

    fn link_neighbors(&mut self) {
        for k in 0..self.cells.len() {
            let c = self.cells[k].coord;
            let neighbors: Vec<CellCoord> = ORTHOGONAL
                .iter()
                .chain(DIAGONAL.iter())
                .map(|&(di, dj)| c.offset(di, dj))
                .filter(|n| self.index.contains_key(n))
                .collect();
            self.cells[k].neighbors = neighbors;
        }
    }

    fn tag_boundary(&mut self) {
        let edges = boundary_edges(self.polygon.exterior());
        let outer_edges = match &self.containment {
            Some(outer) => boundary_edges(outer.exterior()),
            None => edges.clone(),
        };
        for k in 0..self.cells.len() {
            let c = self.cells[k].coord;
            let sq = self.square(c);
            let touching = edges.iter().filter(|e| sq.intersects(*e)).count();
            let cell = &mut self.cells[k];
            cell.on_perimeter = touching >= 1;
            cell.is_corner = touching >= 2;
            cell.corner_at_build = cell.is_corner;
            cell.on_outer_boundary = outer_edges.iter().any(|e| sq.intersects(e));
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn cell_area(&self) -> f64 {
        self.cell_size * self.cell_size
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    pub fn containment(&self) -> Option<&Polygon<f64>> {
        self.containment.as_ref()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn contains(&self, c: CellCoord) -> bool {
        self.index.contains_key(&c)
    }

    pub fn cell(&self, c: CellCoord) -> Option<&Cell> {
        self.index.get(&c).map(|&k| &self.cells[k])
    }

    fn cell_mut(&mut self, c: CellCoord) -> Option<&mut Cell> {
        match self.index.get(&c) {
            Some(&k) => Some(&mut self.cells[k]),
            None => None,
        }
    }

    /// Present and not yet assigned.
    pub fn is_free(&self, c: CellCoord) -> bool {
        self.cell(c).is_some_and(|cell| !cell.assigned)
    }

    pub fn set_assigned(&mut self, c: CellCoord, assigned: bool) {
        if let Some(cell) = self.cell_mut(c) {
            cell.assigned = assigned;
            if !assigned {
                cell.owner = None;
            }
        }
    }

    pub fn set_owner(&mut self, c: CellCoord, owner: Option<u32>) {
        if let Some(cell) = self.cell_mut(c) {
            cell.owner = owner;
            cell.assigned = owner.is_some();
        }
    }

    pub fn owner(&self, c: CellCoord) -> Option<u32> {
        self.cell(c).and_then(|cell| cell.owner)
    }

    pub fn mark_corner(&mut self, c: CellCoord) {
        if let Some(cell) = self.cell_mut(c) {
            cell.is_corner = true;
        }
    }

    /// Count of unassigned cells among `c`'s neighbours.
    pub fn free_neighbor_count(&self, c: CellCoord) -> usize {
        self.cell(c).map_or(0, |cell| {
            cell.neighbors.iter().filter(|&&n| self.is_free(n)).count()
        })
    }

    pub fn unassigned_count(&self) -> usize {
        self.cells.iter().filter(|c| !c.assigned).count()
    }

    /// Clear every allocation and restore build-time corner flags.
    pub fn reset(&mut self) {
        for cell in &mut self.cells {
            cell.assigned = false;
            cell.owner = None;
            cell.is_corner = cell.corner_at_build;
        }
    }

    /// World position of lattice point `(i, j)`.
    pub fn lattice_point(&self, i: i32, j: i32) -> Coord<f64> {
        Coord {
            x: self.origin.x + f64::from(i) * self.cell_size,
            y: self.origin.y + f64::from(j) * self.cell_size,
        }
    }

    /// Unclipped square of a lattice coordinate.
    pub fn square(&self, c: CellCoord) -> Polygon<f64> {
        let p = self.lattice_point(c.i, c.j);
        square(p.x, p.y, self.cell_size)
    }

    /// Classify a coordinate that has no cell in this grid.
    pub fn outside_kind(&self, c: CellCoord) -> Outside {
        let corner = self.lattice_point(c.i, c.j);
        let center = Coord {
            x: corner.x + self.cell_size / 2.0,
            y: corner.y + self.cell_size / 2.0,
        };
        match &self.containment {
            Some(outer) if outer.contains(&center) => Outside::Parent,
            _ => Outside::Outer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::polygon_from_vertices;

    fn rect(w: f64, h: f64) -> Polygon<f64> {
        polygon_from_vertices(&[[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]]).unwrap()
    }

    #[test]
    fn rectangle_rasterises_to_full_lattice() {
        let grid = PolygonGrid::build(&rect(6.0, 4.0), 1.0, None).unwrap();
        assert_eq!(grid.len(), 24);
        assert!(grid.contains(CellCoord::new(5, 3)));
        assert!(!grid.contains(CellCoord::new(6, 0)));
    }

    #[test]
    fn neighbor_links_are_symmetric() {
        let grid = PolygonGrid::build(&rect(5.0, 5.0), 1.0, None).unwrap();
        for cell in grid.cells() {
            for n in &cell.neighbors {
                let other = grid.cell(*n).unwrap();
                assert!(other.neighbors.contains(&cell.coord));
            }
        }
        let center = grid.cell(CellCoord::new(2, 2)).unwrap();
        assert_eq!(center.neighbors.len(), 8);
        let corner = grid.cell(CellCoord::new(0, 0)).unwrap();
        assert_eq!(corner.neighbors.len(), 3);
    }

    #[test]
    fn perimeter_and_corner_tags() {
        let grid = PolygonGrid::build(&rect(6.0, 4.0), 1.0, None).unwrap();
        let corner = grid.cell(CellCoord::new(0, 0)).unwrap();
        assert!(corner.on_perimeter && corner.is_corner);
        let edge = grid.cell(CellCoord::new(2, 0)).unwrap();
        assert!(edge.on_perimeter && !edge.is_corner);
        let inner = grid.cell(CellCoord::new(2, 2)).unwrap();
        assert!(!inner.on_perimeter && !inner.is_corner);
        let corners = grid.cells().iter().filter(|c| c.is_corner).count();
        assert_eq!(corners, 4);
    }

    #[test]
    fn l_shape_drops_cells_outside() {
        let l = polygon_from_vertices(&[
            [0.0, 0.0],
            [4.0, 0.0],
            [4.0, 2.0],
            [2.0, 2.0],
            [2.0, 4.0],
            [0.0, 4.0],
        ])
        .unwrap();
        let grid = PolygonGrid::build(&l, 1.0, None).unwrap();
        assert_eq!(grid.len(), 12);
        assert!(!grid.contains(CellCoord::new(3, 3)));
        // the reflex corner cell touches both inner edges
        assert!(grid.cell(CellCoord::new(2, 1)).unwrap().on_perimeter);
    }

    #[test]
    fn edge_contact_does_not_keep_a_cell() {
        let grid = PolygonGrid::build(&rect(3.0, 3.0), 1.0, None).unwrap();
        assert_eq!(grid.len(), 9);
    }

    #[test]
    fn partial_cells_are_clipped() {
        let grid = PolygonGrid::build(&rect(2.5, 1.0), 1.0, None).unwrap();
        assert_eq!(grid.len(), 3);
        let last = grid.cell(CellCoord::new(2, 0)).unwrap();
        assert!((last.fragment.unsigned_area() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn containment_limits_cells() {
        let outer = rect(3.0, 3.0);
        let wide = rect(6.0, 3.0);
        let grid = PolygonGrid::build(&wide, 1.0, Some(&outer)).unwrap();
        assert_eq!(grid.len(), 9);
    }

    #[test]
    fn outside_classification() {
        let building = rect(6.0, 3.0);
        let section = rect(3.0, 3.0);
        let grid = PolygonGrid::build(&section, 1.0, Some(&building)).unwrap();
        assert_eq!(grid.outside_kind(CellCoord::new(3, 1)), Outside::Parent);
        assert_eq!(grid.outside_kind(CellCoord::new(-1, 1)), Outside::Outer);
    }

    #[test]
    fn reset_restores_state() {
        let mut grid = PolygonGrid::build(&rect(4.0, 4.0), 1.0, None).unwrap();
        let c = CellCoord::new(1, 1);
        grid.set_owner(c, Some(3));
        grid.mark_corner(c);
        assert!(!grid.is_free(c));
        grid.reset();
        assert!(grid.is_free(c));
        assert!(!grid.cell(c).unwrap().is_corner);
        assert_eq!(grid.unassigned_count(), 16);
    }

    #[test]
    fn invalid_cell_size() {
        assert!(PolygonGrid::build(&rect(4.0, 4.0), 0.0, None).is_err());
    }
}
