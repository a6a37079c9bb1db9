//! Polygon helpers on top of the `geo` crate.
//!
//! The planner never reimplements boolean operations; everything here is a
//! thin convenience layer (construction from vertex lists, balanced unions,
//! clipping with largest-fragment selection, section cuts).

use geo::{Area, BooleanOps, BoundingRect, Coord, Line, LineString, MultiPolygon, Polygon, Rect};

use crate::constants::{EPSILON, SECTION_CUT_HALF_WIDTH};
use crate::error::{PlanError, Result};

/// Build a polygon from an implicitly closed vertex ring.
///
/// A repeated closing vertex is accepted. Fewer than three distinct vertices
/// or a zero-area ring is rejected.
pub fn polygon_from_vertices(vertices: &[[f64; 2]]) -> Result<Polygon<f64>> {
    let mut coords: Vec<Coord<f64>> = vertices.iter().map(|&[x, y]| Coord { x, y }).collect();
    if coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }
    if coords.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(PlanError::InvalidInput(
            "polygon has non-finite coordinates".into(),
        ));
    }
    if coords.len() < 3 {
        return Err(PlanError::InvalidInput(format!(
            "polygon needs at least 3 vertices, got {}",
            coords.len()
        )));
    }
    let polygon = Polygon::new(LineString::from(coords), vec![]);
    if polygon.unsigned_area() <= EPSILON {
        return Err(PlanError::InvalidInput("polygon has zero area".into()));
    }
    Ok(polygon)
}

/// Axis-aligned square with its minimum corner at `(x, y)`.
pub fn square(x: f64, y: f64, size: f64) -> Polygon<f64> {
    Rect::new(Coord { x, y }, Coord { x: x + size, y: y + size }).to_polygon()
}

/// Union of many polygons, reduced pairwise so each boolean op stays small.
pub fn union_all(polygons: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    let mut layer: Vec<MultiPolygon<f64>> = polygons
        .into_iter()
        .map(|p| MultiPolygon::new(vec![p]))
        .collect();
    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len().div_ceil(2));
        let mut parts = layer.into_iter();
        while let Some(a) = parts.next() {
            match parts.next() {
                Some(b) => next.push(a.union(&b)),
                None => next.push(a),
            }
        }
        layer = next;
    }
    layer.pop().unwrap_or_else(|| MultiPolygon::new(vec![]))
}

/// The largest-area part of a multipolygon.
pub fn largest_part(parts: MultiPolygon<f64>) -> Option<Polygon<f64>> {
    parts
        .0
        .into_iter()
        .map(|p| (p.unsigned_area(), p))
        .filter(|(area, _)| *area > EPSILON)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, p)| p)
}

/// Clip `polygon` to `container`, keeping the largest fragment.
pub fn clip_to(polygon: &Polygon<f64>, container: &Polygon<f64>) -> Option<Polygon<f64>> {
    largest_part(polygon.intersection(container))
}

/// Whether a union result is one polygon without holes.
pub fn is_single_simple(parts: &MultiPolygon<f64>) -> bool {
    parts.0.len() == 1 && parts.0[0].interiors().is_empty()
}

/// Thin rectangle covering segment `a → b`, extended by `half_width` at both ends.
fn segment_strip(a: [f64; 2], b: [f64; 2], half_width: f64) -> Option<Polygon<f64>> {
    let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
    let len = (dx * dx + dy * dy).sqrt();
    if len < EPSILON {
        return None;
    }
    let (ux, uy) = (dx / len * half_width, dy / len * half_width);
    let (nx, ny) = (-uy, ux);
    let start = [a[0] - ux, a[1] - uy];
    let end = [b[0] + ux, b[1] + uy];
    let ring = vec![
        Coord { x: start[0] - nx, y: start[1] - ny },
        Coord { x: end[0] - nx, y: end[1] - ny },
        Coord { x: end[0] + nx, y: end[1] + ny },
        Coord { x: start[0] + nx, y: start[1] + ny },
    ];
    Some(Polygon::new(LineString::from(ring), vec![]))
}

/// Partition a footprint into sections along cut polylines.
///
/// Each cut removes a very thin strip; the remaining parts are the sections,
/// ordered by the minimum corner of their bounding box (x, then y).
pub fn split_by_cuts(footprint: &Polygon<f64>, cuts: &[Vec<[f64; 2]>]) -> Vec<Polygon<f64>> {
    let strips: Vec<Polygon<f64>> = cuts
        .iter()
        .flat_map(|cut| {
            cut.windows(2)
                .filter_map(|w| segment_strip(w[0], w[1], SECTION_CUT_HALF_WIDTH))
        })
        .collect();
    if strips.is_empty() {
        return vec![footprint.clone()];
    }

    let whole = MultiPolygon::new(vec![footprint.clone()]);
    let remaining = whole.difference(&union_all(strips));
    let min_area = footprint.unsigned_area() * 1e-6;
    let mut parts: Vec<Polygon<f64>> = remaining
        .0
        .into_iter()
        .filter(|p| p.unsigned_area() > min_area)
        .collect();
    parts.sort_by(|a, b| {
        let ka = min_corner(a);
        let kb = min_corner(b);
        ka.0.total_cmp(&kb.0).then(ka.1.total_cmp(&kb.1))
    });
    if parts.is_empty() {
        vec![footprint.clone()]
    } else {
        parts
    }
}

/// Whether two axis-aligned segments lie on the same line (within `tol`)
/// and share a stretch longer than `tol`.
pub fn lines_overlap(a: &Line<f64>, b: &Line<f64>, tol: f64) -> bool {
    let horizontal = |l: &Line<f64>| (l.start.y - l.end.y).abs() <= EPSILON;
    let vertical = |l: &Line<f64>| (l.start.x - l.end.x).abs() <= EPSILON;
    let shared = |a0: f64, a1: f64, b0: f64, b1: f64| {
        a0.max(a1).min(b0.max(b1)) - a0.min(a1).max(b0.min(b1))
    };
    if horizontal(a) && horizontal(b) {
        (a.start.y - b.start.y).abs() <= tol
            && shared(a.start.x, a.end.x, b.start.x, b.end.x) > tol
    } else if vertical(a) && vertical(b) {
        (a.start.x - b.start.x).abs() <= tol
            && shared(a.start.y, a.end.y, b.start.y, b.end.y) > tol
    } else {
        false
    }
}

fn min_corner(polygon: &Polygon<f64>) -> (f64, f64) {
    polygon
        .bounding_rect()
        .map_or((0.0, 0.0), |r| (r.min().x, r.min().y))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(w: f64, h: f64) -> Polygon<f64> {
        polygon_from_vertices(&[[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]]).unwrap()
    }

    #[test]
    fn closing_vertex_is_accepted() {
        let p = polygon_from_vertices(&[[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 0.0]]).unwrap();
        assert!((p.unsigned_area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_polygons_rejected() {
        assert!(polygon_from_vertices(&[[0.0, 0.0], [1.0, 1.0]]).is_err());
        assert!(polygon_from_vertices(&[[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]]).is_err());
    }

    #[test]
    fn union_of_adjacent_squares_is_one_rectangle() {
        let squares = (0..6).map(|i| square(i as f64, 0.0, 1.0)).collect();
        let merged = union_all(squares);
        assert!(is_single_simple(&merged));
        assert!((merged.unsigned_area() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn union_of_separate_squares_is_disjoint() {
        let merged = union_all(vec![square(0.0, 0.0, 1.0), square(3.0, 0.0, 1.0)]);
        assert_eq!(merged.0.len(), 2);
        assert!(!is_single_simple(&merged));
    }

    #[test]
    fn clip_keeps_inside_part() {
        let big = rect(4.0, 4.0);
        let spill = square(3.0, 3.0, 2.0);
        let clipped = clip_to(&spill, &big).unwrap();
        assert!((clipped.unsigned_area() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn split_without_cuts_returns_footprint() {
        let parts = split_by_cuts(&rect(10.0, 5.0), &[]);
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn split_into_two_sections() {
        let cut = vec![[5.0, -1.0], [5.0, 6.0]];
        let parts = split_by_cuts(&rect(10.0, 5.0), &[cut]);
        assert_eq!(parts.len(), 2);
        let left = min_corner(&parts[0]);
        assert!(left.0 < 1e-9, "left section first");
        let total: f64 = parts.iter().map(|p| p.unsigned_area()).sum();
        assert!((total - 50.0).abs() < 0.1);
    }

    #[test]
    fn collinear_segments_overlap() {
        let facade = Line::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 6.0, y: 0.0 });
        let part = Line::new(Coord { x: 4.0, y: 0.0 }, Coord { x: 2.0, y: 0.0 });
        let touching = Line::new(Coord { x: 6.0, y: 0.0 }, Coord { x: 8.0, y: 0.0 });
        let parallel = Line::new(Coord { x: 0.0, y: 3.0 }, Coord { x: 6.0, y: 3.0 });
        let wall = Line::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 3.0 });
        assert!(lines_overlap(&facade, &part, 1e-6));
        assert!(!lines_overlap(&facade, &touching, 1e-6));
        assert!(!lines_overlap(&facade, &parallel, 1e-6));
        assert!(!lines_overlap(&facade, &wall, 1e-6));
    }
}
