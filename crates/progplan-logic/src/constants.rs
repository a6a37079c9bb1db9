//! Planner constants: apartment categories, room categories, tolerances.
//!
//! Category names are plain strings so callers can bring their own quota
//! tables; these are the names the built-in room programmes recognise.

pub mod apartment_types {
    pub const STUDIO: &str = "studio";
    pub const ONE_ROOM: &str = "1room";
    pub const TWO_ROOM: &str = "2room";
    pub const THREE_ROOM: &str = "3room";
    pub const FOUR_ROOM: &str = "4room";

    pub const ALL: [&str; 5] = [STUDIO, ONE_ROOM, TWO_ROOM, THREE_ROOM, FOUR_ROOM];
}

pub mod room_types {
    pub const BATHROOM: &str = "bathroom";
    pub const KITCHEN: &str = "kitchen";
    pub const LIVING: &str = "living";
    pub const BEDROOM: &str = "bedroom";

    /// Wet areas need plumbing but no window.
    pub fn is_wet(category: &str) -> bool {
        category == BATHROOM || category == KITCHEN
    }
}

/// Simplification tolerance applied to polygon exteriors before perimeter
/// and corner tagging (world units).
pub const BOUNDARY_SIMPLIFY_TOLERANCE: f64 = 1.0;

/// Fraction of a cell's area below which a clipped fragment is dropped.
pub const MIN_FRAGMENT_FRACTION: f64 = 1e-6;

/// Half-width of the strip removed along a section cut polyline.
pub const SECTION_CUT_HALF_WIDTH: f64 = 0.005;

/// Distance below which two coordinates are treated as equal.
pub const EPSILON: f64 = 1e-9;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apartment_types_are_unique() {
        let mut names = apartment_types::ALL.to_vec();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), apartment_types::ALL.len());
    }

    #[test]
    fn wet_rooms() {
        assert!(room_types::is_wet(room_types::BATHROOM));
        assert!(room_types::is_wet(room_types::KITCHEN));
        assert!(!room_types::is_wet(room_types::BEDROOM));
    }
}
