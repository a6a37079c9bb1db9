//! Fixed room programmes per apartment type.
//!
//! A programme lists the rooms of an apartment with the share of the
//! apartment's area each should take. Room quotas for the layout engine are
//! derived from it with a relative tolerance around each share.

use crate::constants::apartment_types;
use crate::constants::room_types::{BATHROOM, BEDROOM, KITCHEN, LIVING};
use crate::quota::{CategoryQuota, QuotaTable};

/// One room of a programme.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomSpec {
    pub category: &'static str,
    /// Fraction of the apartment area.
    pub share: f64,
}

const fn room(category: &'static str, share: f64) -> RoomSpec {
    RoomSpec { category, share }
}

const STUDIO: &[RoomSpec] = &[room(BATHROOM, 0.25), room(BEDROOM, 0.75)];

const ONE_ROOM: &[RoomSpec] = &[
    room(BATHROOM, 0.15),
    room(KITCHEN, 0.25),
    room(BEDROOM, 0.6),
];

const TWO_ROOM: &[RoomSpec] = &[
    room(BATHROOM, 0.1),
    room(KITCHEN, 0.15),
    room(LIVING, 0.4),
    room(BEDROOM, 0.35),
];

const THREE_ROOM: &[RoomSpec] = &[
    room(BATHROOM, 0.08),
    room(KITCHEN, 0.12),
    room(LIVING, 0.3),
    room(BEDROOM, 0.25),
    room(BEDROOM, 0.25),
];

const FOUR_ROOM: &[RoomSpec] = &[
    room(BATHROOM, 0.07),
    room(KITCHEN, 0.1),
    room(LIVING, 0.23),
    room(BEDROOM, 0.2),
    room(BEDROOM, 0.2),
    room(BEDROOM, 0.2),
];

/// Rooms of an apartment category. Unknown categories get the studio programme.
pub fn programme(category: &str) -> &'static [RoomSpec] {
    match category {
        apartment_types::ONE_ROOM => ONE_ROOM,
        apartment_types::TWO_ROOM => TWO_ROOM,
        apartment_types::THREE_ROOM => THREE_ROOM,
        apartment_types::FOUR_ROOM => FOUR_ROOM,
        _ => STUDIO,
    }
}

/// Room quota table for one apartment of `category` and `area`.
///
/// Rooms of the same type are grouped into one entry; the area range is
/// `share · area · (1 ± tolerance)`.
pub fn room_quota(category: &str, area: f64, tolerance: f64) -> QuotaTable {
    let mut table = QuotaTable::new();
    for spec in programme(category) {
        let base = spec.share * area;
        let (count, percent) = table
            .get(spec.category)
            .map_or((0, 0.0), |q| (q.target_count, q.target_percent));
        table.insert(
            spec.category,
            CategoryQuota::new(
                base * (1.0 - tolerance).max(0.0),
                base * (1.0 + tolerance),
                percent + spec.share * 100.0,
                count + 1,
            ),
        );
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn programmes_cover_the_whole_apartment() {
        for category in apartment_types::ALL {
            let total: f64 = programme(category).iter().map(|r| r.share).sum();
            assert!((total - 1.0).abs() < 1e-9, "{category}: {total}");
        }
    }

    #[test]
    fn studio_has_wet_area_and_bedroom() {
        let rooms: Vec<&str> = programme(apartment_types::STUDIO)
            .iter()
            .map(|r| r.category)
            .collect();
        assert_eq!(rooms, vec![BATHROOM, BEDROOM]);
        assert_eq!(programme("penthouse"), programme(apartment_types::STUDIO));
    }

    #[test]
    fn bedrooms_are_grouped() {
        let quota = room_quota(apartment_types::THREE_ROOM, 80.0, 0.25);
        let bedrooms = quota.get(BEDROOM).unwrap();
        assert_eq!(bedrooms.target_count, 2);
        assert!((bedrooms.area_min - 15.0).abs() < 1e-9);
        assert!((bedrooms.area_max - 25.0).abs() < 1e-9);
        assert!((bedrooms.target_percent - 50.0).abs() < 1e-9);
        assert_eq!(quota.total_count(), 5);
    }

    #[test]
    fn programme_fits_its_apartment() {
        let quota = room_quota(apartment_types::FOUR_ROOM, 100.0, 0.25);
        let min_total: f64 = quota
            .iter()
            .map(|(_, q)| q.area_min * f64::from(q.target_count))
            .sum();
        assert!(min_total < 100.0);
    }
}
