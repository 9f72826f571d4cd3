use crate::station::{DistanceRecord, Point, Station};

/// Address and position of an anchor, captured before mutating a tag
#[derive(Clone, Debug, PartialEq)]
pub struct AnchorFix {
    pub mac_address: String,
    pub position: Point,
}

impl AnchorFix {
    pub fn of(anchor: &Station) -> Self {
        Self {
            mac_address: anchor.mac_address().to_string(),
            position: anchor.position(),
        }
    }
}

/// Distance between two points, raw and multiplied by `scaling_factor`
pub fn distance_between(a: &Point, b: &Point, scaling_factor: f64) -> DistanceRecord {
    // Pythagorean theorem
    let raw_distance = a.distance_to(b);

    DistanceRecord {
        raw_distance,
        scaled_distance: raw_distance * scaling_factor,
    }
}

/// Distance between a tag and an anchor at their current positions
pub fn calculate_distance(tag: &Station, anchor: &Station, scaling_factor: f64) -> DistanceRecord {
    distance_between(&tag.position(), &anchor.position(), scaling_factor)
}

/// Refresh a tag's ranging table against every given anchor.
///
/// No-op for stations that are not tags.
pub fn update_tag_distances(tag: &mut Station, anchors: &[AnchorFix], scaling_factor: f64) {
    if !tag.is_tag() {
        return;
    }

    let position = tag.position();
    for anchor in anchors {
        let distance = distance_between(&position, &anchor.position, scaling_factor);
        tag.add_distance_to_anchor(&anchor.mac_address, distance);
    }
}
