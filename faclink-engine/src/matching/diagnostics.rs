//! Match diagnostics
//!
//! Small scoring helpers behind the diagnostic comments attached to a
//! mapping record: name dissimilarity via edit distance, geodesic
//! distance between facility coordinates.

use crate::model::Position;

/// Whether two display names differ after case folding
pub fn names_differ(a: &str, b: &str) -> bool {
    strsim::levenshtein(&a.to_lowercase(), &b.to_lowercase()) != 0
}

/// Haversine distance between two positions in meters
pub fn geodesic_distance_m(a: &Position, b: &Position) -> f64 {
    const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

    let lat1_rad = a.latitude.to_radians();
    let lat2_rad = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lng = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}
