//! Great-circle geometry on a spherical Earth.

use angkot_types::Coordinate;

/// Mean Earth radius in kilometers used for every distance computation.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two coordinates in kilometers.
///
/// `a = sin²(Δlat/2) + cos(lat1)·cos(lat2)·sin²(Δlon/2)` and
/// `d = 2R·atan2(√a, √(1−a))`, with all angles in radians.
pub fn haversine_km(from: Coordinate, to: Coordinate) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lng = (to.lng - from.lng).to_radians();

    let half_lat = (d_lat / 2.0).sin();
    let half_lng = (d_lng / 2.0).sin();
    let a = half_lat.mul_add(half_lat, lat1.cos() * lat2.cos() * half_lng * half_lng);
    // Rounding can push `a` a hair past 1 for antipodal points.
    let a = a.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}
