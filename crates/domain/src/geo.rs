//! GPS distance for zone anchoring.

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two WGS84 coordinates.
pub fn haversine_m(lat_a: f64, lng_a: f64, lat_b: f64, lng_b: f64) -> f64 {
    let phi_a = lat_a.to_radians();
    let phi_b = lat_b.to_radians();
    let d_phi = (lat_b - lat_a).to_radians();
    let d_lambda = (lng_b - lng_a).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi_a.cos() * phi_b.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// Index and distance of the nearest anchor within `radius_m`, if any.
///
/// Non-finite anchors are skipped; a non-finite fix matches nothing.
pub fn nearest_within(
    lat: f64,
    lng: f64,
    anchors: &[(f64, f64)],
    radius_m: f64,
) -> Option<(usize, f64)> {
    if !lat.is_finite() || !lng.is_finite() {
        return None;
    }
    anchors
        .iter()
        .enumerate()
        .filter(|(_, (a_lat, a_lng))| a_lat.is_finite() && a_lng.is_finite())
        .map(|(i, (a_lat, a_lng))| (i, haversine_m(lat, lng, *a_lat, *a_lng)))
        .filter(|(_, d)| *d <= radius_m)
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
}
