//! Geographic utilities: great-circle distance, centers and degree conversions.

use crate::Coordinate;

/// Mean Earth radius used by the haversine formula, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude (and of longitude at the equator).
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Great-circle distance between two coordinates in meters (haversine).
///
/// Returns 0 for identical coordinates; NaN inputs propagate.
///
/// # Example
/// ```
/// use sakura_run::Coordinate;
/// use sakura_run::geo_utils::haversine_distance;
///
/// let ghent = Coordinate::new(51.0543, 3.7174);
/// let brussels = Coordinate::new(50.8503, 4.3517);
/// let d = haversine_distance(&ghent, &brussels);
/// assert!((d - 50_000.0).abs() < 2_000.0);
/// ```
pub fn haversine_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push h marginally above 1 for antipodal points
    2.0 * EARTH_RADIUS_M * h.min(1.0).sqrt().asin()
}

/// Total length of a polyline in meters.
pub fn polyline_length(points: &[Coordinate]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Arithmetic mean of a set of coordinates, or `None` when empty.
pub fn compute_center(points: &[Coordinate]) -> Option<Coordinate> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let sum_lat: f64 = points.iter().map(|p| p.lat).sum();
    let sum_lon: f64 = points.iter().map(|p| p.lon).sum();
    Some(Coordinate::new(sum_lat / n, sum_lon / n))
}

/// Convert a distance in meters to `(lat_degrees, lon_degrees)` offsets
/// around the given reference latitude.
///
/// The longitude offset grows towards the poles; it is capped at 360° so
/// a search window never becomes infinite.
pub fn meters_to_degrees(meters: f64, ref_lat: f64) -> (f64, f64) {
    let dlat = meters / METERS_PER_DEGREE;
    let cos_lat = ref_lat.to_radians().cos().abs();
    let dlon = if cos_lat < 1e-9 {
        360.0
    } else {
        (meters / (METERS_PER_DEGREE * cos_lat)).min(360.0)
    };
    (dlat, dlon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_zero_for_same_point() {
        let p = Coordinate::new(51.0489, 3.6951);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(1.0, 0.0);
        let expected = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        assert!((haversine_distance(&a, &b) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_haversine_is_symmetric() {
        let a = Coordinate::new(51.0489, 3.6951);
        let b = Coordinate::new(51.0462, 3.6984);
        assert_eq!(haversine_distance(&a, &b), haversine_distance(&b, &a));
    }

    #[test]
    fn test_haversine_nan_propagates() {
        let a = Coordinate::new(f64::NAN, 0.0);
        let b = Coordinate::new(0.0, 0.0);
        assert!(haversine_distance(&a, &b).is_nan());
    }

    #[test]
    fn test_compute_center() {
        let pts = vec![Coordinate::new(50.0, 3.0), Coordinate::new(52.0, 5.0)];
        let c = compute_center(&pts).unwrap();
        assert!((c.lat - 51.0).abs() < 1e-12);
        assert!((c.lon - 4.0).abs() < 1e-12);
        assert!(compute_center(&[]).is_none());
    }

    #[test]
    fn test_meters_to_degrees_widens_longitude() {
        let (dlat, dlon) = meters_to_degrees(1000.0, 60.0);
        assert!((dlon - 2.0 * dlat).abs() < 1e-6);
        let (_, polar) = meters_to_degrees(1000.0, 90.0);
        assert_eq!(polar, 360.0);
    }
}
