//! Great-circle helpers on a spherical Earth.
//!
//! All public inputs and outputs are in degrees and meters. Trigonometry runs in
//! radians internally.

use crate::types::Coordinate;

/// Mean Earth radius (m)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

pub fn to_radians(degrees: f64) -> f64 {
    degrees * std::f64::consts::PI / 180.0
}

pub fn to_degrees(radians: f64) -> f64 {
    radians * 180.0 / std::f64::consts::PI
}

/// Wrap an angle into [0, 360).
pub fn normalize_360(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid of a tiny negative value rounds up to exactly 360.0
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Wrap an angle into (-180, 180].
pub fn normalize_180(degrees: f64) -> f64 {
    let wrapped = normalize_360(degrees);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Signed shortest rotation taking `from` onto `to`, in (-180, 180].
pub fn shortest_angle_delta(from: f64, to: f64) -> f64 {
    normalize_180(to - from)
}

/// Haversine distance between two points (m).
pub fn distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let phi1 = to_radians(a.lat);
    let phi2 = to_radians(b.lat);
    let d_phi = to_radians(b.lat - a.lat);
    let d_lambda = to_radians(b.lon - a.lon);

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial great-circle bearing from `from` towards `to`, in [0, 360).
pub fn bearing(from: &Coordinate, to: &Coordinate) -> f64 {
    let phi1 = to_radians(from.lat);
    let phi2 = to_radians(to.lat);
    let d_lambda = to_radians(to.lon - from.lon);

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
    normalize_360(to_degrees(y.atan2(x)))
}

/// Destination reached by travelling `distance_m` from `origin` along
/// `bearing_deg` (spherical direct problem). Longitude is wrapped to [-180, 180).
pub fn project(origin: &Coordinate, bearing_deg: f64, distance_m: f64) -> Coordinate {
    let delta = distance_m / EARTH_RADIUS_M;
    let theta = to_radians(bearing_deg);
    let phi1 = to_radians(origin.lat);
    let lambda1 = to_radians(origin.lon);

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
    let lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());

    Coordinate::new(to_degrees(phi2), (to_degrees(lambda2) + 540.0).rem_euclid(360.0) - 180.0)
}

/// Index of the waypoint closest to `point`. Ties keep the lowest index;
/// an empty slice yields 0.
pub fn nearest_waypoint_index<P: AsRef<Coordinate>>(point: &Coordinate, waypoints: &[P]) -> usize {
    let mut nearest = 0;
    let mut min_distance = f64::INFINITY;
    for (idx, wp) in waypoints.iter().enumerate() {
        let d = distance(point, wp.as_ref());
        if d < min_distance {
            min_distance = d;
            nearest = idx;
        }
    }
    nearest
}

impl AsRef<Coordinate> for Coordinate {
    fn as_ref(&self) -> &Coordinate {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_one_degree_of_latitude() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(1.0, 0.0);
        // R * pi / 180
        assert_abs_diff_eq!(distance(&a, &b), 111_194.93, epsilon = 0.01);
        assert_abs_diff_eq!(distance(&a, &a), 0.0);
    }

    #[test]
    fn test_cardinal_bearings() {
        let origin = Coordinate::new(0.0, 0.0);
        assert_abs_diff_eq!(bearing(&origin, &Coordinate::new(1.0, 0.0)), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bearing(&origin, &Coordinate::new(0.0, 1.0)), 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bearing(&origin, &Coordinate::new(-1.0, 0.0)), 180.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bearing(&origin, &Coordinate::new(0.0, -1.0)), 270.0, epsilon = 1e-9);
    }

    #[test]
    fn test_project_matches_distance_and_bearing() {
        let origin = Coordinate::new(46.2382, -63.1311);
        let dest = project(&origin, 37.0, 250.0);
        assert_abs_diff_eq!(distance(&origin, &dest), 250.0, epsilon = 1e-4);
        assert_abs_diff_eq!(bearing(&origin, &dest), 37.0, epsilon = 1e-3);
    }

    #[test]
    fn test_project_wraps_antimeridian() {
        let origin = Coordinate::new(0.0, 179.9999);
        let dest = project(&origin, 90.0, 100_000.0);
        assert!(dest.lon < 0.0 && dest.lon >= -180.0);
        assert_abs_diff_eq!(distance(&origin, &dest), 100_000.0, epsilon = 1e-2);
    }

    #[test]
    fn test_angle_normalization() {
        assert_abs_diff_eq!(normalize_360(-10.0), 350.0);
        assert_abs_diff_eq!(normalize_360(720.0), 0.0);
        assert_abs_diff_eq!(normalize_360(-1e-20), 0.0);
        assert_abs_diff_eq!(normalize_180(190.0), -170.0);
        assert_abs_diff_eq!(normalize_180(-180.0), 180.0);
        assert_abs_diff_eq!(shortest_angle_delta(350.0, 10.0), 20.0);
        assert_abs_diff_eq!(shortest_angle_delta(10.0, 350.0), -20.0);
    }

    #[test]
    fn test_nearest_prefers_lowest_index_on_tie() {
        let point = Coordinate::new(0.0, 0.0);
        let points = vec![
            Coordinate::new(0.0, 0.01),
            Coordinate::new(0.0, -0.001),
            Coordinate::new(0.001, 0.0),
            Coordinate::new(0.0, 0.001),
        ];
        // indices 1..=3 all sit 0.001 deg from the query point on the equator
        assert_eq!(nearest_waypoint_index(&point, &points), 1);
        let empty: Vec<Coordinate> = Vec::new();
        assert_eq!(nearest_waypoint_index(&point, &empty), 0);
    }
}
