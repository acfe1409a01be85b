//! Great-circle math on a spherical Earth

use crate::common::Coordinate;
use nalgebra::Vector3;

/// Mean Earth radius used for all distance computations, in meters
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance in meters (haversine formula)
pub fn distance_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.latitude().to_radians();
    let lat2 = b.latitude().to_radians();
    let dlat = (b.latitude() - a.latitude()).to_radians();
    let dlon = (b.longitude() - a.longitude()).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlon = (dlon / 2.0).sin();

    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// Initial bearing from `a` towards `b`, in degrees clockwise from north [0, 360)
pub fn initial_bearing(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.latitude().to_radians();
    let lat2 = b.latitude().to_radians();
    let dlon = (b.longitude() - a.longitude()).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Point reached by travelling `meters` from `origin` along `bearing_deg`
pub fn destination_point(origin: &Coordinate, bearing_deg: f64, meters: f64) -> Coordinate {
    let delta = meters / EARTH_RADIUS_METERS;
    let theta = bearing_deg.to_radians();
    let lat1 = origin.latitude().to_radians();
    let lon1 = origin.longitude().to_radians();

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos())
        .clamp(-1.0, 1.0)
        .asin();
    let lon2 = lon1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    from_radians(lat2, lon2)
}

/// Point at `fraction` of the way from `a` to `b` along the great circle.
///
/// Uses spherical linear interpolation between the two unit position
/// vectors; `fraction` is clamped to [0, 1].
pub fn intermediate_point(a: &Coordinate, b: &Coordinate, fraction: f64) -> Coordinate {
    let f = fraction.clamp(0.0, 1.0);
    let va = to_unit_vector(a);
    let vb = to_unit_vector(b);

    let angle = va.cross(&vb).norm().atan2(va.dot(&vb));
    if angle.abs() < 1e-12 {
        return *a;
    }

    let sin_angle = angle.sin();
    let v = va * (((1.0 - f) * angle).sin() / sin_angle) + vb * ((f * angle).sin() / sin_angle);
    from_unit_vector(&v)
}

fn to_unit_vector(c: &Coordinate) -> Vector3<f64> {
    let lat = c.latitude().to_radians();
    let lon = c.longitude().to_radians();
    Vector3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin())
}

fn from_unit_vector(v: &Vector3<f64>) -> Coordinate {
    let lat = v.z.atan2((v.x * v.x + v.y * v.y).sqrt());
    let lon = v.y.atan2(v.x);
    from_radians(lat, lon)
}

fn from_radians(lat: f64, lon: f64) -> Coordinate {
    Coordinate::normalized(lat.to_degrees(), lon.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = distance_meters(&coord(0.0, 0.0), &coord(1.0, 0.0));
        // pi / 180 * R
        assert!((d - 111_194.93).abs() < 0.5, "got {}", d);
    }

    #[test]
    fn test_distance_is_symmetric_and_zero_on_identity() {
        let a = coord(9.9, -84.1);
        let b = coord(10.0, -84.0);
        assert_eq!(distance_meters(&a, &a), 0.0);
        assert!((distance_meters(&a, &b) - distance_meters(&b, &a)).abs() < 1e-9);
    }

    #[test]
    fn test_destination_point_roundtrips_short_distances() {
        let origin = coord(9.93, -84.08);
        for meters in [5.0, 15.0, 20.0, 250.0, 9_500.0] {
            for bearing in [0.0, 45.0, 137.0, 270.0] {
                let p = destination_point(&origin, bearing, meters);
                let d = distance_meters(&origin, &p);
                assert!((d - meters).abs() < meters * 1e-6, "{} vs {}", d, meters);
            }
        }
    }

    #[test]
    fn test_colinear_points_add_up() {
        let a = coord(9.9, -84.1);
        let c = coord(10.0, -84.0);
        for fraction in [0.1, 0.33, 0.5, 0.9] {
            let b = intermediate_point(&a, &c, fraction);
            let sum = distance_meters(&a, &b) + distance_meters(&b, &c);
            let direct = distance_meters(&a, &c);
            assert!((sum - direct).abs() < 1e-6, "{} vs {}", sum, direct);
            assert!((distance_meters(&a, &b) - fraction * direct).abs() < 1e-4);
        }
    }

    #[test]
    fn test_intermediate_endpoints() {
        let a = coord(-33.45, -70.66);
        let b = coord(-34.6, -58.38);
        assert!(distance_meters(&intermediate_point(&a, &b, 0.0), &a) < 1e-6);
        assert!(distance_meters(&intermediate_point(&a, &b, 1.0), &b) < 1e-6);
        assert_eq!(intermediate_point(&a, &a, 0.5), a);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = coord(0.0, 0.0);
        assert!((initial_bearing(&origin, &coord(1.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((initial_bearing(&origin, &coord(0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((initial_bearing(&origin, &coord(-1.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((initial_bearing(&origin, &coord(0.0, -1.0)) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_destination_point_wraps_antimeridian() {
        let p = destination_point(&coord(0.0, 179.9999), 90.0, 100.0);
        assert!(p.longitude() < 0.0);
        assert!(p.longitude() >= -180.0);
    }
}
