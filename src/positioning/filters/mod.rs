//! Filtering of incoming position fixes

use crate::common::Coordinate;
use crate::positioning::geodesy::distance_meters;

/// A generic filter interface for position fixes
pub trait Filter<T> {
    /// Decide whether `next` should be acted upon given the last accepted value
    fn accepts(&self, last: Option<&T>, next: &T) -> bool;
}

/// Decide whether moving from `last` to `next` is significant.
///
/// The first sample (no `last`) is always significant; otherwise the
/// great-circle distance must reach `threshold_meters`.
pub fn is_significant(last: Option<&Coordinate>, next: &Coordinate, threshold_meters: f64) -> bool {
    match last {
        None => true,
        Some(last) => distance_meters(last, next) >= threshold_meters,
    }
}

/// Distance-threshold filter deciding when movement warrants a route recompute
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementFilter {
    threshold_meters: f64,
}

impl MovementFilter {
    /// Create a new movement filter
    pub fn new(threshold_meters: f64) -> Self {
        MovementFilter { threshold_meters }
    }

    pub fn threshold_meters(&self) -> f64 {
        self.threshold_meters
    }
}

impl Filter<Coordinate> for MovementFilter {
    fn accepts(&self, last: Option<&Coordinate>, next: &Coordinate) -> bool {
        is_significant(last, next, self.threshold_meters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::positioning::geodesy::destination_point;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    #[test]
    fn test_first_sample_is_always_significant() {
        let p = coord(9.9, -84.1);
        for t in [0.1, 15.0, 1e9] {
            assert!(is_significant(None, &p, t));
        }
    }

    #[test]
    fn test_same_point_is_never_significant() {
        let p = coord(9.9, -84.1);
        for t in [1e-9, 0.5, 15.0, 10_000.0] {
            assert!(!is_significant(Some(&p), &p, t));
        }
    }

    #[test]
    fn test_threshold_boundary() {
        let filter = MovementFilter::new(15.0);
        let last = coord(9.9, -84.1);

        let near = destination_point(&last, 90.0, 5.0);
        let far = destination_point(&last, 90.0, 20.0);
        assert!(!filter.accepts(Some(&last), &near));
        assert!(filter.accepts(Some(&last), &far));
        assert!(filter.accepts(None, &near));
    }
}
