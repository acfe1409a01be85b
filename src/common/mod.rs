//! Common value types shared by the positioning and navigation stacks

use crate::error::{NavError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated WGS84 coordinate in decimal degrees.
///
/// Latitude is within [-90, 90] and longitude within [-180, 180]; both are
/// finite. The only way to obtain one is through [`Coordinate::new`] (or
/// deserialization, which goes through the same check).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate", into = "RawCoordinate")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

#[derive(Serialize, Deserialize)]
struct RawCoordinate {
    #[serde(alias = "lat")]
    latitude: f64,
    #[serde(alias = "lon")]
    longitude: f64,
}

impl Coordinate {
    /// Create a coordinate, rejecting non-finite or out-of-range values
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(NavError::InvalidCoordinate(format!(
                "({}, {}) is not finite",
                latitude, longitude
            )));
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(NavError::InvalidCoordinate(format!(
                "latitude {} outside [-90, 90]",
                latitude
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(NavError::InvalidCoordinate(format!(
                "longitude {} outside [-180, 180]",
                longitude
            )));
        }
        Ok(Coordinate {
            latitude,
            longitude,
        })
    }

    /// Build a coordinate from computed values: latitude is clamped and
    /// longitude wrapped into range. Non-finite components collapse to 0.
    pub(crate) fn normalized(latitude: f64, longitude: f64) -> Self {
        let latitude = if latitude.is_finite() {
            latitude.clamp(-90.0, 90.0)
        } else {
            0.0
        };
        let longitude = if longitude.is_finite() {
            let wrapped = (longitude + 180.0).rem_euclid(360.0) - 180.0;
            if wrapped == -180.0 && longitude > 0.0 {
                180.0
            } else {
                wrapped
            }
        } else {
            0.0
        };
        Coordinate {
            latitude,
            longitude,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = NavError;

    fn try_from(raw: RawCoordinate) -> Result<Self> {
        Coordinate::new(raw.latitude, raw.longitude)
    }
}

impl From<Coordinate> for RawCoordinate {
    fn from(c: Coordinate) -> Self {
        RawCoordinate {
            latitude: c.latitude,
            longitude: c.longitude,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Where a navigation session is heading.
///
/// Owned by the caller and never mutated once a session has started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    coordinate: Coordinate,
    name: String,
    address: Option<String>,
}

impl Destination {
    pub fn new(coordinate: Coordinate, name: impl Into<String>) -> Self {
        Destination {
            coordinate,
            name: name.into(),
            address: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }
}

/// A single position fix from the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub coordinate: Coordinate,
    pub timestamp: DateTime<Utc>,
    /// Accuracy radius in meters, when the device reports one
    pub accuracy_meters: Option<f64>,
}

impl PositionSample {
    /// A fix taken now with no accuracy information
    pub fn now(coordinate: Coordinate) -> Self {
        PositionSample {
            coordinate,
            timestamp: Utc::now(),
            accuracy_meters: None,
        }
    }

    pub fn with_accuracy(mut self, meters: f64) -> Self {
        self.accuracy_meters = Some(meters);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_bounds_are_inclusive() {
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
        assert!(Coordinate::new(90.0001, 0.0).is_err());
        assert!(Coordinate::new(0.0, -180.5).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_coordinate_deserialize_validates() {
        let ok: Coordinate = serde_json::from_str(r#"{"lat": 9.9, "lon": -84.1}"#).unwrap();
        assert_eq!(ok.latitude(), 9.9);
        assert_eq!(ok.longitude(), -84.1);

        let bad = serde_json::from_str::<Coordinate>(r#"{"latitude": 120.0, "longitude": 0.0}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_destination_metadata() {
        let dest = Destination::new(Coordinate::new(10.0, -84.0).unwrap(), "Ferretería Central")
            .with_address("Avenida 2, San José");
        assert_eq!(dest.name(), "Ferretería Central");
        assert_eq!(dest.address(), Some("Avenida 2, San José"));
        assert_eq!(dest.coordinate().latitude(), 10.0);
    }
}
