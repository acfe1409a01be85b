//! Address lookup: turns addresses into destinations and coordinates into labels

pub mod nominatim;

use crate::common::{Coordinate, Destination};
use crate::error::{NavError, Result};
use async_trait::async_trait;
use tracing::warn;

pub use self::nominatim::NominatimClient;

/// A geocoded location
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedPlace {
    pub coordinate: Coordinate,
    pub display_name: String,
}

/// Trait for geocoding providers
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Best match for a free-form address; `None` when nothing matched
    async fn search(&self, query: &str) -> Result<Option<GeocodedPlace>>;

    /// Display name for a coordinate; `None` when the service has none
    async fn reverse(&self, at: Coordinate) -> Result<Option<String>>;
}

/// Resolve `address` into a named destination
pub async fn resolve_destination(
    geocoder: &dyn Geocoder,
    name: &str,
    address: &str,
) -> Result<Destination> {
    match geocoder.search(address).await? {
        Some(place) => Ok(Destination::new(place.coordinate, name).with_address(address)),
        None => Err(NavError::AddressNotFound(address.to_string())),
    }
}

/// Human-readable label for a coordinate, never failing.
///
/// Falls back to the raw coordinate when reverse lookup errors or finds nothing.
pub async fn describe_location(geocoder: &dyn Geocoder, at: Coordinate) -> String {
    match geocoder.reverse(at).await {
        Ok(Some(name)) => name,
        Ok(None) => coordinate_label(&at),
        Err(e) => {
            warn!(error = %e, %at, "reverse geocoding failed");
            coordinate_label(&at)
        }
    }
}

fn coordinate_label(at: &Coordinate) -> String {
    format!("Lat: {:.6}, Lon: {:.6}", at.latitude(), at.longitude())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedGeocoder {
        hit: Option<GeocodedPlace>,
        reverse: Result<Option<String>>,
    }

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn search(&self, _query: &str) -> Result<Option<GeocodedPlace>> {
            Ok(self.hit.clone())
        }

        async fn reverse(&self, _at: Coordinate) -> Result<Option<String>> {
            self.reverse.clone()
        }
    }

    fn at() -> Coordinate {
        Coordinate::new(9.933333, -84.083333).unwrap()
    }

    #[tokio::test]
    async fn test_resolve_destination_keeps_name_and_address() {
        let geocoder = FixedGeocoder {
            hit: Some(GeocodedPlace {
                coordinate: at(),
                display_name: "San José, Costa Rica".into(),
            }),
            reverse: Ok(None),
        };
        let dest = resolve_destination(&geocoder, "Soda La Esquina", "Calle 5, San José")
            .await
            .unwrap();
        assert_eq!(dest.name(), "Soda La Esquina");
        assert_eq!(dest.address(), Some("Calle 5, San José"));
        assert_eq!(dest.coordinate(), at());
    }

    #[tokio::test]
    async fn test_resolve_destination_not_found() {
        let geocoder = FixedGeocoder {
            hit: None,
            reverse: Ok(None),
        };
        let err = resolve_destination(&geocoder, "X", "nowhere").await.unwrap_err();
        assert_eq!(err, NavError::AddressNotFound("nowhere".into()));
    }

    #[tokio::test]
    async fn test_describe_location_fallbacks() {
        let named = FixedGeocoder {
            hit: None,
            reverse: Ok(Some("Catedral Metropolitana".into())),
        };
        assert_eq!(describe_location(&named, at()).await, "Catedral Metropolitana");

        let empty = FixedGeocoder {
            hit: None,
            reverse: Ok(None),
        };
        assert_eq!(
            describe_location(&empty, at()).await,
            "Lat: 9.933333, Lon: -84.083333"
        );

        let offline = FixedGeocoder {
            hit: None,
            reverse: Err(NavError::Network("dns".into())),
        };
        assert_eq!(
            describe_location(&offline, at()).await,
            "Lat: 9.933333, Lon: -84.083333"
        );
    }
}
