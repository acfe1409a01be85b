//! Nominatim HTTP geocoder

use super::{GeocodedPlace, Geocoder};
use crate::common::Coordinate;
use crate::config::GeocodingConfig;
use crate::error::{NavError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Client for the Nominatim search and reverse APIs
#[derive(Debug, Clone)]
pub struct NominatimClient {
    http: reqwest::Client,
    service_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    // Nominatim encodes coordinates as strings
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct ReverseReply {
    display_name: Option<String>,
}

impl NominatimClient {
    pub fn new(config: &GeocodingConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let language = HeaderValue::from_str(&config.language)
            .map_err(|e| NavError::Config(format!("geocoding.language: {}", e)))?;
        headers.insert(ACCEPT_LANGUAGE, language);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| NavError::Config(format!("geocoding http client: {}", e)))?;
        Ok(NominatimClient {
            http,
            service_url: config.service_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<(u16, String)> {
        let url = format!("{}/{}", self.service_url, path);
        debug!(%url, "geocoding request");
        let response = self.http.get(&url).query(query).send().await?;
        let status = response.status().as_u16();
        Ok((status, response.text().await?))
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    async fn search(&self, query: &str) -> Result<Option<GeocodedPlace>> {
        let (status, body) = self
            .get(
                "search",
                &[
                    ("format", "json".to_string()),
                    ("limit", "1".to_string()),
                    ("q", query.to_string()),
                ],
            )
            .await?;
        parse_search_response(status, &body)
    }

    async fn reverse(&self, at: Coordinate) -> Result<Option<String>> {
        let (status, body) = self
            .get(
                "reverse",
                &[
                    ("format", "json".to_string()),
                    ("lat", at.latitude().to_string()),
                    ("lon", at.longitude().to_string()),
                    ("zoom", "18".to_string()),
                    ("addressdetails", "1".to_string()),
                ],
            )
            .await?;
        parse_reverse_response(status, &body)
    }
}

fn check_status(status: u16) -> Result<()> {
    if status >= 400 {
        return Err(NavError::Service(format!("geocoding service returned HTTP {}", status)));
    }
    Ok(())
}

/// First search hit, if any. An empty array means the address was not found.
pub fn parse_search_response(status: u16, body: &str) -> Result<Option<GeocodedPlace>> {
    check_status(status)?;
    let hits: Vec<SearchHit> = serde_json::from_str(body)
        .map_err(|e| NavError::Service(format!("malformed search response: {}", e)))?;
    let Some(hit) = hits.into_iter().next() else {
        return Ok(None);
    };

    let lat = hit
        .lat
        .parse::<f64>()
        .map_err(|e| NavError::Service(format!("bad latitude {:?}: {}", hit.lat, e)))?;
    let lon = hit
        .lon
        .parse::<f64>()
        .map_err(|e| NavError::Service(format!("bad longitude {:?}: {}", hit.lon, e)))?;
    let coordinate =
        Coordinate::new(lat, lon).map_err(|e| NavError::Service(e.to_string()))?;

    Ok(Some(GeocodedPlace {
        coordinate,
        display_name: hit.display_name,
    }))
}

/// Display name from a reverse lookup; absent or empty names yield `None`
pub fn parse_reverse_response(status: u16, body: &str) -> Result<Option<String>> {
    check_status(status)?;
    let reply: ReverseReply = serde_json::from_str(body)
        .map_err(|e| NavError::Service(format!("malformed reverse response: {}", e)))?;
    Ok(reply.display_name.filter(|name| !name.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_search_hit() {
        let body = r#"[{"place_id": 1, "lat": "9.9325427", "lon": "-84.0795782", "display_name": "San José, Costa Rica"}]"#;
        let place = parse_search_response(200, body).unwrap().unwrap();
        assert_eq!(place.coordinate.latitude(), 9.9325427);
        assert_eq!(place.coordinate.longitude(), -84.0795782);
        assert_eq!(place.display_name, "San José, Costa Rica");
    }

    #[test]
    fn test_empty_search_is_not_found_not_error() {
        assert_eq!(parse_search_response(200, "[]").unwrap(), None);
    }

    #[test]
    fn test_search_failures_are_service_errors() {
        let bad_lat = r#"[{"lat": "north", "lon": "1.0"}]"#;
        assert_eq!(
            parse_search_response(200, bad_lat).unwrap_err().kind(),
            ErrorKind::ServiceError
        );
        assert_eq!(
            parse_search_response(503, "[]").unwrap_err().kind(),
            ErrorKind::ServiceError
        );
        assert_eq!(
            parse_search_response(200, "{}").unwrap_err().kind(),
            ErrorKind::ServiceError
        );
    }

    #[test]
    fn test_reverse_display_name_or_none() {
        let named = r#"{"place_id": 7, "display_name": "Avenida Central, San José", "address": {}}"#;
        assert_eq!(
            parse_reverse_response(200, named).unwrap().as_deref(),
            Some("Avenida Central, San José")
        );
        assert_eq!(
            parse_reverse_response(200, r#"{"error": "Unable to geocode"}"#).unwrap(),
            None
        );
    }

    #[test]
    fn test_client_builds_from_default_config() {
        assert!(NominatimClient::new(&GeocodingConfig::default()).is_ok());
    }
}
