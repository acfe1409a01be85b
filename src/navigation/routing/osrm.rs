//! OSRM HTTP routing client

use super::{Route, RoutingClient};
use crate::common::Coordinate;
use crate::config::RoutingConfig;
use crate::error::{NavError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Routing client for the OSRM `route/v1` API
#[derive(Debug, Clone)]
pub struct OsrmClient {
    http: reqwest::Client,
    service_url: String,
    profile: String,
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    /// GeoJSON order: [lon, lat]
    coordinates: Vec<[f64; 2]>,
}

impl OsrmClient {
    pub fn new(config: &RoutingConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| NavError::Config(format!("routing http client: {}", e)))?;
        Ok(OsrmClient {
            http,
            service_url: config.service_url.trim_end_matches('/').to_string(),
            profile: config.profile.clone(),
        })
    }

    /// Request URL for a route between two points
    pub fn route_url(&self, origin: &Coordinate, destination: &Coordinate) -> String {
        format!(
            "{}/{}/{:.6},{:.6};{:.6},{:.6}?overview=full&geometries=geojson&alternatives=false&steps=false",
            self.service_url,
            self.profile,
            origin.longitude(),
            origin.latitude(),
            destination.longitude(),
            destination.latitude()
        )
    }
}

#[async_trait]
impl RoutingClient for OsrmClient {
    async fn compute_route(&self, origin: Coordinate, destination: Coordinate) -> Result<Route> {
        let url = self.route_url(&origin, &destination);
        debug!(%url, "requesting route");

        let response = self.http.get(&url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        parse_route_response(status, &body)
    }
}

/// Map an OSRM HTTP response onto a route or a classified error
pub fn parse_route_response(status: u16, body: &str) -> Result<Route> {
    let parsed: OsrmResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) if status >= 400 => {
            return Err(NavError::Service(format!("HTTP {} ({})", status, e)));
        }
        Err(e) => {
            return Err(NavError::Service(format!("malformed routing response: {}", e)));
        }
    };

    let message = parsed.message.unwrap_or_default();
    match parsed.code.as_str() {
        "Ok" => {
            let route = parsed
                .routes
                .into_iter()
                .next()
                .ok_or_else(|| NavError::NoRouteFound("service returned no routes".to_string()))?;
            let geometry = route
                .geometry
                .coordinates
                .iter()
                .map(|[lon, lat]| Coordinate::new(*lat, *lon))
                .collect::<Result<Vec<_>>>()
                .map_err(|e| NavError::Service(format!("bad route geometry: {}", e)))?;
            if geometry.is_empty() {
                return Err(NavError::NoRouteFound("route has no geometry".to_string()));
            }
            Ok(Route {
                geometry,
                distance_meters: route.distance,
                duration_seconds: route.duration,
            })
        }
        "NoRoute" | "NoSegment" => Err(NavError::NoRouteFound(format!(
            "{}: {}",
            parsed.code, message
        ))),
        other => Err(NavError::Service(format!("{} (HTTP {}): {}", other, status, message))),
    }
}
