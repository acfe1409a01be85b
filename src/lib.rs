pub mod common;
pub mod config;
pub mod error;
pub mod geocoding;
pub mod navigation;
pub mod positioning;

use crate::config::NavConfig;
use crate::error::Result;
use crate::geocoding::{Geocoder, NominatimClient};
use crate::navigation::{FollowController, OsrmClient, RoutingClient};
use crate::positioning::PositionSource;
use std::collections::HashMap;
use std::sync::Arc;

pub use crate::common::{Coordinate, Destination, PositionSample};
pub use crate::error::{ErrorKind, NavError};
pub use crate::navigation::{FollowState, NavSnapshot, RouteHandle};

/// Core functionality for live navigation tracking
pub struct NavtrackCore {
    config: NavConfig,
    geocoder: Arc<dyn Geocoder>,
    controller: FollowController,
}

impl NavtrackCore {
    /// Wire the HTTP routing and geocoding clients from `config` around a
    /// caller-supplied position source
    pub fn new(config: NavConfig, source: Arc<dyn PositionSource>) -> Result<Self> {
        config.validate()?;
        let router: Arc<dyn RoutingClient> = Arc::new(OsrmClient::new(&config.routing)?);
        let geocoder: Arc<dyn Geocoder> = Arc::new(NominatimClient::new(&config.geocoding)?);
        Ok(Self::with_components(config, source, router, geocoder))
    }

    /// Assemble a core from explicit components
    pub fn with_components(
        config: NavConfig,
        source: Arc<dyn PositionSource>,
        router: Arc<dyn RoutingClient>,
        geocoder: Arc<dyn Geocoder>,
    ) -> Self {
        let controller = FollowController::new(source, router, &config);
        NavtrackCore {
            config,
            geocoder,
            controller,
        }
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    /// Tune follow and positioning parameters of the running controller.
    ///
    /// Accepts the keys of [`NavConfig::configure`]; on error nothing changes.
    pub fn configure(&mut self, params: &HashMap<String, f64>) -> Result<()> {
        self.config.configure(params)?;
        self.controller.reconfigure(&self.config);
        Ok(())
    }

    /// The follow controller driving the active navigation
    pub fn controller(&self) -> &FollowController {
        &self.controller
    }

    pub fn geocoder(&self) -> &dyn Geocoder {
        self.geocoder.as_ref()
    }

    /// Geocode `address` and start navigating to it
    pub async fn navigate_to_address(&self, name: &str, address: &str) -> Result<RouteHandle> {
        let destination =
            geocoding::resolve_destination(self.geocoder.as_ref(), name, address).await?;
        self.controller.start_route(destination).await
    }
}
