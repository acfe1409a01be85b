//! Configuration loading for navtrack_core

use crate::error::{NavError, Result};
use crate::positioning::source::PositionOptions;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct NavConfig {
    #[serde(default)]
    pub follow: FollowConfig,
    #[serde(default)]
    pub positioning: PositioningConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub geocoding: GeocodingConfig,
}

/// Follow-mode behaviour
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct FollowConfig {
    /// Minimum movement in meters before a fix triggers a recompute (default: 15)
    #[serde(default = "default_min_move_meters")]
    pub min_move_meters: f64,

    /// Treat the route origin as the first accepted fix when follow starts
    #[serde(default)]
    pub seed_with_origin: bool,
}

/// Device location API options
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PositioningConfig {
    #[serde(default = "default_one_shot")]
    pub one_shot: PositionOptions,

    #[serde(default = "default_watch")]
    pub watch: PositionOptions,
}

/// Routing service settings
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RoutingConfig {
    /// OSRM route endpoint, without profile (default: public OSRM demo server)
    #[serde(default = "default_routing_url")]
    pub service_url: String,

    /// OSRM profile (default: driving)
    #[serde(default = "default_profile")]
    pub profile: String,

    /// Request timeout in milliseconds (default: 10000)
    #[serde(default = "default_http_timeout")]
    pub timeout_ms: u64,
}

/// Geocoding service settings
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct GeocodingConfig {
    #[serde(default = "default_geocoding_url")]
    pub service_url: String,

    /// Sent as Accept-Language (default: es)
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_http_timeout")]
    pub timeout_ms: u64,
}

impl NavConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NavError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: NavConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.follow.validate()?;
        for (name, options) in [
            ("positioning.one_shot", &self.positioning.one_shot),
            ("positioning.watch", &self.positioning.watch),
        ] {
            if options.timeout_ms == 0 {
                return Err(NavError::Config(format!(
                    "{}.timeout_ms must be positive",
                    name
                )));
            }
        }
        if self.routing.service_url.is_empty() {
            return Err(NavError::Config("routing.service_url is empty".to_string()));
        }
        if self.geocoding.service_url.is_empty() {
            return Err(NavError::Config(
                "geocoding.service_url is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Tune follow and positioning parameters at runtime.
    ///
    /// Recognised keys: `min_move_meters`, `one_shot_timeout_ms`,
    /// `watch_timeout_ms`, `watch_maximum_age_ms`. Unknown keys are ignored.
    /// Either every key is applied or, on error, none is.
    pub fn configure(&mut self, params: &HashMap<String, f64>) -> Result<()> {
        let mut updated = self.clone();
        updated.follow.configure(params)?;

        if let Some(&timeout) = params.get("one_shot_timeout_ms") {
            updated.positioning.one_shot.timeout_ms = millis(timeout, false).ok_or_else(|| {
                NavError::Config("One-shot timeout must be at least 1 ms".to_string())
            })?;
        }

        if let Some(&timeout) = params.get("watch_timeout_ms") {
            updated.positioning.watch.timeout_ms = millis(timeout, false).ok_or_else(|| {
                NavError::Config("Watch timeout must be at least 1 ms".to_string())
            })?;
        }

        if let Some(&max_age) = params.get("watch_maximum_age_ms") {
            updated.positioning.watch.maximum_age_ms = millis(max_age, true).ok_or_else(|| {
                NavError::Config("Watch maximum age must be non-negative".to_string())
            })?;
        }

        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

/// Round a millisecond parameter, rejecting negative, non-finite and (unless
/// `allow_zero`) values that round to zero
fn millis(value: f64, allow_zero: bool) -> Option<u64> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let rounded = value.round() as u64;
    if rounded == 0 && !allow_zero {
        return None;
    }
    Some(rounded)
}

impl FollowConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_move_meters > 0.0) {
            return Err(NavError::Config(
                "follow.min_move_meters must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn configure(&mut self, params: &HashMap<String, f64>) -> Result<()> {
        if let Some(&min_move) = params.get("min_move_meters") {
            if !(min_move > 0.0) {
                return Err(NavError::Config(
                    "Minimum movement distance must be positive".to_string(),
                ));
            }
            self.min_move_meters = min_move;
        }
        Ok(())
    }
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            min_move_meters: default_min_move_meters(),
            seed_with_origin: false,
        }
    }
}

impl Default for PositioningConfig {
    fn default() -> Self {
        Self {
            one_shot: default_one_shot(),
            watch: default_watch(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            service_url: default_routing_url(),
            profile: default_profile(),
            timeout_ms: default_http_timeout(),
        }
    }
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            service_url: default_geocoding_url(),
            language: default_language(),
            user_agent: default_user_agent(),
            timeout_ms: default_http_timeout(),
        }
    }
}

// Default value functions
fn default_min_move_meters() -> f64 {
    15.0
}
fn default_one_shot() -> PositionOptions {
    PositionOptions {
        enable_high_accuracy: true,
        timeout_ms: 10_000,
        maximum_age_ms: 0,
    }
}
fn default_watch() -> PositionOptions {
    PositionOptions {
        enable_high_accuracy: true,
        timeout_ms: 10_000,
        maximum_age_ms: 1_000,
    }
}
fn default_routing_url() -> String {
    "https://router.project-osrm.org/route/v1".to_string()
}
fn default_profile() -> String {
    "driving".to_string()
}
fn default_http_timeout() -> u64 {
    10_000
}
fn default_geocoding_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}
fn default_language() -> String {
    "es".to_string()
}
fn default_user_agent() -> String {
    concat!("navtrack_core/", env!("CARGO_PKG_VERSION")).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = NavConfig::from_toml_str("").unwrap();
        assert_eq!(config, NavConfig::default());
        assert_eq!(config.follow.min_move_meters, 15.0);
        assert_eq!(config.positioning.one_shot.maximum_age_ms, 0);
        assert_eq!(config.positioning.watch.maximum_age_ms, 1_000);
        assert_eq!(config.routing.profile, "driving");
    }

    #[test]
    fn test_sample_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/navtrack.toml");
        assert_eq!(NavConfig::load(&path).unwrap(), NavConfig::default());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = NavConfig::from_toml_str(
            r#"
            [follow]
            min_move_meters = 25.0

            [routing]
            profile = "foot"
            "#,
        )
        .unwrap();
        assert_eq!(config.follow.min_move_meters, 25.0);
        assert!(!config.follow.seed_with_origin);
        assert_eq!(config.routing.profile, "foot");
        assert_eq!(config.routing.timeout_ms, 10_000);
        assert_eq!(config.geocoding.language, "es");
    }

    #[test]
    fn test_rejects_non_positive_threshold() {
        let err = NavConfig::from_toml_str("[follow]\nmin_move_meters = 0.0").unwrap_err();
        assert!(matches!(err, NavError::Config(_)));
    }

    #[test]
    fn test_configure_params() {
        let mut config = NavConfig::default();
        let mut params = HashMap::new();
        params.insert("min_move_meters".to_string(), 30.0);
        params.insert("watch_maximum_age_ms".to_string(), 0.0);
        config.configure(&params).unwrap();
        assert_eq!(config.follow.min_move_meters, 30.0);
        assert_eq!(config.positioning.watch.maximum_age_ms, 0);

        params.insert("watch_timeout_ms".to_string(), -1.0);
        assert!(config.configure(&params).is_err());
    }

    #[test]
    fn test_configure_rejects_sub_millisecond_timeout() {
        let mut config = NavConfig::default();
        let mut params = HashMap::new();
        params.insert("one_shot_timeout_ms".to_string(), 0.4);
        assert!(matches!(config.configure(&params), Err(NavError::Config(_))));
        assert_eq!(config.positioning.one_shot.timeout_ms, 10_000);

        params.insert("one_shot_timeout_ms".to_string(), 1.6);
        config.configure(&params).unwrap();
        assert_eq!(config.positioning.one_shot.timeout_ms, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_configure_failure_applies_nothing() {
        let mut config = NavConfig::default();
        let mut params = HashMap::new();
        params.insert("min_move_meters".to_string(), 40.0);
        params.insert("one_shot_timeout_ms".to_string(), 500.0);
        params.insert("watch_timeout_ms".to_string(), -1.0);

        assert!(config.configure(&params).is_err());
        assert_eq!(config, NavConfig::default());
    }
}
