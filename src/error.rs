//! Error types for navtrack_core

use crate::navigation::routing::RouteId;
use crate::navigation::FollowState;
use thiserror::Error;

/// Navigation error type
///
/// Cloneable so the last failure can travel inside state snapshots to the
/// presentation layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NavError {
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("routing service unreachable: {0}")]
    Network(String),

    #[error("no route found: {0}")]
    NoRouteFound(String),

    #[error("routing service error: {0}")]
    Service(String),

    #[error("route handle {0} is no longer usable")]
    StaleHandle(RouteId),

    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("address not found: {0}")]
    AddressNotFound(String),

    #[error("cannot {action} while {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: FollowState,
    },

    #[error("navigation session was cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

/// Coarse classification of [`NavError`] for callers that render errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PositionUnavailable,
    NetworkError,
    NoRouteFound,
    AddressNotFound,
    ServiceError,
    StaleHandle,
    InvalidInput,
    Cancelled,
}

impl NavError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NavError::PositionUnavailable(_) => ErrorKind::PositionUnavailable,
            NavError::Network(_) => ErrorKind::NetworkError,
            NavError::NoRouteFound(_) => ErrorKind::NoRouteFound,
            NavError::AddressNotFound(_) => ErrorKind::AddressNotFound,
            NavError::Service(_) => ErrorKind::ServiceError,
            NavError::StaleHandle(_) => ErrorKind::StaleHandle,
            NavError::InvalidCoordinate(_)
            | NavError::InvalidTransition { .. }
            | NavError::Config(_) => ErrorKind::InvalidInput,
            NavError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// True for failures of an external service call, as opposed to caller
    /// mistakes or internal bookkeeping.
    pub fn is_service_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NetworkError
                | ErrorKind::NoRouteFound
                | ErrorKind::AddressNotFound
                | ErrorKind::ServiceError
        )
    }
}

impl From<reqwest::Error> for NavError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() || e.is_status() {
            NavError::Service(e.to_string())
        } else {
            NavError::Network(e.to_string())
        }
    }
}

impl From<toml::de::Error> for NavError {
    fn from(e: toml::de::Error) -> Self {
        NavError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NavError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_distinguish_no_route_from_unreachable() {
        let no_route = NavError::NoRouteFound("empty".into());
        let offline = NavError::Network("connection refused".into());

        assert_eq!(no_route.kind(), ErrorKind::NoRouteFound);
        assert_eq!(offline.kind(), ErrorKind::NetworkError);
        assert!(no_route.is_service_failure());
        assert!(offline.is_service_failure());
        assert!(!NavError::Cancelled.is_service_failure());
    }

    #[test]
    fn test_unknown_address_is_not_a_missing_route() {
        let err = NavError::AddressNotFound("Calle Falsa 123".into());
        assert_eq!(err.kind(), ErrorKind::AddressNotFound);
        assert_ne!(err.kind(), NavError::NoRouteFound("x".into()).kind());
        assert!(err.is_service_failure());
    }

    #[test]
    fn test_toml_error_maps_to_config() {
        let err: NavError = toml::from_str::<toml::Value>("= broken")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(matches!(err, NavError::Config(_)));
    }
}
