//! Navigation stack: routing, route sessions and live follow mode
pub mod follow;
pub mod routing;
pub mod session;

pub use self::follow::{FollowController, NavSnapshot};
pub use self::routing::osrm::OsrmClient;
pub use self::routing::{HandleHealth, Route, RouteHandle, RouteId, RoutingClient};
pub use self::session::{RouteRequest, RouteSession, SessionStatus, Settled};

/// State of the follow controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowState {
    /// No active navigation
    Idle,
    /// A route is being computed or is ready, position is not being followed
    Routing,
    /// Continuous tracking with recompute on significant movement
    Following,
    /// The last route or position operation failed
    Error,
}
