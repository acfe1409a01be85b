//! Routing service contract and route handles

pub mod osrm;

use crate::common::Coordinate;
use crate::error::{NavError, Result};
use crate::positioning::geodesy::distance_meters;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Trait for route providers
#[async_trait]
pub trait RoutingClient: Send + Sync {
    /// Compute a route from `origin` to `destination`.
    ///
    /// Must keep "no path exists" (`NoRouteFound`) distinct from transport
    /// (`Network`) and protocol (`Service`) failures. One external call per
    /// invocation, no retries.
    async fn compute_route(&self, origin: Coordinate, destination: Coordinate) -> Result<Route>;
}

/// Route geometry and summary as returned by the routing service
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub geometry: Vec<Coordinate>,
    pub distance_meters: f64,
    pub duration_seconds: f64,
}

impl Route {
    /// Length of the polyline itself, independent of the service's summary
    pub fn geometry_length_meters(&self) -> f64 {
        self.geometry
            .windows(2)
            .map(|w| distance_meters(&w[0], &w[1]))
            .sum()
    }
}

/// Identity of a route within a session: (session generation, request sequence)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteId {
    pub session: u64,
    pub seq: u64,
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "route#{}.{}", self.session, self.seq)
    }
}

/// Lifecycle of the route object behind a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleHealth {
    Live,
    /// The route object signalled failure; it must be rebuilt, never reused
    Faulted,
    /// Disposed by its session
    Retired,
}

/// Shared reference to a computed route.
///
/// Cheap to clone; all clones observe the same health. Owned by exactly one
/// [`RouteSession`](crate::navigation::session::RouteSession), which is the
/// only place that retires it.
#[derive(Clone)]
pub struct RouteHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: RouteId,
    origin: Coordinate,
    destination: Coordinate,
    route: Route,
    health: AtomicU8,
}

const LIVE: u8 = 0;
const FAULTED: u8 = 1;
const RETIRED: u8 = 2;

impl RouteHandle {
    pub(crate) fn new(id: RouteId, origin: Coordinate, destination: Coordinate, route: Route) -> Self {
        RouteHandle {
            inner: Arc::new(HandleInner {
                id,
                origin,
                destination,
                route,
                health: AtomicU8::new(LIVE),
            }),
        }
    }

    pub fn id(&self) -> RouteId {
        self.inner.id
    }

    pub fn origin(&self) -> Coordinate {
        self.inner.origin
    }

    pub fn destination(&self) -> Coordinate {
        self.inner.destination
    }

    /// Display geometry and summary
    pub fn route(&self) -> &Route {
        &self.inner.route
    }

    pub fn health(&self) -> HandleHealth {
        match self.inner.health.load(Ordering::Acquire) {
            LIVE => HandleHealth::Live,
            FAULTED => HandleHealth::Faulted,
            _ => HandleHealth::Retired,
        }
    }

    pub fn is_live(&self) -> bool {
        self.health() == HandleHealth::Live
    }

    /// Flag the route object as unusable. Has no effect once retired.
    pub fn mark_faulted(&self) {
        let _ = self.inner.health.compare_exchange(
            LIVE,
            FAULTED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// `Ok` while the handle may still be used, `StaleHandle` otherwise
    pub fn ensure_usable(&self) -> Result<()> {
        match self.health() {
            HandleHealth::Live => Ok(()),
            HandleHealth::Faulted | HandleHealth::Retired => Err(NavError::StaleHandle(self.id())),
        }
    }

    pub(crate) fn retire(&self) {
        self.inner.health.store(RETIRED, Ordering::Release);
    }

    /// True if both values refer to the same route object
    pub fn same_as(&self, other: &RouteHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for RouteHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl fmt::Debug for RouteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteHandle")
            .field("id", &self.inner.id)
            .field("health", &self.health())
            .field("points", &self.inner.route.geometry.len())
            .field("distance_meters", &self.inner.route.distance_meters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> RouteHandle {
        let a = Coordinate::new(9.9, -84.1).unwrap();
        let b = Coordinate::new(10.0, -84.0).unwrap();
        RouteHandle::new(
            RouteId { session: 1, seq: 1 },
            a,
            b,
            Route {
                geometry: vec![a, b],
                distance_meters: 16_000.0,
                duration_seconds: 900.0,
            },
        )
    }

    #[test]
    fn test_fault_then_retire() {
        let h = handle();
        let clone = h.clone();
        assert!(h.ensure_usable().is_ok());

        h.mark_faulted();
        assert_eq!(clone.health(), HandleHealth::Faulted);
        assert_eq!(
            clone.ensure_usable(),
            Err(NavError::StaleHandle(RouteId { session: 1, seq: 1 }))
        );

        h.retire();
        h.mark_faulted();
        assert_eq!(clone.health(), HandleHealth::Retired);
    }

    #[test]
    fn test_geometry_length() {
        let h = handle();
        let direct = distance_meters(&h.origin(), &h.destination());
        assert!((h.route().geometry_length_meters() - direct).abs() < 1e-9);
    }

    #[test]
    fn test_route_id_ordering_and_display() {
        let older = RouteId { session: 2, seq: 3 };
        let newer = RouteId { session: 2, seq: 4 };
        assert!(older < newer);
        assert_eq!(newer.to_string(), "route#2.4");
    }
}
