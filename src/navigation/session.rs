//! Route session: lifecycle of the single route of one navigation
//!
//! A session owns at most one installed [`RouteHandle`]. Requests are issued
//! with increasing sequence numbers and settled independently, so several
//! may be in flight at once; only the result of the most recently issued
//! request takes effect (last write wins), and only if it belongs to this
//! session generation. Older results are superseded whether they succeeded
//! or failed.

use super::routing::{Route, RouteHandle, RouteId, RoutingClient};
use crate::common::{Coordinate, Destination};
use crate::error::{NavError, Result};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No route installed yet
    Pending,
    Active,
    Disposed,
}

/// A route computation issued by a session and not yet settled
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub generation: u64,
    pub seq: u64,
    pub origin: Coordinate,
    pub destination: Coordinate,
    /// No usable route existed when the request was issued
    pub rebuild: bool,
}

/// Outcome of settling a request
#[derive(Debug, Clone, PartialEq)]
pub enum Settled {
    Installed(RouteHandle),
    /// The request failed; any previously installed handle is still current
    Failed(NavError),
    /// A newer request already installed its route
    Superseded,
    /// The request belongs to a disposed session or an older generation
    Discarded,
}

/// Route state of one navigation towards a fixed destination
#[derive(Debug)]
pub struct RouteSession {
    destination: Destination,
    generation: u64,
    current: Option<RouteHandle>,
    issued: u64,
    installed: u64,
    status: SessionStatus,
}

impl RouteSession {
    /// Create a session for `destination`; `generation` tags every route it installs
    pub fn new(destination: Destination, generation: u64) -> Self {
        RouteSession {
            destination,
            generation,
            current: None,
            issued: 0,
            installed: 0,
            status: SessionStatus::Pending,
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// The installed handle, if any
    pub fn current(&self) -> Option<&RouteHandle> {
        self.current.as_ref()
    }

    /// Issue a new request from `origin` to the session destination.
    ///
    /// If the installed handle has faulted it is retired here and the
    /// request is marked as a rebuild: a faulted route object is never
    /// updated in place.
    pub fn issue(&mut self, origin: Coordinate) -> RouteRequest {
        let stale = match self.current.as_ref().map(RouteHandle::ensure_usable) {
            Some(Err(NavError::StaleHandle(id))) => Some(id),
            _ => None,
        };
        if let Some(id) = stale {
            warn!(%id, "route handle is stale, discarding and rebuilding");
            if let Some(handle) = self.current.take() {
                handle.retire();
            }
        }
        let rebuild = self.current.is_none();

        self.issued += 1;
        debug!(
            generation = self.generation,
            seq = self.issued,
            rebuild,
            %origin,
            "issuing route request"
        );
        RouteRequest {
            generation: self.generation,
            seq: self.issued,
            origin,
            destination: self.destination.coordinate(),
            rebuild,
        }
    }

    /// Apply the result of a previously issued request
    pub fn settle(&mut self, request: RouteRequest, result: Result<Route>) -> Settled {
        if request.generation != self.generation || self.status == SessionStatus::Disposed {
            debug!(
                generation = request.generation,
                seq = request.seq,
                "discarding route result from an inactive session"
            );
            return Settled::Discarded;
        }
        // Only the most recently issued request may take effect
        if request.seq < self.issued || request.seq <= self.installed {
            debug!(
                seq = request.seq,
                issued = self.issued,
                installed = self.installed,
                "discarding superseded route result"
            );
            return Settled::Superseded;
        }

        match result {
            Ok(route) => {
                let id = RouteId {
                    session: self.generation,
                    seq: request.seq,
                };
                let handle = RouteHandle::new(id, request.origin, request.destination, route);
                if let Some(previous) = self.current.replace(handle.clone()) {
                    previous.retire();
                }
                self.installed = request.seq;
                self.status = SessionStatus::Active;
                info!(
                    %id,
                    distance_m = handle.route().distance_meters,
                    "route installed"
                );
                Settled::Installed(handle)
            }
            Err(e) => {
                warn!(seq = request.seq, error = %e, "route request failed");
                Settled::Failed(e)
            }
        }
    }

    /// Compute and install the first route of the session.
    ///
    /// On failure the session is left as it was and the error is returned.
    pub async fn start(
        &mut self,
        router: &dyn RoutingClient,
        origin: Coordinate,
    ) -> Result<RouteHandle> {
        self.request_and_settle(router, origin).await
    }

    /// Compute a route from a new origin and swap it in.
    ///
    /// On failure the previous handle stays installed.
    pub async fn recompute(
        &mut self,
        router: &dyn RoutingClient,
        origin: Coordinate,
    ) -> Result<RouteHandle> {
        self.request_and_settle(router, origin).await
    }

    async fn request_and_settle(
        &mut self,
        router: &dyn RoutingClient,
        origin: Coordinate,
    ) -> Result<RouteHandle> {
        let request = self.issue(origin);
        let result = router
            .compute_route(request.origin, request.destination)
            .await;
        match self.settle(request, result) {
            Settled::Installed(handle) => Ok(handle),
            Settled::Failed(e) => Err(e),
            Settled::Superseded | Settled::Discarded => Err(NavError::Cancelled),
        }
    }

    /// Flag the installed route as unusable if it is `id`
    pub fn report_fault(&self, id: RouteId) -> bool {
        match &self.current {
            Some(current) if current.id() == id => {
                current.mark_faulted();
                true
            }
            _ => false,
        }
    }

    /// Release the installed handle, if any. Idempotent.
    pub fn dispose(&mut self) {
        if let Some(handle) = self.current.take() {
            debug!(id = %handle.id(), "disposing route");
            handle.retire();
        }
        self.status = SessionStatus::Disposed;
    }
}

impl Drop for RouteSession {
    fn drop(&mut self) {
        self.dispose();
    }
}
