//! Follow controller: the state machine of a live navigation
//!
//! Ties a [`PositionSource`], a [`MovementFilter`] and a [`RouteSession`]
//! together. Every transition happens under one mutex, so position fixes,
//! route completions and caller commands never interleave. Route requests
//! run outside the lock and are settled by the session, which discards
//! superseded results and results from cancelled sessions.

use super::routing::{Route, RouteHandle, RouteId, RoutingClient};
use super::session::{RouteRequest, RouteSession, Settled};
use super::FollowState;
use crate::common::{Destination, PositionSample};
use crate::config::NavConfig;
use crate::error::{NavError, Result};
use crate::positioning::filters::{Filter, MovementFilter};
use crate::positioning::source::{
    current_position_within, PositionEvent, PositionOptions, PositionSource, SubscriptionHandle,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Consistent view of the controller for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub struct NavSnapshot {
    pub state: FollowState,
    /// Identity of the current navigation; bumped by `start_route` and `cancel`
    pub generation: u64,
    pub destination: Option<Destination>,
    /// The installed route, always fully installed and live when present
    pub route: Option<RouteHandle>,
    pub last_accepted: Option<PositionSample>,
    /// Failure behind the `Error` state; cleared when the controller recovers
    pub last_error: Option<NavError>,
    /// A position subscription is alive
    pub following: bool,
}

impl NavSnapshot {
    fn idle() -> Self {
        NavSnapshot {
            state: FollowState::Idle,
            generation: 0,
            destination: None,
            route: None,
            last_accepted: None,
            last_error: None,
            following: false,
        }
    }

    pub fn route_ready(&self) -> bool {
        self.route.is_some()
    }
}

/// Drives one navigation at a time
pub struct FollowController {
    shared: Arc<Shared>,
}

struct Shared {
    source: Arc<dyn PositionSource>,
    router: Arc<dyn RoutingClient>,
    core: Mutex<Core>,
    snapshots: watch::Sender<NavSnapshot>,
}

/// Tunables taken from [`NavConfig`]; replaced by `FollowController::reconfigure`
struct Settings {
    filter: MovementFilter,
    seed_with_origin: bool,
    one_shot: PositionOptions,
    watch_options: PositionOptions,
}

impl Settings {
    fn from_config(config: &NavConfig) -> Self {
        Settings {
            filter: MovementFilter::new(config.follow.min_move_meters),
            seed_with_origin: config.follow.seed_with_origin,
            one_shot: config.positioning.one_shot.clone(),
            watch_options: config.positioning.watch.clone(),
        }
    }
}

struct Core {
    settings: Settings,
    state: FollowState,
    generation: u64,
    session: Option<RouteSession>,
    last_accepted: Option<PositionSample>,
    last_error: Option<NavError>,
    watch: Option<ActiveWatch>,
    watch_epoch: u64,
}

struct ActiveWatch {
    handle: SubscriptionHandle,
    epoch: u64,
    pump: JoinHandle<()>,
}

impl Core {
    fn snapshot(&self) -> NavSnapshot {
        NavSnapshot {
            state: self.state,
            generation: self.generation,
            destination: self.session.as_ref().map(|s| s.destination().clone()),
            route: self.session.as_ref().and_then(|s| s.current().cloned()),
            last_accepted: self.last_accepted.clone(),
            last_error: self.last_error.clone(),
            following: self.watch.is_some(),
        }
    }

    fn current_route(&self) -> Option<RouteHandle> {
        self.session.as_ref().and_then(|s| s.current().cloned())
    }

    fn live_epoch(&self) -> Option<u64> {
        self.watch.as_ref().map(|w| w.epoch)
    }
}

impl FollowController {
    /// Create an idle controller
    pub fn new(
        source: Arc<dyn PositionSource>,
        router: Arc<dyn RoutingClient>,
        config: &NavConfig,
    ) -> Self {
        let (snapshots, _) = watch::channel(NavSnapshot::idle());
        FollowController {
            shared: Arc::new(Shared {
                source,
                router,
                core: Mutex::new(Core {
                    settings: Settings::from_config(config),
                    state: FollowState::Idle,
                    generation: 0,
                    session: None,
                    last_accepted: None,
                    last_error: None,
                    watch: None,
                    watch_epoch: 0,
                }),
                snapshots,
            }),
        }
    }

    /// Receive every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<NavSnapshot> {
        self.shared.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> NavSnapshot {
        self.shared.lock().snapshot()
    }

    pub fn state(&self) -> FollowState {
        self.shared.lock().state
    }

    /// Apply new follow and positioning settings.
    ///
    /// The movement threshold applies from the next fix; positioning
    /// options apply to the next one-shot request or watch subscription.
    pub fn reconfigure(&self, config: &NavConfig) {
        let mut core = self.shared.lock();
        core.settings = Settings::from_config(config);
        info!(
            min_move_m = core.settings.filter.threshold_meters(),
            seed_with_origin = core.settings.seed_with_origin,
            "follow settings updated"
        );
    }

    /// Start navigating to `destination` from the current device position.
    ///
    /// Any previous navigation is torn down first. On success the controller
    /// stays in `Routing` with the route installed; on failure it moves to
    /// `Error` and the error is returned. Nothing is retried.
    pub async fn start_route(&self, destination: Destination) -> Result<RouteHandle> {
        let (generation, one_shot) = {
            let mut guard = self.shared.lock();
            let core = &mut *guard;
            self.shared.teardown(core);
            core.generation += 1;
            core.state = FollowState::Routing;
            core.session = Some(RouteSession::new(destination.clone(), core.generation));
            info!(
                generation = core.generation,
                destination = destination.name(),
                at = %destination.coordinate(),
                "starting route"
            );
            self.shared.publish(core);
            (core.generation, core.settings.one_shot.clone())
        };

        let origin = match current_position_within(self.shared.source.as_ref(), &one_shot).await {
            Ok(sample) => sample,
            Err(e) => return Err(self.shared.fail_start(generation, e)),
        };

        let request = {
            let mut guard = self.shared.lock();
            if guard.generation != generation {
                return Err(NavError::Cancelled);
            }
            match guard.session.as_mut() {
                Some(session) => session.issue(origin.coordinate),
                None => return Err(NavError::Cancelled),
            }
        };

        let result = self
            .shared
            .router
            .compute_route(request.origin, request.destination)
            .await;

        let mut guard = self.shared.lock();
        let core = &mut *guard;
        if core.generation != generation {
            debug!(generation, "route computed for a cancelled session, discarding");
            return Err(NavError::Cancelled);
        }
        let settled = match core.session.as_mut() {
            Some(session) => session.settle(request, result),
            None => return Err(NavError::Cancelled),
        };
        match settled {
            Settled::Installed(handle) => {
                core.last_error = None;
                self.shared.publish(core);
                Ok(handle)
            }
            Settled::Failed(e) => {
                warn!(error = %e, "initial route failed");
                core.state = FollowState::Error;
                core.last_error = Some(e.clone());
                self.shared.publish(core);
                Err(e)
            }
            Settled::Superseded | Settled::Discarded => Err(NavError::Cancelled),
        }
    }

    /// Begin continuous tracking of the device position.
    ///
    /// Requires an installed route. A no-op while a subscription is alive.
    /// Must be called from within a Tokio runtime.
    pub fn enable_follow(&self) -> Result<()> {
        let mut guard = self.shared.lock();
        let core = &mut *guard;
        if core.watch.is_some() {
            return Ok(());
        }
        let route = match core.current_route() {
            Some(route) => route,
            None => {
                return Err(NavError::InvalidTransition {
                    action: "enable follow",
                    state: core.state,
                })
            }
        };

        let watch = match self.shared.source.watch_position(&core.settings.watch_options) {
            Ok(watch) => watch,
            Err(e) => {
                warn!(error = %e, "could not start position watch");
                core.state = FollowState::Error;
                core.last_error = Some(e.clone());
                self.shared.publish(core);
                return Err(e);
            }
        };

        core.watch_epoch += 1;
        let epoch = core.watch_epoch;
        let pump = tokio::spawn(Shared::pump(Arc::clone(&self.shared), epoch, watch.events));
        core.watch = Some(ActiveWatch {
            handle: watch.handle,
            epoch,
            pump,
        });
        core.last_accepted = if core.settings.seed_with_origin {
            Some(PositionSample::now(route.origin()))
        } else {
            None
        };
        core.state = FollowState::Following;
        core.last_error = None;
        info!(handle = %watch.handle, "follow enabled");
        self.shared.publish(core);
        Ok(())
    }

    /// Stop continuous tracking and keep the last route displayed
    pub fn disable_follow(&self) {
        let mut guard = self.shared.lock();
        let core = &mut *guard;
        if !self.shared.stop_watch(core) {
            return;
        }
        core.last_accepted = None;
        if core.current_route().is_some() {
            core.state = FollowState::Routing;
            core.last_error = None;
        } else {
            // A rebuild failed while following; there is nothing to show
            core.state = FollowState::Error;
        }
        info!("follow disabled");
        self.shared.publish(core);
    }

    /// Abandon the navigation: stop tracking, dispose the route, return to `Idle`.
    ///
    /// Safe from any state and idempotent. Route requests already in flight
    /// are not aborted; their results are discarded when they arrive.
    pub fn cancel(&self) {
        let mut guard = self.shared.lock();
        let core = &mut *guard;
        if core.state == FollowState::Idle && core.session.is_none() && core.watch.is_none() {
            return;
        }
        self.shared.teardown(core);
        core.generation += 1;
        info!(generation = core.generation, "navigation cancelled");
        self.shared.publish(core);
    }

    /// Report that the displayed route object for `id` became unusable.
    ///
    /// The next accepted fix rebuilds the route from scratch instead of
    /// reusing it. Returns false if `id` is not the installed route.
    pub fn report_route_fault(&self, id: RouteId) -> bool {
        let core = self.shared.lock();
        match &core.session {
            Some(session) => session.report_fault(id),
            None => false,
        }
    }
}

impl Drop for FollowController {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, core: &Core) {
        self.snapshots.send_replace(core.snapshot());
    }

    /// Cancel the live subscription, if any. Returns whether one existed.
    fn stop_watch(&self, core: &mut Core) -> bool {
        match core.watch.take() {
            Some(watch) => {
                self.source.cancel(watch.handle);
                watch.pump.abort();
                debug!(handle = %watch.handle, "position watch stopped");
                true
            }
            None => false,
        }
    }

    fn teardown(&self, core: &mut Core) {
        self.stop_watch(core);
        if let Some(mut session) = core.session.take() {
            session.dispose();
        }
        core.last_accepted = None;
        core.last_error = None;
        core.state = FollowState::Idle;
    }

    fn fail_start(&self, generation: u64, e: NavError) -> NavError {
        let mut guard = self.lock();
        let core = &mut *guard;
        if core.generation == generation {
            warn!(error = %e, "could not acquire starting position");
            core.state = FollowState::Error;
            core.last_error = Some(e.clone());
            self.publish(core);
        }
        e
    }

    async fn pump(
        shared: Arc<Shared>,
        epoch: u64,
        mut events: mpsc::UnboundedReceiver<PositionEvent>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                PositionEvent::Fix(sample) => shared.on_sample(epoch, sample),
                PositionEvent::Failed(e) => {
                    shared.on_watch_failed(epoch, e);
                    return;
                }
            }
        }
        shared.on_watch_failed(
            epoch,
            NavError::PositionUnavailable("position stream ended".to_string()),
        );
    }

    fn on_sample(self: &Arc<Self>, epoch: u64, sample: PositionSample) {
        let request = {
            let mut guard = self.lock();
            let core = &mut *guard;
            if core.live_epoch() != Some(epoch) {
                trace!(epoch, "fix from a stopped watch, ignoring");
                return;
            }
            let last = core.last_accepted.as_ref().map(|s| &s.coordinate);
            if !core.settings.filter.accepts(last, &sample.coordinate) {
                trace!(at = %sample.coordinate, "movement below threshold");
                return;
            }
            let request = match core.session.as_mut() {
                Some(session) => session.issue(sample.coordinate),
                None => return,
            };
            debug!(at = %sample.coordinate, seq = request.seq, "significant movement, recomputing");
            core.last_accepted = Some(sample);
            self.publish(core);
            request
        };

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let result = shared
                .router
                .compute_route(request.origin, request.destination)
                .await;
            shared.on_recomputed(request, result);
        });
    }

    fn on_recomputed(&self, request: RouteRequest, result: Result<Route>) {
        let mut guard = self.lock();
        let core = &mut *guard;
        if request.generation != core.generation {
            debug!(
                generation = request.generation,
                "recompute finished after cancellation, discarding"
            );
            return;
        }
        let settled = match core.session.as_mut() {
            Some(session) => session.settle(request, result),
            None => return,
        };
        match settled {
            Settled::Installed(_) => {
                if core.state == FollowState::Error && core.watch.is_some() {
                    info!("route recovered, following again");
                    core.state = FollowState::Following;
                    core.last_error = None;
                }
                self.publish(core);
            }
            Settled::Failed(e) if core.watch.is_some() => {
                warn!(error = %e, "recompute failed, keeping previous route");
                core.state = FollowState::Error;
                core.last_error = Some(e);
                self.publish(core);
            }
            Settled::Failed(e) => {
                debug!(error = %e, "recompute failed after follow stopped, ignoring");
            }
            Settled::Superseded | Settled::Discarded => {}
        }
    }

    fn on_watch_failed(&self, epoch: u64, e: NavError) {
        let mut guard = self.lock();
        let core = &mut *guard;
        if core.live_epoch() != Some(epoch) {
            return;
        }
        if let Some(watch) = core.watch.take() {
            self.source.cancel(watch.handle);
        }
        warn!(error = %e, "position watch failed");
        core.last_accepted = None;
        core.state = FollowState::Error;
        core.last_error = Some(e);
        self.publish(core);
    }
}
