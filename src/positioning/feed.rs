//! Position source fed by the host's device bridge
//!
//! The host pushes raw fixes and device failures into a [`PositionFeed`];
//! [`FeedPositionSource`] turns them into one-shot answers and independent
//! watch subscriptions.

use super::source::{
    PositionEvent, PositionOptions, PositionSource, PositionWatch, SubscriptionHandle,
};
use crate::common::PositionSample;
use crate::error::{NavError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
enum DeviceEvent {
    Fix(PositionSample),
    Error(String),
}

/// Host-side handle used to publish device readings
#[derive(Debug, Clone)]
pub struct PositionFeed {
    tx: broadcast::Sender<DeviceEvent>,
}

impl PositionFeed {
    /// Publish a new fix. Returns how many listeners received it.
    pub fn push_fix(&self, sample: PositionSample) -> usize {
        self.tx.send(DeviceEvent::Fix(sample)).unwrap_or(0)
    }

    /// Publish a device failure (permission denied, timeout, ...)
    pub fn push_error(&self, reason: impl Into<String>) -> usize {
        self.tx.send(DeviceEvent::Error(reason.into())).unwrap_or(0)
    }

    /// Number of one-shot requests and watches currently listening
    pub fn listeners(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A [`PositionSource`] backed by a broadcast feed
pub struct FeedPositionSource {
    tx: broadcast::Sender<DeviceEvent>,
    watches: Mutex<HashMap<SubscriptionHandle, JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl FeedPositionSource {
    /// Create a source and the feed that drives it.
    ///
    /// `capacity` bounds how many unread readings a slow subscriber may lag
    /// behind before it starts skipping.
    pub fn new(capacity: usize) -> (Self, PositionFeed) {
        let (tx, _) = broadcast::channel(capacity.max(1));
        let source = FeedPositionSource {
            tx: tx.clone(),
            watches: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        };
        (source, PositionFeed { tx })
    }

    /// Number of watch subscriptions not yet cancelled
    pub fn active_watches(&self) -> usize {
        let mut watches = self.watches.lock().unwrap_or_else(PoisonError::into_inner);
        watches.retain(|_, task| !task.is_finished());
        watches.len()
    }
}

#[async_trait]
impl PositionSource for FeedPositionSource {
    async fn current_position(&self, options: &PositionOptions) -> Result<PositionSample> {
        debug!(
            high_accuracy = options.enable_high_accuracy,
            timeout_ms = options.timeout_ms,
            "waiting for one-shot fix"
        );
        let mut rx = self.tx.subscribe();
        loop {
            match rx.recv().await {
                Ok(DeviceEvent::Fix(sample)) => return Ok(sample),
                Ok(DeviceEvent::Error(reason)) => return Err(NavError::PositionUnavailable(reason)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    trace!(skipped, "one-shot request lagged behind feed");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(NavError::PositionUnavailable(
                        "position feed closed".to_string(),
                    ))
                }
            }
        }
    }

    fn watch_position(&self, options: &PositionOptions) -> Result<PositionWatch> {
        let handle = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, events) = mpsc::unbounded_channel();
        let mut rx = self.tx.subscribe();

        debug!(%handle, maximum_age_ms = options.maximum_age_ms, "starting position watch");
        let task = tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(DeviceEvent::Fix(sample)) => PositionEvent::Fix(sample),
                    Ok(DeviceEvent::Error(reason)) => {
                        PositionEvent::Failed(NavError::PositionUnavailable(reason))
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%handle, skipped, "position watch lagged, fixes dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => PositionEvent::Failed(
                        NavError::PositionUnavailable("position feed closed".to_string()),
                    ),
                };
                let failed = matches!(event, PositionEvent::Failed(_));
                if tx.send(event).is_err() || failed {
                    break;
                }
            }
            trace!(%handle, "position watch forwarder finished");
        });

        self.watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, task);
        Ok(PositionWatch { handle, events })
    }

    fn cancel(&self, handle: SubscriptionHandle) {
        let task = self
            .watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);
        if let Some(task) = task {
            debug!(%handle, "cancelling position watch");
            task.abort();
        }
    }
}

impl Drop for FeedPositionSource {
    fn drop(&mut self) {
        let watches = self.watches.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, task) in watches.drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Coordinate;
    use std::time::Duration;

    fn options() -> PositionOptions {
        PositionOptions {
            enable_high_accuracy: true,
            timeout_ms: 1_000,
            maximum_age_ms: 0,
        }
    }

    fn sample(lat: f64, lon: f64) -> PositionSample {
        PositionSample::now(Coordinate::new(lat, lon).unwrap())
    }

    async fn wait_for_listeners(feed: &PositionFeed, n: usize) {
        for _ in 0..200 {
            if feed.listeners() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("listeners never reached {}", n);
    }

    #[tokio::test]
    async fn test_one_shot_waits_for_next_fix() {
        let (source, feed) = FeedPositionSource::new(8);
        // Readings pushed before the request are not cached
        feed.push_fix(sample(1.0, 1.0));

        let request = tokio::spawn(async move { source.current_position(&options()).await });
        wait_for_listeners(&feed, 1).await;
        feed.push_fix(sample(9.9, -84.1));

        let fix = request.await.unwrap().unwrap();
        assert_eq!(fix.coordinate.latitude(), 9.9);
    }

    #[tokio::test]
    async fn test_one_shot_reports_device_error() {
        let (source, feed) = FeedPositionSource::new(8);
        let request = tokio::spawn(async move { source.current_position(&options()).await });
        wait_for_listeners(&feed, 1).await;
        feed.push_error("permission denied");

        let err = request.await.unwrap().unwrap_err();
        assert_eq!(err, NavError::PositionUnavailable("permission denied".into()));
    }

    #[tokio::test]
    async fn test_watch_forwards_every_fix_in_order() {
        let (source, feed) = FeedPositionSource::new(8);
        let mut watch = source.watch_position(&options()).unwrap();
        wait_for_listeners(&feed, 1).await;

        feed.push_fix(sample(1.0, 1.0));
        feed.push_fix(sample(1.0, 1.0));
        feed.push_fix(sample(2.0, 2.0));

        let mut lats = Vec::new();
        for _ in 0..3 {
            match watch.events.recv().await {
                Some(PositionEvent::Fix(s)) => lats.push(s.coordinate.latitude()),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(lats, vec![1.0, 1.0, 2.0]);
    }

    #[tokio::test]
    async fn test_watch_error_is_delivered_once_then_stream_ends() {
        let (source, feed) = FeedPositionSource::new(8);
        let mut watch = source.watch_position(&options()).unwrap();
        wait_for_listeners(&feed, 1).await;

        feed.push_error("signal lost");
        feed.push_fix(sample(1.0, 1.0));

        assert!(matches!(watch.events.recv().await, Some(PositionEvent::Failed(_))));
        assert!(watch.events.recv().await.is_none());

        // Cancelling a dead subscription is harmless
        source.cancel(watch.handle);
        source.cancel(watch.handle);
    }

    #[tokio::test]
    async fn test_cancel_stops_delivery_and_is_idempotent() {
        let (source, feed) = FeedPositionSource::new(8);
        let mut first = source.watch_position(&options()).unwrap();
        let mut second = source.watch_position(&options()).unwrap();
        assert_ne!(first.handle, second.handle);
        wait_for_listeners(&feed, 2).await;

        source.cancel(first.handle);
        source.cancel(first.handle);
        assert_eq!(source.active_watches(), 1);

        feed.push_fix(sample(3.0, 3.0));
        assert!(matches!(second.events.recv().await, Some(PositionEvent::Fix(_))));
        assert!(first.events.recv().await.is_none());
    }
}
