//! Position source contract

use crate::common::PositionSample;
use crate::error::{NavError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// Options passed to the device location API
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PositionOptions {
    #[serde(default)]
    pub enable_high_accuracy: bool,
    /// Upper bound on how long a fix may take, in milliseconds
    pub timeout_ms: u64,
    /// Oldest cached fix the device may hand back, in milliseconds (0 = fresh only)
    #[serde(default)]
    pub maximum_age_ms: u64,
}

impl PositionOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Identifies one `watch_position` subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch#{}", self.0)
    }
}

/// What a continuous subscription delivers
#[derive(Debug, Clone, PartialEq)]
pub enum PositionEvent {
    Fix(PositionSample),
    /// Delivered at most once; the subscription is dead afterwards
    Failed(NavError),
}

/// A live subscription: its handle plus the ordered event stream
#[derive(Debug)]
pub struct PositionWatch {
    pub handle: SubscriptionHandle,
    pub events: mpsc::UnboundedReceiver<PositionEvent>,
}

/// Trait for device location providers
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Acquire a single fresh fix. Implementations do not cache.
    async fn current_position(&self, options: &PositionOptions) -> Result<PositionSample>;

    /// Start a continuous subscription. Every fix is forwarded without
    /// deduplication; after a `Failed` event the stream ends.
    fn watch_position(&self, options: &PositionOptions) -> Result<PositionWatch>;

    /// Stop a subscription. Idempotent and safe on handles that already failed.
    fn cancel(&self, handle: SubscriptionHandle);
}

/// Acquire a one-shot fix bounded by `options.timeout_ms`
pub async fn current_position_within(
    source: &dyn PositionSource,
    options: &PositionOptions,
) -> Result<PositionSample> {
    match tokio::time::timeout(options.timeout(), source.current_position(options)).await {
        Ok(result) => result,
        Err(_) => Err(NavError::PositionUnavailable(format!(
            "no fix within {} ms",
            options.timeout_ms
        ))),
    }
}
