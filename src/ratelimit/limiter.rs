//! Core rate limiter implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, trace, warn};

use super::key::WindowKey;
use super::store::WindowStore;
use super::window::TimeWindow;
use crate::error::{Result, WindowLimitError};

/// Remaining quota at or below which admissions are logged as warnings.
const LOW_REMAINING_THRESHOLD: u64 = 10;

/// Maximum number of requests admitted per key per window.
///
/// A quota is always at least 1. A quota of 1 admits only the first request
/// of each window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Quota(u64);

impl Quota {
    /// Create a quota, rejecting zero.
    pub fn new(limit: u64) -> Result<Self> {
        if limit == 0 {
            return Err(WindowLimitError::InvalidQuota(limit));
        }
        Ok(Self(limit))
    }

    /// The number of requests allowed per window.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Default for Quota {
    fn default() -> Self {
        Self(super::rules::DEFAULT_REQUESTS_PER_MINUTE)
    }
}

impl TryFrom<u64> for Quota {
    type Error = WindowLimitError;

    fn try_from(limit: u64) -> Result<Self> {
        Quota::new(limit)
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests left in the current window after this one
    pub remaining: u64,
    /// Rank of this request in its window (0 when the limiter is disabled)
    pub count: u64,
    /// The quota the request was checked against
    pub limit: u64,
    /// Window the quota applies to
    pub window: TimeWindow,
    /// Time until the window resets
    pub reset_after: Duration,
    /// False when the limiter was globally disabled and nothing was counted
    pub enforced: bool,
}

impl Admission {
    fn bypassed(quota: Quota, window: TimeWindow) -> Self {
        Self {
            allowed: true,
            remaining: quota.get(),
            count: 0,
            limit: quota.get(),
            window,
            reset_after: Duration::ZERO,
            enforced: false,
        }
    }
}

/// The rate limiter that turns window counts into admission decisions.
///
/// This struct is thread-safe and meant to be created once and shared behind
/// an `Arc` for the lifetime of the process.
pub struct RateLimiter {
    /// Per-key window counters
    store: Arc<WindowStore>,
    /// Global kill switch
    enabled: AtomicBool,
}

impl RateLimiter {
    /// Create a new rate limiter with its own store on the monotonic clock.
    pub fn new() -> Self {
        Self::with_store(Arc::new(WindowStore::new()))
    }

    /// Create a rate limiter over an existing store.
    pub fn with_store(store: Arc<WindowStore>) -> Self {
        Self {
            store,
            enabled: AtomicBool::new(true),
        }
    }

    /// Check whether one more request for `key` fits in `quota` for `window`.
    ///
    /// The request is counted even when it is rejected. When the limiter is
    /// disabled the request is allowed and the store is left untouched.
    pub fn admit(&self, key: &WindowKey, quota: Quota, window: TimeWindow) -> Admission {
        if !self.is_enabled() {
            trace!(key = %key, "Rate limiter disabled, bypassing");
            return Admission::bypassed(quota, window);
        }

        let duration = window.duration();
        let observation = self.store.observe_window(key, duration);
        let count = observation.count;
        let limit = quota.get();

        let allowed = count <= limit;
        let remaining = limit.saturating_sub(count);
        let elapsed = self.store.clock().now().saturating_duration_since(observation.opened_at);
        let reset_after = duration.saturating_sub(elapsed);

        if !allowed {
            warn!(key = %key, count = count, limit = limit, "Rate limit exceeded");
        } else if remaining <= LOW_REMAINING_THRESHOLD {
            warn!(key = %key, remaining = remaining, "Rate limit nearly exhausted");
        } else {
            trace!(key = %key, remaining = remaining, "Rate limit remaining");
        }

        Admission {
            allowed,
            remaining,
            count,
            limit,
            window,
            reset_after,
            enforced: true,
        }
    }

    /// Turn enforcement on or off for all subsequent calls.
    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!(enabled = enabled, "Rate limiter enforcement toggled");
        }
    }

    /// Whether enforcement is on.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Forget every window so all keys start fresh.
    pub fn release_all(&self) {
        self.store.release_all();
    }

    /// The store backing this limiter.
    pub fn store(&self) -> &Arc<WindowStore> {
        &self.store
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
