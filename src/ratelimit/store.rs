//! Expiring, concurrency-safe window counters.
//!
//! Each key maps to at most one live window. Counting a request against a
//! live window only takes the shard's shared lock and bumps an atomic, while
//! opening or replacing a window takes the shard's exclusive lock so that
//! exactly one caller creates it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, trace};

use super::clock::{Clock, MonotonicClock};
use super::key::WindowKey;

/// State of one fixed window.
struct WindowEntry {
    /// Requests observed since `opened_at`
    count: AtomicU64,
    /// Start of the window
    opened_at: Instant,
    /// Window length the entry was opened with, used by the sweeper
    window: Duration,
}

impl WindowEntry {
    fn open(now: Instant, window: Duration) -> Self {
        Self {
            count: AtomicU64::new(1),
            opened_at: now,
            window,
        }
    }

    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.opened_at) > window
    }

    fn increment(&self) -> u64 {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Result of registering one request against a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Rank of this request within its window, starting at 1
    pub count: u64,
    /// When the window this request landed in was opened
    pub opened_at: Instant,
}

/// Store of per-key fixed windows.
///
/// The store is safe to share across threads; wrap it in an `Arc` to hand
/// it to both a limiter and a sweeper.
pub struct WindowStore {
    entries: DashMap<WindowKey, WindowEntry>,
    clock: Arc<dyn Clock>,
}

impl WindowStore {
    /// Create an empty store on the monotonic clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock))
    }

    /// Create an empty store driven by the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Register one request for `key` and return its rank in the window.
    ///
    /// A missing or expired window is replaced by a fresh one and the caller
    /// gets 1. Concurrent callers on the same key always receive distinct,
    /// gap-free ranks.
    pub fn observe(&self, key: &WindowKey, window: Duration) -> u64 {
        self.observe_window(key, window).count
    }

    /// Like [`observe`](Self::observe), also reporting when the window opened.
    pub fn observe_window(&self, key: &WindowKey, window: Duration) -> Observation {
        let now = self.clock.now();

        // Fast path: the shared guard keeps the entry from being replaced
        // while we count against it.
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now, window) {
                let count = entry.increment();
                trace!(key = %key, count = count, "Counted request in live window");
                return Observation {
                    count,
                    opened_at: entry.opened_at,
                };
            }
        }

        // Slow path: re-check under the exclusive guard so only one caller
        // opens the new window.
        let now = self.clock.now();
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now, window) {
                    debug!(key = %key, "Replacing expired window");
                    occupied.insert(WindowEntry::open(now, window));
                    Observation {
                        count: 1,
                        opened_at: now,
                    }
                } else {
                    let entry = occupied.get();
                    Observation {
                        count: entry.increment(),
                        opened_at: entry.opened_at,
                    }
                }
            }
            Entry::Vacant(vacant) => {
                debug!(key = %key, window = ?window, "Opening new window");
                vacant.insert(WindowEntry::open(now, window));
                Observation {
                    count: 1,
                    opened_at: now,
                }
            }
        }
    }

    /// Get the count of the live window for `key`.
    ///
    /// Returns `None` if the key has no window or its window has expired.
    pub fn current_count(&self, key: &WindowKey, window: Duration) -> Option<u64> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now, window))
            .map(|entry| entry.count.load(Ordering::SeqCst))
    }

    /// Time left before the live window for `key` closes.
    pub fn time_until_reset(&self, key: &WindowKey, window: Duration) -> Option<Duration> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now, window))
            .map(|entry| window.saturating_sub(now.saturating_duration_since(entry.opened_at)))
    }

    /// Drop every window, live or not.
    pub fn release_all(&self) {
        let released = self.entries.len();
        self.entries.clear();
        info!(released = released, "Released all rate limit windows");
    }

    /// Remove windows that outlived the length they were opened with.
    ///
    /// Returns the number of windows removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now, entry.window);
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            debug!(removed = removed, remaining = self.entries.len(), "Swept expired windows");
        }
        removed
    }

    /// Get the number of tracked windows, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no windows are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The clock driving this store.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

impl Default for WindowStore {
    fn default() -> Self {
        Self::new()
    }
}
