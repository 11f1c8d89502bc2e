// storefront/src/services/rate_limit.rs

//! Keyed sliding-window rate limiting.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{event, Level};
use uuid::Uuid;

/// Source of "now" for the limiter. Tests swap in a [`ManualClock`].
pub trait Clock: Send + Sync {
  fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> Instant {
    Instant::now()
  }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
  now: Mutex<Instant>,
}

impl ManualClock {
  pub fn new() -> Self {
    Self {
      now: Mutex::new(Instant::now()),
    }
  }

  pub fn advance(&self, by: Duration) {
    *self.now.lock() += by;
  }
}

impl Default for ManualClock {
  fn default() -> Self {
    Self::new()
  }
}

impl Clock for ManualClock {
  fn now(&self) -> Instant {
    *self.now.lock()
  }
}

pub trait RateLimiter: Send + Sync {
  /// Records an attempt for `key` and returns whether it is allowed.
  /// Rejected attempts are not recorded.
  fn try_acquire(&self, key: Uuid) -> bool;
}

/// Allows at most `limit` attempts per key within any rolling `window`.
pub struct WindowedRateLimiter {
  limit: usize,
  window: Duration,
  clock: Arc<dyn Clock>,
  hits: Mutex<HashMap<Uuid, VecDeque<Instant>>>,
}

// Above this many tracked keys, every access also sweeps keys whose
// attempts have all left the window.
const SWEEP_THRESHOLD: usize = 1024;

impl WindowedRateLimiter {
  pub fn new(limit: usize, window: Duration) -> Self {
    Self::with_clock(limit, window, Arc::new(SystemClock))
  }

  pub fn with_clock(limit: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
    Self {
      limit,
      window,
      clock,
      hits: Mutex::new(HashMap::new()),
    }
  }

  pub fn tracked_keys(&self) -> usize {
    self.hits.lock().len()
  }

  fn expired(&self, now: Instant, at: Instant) -> bool {
    now.duration_since(at) >= self.window
  }
}

impl RateLimiter for WindowedRateLimiter {
  fn try_acquire(&self, key: Uuid) -> bool {
    let now = self.clock.now();
    let mut hits = self.hits.lock();

    if hits.len() > SWEEP_THRESHOLD {
      let before = hits.len();
      hits.retain(|_, attempts| attempts.back().is_some_and(|last| !self.expired(now, *last)));
      event!(Level::DEBUG, swept = before - hits.len(), "Pruned idle rate limit keys.");
    }

    let attempts = hits.entry(key).or_default();
    while attempts.front().is_some_and(|first| self.expired(now, *first)) {
      attempts.pop_front();
    }

    if attempts.len() >= self.limit {
      event!(Level::WARN, %key, limit = self.limit, "Rate limit reached.");
      return false;
    }
    attempts.push_back(now);
    true
  }
}
