//! Per-application token buckets.
//!
//! Gates how often a lost task may trigger a scaling action, so that a
//! crash-looping app cannot spin the engine in a hot re-scale loop.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use armada_id::AppId;
use tracing::debug;

/// A token bucket holding up to one second of permits.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate_per_sec: f64) -> Self {
        let capacity = rate_per_sec.max(1.0);
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec: rate_per_sec.max(0.0),
            last_refill: Instant::now(),
        }
    }

    fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Per-app rate limiter for loss-triggered rescaling.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<AppId, TokenBucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Establishes (or replaces) the bucket for an app.
    pub fn set_permits(&self, app_id: &AppId, rate_per_sec: f64) {
        let mut buckets = self.lock();
        buckets.insert(app_id.clone(), TokenBucket::new(rate_per_sec));
    }

    /// Consumes a token if one is available. Apps without a configured
    /// bucket are not throttled.
    pub fn try_acquire(&self, app_id: &AppId) -> bool {
        let mut buckets = self.lock();
        match buckets.get_mut(app_id) {
            Some(bucket) => bucket.try_acquire(),
            None => {
                debug!(app_id = %app_id, "No rate limit configured, allowing");
                true
            }
        }
    }

    /// Retires the bucket for an app.
    pub fn remove(&self, app_id: &AppId) {
        self.lock().remove(app_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<AppId, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner())
    }
}
