//! Dual token-bucket rate limiting: one global bucket, one per origin.
//! A request may proceed only once both buckets hold a token.

use dashmap::DashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// A continuously-refilling token bucket. Capacity equals the refill rate,
/// i.e. a one-second burst.
struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    tokens: Mutex<(f64, Instant)>,
}

impl TokenBucket {
    fn new(refill_per_sec: f64) -> Self {
        Self {
            capacity: refill_per_sec.max(1.0),
            refill_per_sec,
            tokens: Mutex::new((refill_per_sec.max(1.0), Instant::now())),
        }
    }

    fn refill(&self) {
        let mut guard = self.tokens.lock().unwrap();
        let (tokens, last) = *guard;
        let elapsed = last.elapsed().as_secs_f64();
        let refilled = (tokens + elapsed * self.refill_per_sec).min(self.capacity);
        *guard = (refilled, Instant::now());
    }

    /// Attempts to take one token. Returns `true` on success.
    fn try_acquire(&self) -> bool {
        self.refill();
        let mut guard = self.tokens.lock().unwrap();
        if guard.0 >= 1.0 {
            guard.0 -= 1.0;
            true
        } else {
            false
        }
    }

    /// Estimated wait, in seconds, until one token becomes available.
    fn wait_estimate(&self) -> Duration {
        self.refill();
        let guard = self.tokens.lock().unwrap();
        if guard.0 >= 1.0 {
            Duration::ZERO
        } else {
            let deficit = 1.0 - guard.0;
            Duration::from_secs_f64(deficit / self.refill_per_sec.max(0.001))
        }
    }
}

/// Enforces a global requests-per-second bound and a per-origin
/// requests-per-second bound. Cancellation-safe: `acquire` returns promptly
/// on cancellation without consuming a token.
pub struct RateLimiter {
    global: TokenBucket,
    per_origin_rps: f64,
    origins: DashMap<String, std::sync::Arc<TokenBucket>>,
    notify: Notify,
}

impl RateLimiter {
    pub fn new(global_rps: f64, per_origin_rps: f64) -> Self {
        Self {
            global: TokenBucket::new(global_rps),
            per_origin_rps,
            origins: DashMap::new(),
            notify: Notify::new(),
        }
    }

    fn origin_bucket(&self, origin: &str) -> std::sync::Arc<TokenBucket> {
        self.origins
            .entry(origin.to_string())
            .or_insert_with(|| std::sync::Arc::new(TokenBucket::new(self.per_origin_rps)))
            .clone()
    }

    /// Suspends until both the global and per-origin buckets hold a token,
    /// or until `cancelled` fires. On cancellation, returns `false` without
    /// having consumed a token from either bucket.
    pub async fn acquire(&self, origin: &str, cancelled: &tokio_util::sync::CancellationToken) -> bool {
        let origin_bucket = self.origin_bucket(origin);
        loop {
            if cancelled.is_cancelled() {
                return false;
            }
            if self.global.try_acquire() {
                if origin_bucket.try_acquire() {
                    return true;
                }
                // Got a global token but not an origin token: this token is
                // lost to the bucket's natural refill (acceptable: buckets
                // refill continuously, so no request is permanently stuck).
            }
            let wait = self
                .global
                .wait_estimate()
                .max(origin_bucket.wait_estimate())
                .min(Duration::from_millis(250));
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancelled.cancelled() => return false,
                _ = self.notify.notified() => {}
            }
        }
    }

    /// Drops per-origin buckets that have been quiescent, bounding memory
    /// for long crawls touching many distinct origins.
    pub fn gc_idle_origins(&self, idle_for: Duration) {
        let cutoff = Instant::now() - idle_for;
        self.origins.retain(|_, bucket| {
            let guard = bucket.tokens.lock().unwrap();
            guard.1 > cutoff
        });
    }

    pub fn origin_count(&self) -> usize {
        self.origins.len()
    }
}
