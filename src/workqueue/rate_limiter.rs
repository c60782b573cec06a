// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Rate limiters deciding how long a key waits before it is re-added.
//!
//! The default controller limiter is the maximum of two policies:
//!
//! - **Per-item exponential backoff** - `base * 2^failures`, capped at `max`
//! - **Overall token bucket** - bounds the aggregate retry rate across all keys
//!
//! # Retry Schedule
//!
//! With the defaults (5ms base, 1000s ceiling) a key that keeps failing waits:
//!
//! 1. 5ms
//! 2. 10ms
//! 3. 20ms
//! 4. 40ms
//! 5. ...doubling...
//! 19. ~655s
//! 20. 1000s (capped at max delay), and 1000s thereafter
//!
//! until [`RateLimiter::forget`] resets the key.

use crate::constants::{
    DEFAULT_BUCKET_BURST, DEFAULT_BUCKET_QPS, DEFAULT_ITEM_BASE_DELAY_MILLIS,
    DEFAULT_ITEM_MAX_DELAY_SECS,
};
use crate::keys::ResourceKey;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Per-key delay policy for rate-limited adds.
pub trait RateLimiter: Send + Sync {
    /// Delay before `key` may be re-added. Records one more failure for the key.
    fn when(&self, key: &ResourceKey) -> Duration;

    /// Reset all backoff state held for `key`.
    fn forget(&self, key: &ResourceKey);

    /// Number of failures recorded for `key` since the last `forget`.
    fn num_requeues(&self, key: &ResourceKey) -> u32;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exponential backoff tracked per key.
pub struct ItemExponentialFailureRateLimiter {
    /// Delay for the first failure
    pub base_delay: Duration,
    /// Ceiling for any single delay
    pub max_delay: Duration,
    failures: Mutex<HashMap<ResourceKey, u32>>,
}

impl ItemExponentialFailureRateLimiter {
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn backoff_for(&self, exponent: u32) -> Duration {
        let nanos = 1u128
            .checked_shl(exponent)
            .and_then(|factor| self.base_delay.as_nanos().checked_mul(factor))
            .filter(|nanos| *nanos < self.max_delay.as_nanos())
            .and_then(|nanos| u64::try_from(nanos).ok());

        nanos.map_or(self.max_delay, Duration::from_nanos)
    }
}

impl Default for ItemExponentialFailureRateLimiter {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_ITEM_BASE_DELAY_MILLIS),
            Duration::from_secs(DEFAULT_ITEM_MAX_DELAY_SECS),
        )
    }
}

impl RateLimiter for ItemExponentialFailureRateLimiter {
    fn when(&self, key: &ResourceKey) -> Duration {
        let exponent = {
            let mut failures = lock(&self.failures);
            let count = failures.entry(key.clone()).or_insert(0);
            let exponent = *count;
            *count = count.saturating_add(1);
            exponent
        };
        self.backoff_for(exponent)
    }

    fn forget(&self, key: &ResourceKey) {
        lock(&self.failures).remove(key);
    }

    fn num_requeues(&self, key: &ResourceKey) -> u32 {
        lock(&self.failures).get(key).copied().unwrap_or(0)
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket shared by all keys.
///
/// Each call to `when` reserves one token. Once the burst is spent, callers are
/// spaced `1 / qps` apart.
pub struct BucketRateLimiter {
    /// Tokens added per second
    pub qps: f64,
    /// Bucket capacity
    pub burst: u32,
    bucket: Mutex<Bucket>,
}

impl BucketRateLimiter {
    #[must_use]
    pub fn new(qps: f64, burst: u32) -> Self {
        Self {
            qps,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            }),
        }
    }
}

impl Default for BucketRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_QPS, DEFAULT_BUCKET_BURST)
    }
}

impl RateLimiter for BucketRateLimiter {
    fn when(&self, _key: &ResourceKey) -> Duration {
        if self.qps <= 0.0 {
            return Duration::ZERO;
        }

        let mut bucket = lock(&self.bucket);
        let now = Instant::now();
        let refill = now.duration_since(bucket.last_refill).as_secs_f64() * self.qps;
        bucket.tokens = (bucket.tokens + refill).min(f64::from(self.burst));
        bucket.last_refill = now;

        bucket.tokens -= 1.0;
        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / self.qps)
        }
    }

    fn forget(&self, _key: &ResourceKey) {}

    fn num_requeues(&self, _key: &ResourceKey) -> u32 {
        0
    }
}

/// Combines limiters by taking the longest delay any of them asks for.
pub struct MaxOfRateLimiter {
    limiters: Vec<Box<dyn RateLimiter>>,
}

impl MaxOfRateLimiter {
    #[must_use]
    pub fn new(limiters: Vec<Box<dyn RateLimiter>>) -> Self {
        Self { limiters }
    }
}

impl RateLimiter for MaxOfRateLimiter {
    fn when(&self, key: &ResourceKey) -> Duration {
        // Every limiter must see the failure, so no short-circuiting here.
        self.limiters
            .iter()
            .map(|limiter| limiter.when(key))
            .fold(Duration::ZERO, Duration::max)
    }

    fn forget(&self, key: &ResourceKey) {
        for limiter in &self.limiters {
            limiter.forget(key);
        }
    }

    fn num_requeues(&self, key: &ResourceKey) -> u32 {
        self.limiters
            .iter()
            .map(|limiter| limiter.num_requeues(key))
            .max()
            .unwrap_or(0)
    }
}

/// Build the standard controller limiter from explicit parameters.
#[must_use]
pub fn controller_rate_limiter(
    base_delay: Duration,
    max_delay: Duration,
    qps: f64,
    burst: u32,
) -> MaxOfRateLimiter {
    MaxOfRateLimiter::new(vec![
        Box::new(ItemExponentialFailureRateLimiter::new(base_delay, max_delay)),
        Box::new(BucketRateLimiter::new(qps, burst)),
    ])
}

/// Standard controller limiter: per-item exponential backoff (5ms to 1000s)
/// combined with a 10 qps / 100 burst overall bucket.
#[must_use]
pub fn default_controller_rate_limiter() -> MaxOfRateLimiter {
    MaxOfRateLimiter::new(vec![
        Box::new(ItemExponentialFailureRateLimiter::default()),
        Box::new(BucketRateLimiter::default()),
    ])
}

#[cfg(test)]
#[path = "rate_limiter_tests.rs"]
mod rate_limiter_tests;
