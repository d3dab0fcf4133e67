//! Per-family token-bucket rate limiting for the request surface.

use std::sync::Mutex;
use std::time::Instant;

use dashmap::DashMap;

use athena_core::constants::{
    RATE_CONSOLIDATE_PER_HOUR, RATE_DEFAULT_PER_MIN, RATE_RECALL_PER_MIN, RATE_REMEMBER_PER_MIN,
};
use athena_core::errors::{AthenaError, AthenaResult};

struct Bucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<(f64, Instant)>,
}

impl Bucket {
    fn new(per_window: u32, window_secs: f64) -> Self {
        let capacity = per_window as f64;
        Self {
            capacity,
            refill_per_sec: capacity / window_secs,
            state: Mutex::new((capacity, Instant::now())),
        }
    }

    /// Try to take one token; on failure returns the wait in milliseconds.
    fn try_take(&self) -> Result<(), u64> {
        let Ok(mut state) = self.state.lock() else { return Err(1000) };
        let (ref mut tokens, ref mut last) = *state;
        let elapsed = last.elapsed().as_secs_f64();
        *tokens = (*tokens + elapsed * self.refill_per_sec).min(self.capacity);
        *last = Instant::now();
        if *tokens >= 1.0 {
            *tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - *tokens;
            Err(((deficit / self.refill_per_sec) * 1000.0).ceil() as u64)
        }
    }
}

/// Every operation passes through here with its family name.
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new() -> Self {
        let limiter = Self { buckets: DashMap::new() };
        // Documented defaults; unknown families get the default bucket lazily.
        limiter.buckets.insert("recall".into(), Bucket::new(RATE_RECALL_PER_MIN, 60.0));
        limiter
            .buckets
            .insert("remember".into(), Bucket::new(RATE_REMEMBER_PER_MIN, 60.0));
        limiter.buckets.insert(
            "consolidation".into(),
            Bucket::new(RATE_CONSOLIDATE_PER_HOUR, 3600.0),
        );
        limiter
    }

    /// Charge one call against a family bucket.
    pub fn check(&self, family: &str) -> AthenaResult<()> {
        let bucket = self
            .buckets
            .entry(family.to_string())
            .or_insert_with(|| Bucket::new(RATE_DEFAULT_PER_MIN, 60.0));
        bucket
            .try_take()
            .map_err(|retry_after_ms| AthenaError::RateLimited { retry_after_ms })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consolidation_family_exhausts_after_five() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            limiter.check("consolidation").unwrap();
        }
        let err = limiter.check("consolidation").unwrap_err();
        assert!(matches!(err, AthenaError::RateLimited { retry_after_ms } if retry_after_ms > 0));
    }

    #[test]
    fn unknown_family_gets_default_bucket() {
        let limiter = RateLimiter::new();
        limiter.check("code").unwrap();
    }
}
