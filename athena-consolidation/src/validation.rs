//! Slow-path validator plumbing: verdict cache keyed by prompt hash, a
//! token-bucket limiter, a bounded in-flight count, and the frozen mode
//! tests use to outlaw cache misses.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use moka::sync::Cache;
use tracing::debug;

use athena_core::constants::DEFAULT_LLM_IN_FLIGHT;
use athena_core::errors::{AthenaError, AthenaResult};
use athena_core::traits::{LlmValidator, ValidationRequest, ValidationResponse};

/// Simple token bucket; the LLM provider is externally rate-limited and we
/// keep our own envelope under it.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<(f64, Instant)>,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_per_sec,
            state: Mutex::new((capacity, Instant::now())),
        }
    }

    /// Take one token; `false` when exhausted.
    pub fn try_take(&self) -> bool {
        let Ok(mut state) = self.state.lock() else { return false };
        let (ref mut tokens, ref mut last) = *state;
        let elapsed = last.elapsed().as_secs_f64();
        *tokens = (*tokens + elapsed * self.refill_per_sec).min(self.capacity);
        *last = Instant::now();
        if *tokens >= 1.0 {
            *tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Wraps the opaque validator with the verdict cache. Within a run (and
/// across runs in one process) the same prompt hash returns the same
/// response, bounding the provider's non-determinism.
pub struct CachedValidator {
    inner: Arc<dyn LlmValidator>,
    cache: Cache<String, ValidationResponse>,
    bucket: TokenBucket,
    in_flight: AtomicUsize,
    max_in_flight: usize,
}

impl CachedValidator {
    pub fn new(inner: Arc<dyn LlmValidator>) -> Self {
        Self {
            inner,
            cache: Cache::new(10_000),
            // Generous envelope; the per-run budget is the real cap.
            bucket: TokenBucket::new(32.0, 2.0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: DEFAULT_LLM_IN_FLIGHT,
        }
    }

    pub fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    /// Validate through the cache. A cache hit costs nothing; a miss takes a
    /// limiter token and an in-flight slot.
    pub fn validate(&self, request: &ValidationRequest) -> AthenaResult<ValidationResponse> {
        let key = request.prompt_hash();
        if let Some(hit) = self.cache.get(&key) {
            debug!(hash = %key, "verdict cache hit");
            return Ok(hit);
        }

        if !self.inner.is_available() {
            return Err(AthenaError::DependencyUnavailable {
                provider: "llm",
                reason: "validator reports unavailable".into(),
            });
        }
        if !self.bucket.try_take() {
            return Err(AthenaError::RateLimited { retry_after_ms: 500 });
        }

        // Bounded in-flight count; the slot is held only for the call.
        let previous = self.in_flight.fetch_add(1, Ordering::SeqCst);
        if previous >= self.max_in_flight {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(AthenaError::RateLimited { retry_after_ms: 100 });
        }
        let result = self.inner.validate(request);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let response = result?;
        self.cache.insert(key, response.clone());
        Ok(response)
    }

    /// Seed the cache directly (used by tests and replay).
    pub fn seed(&self, request: &ValidationRequest, response: ValidationResponse) {
        self.cache.insert(request.prompt_hash(), response);
    }
}

/// Frozen mode: any call that would miss the verdict cache fails. Tests use
/// this to make the slow path fully deterministic.
pub struct FrozenValidator {
    cache: Cache<String, ValidationResponse>,
}

impl FrozenValidator {
    pub fn new() -> Self {
        Self { cache: Cache::new(10_000) }
    }

    pub fn seed(&self, request: &ValidationRequest, response: ValidationResponse) {
        self.cache.insert(request.prompt_hash(), response);
    }
}

impl Default for FrozenValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmValidator for FrozenValidator {
    fn validate(&self, request: &ValidationRequest) -> AthenaResult<ValidationResponse> {
        self.cache.get(&request.prompt_hash()).ok_or_else(|| {
            AthenaError::DependencyUnavailable {
                provider: "llm",
                reason: "frozen validator: prompt hash not in cache".into(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use athena_core::traits::Verdict;

    fn request(prompt: &str) -> ValidationRequest {
        ValidationRequest { prompt: prompt.into(), schema: serde_json::json!({}) }
    }

    fn response(verdict: Verdict) -> ValidationResponse {
        ValidationResponse {
            verdict,
            refined_summary: None,
            confidence: 0.8,
            rationale: "test".into(),
        }
    }

    struct CountingValidator(AtomicUsize);

    impl LlmValidator for CountingValidator {
        fn validate(&self, _request: &ValidationRequest) -> AthenaResult<ValidationResponse> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(response(Verdict::Valid))
        }
    }

    #[test]
    fn same_prompt_hits_cache_once() {
        let inner = Arc::new(CountingValidator(AtomicUsize::new(0)));
        let cached = CachedValidator::new(inner.clone());
        cached.validate(&request("same prompt")).unwrap();
        cached.validate(&request("same prompt")).unwrap();
        assert_eq!(inner.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn frozen_validator_fails_on_miss_and_serves_seeds() {
        let frozen = FrozenValidator::new();
        let req = request("seeded prompt");
        assert!(frozen.validate(&req).is_err());
        frozen.seed(&req, response(Verdict::Invalid));
        assert_eq!(frozen.validate(&req).unwrap().verdict, Verdict::Invalid);
    }
}
