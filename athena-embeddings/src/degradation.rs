//! Degradation latch for the embedding collaborator.
//!
//! When the provider fails, search degrades to lexical-only ranking and
//! consolidation coherence falls back to lexical overlap; both consult this
//! state and flag the degradation in envelope metadata and meta metrics.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::warn;

/// One recorded fallback.
#[derive(Debug, Clone)]
pub struct DegradationEvent {
    pub failure: String,
    pub timestamp: DateTime<Utc>,
}

pub struct DegradationState {
    degraded: AtomicBool,
    failure_count: AtomicU64,
    events: Mutex<Vec<DegradationEvent>>,
}

impl DegradationState {
    pub fn new() -> Self {
        Self {
            degraded: AtomicBool::new(false),
            failure_count: AtomicU64::new(0),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Force the degraded state (used to disable the provider in tests and
    /// during maintenance).
    pub fn disable(&self) {
        self.degraded.store(true, Ordering::Release);
    }

    pub fn mark_failed(&self, failure: &str) {
        warn!(failure, "embedding provider failed, degrading to lexical-only");
        self.degraded.store(true, Ordering::Release);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut events) = self.events.lock() {
            events.push(DegradationEvent {
                failure: failure.to_string(),
                timestamp: Utc::now(),
            });
            // Bounded history.
            let len = events.len();
            if len > 256 {
                events.drain(0..len - 256);
            }
        }
    }

    /// A successful call clears the latch.
    pub fn mark_available(&self) {
        self.degraded.store(false, Ordering::Release);
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn recent_events(&self) -> Vec<DegradationEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Default for DegradationState {
    fn default() -> Self {
        Self::new()
    }
}
