use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{CONFIDENCE_CEIL, CONFIDENCE_FLOOR};

/// Confidence score clamped to [0.01, 0.99] so its logit stays finite.
///
/// Monotonically non-increasing under contradictions and non-decreasing
/// under reinforcement, via [`Confidence::reinforced`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Confidence(f64);

impl Confidence {
    /// Create a new Confidence, clamping into the representable range.
    pub fn new(value: f64) -> Self {
        Self(value.clamp(CONFIDENCE_FLOOR, CONFIDENCE_CEIL))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Logistic reinforcement update: `σ(logit(old) + k·(s − 2c))`.
    /// Contradictions weigh twice supports.
    pub fn reinforced(self, support: u32, contradict: u32, k: f64) -> Self {
        let logit = (self.0 / (1.0 - self.0)).ln();
        let delta = k * (support as f64 - 2.0 * contradict as f64);
        let x = logit + delta;
        Self::new(1.0 / (1.0 + (-x).exp()))
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self(0.5)
    }
}

impl From<f64> for Confidence {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(c: Confidence) -> Self {
        c.0
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// A durable semantic statement distilled from one or more events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    /// UUID v4 identifier.
    pub id: String,
    pub content: String,
    pub domain: String,
    pub confidence: Confidence,
    pub support_count: u32,
    pub contradiction_count: u32,
    /// EWMA of retrieval hits, feeds the ranking tie-break chain.
    pub usefulness: f64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    /// Weak references: the events may be archived, the fact remains valid.
    pub source_event_ids: BTreeSet<u64>,
    /// blake3 of the content, used for consolidation idempotency and the
    /// embedding cache.
    pub content_hash: String,
}

impl Fact {
    pub fn compute_content_hash(content: &str) -> String {
        blake3::hash(content.as_bytes()).to_hex().to_string()
    }

    pub fn new(content: impl Into<String>, domain: impl Into<String>) -> Self {
        let content = content.into();
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content_hash: Self::compute_content_hash(&content),
            content,
            domain: domain.into(),
            confidence: Confidence::default(),
            support_count: 0,
            contradiction_count: 0,
            usefulness: 0.0,
            created_at: now,
            last_used_at: now,
            source_event_ids: BTreeSet::new(),
        }
    }
}

impl PartialEq for Fact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reinforcement_with_support_never_decreases() {
        let c = Confidence::new(0.5);
        let up = c.reinforced(1, 0, 0.25);
        assert!(up.value() >= c.value());
    }

    #[test]
    fn reinforcement_with_contradiction_never_increases() {
        let c = Confidence::new(0.5);
        let down = c.reinforced(0, 1, 0.25);
        assert!(down.value() <= c.value());
    }

    #[test]
    fn contradictions_weigh_twice_supports() {
        let c = Confidence::new(0.5);
        // One support and one contradiction nets to a decrease.
        let mixed = c.reinforced(1, 1, 0.25);
        assert!(mixed.value() < c.value());
    }

    #[test]
    fn confidence_stays_clamped() {
        let mut c = Confidence::new(0.5);
        for _ in 0..100 {
            c = c.reinforced(5, 0, 0.25);
        }
        assert!(c.value() <= 0.99);
        for _ in 0..200 {
            c = c.reinforced(0, 5, 0.25);
        }
        assert!(c.value() >= 0.01);
    }
}
