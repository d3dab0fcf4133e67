use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// How a candidate pattern was mined from its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// An ordered action n-gram present in enough clusters.
    FrequentSequence,
    /// Event types co-occurring with high conditional probability.
    CoOccurrence,
}

/// A candidate fact produced by clustering and mining, prior to write-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub summary: String,
    /// Ordered action list; non-empty for sequence patterns.
    pub template: Vec<String>,
    /// Source event ids (weak references).
    pub support: BTreeSet<u64>,
    pub domain: String,
    /// Conditional probability for co-occurrence patterns, n-gram frequency
    /// for sequences.
    pub co_occurrence: f64,
    /// 1 − min(coherence, support_strength), filled in by uncertainty scoring.
    pub uncertainty: f64,
    /// Confidence reported by the slow-path validator, when it ran.
    pub slow_path_confidence: Option<f64>,
    /// How many times this candidate has been refined by the validator.
    pub refinement_round: u8,
}

/// What a consolidation run did. Returned to the caller and folded into the
/// meta store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsolidationReport {
    pub window_start_us: i64,
    pub window_end_us: i64,
    pub events_considered: usize,
    pub clusters: usize,
    pub candidates: usize,
    pub accepted_fast: usize,
    pub accepted_slow: usize,
    pub rejected: usize,
    pub deferred: usize,
    pub facts_written: usize,
    pub procedures_written: usize,
    pub entities_written: usize,
    pub edges_written: usize,
    pub events_archived: usize,
    pub slow_path_calls: usize,
    /// True when a deadline or provider failure cut the run short.
    pub partial: bool,
    /// True when coherence degraded to lexical-only scoring.
    pub vector_degraded: bool,
}
