//! The dual-process pipeline stages.
//!
//! Clustering → extraction → uncertainty scoring → gating happen here and
//! are always fast; the engine drives slow-path validation and write-out
//! around them.

pub mod clustering;
pub mod extraction;
pub mod writeout;

use std::collections::HashMap;

use athena_core::constants::REFERENCE_SUPPORT;
use athena_core::traits::EmbeddingProvider;
use athena_core::types::{Event, Pattern};

pub use clustering::{cluster_events, coherence, ClusterOutput};
pub use extraction::extract;

/// Stage thresholds resolved from config and strategy profile.
#[derive(Debug, Clone, Copy)]
pub struct StageSettings {
    pub min_support: usize,
    pub slow_path_threshold: f64,
    pub uses_slow_path: bool,
    pub llm_budget: usize,
}

/// Output of the fast half of the pipeline.
pub struct FastOutput {
    pub clusters: ClusterOutput,
    /// Candidates accepted directly by the gate.
    pub accepted: Vec<Pattern>,
    /// Candidates above the uncertainty threshold, slow-path bound.
    pub uncertain: Vec<Pattern>,
}

/// Run clustering, extraction, uncertainty scoring, and gating.
pub fn run_fast(
    events: &[Event],
    embedder: &dyn EmbeddingProvider,
    settings: StageSettings,
) -> FastOutput {
    let clusters = cluster_events(events, embedder);
    let mut patterns = extract(events, &clusters.clusters, settings.min_support);

    let index_by_id: HashMap<u64, usize> =
        events.iter().enumerate().map(|(i, e)| (e.id, i)).collect();

    for pattern in &mut patterns {
        score_uncertainty(pattern, events, &clusters, &index_by_id);
    }

    let (accepted, uncertain) = gate(patterns, settings.slow_path_threshold);
    FastOutput { clusters, accepted, uncertain }
}

/// `uncertainty = 1 − min(coherence, support_strength)`.
pub fn score_uncertainty(
    pattern: &mut Pattern,
    events: &[Event],
    clusters: &ClusterOutput,
    index_by_id: &HashMap<u64, usize>,
) {
    let members: Vec<usize> = pattern
        .support
        .iter()
        .filter_map(|id| index_by_id.get(id).copied())
        .collect();

    let coherence = clustering::coherence(
        &members,
        events,
        &clusters.embeddings,
        clusters.vector_degraded,
    );
    let support_strength = (pattern.support.len() as f64 / REFERENCE_SUPPORT as f64).min(1.0);
    pattern.uncertainty = (1.0 - coherence.min(support_strength)).clamp(0.0, 1.0);
}

/// Gate: below the threshold a candidate is accepted directly, otherwise it
/// queues for slow-path validation.
pub fn gate(patterns: Vec<Pattern>, threshold: f64) -> (Vec<Pattern>, Vec<Pattern>) {
    patterns
        .into_iter()
        .partition(|p| p.uncertainty < threshold)
}
