//! Hybrid ranking: `α·cosine + β·bm25`, candidates drawn from BOTH the
//! vector index and the lexical index. Sourcing from both is the ranking
//! contract, not an optimisation: either alone misses items the other
//! catches.

use std::collections::BTreeMap;

use athena_core::constants::SCORE_EPSILON;
use athena_core::types::Fact;

/// Runtime-configurable ranking mix.
#[derive(Debug, Clone, Copy)]
pub struct SearchWeights {
    pub vector: f64,
    pub lexical: f64,
}

impl Default for SearchWeights {
    fn default() -> Self {
        Self {
            vector: athena_core::constants::DEFAULT_VECTOR_WEIGHT,
            lexical: athena_core::constants::DEFAULT_LEXICAL_WEIGHT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub fact: Fact,
    pub score: f64,
    pub vector_score: f64,
    pub lexical_score: f64,
}

/// A ranked result set plus degradation flags for the envelope.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    /// True when the embedding provider was unavailable and ranking was
    /// lexical-only.
    pub vector_disabled: bool,
}

/// One candidate accumulated from the two sources before scoring.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct CandidateSignals {
    pub vector: Option<f64>,
    pub lexical: Option<f64>,
}

/// Merge vector and lexical candidate lists into per-id signals.
/// BTreeMap keeps downstream iteration deterministic.
pub(crate) fn merge_candidates(
    vector_hits: &[(String, f64)],
    lexical_hits: &[(String, f64)],
) -> BTreeMap<String, CandidateSignals> {
    let mut merged: BTreeMap<String, CandidateSignals> = BTreeMap::new();
    for (id, similarity) in vector_hits {
        merged.entry(id.clone()).or_default().vector = Some(*similarity);
    }
    for (id, relevance) in lexical_hits {
        merged.entry(id.clone()).or_default().lexical = Some(*relevance);
    }
    merged
}

/// Normalise raw lexical relevances to [0, 1] by the max over the candidate
/// union. Vector cosines are already comparable.
pub(crate) fn normalise_lexical(signals: &mut BTreeMap<String, CandidateSignals>) {
    let max = signals
        .values()
        .filter_map(|s| s.lexical)
        .fold(0.0f64, f64::max);
    if max <= 0.0 {
        return;
    }
    for s in signals.values_mut() {
        if let Some(l) = s.lexical.as_mut() {
            *l /= max;
        }
    }
}

/// Order hits best-first with the documented tie-break chain: score, then
/// confidence, then usefulness, then recency of use, then lower id.
pub(crate) fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        let by_score = b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal);
        if (a.score - b.score).abs() > SCORE_EPSILON {
            return by_score;
        }
        b.fact
            .confidence
            .value()
            .partial_cmp(&a.fact.confidence.value())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.fact
                    .usefulness
                    .partial_cmp(&a.fact.usefulness)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| b.fact.last_used_at.cmp(&a.fact.last_used_at))
            .then_with(|| a.fact.id.cmp(&b.fact.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn hit(id: &str, score: f64, confidence: f64, usefulness: f64) -> SearchHit {
        let mut fact = Fact::new(format!("content {id}"), "test");
        fact.id = id.to_string();
        fact.confidence = confidence.into();
        fact.usefulness = usefulness;
        fact.last_used_at = Utc::now();
        SearchHit { fact, score, vector_score: 0.0, lexical_score: 0.0 }
    }

    #[test]
    fn merge_keeps_items_unique_to_each_source() {
        let merged = merge_candidates(
            &[("only-vector".into(), 0.9)],
            &[("only-lexical".into(), 3.0)],
        );
        assert_eq!(merged.len(), 2);
        assert!(merged["only-vector"].vector.is_some());
        assert!(merged["only-vector"].lexical.is_none());
        assert!(merged["only-lexical"].lexical.is_some());
    }

    #[test]
    fn lexical_normalisation_maxes_at_one() {
        let mut merged = merge_candidates(&[], &[("a".into(), 4.0), ("b".into(), 2.0)]);
        normalise_lexical(&mut merged);
        assert_eq!(merged["a"].lexical, Some(1.0));
        assert_eq!(merged["b"].lexical, Some(0.5));
    }

    #[test]
    fn ties_break_on_confidence_then_id() {
        let mut hits = vec![
            hit("b", 0.5, 0.9, 0.0),
            hit("a", 0.5, 0.9, 0.0),
            hit("c", 0.5, 0.95, 0.0),
        ];
        sort_hits(&mut hits);
        assert_eq!(hits[0].fact.id, "c", "higher confidence wins the tie");
        assert_eq!(hits[1].fact.id, "a", "equal everything: lower id");
        assert_eq!(hits[2].fact.id, "b");
    }

    #[test]
    fn clear_score_difference_ignores_tiebreaks() {
        let mut hits = vec![hit("low", 0.2, 0.99, 9.0), hit("high", 0.8, 0.01, 0.0)];
        sort_hits(&mut hits);
        assert_eq!(hits[0].fact.id, "high");
    }
}
