//! Quality metric computations.

use std::collections::HashSet;

use athena_core::types::Fact;

/// Compression ratio = bytes(facts derived) / bytes(source events).
/// 1.0 when nothing was consumed.
pub fn compression_ratio(fact_bytes: u64, event_bytes: u64) -> f64 {
    if event_bytes == 0 {
        return 1.0;
    }
    fact_bytes as f64 / event_bytes as f64
}

/// Deterministic recall check: the fraction of source descriptions whose
/// token overlap with some derived fact reaches 0.6. Used when the LLM is
/// unavailable; the sampled generative check replaces it when it is.
pub fn lexical_recall(source_descriptions: &[String], fact_contents: &[String]) -> f64 {
    if source_descriptions.is_empty() {
        return 1.0;
    }
    let fact_tokens: Vec<HashSet<String>> = fact_contents.iter().map(|c| tokens(c)).collect();

    let recalled = source_descriptions
        .iter()
        .filter(|description| {
            let source = tokens(description);
            if source.is_empty() {
                return true;
            }
            fact_tokens.iter().any(|fact| {
                let overlap = source.intersection(fact).count();
                overlap as f64 / source.len() as f64 >= 0.6
            })
        })
        .count();

    recalled as f64 / source_descriptions.len() as f64
}

/// Consistency = 1 − contradicting_fact_pairs / total_fact_pairs.
/// A pair contradicts when either member records a contradiction against a
/// content-overlapping partner. 1.0 for fewer than two facts.
pub fn consistency_score(facts: &[Fact]) -> f64 {
    let n = facts.len();
    if n < 2 {
        return 1.0;
    }
    let total_pairs = (n * (n - 1) / 2) as f64;

    let token_sets: Vec<HashSet<String>> = facts.iter().map(|f| tokens(&f.content)).collect();
    let mut contradicting = 0usize;
    for i in 0..n {
        for j in (i + 1)..n {
            let has_contradictions =
                facts[i].contradiction_count > 0 || facts[j].contradiction_count > 0;
            if !has_contradictions {
                continue;
            }
            let overlap = token_sets[i].intersection(&token_sets[j]).count();
            let smaller = token_sets[i].len().min(token_sets[j].len()).max(1);
            if overlap as f64 / smaller as f64 >= 0.5 {
                contradicting += 1;
            }
        }
    }

    1.0 - contradicting as f64 / total_pairs
}

/// Per-domain expertise: saturating in consolidated volume, scaled by mean
/// confidence. `1 − e^(−count/50)` reaches ~0.63 at 50 facts.
pub fn expertise(fact_count: u64, mean_confidence: f64) -> f64 {
    let volume = 1.0 - (-(fact_count as f64) / 50.0).exp();
    (volume * mean_confidence).clamp(0.0, 1.0)
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_of_nothing_is_one() {
        assert_eq!(compression_ratio(0, 0), 1.0);
        assert_eq!(compression_ratio(50, 200), 0.25);
    }

    #[test]
    fn recall_counts_covered_descriptions() {
        let sources = vec![
            "write test for parser".to_string(),
            "unrelated marketing meeting".to_string(),
        ];
        let facts = vec!["pattern: write test for parser module".to_string()];
        let recall = lexical_recall(&sources, &facts);
        assert!((recall - 0.5).abs() < 1e-9);
    }

    #[test]
    fn consistency_is_one_without_contradictions() {
        let facts = vec![Fact::new("a b c", "d1"), Fact::new("x y z", "d1")];
        assert_eq!(consistency_score(&facts), 1.0);
    }

    #[test]
    fn contradicted_overlapping_pair_lowers_consistency() {
        let mut a = Fact::new("service timeout is thirty seconds", "d1");
        a.contradiction_count = 2;
        let b = Fact::new("service timeout is sixty seconds", "d1");
        let score = consistency_score(&[a, b]);
        assert!(score < 1.0);
    }

    #[test]
    fn expertise_saturates() {
        assert!(expertise(0, 1.0) < 0.05);
        let mid = expertise(50, 1.0);
        assert!(mid > 0.6 && mid < 0.7);
        assert!(expertise(10_000, 1.0) > 0.99);
        assert!(expertise(10_000, 0.5) < 0.51);
    }
}
