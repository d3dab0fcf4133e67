//! Pattern extraction (fast): frequent-sequence mining over normalized
//! action n-grams, and event-type co-occurrence with a conditional
//! probability floor.

use std::collections::{BTreeMap, BTreeSet};

use athena_core::constants::CO_OCCURRENCE_MIN_PROBABILITY;
use athena_core::types::{Event, Pattern, PatternKind};

use super::clustering::EventCluster;

/// n-gram widths mined from cluster action sequences.
const NGRAM_RANGE: std::ops::RangeInclusive<usize> = 2..=4;

/// Mine candidate patterns from the window's clusters.
pub fn extract(
    events: &[Event],
    clusters: &[EventCluster],
    min_support: usize,
) -> Vec<Pattern> {
    let mut candidates = Vec::new();
    candidates.extend(mine_sequences(events, clusters, min_support));
    candidates.extend(mine_co_occurrence(events, clusters));
    candidates
}

/// An ordered action n-gram present in at least `min_support` clusters
/// becomes a candidate. Actions are normalized descriptions with
/// consecutive repeats collapsed.
fn mine_sequences(events: &[Event], clusters: &[EventCluster], min_support: usize) -> Vec<Pattern> {
    #[derive(Default)]
    struct GramStats {
        /// Clusters containing the n-gram at least once.
        cluster_count: usize,
        /// Occurrences across all clusters (in-cluster repeats count).
        occurrences: usize,
        support: BTreeSet<u64>,
    }

    let mut stats: BTreeMap<Vec<String>, GramStats> = BTreeMap::new();

    for cluster in clusters {
        // Collapse consecutive repeats into single actions.
        let mut actions: Vec<(String, u64)> = Vec::new();
        for &i in &cluster.members {
            let action = normalize(&events[i].description);
            if actions.last().map(|(a, _)| *a == action).unwrap_or(false) {
                continue;
            }
            actions.push((action, events[i].id));
        }

        let mut seen_in_cluster: BTreeSet<Vec<String>> = BTreeSet::new();
        for n in NGRAM_RANGE {
            if actions.len() < n {
                continue;
            }
            for window in actions.windows(n) {
                let gram: Vec<String> = window.iter().map(|(a, _)| a.clone()).collect();
                let entry = stats.entry(gram.clone()).or_default();
                entry.occurrences += 1;
                if seen_in_cluster.insert(gram) {
                    entry.cluster_count += 1;
                }
                entry.support.extend(window.iter().map(|(_, id)| *id));
            }
        }
    }

    stats
        .into_iter()
        .filter_map(|(gram, s)| {
            // Support comes from distinct clusters or from repetition inside
            // one long session run; either witnesses the habit.
            if s.cluster_count < min_support && s.occurrences < min_support {
                return None;
            }
            let summary = format!("pattern: {}", gram.join(" \u{2192} "));
            Some(Pattern {
                kind: PatternKind::FrequentSequence,
                summary,
                template: gram,
                support: s.support,
                domain: "workflow".into(),
                co_occurrence: s.occurrences as f64,
                uncertainty: 0.0,
                slow_path_confidence: None,
                refinement_round: 0,
            })
        })
        .collect()
}

/// Event-type pairs whose conditional probability within clusters clears
/// the floor become candidates.
fn mine_co_occurrence(events: &[Event], clusters: &[EventCluster]) -> Vec<Pattern> {
    let mut type_counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut pair_counts: BTreeMap<(&'static str, &'static str), (usize, BTreeSet<u64>)> =
        BTreeMap::new();

    for cluster in clusters {
        let mut types_present: BTreeMap<&'static str, BTreeSet<u64>> = BTreeMap::new();
        for &i in &cluster.members {
            types_present
                .entry(events[i].event_type.as_str())
                .or_default()
                .insert(events[i].id);
        }
        for t in types_present.keys() {
            *type_counts.entry(t).or_default() += 1;
        }
        let present: Vec<&&'static str> = types_present.keys().collect();
        for a in &present {
            for b in &present {
                if a == b {
                    continue;
                }
                let entry = pair_counts.entry((**a, **b)).or_default();
                entry.0 += 1;
                entry.1.extend(&types_present[**a]);
                entry.1.extend(&types_present[**b]);
            }
        }
    }

    pair_counts
        .into_iter()
        .filter_map(|((a, b), (both, support))| {
            let base = type_counts.get(a).copied().unwrap_or(0);
            if base < 2 {
                return None; // One observation is not a co-occurrence.
            }
            let probability = both as f64 / base as f64;
            if probability < CO_OCCURRENCE_MIN_PROBABILITY {
                return None;
            }
            Some(Pattern {
                kind: PatternKind::CoOccurrence,
                summary: format!("{a} events co-occur with {b} events"),
                template: Vec::new(),
                support,
                domain: "co_occurrence".into(),
                co_occurrence: probability,
                uncertainty: 0.0,
                slow_path_confidence: None,
                refinement_round: 0,
            })
        })
        .collect()
}

/// Lowercase, collapse whitespace.
pub fn normalize(description: &str) -> String {
    description
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use athena_core::types::{EventContext, EventType, Outcome};
    use chrono::TimeZone;

    fn event(id: u64, event_type: EventType, description: &str) -> Event {
        Event {
            id,
            timestamp: chrono::Utc.timestamp_opt(1000 + id as i64 * 10, 0).unwrap(),
            session_id: "s1".into(),
            event_type,
            description: description.into(),
            context: EventContext::default(),
            outcome: Outcome::Success,
            fingerprint: format!("fp-{id}"),
            novelty: 1.0,
        }
    }

    #[test]
    fn alternating_actions_yield_a_sequence_pattern() {
        let events: Vec<Event> = (0..10)
            .map(|i| {
                let description = if i % 2 == 0 { "write test" } else { "run tests" };
                event(i as u64 + 1, EventType::Work, description)
            })
            .collect();
        let cluster = EventCluster { members: (0..10).collect() };

        let patterns = extract(&events, &[cluster], 2);
        let sequence = patterns
            .iter()
            .find(|p| p.kind == PatternKind::FrequentSequence && p.template.len() == 2)
            .expect("bigram pattern");
        assert_eq!(sequence.template, vec!["write test", "run tests"]);
        assert!(sequence.summary.starts_with("pattern: "));
        assert_eq!(sequence.support.len(), 10, "all alternating events support it");
    }

    #[test]
    fn co_occurrence_requires_probability_floor() {
        // testing appears in 3 clusters; error joins it in all 3.
        let mut clusters = Vec::new();
        let mut events = Vec::new();
        for c in 0..3u64 {
            let base = c * 2;
            events.push(event(base + 1, EventType::Testing, "run suite"));
            events.push(event(base + 2, EventType::Error, "assertion failed"));
            clusters.push(EventCluster { members: vec![base as usize, base as usize + 1] });
        }

        let patterns = extract(&events, &clusters, 99);
        assert!(patterns
            .iter()
            .any(|p| p.kind == PatternKind::CoOccurrence && p.summary.contains("testing")));
    }

    #[test]
    fn rare_pairs_are_not_candidates() {
        let events = vec![
            event(1, EventType::Testing, "run suite"),
            event(2, EventType::Error, "assertion failed"),
        ];
        let clusters = vec![EventCluster { members: vec![0, 1] }];
        let patterns = extract(&events, &clusters, 99);
        assert!(patterns.iter().all(|p| p.kind != PatternKind::CoOccurrence));
    }
}
