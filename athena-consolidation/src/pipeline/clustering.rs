//! Clustering (always fast): temporal/session partition, then an
//! embedding-similarity merge of same-session clusters. Degrades to
//! lexical-only trigram similarity when the provider is down.

use std::collections::HashSet;

use tracing::debug;

use athena_core::constants::{CLUSTER_MERGE_SIMILARITY, CLUSTER_TEMPORAL_GAP_SECS};
use athena_core::traits::EmbeddingProvider;
use athena_core::types::Event;
use athena_embeddings::cosine_similarity;

/// A cluster of indices into the window's event slice.
#[derive(Debug, Clone)]
pub struct EventCluster {
    pub members: Vec<usize>,
}

pub struct ClusterOutput {
    pub clusters: Vec<EventCluster>,
    /// Parallel to the event slice; empty when the provider degraded.
    pub embeddings: Vec<Vec<f32>>,
    pub vector_degraded: bool,
}

/// Partition events (already ordered by timestamp, id) into clusters.
pub fn cluster_events(events: &[Event], embedder: &dyn EmbeddingProvider) -> ClusterOutput {
    if events.is_empty() {
        return ClusterOutput { clusters: Vec::new(), embeddings: Vec::new(), vector_degraded: false };
    }

    // Temporal pass: consecutive events within the gap OR in the same
    // session stay together.
    let mut clusters: Vec<EventCluster> = Vec::new();
    let mut current = EventCluster { members: vec![0] };
    for i in 1..events.len() {
        let previous = &events[i - 1];
        let event = &events[i];
        let gap = (event.timestamp - previous.timestamp).num_seconds();
        if gap <= CLUSTER_TEMPORAL_GAP_SECS || event.session_id == previous.session_id {
            current.members.push(i);
        } else {
            clusters.push(std::mem::replace(&mut current, EventCluster { members: vec![i] }));
        }
    }
    clusters.push(current);

    // Similarity refinement: merge same-session clusters whose centroids
    // agree. Embedding failure degrades to trigram similarity.
    let texts: Vec<String> = events.iter().map(|e| e.description.clone()).collect();
    let (embeddings, vector_degraded) = match embedder.embed_batch(&texts) {
        Ok(vectors) => (vectors, false),
        Err(e) => {
            debug!(error = %e, "clustering degraded to lexical similarity");
            (Vec::new(), true)
        }
    };

    let mut merged: Vec<EventCluster> = Vec::new();
    'outer: for cluster in clusters {
        for target in merged.iter_mut() {
            if !same_session(&cluster, target, events) {
                continue;
            }
            let similarity = if vector_degraded {
                lexical_centroid_similarity(&cluster, target, events)
            } else {
                centroid_similarity(&cluster, target, &embeddings)
            };
            if similarity >= CLUSTER_MERGE_SIMILARITY {
                target.members.extend(cluster.members.iter().copied());
                target.members.sort_unstable();
                continue 'outer;
            }
        }
        merged.push(cluster);
    }

    ClusterOutput { clusters: merged, embeddings, vector_degraded }
}

fn same_session(a: &EventCluster, b: &EventCluster, events: &[Event]) -> bool {
    let session = |c: &EventCluster| -> Option<&str> {
        let first = &events[c.members[0]].session_id;
        c.members
            .iter()
            .all(|&i| &events[i].session_id == first)
            .then_some(first.as_str())
    };
    match (session(a), session(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn centroid(cluster: &EventCluster, embeddings: &[Vec<f32>]) -> Vec<f32> {
    let dims = embeddings.first().map(|e| e.len()).unwrap_or(0);
    let mut sum = vec![0.0f32; dims];
    for &i in &cluster.members {
        for (s, v) in sum.iter_mut().zip(embeddings[i].iter()) {
            *s += v;
        }
    }
    let n = cluster.members.len().max(1) as f32;
    for s in &mut sum {
        *s /= n;
    }
    sum
}

fn centroid_similarity(a: &EventCluster, b: &EventCluster, embeddings: &[Vec<f32>]) -> f64 {
    cosine_similarity(&centroid(a, embeddings), &centroid(b, embeddings))
}

/// Trigram-set similarity of the concatenated descriptions.
fn lexical_centroid_similarity(a: &EventCluster, b: &EventCluster, events: &[Event]) -> f64 {
    let text = |c: &EventCluster| -> String {
        c.members
            .iter()
            .map(|&i| events[i].description.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    };
    let grams = |t: &str| -> HashSet<Vec<char>> {
        let chars: Vec<char> = t.chars().collect();
        chars.windows(3).map(|w| w.to_vec()).collect()
    };
    let (ga, gb) = (grams(&text(a)), grams(&text(b)));
    if ga.is_empty() || gb.is_empty() {
        return 0.0;
    }
    let intersection = ga.intersection(&gb).count();
    let union = ga.len() + gb.len() - intersection;
    intersection as f64 / union as f64
}

/// Mean pairwise similarity of a candidate's source events, the coherence
/// input to uncertainty scoring. 1.0 for singleton support.
pub fn coherence(
    member_indices: &[usize],
    events: &[Event],
    embeddings: &[Vec<f32>],
    vector_degraded: bool,
) -> f64 {
    if member_indices.len() < 2 {
        return 1.0;
    }
    let mut total = 0.0;
    let mut pairs = 0usize;
    for (pos, &i) in member_indices.iter().enumerate() {
        for &j in &member_indices[pos + 1..] {
            let similarity = if vector_degraded || embeddings.is_empty() {
                lexical_pair_similarity(&events[i].description, &events[j].description)
            } else {
                cosine_similarity(&embeddings[i], &embeddings[j])
            };
            total += similarity;
            pairs += 1;
        }
    }
    (total / pairs as f64).clamp(0.0, 1.0)
}

fn lexical_pair_similarity(a: &str, b: &str) -> f64 {
    let grams = |t: &str| -> HashSet<Vec<char>> {
        let lowered = t.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();
        chars.windows(3).map(|w| w.to_vec()).collect()
    };
    let (ga, gb) = (grams(a), grams(b));
    if ga.is_empty() || gb.is_empty() {
        return 0.0;
    }
    let intersection = ga.intersection(&gb).count();
    let union = ga.len() + gb.len() - intersection;
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use athena_core::types::{EventContext, EventType, Outcome};
    use athena_embeddings::HashedTfIdf;
    use chrono::TimeZone;

    fn event(id: u64, session: &str, ts_secs: i64, description: &str) -> Event {
        Event {
            id,
            timestamp: chrono::Utc.timestamp_opt(ts_secs, 0).unwrap(),
            session_id: session.into(),
            event_type: EventType::Work,
            description: description.into(),
            context: EventContext::default(),
            outcome: Outcome::Success,
            fingerprint: format!("fp-{id}"),
            novelty: 1.0,
        }
    }

    #[test]
    fn same_session_events_share_a_cluster() {
        let events = vec![
            event(1, "s1", 0, "write test"),
            event(2, "s1", 60, "run tests"),
            event(3, "s1", 120, "write test"),
        ];
        let out = cluster_events(&events, &HashedTfIdf::new(64));
        assert_eq!(out.clusters.len(), 1);
        assert_eq!(out.clusters[0].members, vec![0, 1, 2]);
    }

    #[test]
    fn distant_other_session_splits() {
        let events = vec![
            event(1, "s1", 0, "write test"),
            event(2, "s2", 10_000, "quarterly planning"),
        ];
        let out = cluster_events(&events, &HashedTfIdf::new(64));
        assert_eq!(out.clusters.len(), 2);
    }

    #[test]
    fn coherence_of_identical_descriptions_is_high() {
        let events = vec![
            event(1, "s1", 0, "write test"),
            event(2, "s1", 10, "write test"),
        ];
        let embedder = HashedTfIdf::new(64);
        let vectors = embedder
            .embed_batch(&["write test".into(), "write test".into()])
            .unwrap();
        let c = coherence(&[0, 1], &events, &vectors, false);
        assert!(c > 0.99);
    }
}
