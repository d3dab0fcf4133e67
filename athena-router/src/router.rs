//! Fan-out and merge across the layer stores.
//!
//! The router holds the capability set only (`LayerStore`); it never sees a
//! concrete store type. For a fixed input and store contents the result
//! order is deterministic: per-layer renormalisation, then score, then
//! layer priority, then id.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use athena_core::deadline::Deadline;
use athena_core::errors::AthenaResult;
use athena_core::traits::{LayerQuery, LayerStore, ScoredItem};

use crate::intent::{classify, Intent};

#[derive(Debug, Clone)]
pub struct RoutedQuery {
    pub text: String,
    pub k: usize,
    pub domain: Option<String>,
    /// Explicit layer override; skips intent classification when set.
    pub layers: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct RoutedResult {
    pub intent: Intent,
    pub items: Vec<ScoredItem>,
    /// (layer, contributed-count) pairs for the envelope.
    pub layer_breakdown: Vec<(String, usize)>,
    /// True when a deadline or layer failure cut the fan-out short.
    pub partial: bool,
}

pub struct QueryRouter {
    layers: Vec<Arc<dyn LayerStore>>,
}

impl QueryRouter {
    pub fn new(layers: Vec<Arc<dyn LayerStore>>) -> Self {
        Self { layers }
    }

    fn layer(&self, name: &str) -> Option<&Arc<dyn LayerStore>> {
        self.layers.iter().find(|l| l.layer_name() == name)
    }

    /// Classify, fan out (reads are safe in parallel), renormalise, merge.
    pub fn query(&self, request: &RoutedQuery, deadline: Deadline) -> AthenaResult<RoutedResult> {
        let intent = classify(&request.text);
        let layer_names: Vec<String> = match &request.layers {
            Some(explicit) => explicit.clone(),
            None => intent.layers().iter().map(|s| s.to_string()).collect(),
        };
        debug!(?intent, layers = ?layer_names, text = %request.text, "routing query");

        let query = LayerQuery {
            text: request.text.clone(),
            k: request.k.max(1) * 2, // Overfetch per layer before the merge.
            domain: request.domain.clone(),
        };

        let selected: Vec<&Arc<dyn LayerStore>> =
            layer_names.iter().filter_map(|n| self.layer(n)).collect();

        let fanned: Vec<(String, AthenaResult<Vec<ScoredItem>>)> = selected
            .par_iter()
            .map(|layer| {
                let name = layer.layer_name().to_string();
                (name, layer.search(&query, deadline))
            })
            .collect();

        let mut partial = deadline.expired();
        let mut merged: Vec<ScoredItem> = Vec::new();
        let mut layer_breakdown = Vec::new();

        for (name, outcome) in fanned {
            match outcome {
                Ok(items) => {
                    layer_breakdown.push((name, items.len()));
                    merged.extend(normalise(items));
                }
                Err(e) => {
                    // A failed layer yields partial results, not a failed query.
                    debug!(layer = %name, error = %e, "layer failed during fan-out");
                    layer_breakdown.push((name, 0));
                    partial = true;
                }
            }
        }

        merged.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    intent
                        .layer_priority(&b.layer)
                        .cmp(&intent.layer_priority(&a.layer))
                })
                .then_with(|| a.id.cmp(&b.id))
        });
        merged.truncate(request.k);

        Ok(RoutedResult { intent, items: merged, layer_breakdown, partial })
    }
}

/// Renormalise one layer's scores to [0, 1] by its max. Empty and
/// zero-score layers pass through unchanged.
fn normalise(mut items: Vec<ScoredItem>) -> Vec<ScoredItem> {
    let max = items.iter().map(|i| i.score).fold(0.0f64, f64::max);
    if max > 0.0 {
        for item in &mut items {
            item.score /= max;
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use athena_core::errors::AthenaError;

    /// Static in-memory layer for router unit tests.
    struct FixedLayer {
        name: &'static str,
        items: Vec<(String, f64)>,
    }

    impl LayerStore for FixedLayer {
        fn layer_name(&self) -> &'static str {
            self.name
        }
        fn search(&self, query: &LayerQuery, _deadline: Deadline) -> AthenaResult<Vec<ScoredItem>> {
            Ok(self
                .items
                .iter()
                .take(query.k)
                .map(|(id, score)| ScoredItem {
                    id: id.clone(),
                    layer: self.name.into(),
                    score: *score,
                    payload: serde_json::Value::Null,
                })
                .collect())
        }
        fn upsert(&self, _payload: &serde_json::Value) -> AthenaResult<String> {
            Err(AthenaError::invalid("operation", "fixed layer"))
        }
        fn delete(&self, _id: &str) -> AthenaResult<()> {
            Ok(())
        }
        fn enumerate(&self, _offset: usize, _limit: usize) -> AthenaResult<Vec<String>> {
            Ok(Vec::new())
        }
        fn count(&self) -> AthenaResult<u64> {
            Ok(self.items.len() as u64)
        }
    }

    fn router() -> QueryRouter {
        QueryRouter::new(vec![
            Arc::new(FixedLayer {
                name: "facts",
                items: vec![("fact-1".into(), 10.0), ("fact-2".into(), 5.0)],
            }),
            Arc::new(FixedLayer {
                name: "events",
                items: vec![("9001".into(), 0.4), ("9002".into(), 0.2)],
            }),
            Arc::new(FixedLayer { name: "graph", items: vec![("entity-1".into(), 0.9)] }),
        ])
    }

    #[test]
    fn per_layer_renormalisation_makes_scores_comparable() {
        let router = router();
        let result = router
            .query(
                &RoutedQuery {
                    text: "anything at all".into(),
                    k: 10,
                    domain: None,
                    layers: None,
                },
                Deadline::none(),
            )
            .unwrap();

        // Each layer's best item normalises to 1.0; ties break by layer
        // priority graph > facts > events.
        assert_eq!(result.items[0].id, "entity-1");
        assert_eq!(result.items[1].id, "fact-1");
        assert_eq!(result.items[2].id, "9001");
    }

    #[test]
    fn factual_intent_routes_to_facts_only() {
        let router = router();
        let result = router
            .query(
                &RoutedQuery {
                    text: "what is the cache".into(),
                    k: 10,
                    domain: None,
                    layers: None,
                },
                Deadline::none(),
            )
            .unwrap();
        assert_eq!(result.intent, Intent::Factual);
        assert!(result.items.iter().all(|i| i.layer == "facts"));
    }

    #[test]
    fn identical_queries_return_identical_order() {
        let router = router();
        let request = RoutedQuery {
            text: "redis eviction".into(),
            k: 10,
            domain: None,
            layers: None,
        };
        let first = router.query(&request, Deadline::none()).unwrap();
        let second = router.query(&request, Deadline::none()).unwrap();
        let ids = |r: &RoutedResult| r.items.iter().map(|i| i.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn explicit_layer_override_skips_classification_routing() {
        let router = router();
        let result = router
            .query(
                &RoutedQuery {
                    text: "what is the cache".into(),
                    k: 10,
                    domain: None,
                    layers: Some(vec!["events".into()]),
                },
                Deadline::none(),
            )
            .unwrap();
        assert!(result.items.iter().all(|i| i.layer == "events"));
    }
}
