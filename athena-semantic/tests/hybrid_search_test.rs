//! Hybrid retrieval contract tests: both signals contribute, weights are
//! runtime-configurable, degradation falls back to lexical-only, purge
//! evicts the index.

use std::sync::Arc;

use athena_core::config::AthenaConfig;
use athena_core::deadline::Deadline;
use athena_core::errors::AthenaError;
use athena_embeddings::{CachedEmbedder, HashedTfIdf};
use athena_index::EmbeddingIndex;
use athena_semantic::{FactStore, SearchWeights};
use athena_storage::StorageEngine;

const DIMS: usize = 256;

fn setup_with_embedder() -> (FactStore, Arc<CachedEmbedder>) {
    let config = AthenaConfig { embedding_dimension: DIMS, ..Default::default() };
    let storage = Arc::new(StorageEngine::open_in_memory(DIMS).unwrap());
    let index = Arc::new(EmbeddingIndex::new(DIMS, config.seed, config.ann_index_target_recall));
    let embedder = Arc::new(CachedEmbedder::new(Arc::new(HashedTfIdf::new(DIMS)), 10_000));
    (
        FactStore::new(storage, index, Arc::clone(&embedder), &config),
        embedder,
    )
}

fn setup() -> FactStore {
    setup_with_embedder().0
}

fn seed_infra_facts(store: &FactStore) -> (String, String) {
    let a = store
        .store_fact(
            "Redis is an in-memory key-value store",
            "infra",
            &Default::default(),
            0.9,
        )
        .unwrap();
    let b = store
        .store_fact(
            "Postgres supports JSONB columns for document-like workloads",
            "infra",
            &Default::default(),
            0.9,
        )
        .unwrap();
    (a, b)
}

#[test]
fn hybrid_ranks_redis_first_for_key_value_query() {
    let store = setup();
    let (a, b) = seed_infra_facts(&store);

    let outcome = store
        .search(
            "key value cache",
            2,
            SearchWeights { vector: 0.7, lexical: 0.3 },
            Deadline::none(),
        )
        .unwrap();
    assert!(!outcome.vector_disabled);
    assert_eq!(outcome.hits.len(), 2);
    assert_eq!(outcome.hits[0].fact.id, a, "Redis fact first");
    assert_eq!(outcome.hits[1].fact.id, b);
}

#[test]
fn lexical_only_weights_still_rank_redis_first() {
    let store = setup();
    let (a, _) = seed_infra_facts(&store);

    // Exchange the mix: all weight on the lexical signal.
    let outcome = store
        .search(
            "key value cache",
            2,
            SearchWeights { vector: 0.0, lexical: 1.0 },
            Deadline::none(),
        )
        .unwrap();
    assert_eq!(outcome.hits[0].fact.id, a, "lexical hits 'key value'");
}

#[test]
fn both_sources_contribute_candidates() {
    let store = setup();
    // Strong lexical match, weak semantic overlap with the query terms.
    let lexical_only = store
        .store_fact(
            "flaky integration suite needs deterministic seeds",
            "testing",
            &Default::default(),
            0.8,
        )
        .unwrap();
    // Semantically near the query via shared vocabulary, no 'flaky' token.
    let vector_side = store
        .store_fact(
            "test suite reliability depends on fixture isolation",
            "testing",
            &Default::default(),
            0.8,
        )
        .unwrap();

    let outcome = store
        .search("flaky test suite", 10, SearchWeights::default(), Deadline::none())
        .unwrap();
    let ids: Vec<_> = outcome.hits.iter().map(|h| h.fact.id.clone()).collect();
    assert!(ids.contains(&lexical_only));
    assert!(ids.contains(&vector_side));
}

#[test]
fn degraded_provider_serves_lexical_results_with_flag() {
    let (store, embedder) = setup_with_embedder();
    let (a, _) = seed_infra_facts(&store);

    // Disabling the shared latch simulates a failed provider without
    // tearing down the store.
    embedder.degradation().disable();

    let outcome = store
        .search("redis", 5, SearchWeights::default(), Deadline::none())
        .unwrap();
    assert!(outcome.vector_disabled, "envelope flag set");
    assert_eq!(outcome.hits[0].fact.id, a, "lexical-only still finds Redis");
}

#[test]
fn reinforcement_moves_confidence_monotonically() {
    let store = setup();
    let id = store
        .store_fact("monotonic fact", "test", &Default::default(), 0.5)
        .unwrap();

    let up = store.reinforce(&id, 2, 0).unwrap();
    assert!(up.value() > 0.5);
    let down = store.reinforce(&id, 0, 3).unwrap();
    assert!(down.value() < up.value());

    let fact = store.get(&id).unwrap();
    assert_eq!(fact.support_count, 2);
    assert_eq!(fact.contradiction_count, 3);
}

#[test]
fn purge_removes_fact_and_vector() {
    let store = setup();
    let id = store
        .store_fact("ephemeral low-confidence claim", "misc", &Default::default(), 0.02)
        .unwrap();

    // Grace of 0 days: anything below threshold goes.
    let removed = store.purge(0.1, 0).unwrap();
    assert_eq!(removed, 1);

    assert!(matches!(store.get(&id), Err(AthenaError::NotFound { .. })));
    let outcome = store
        .search("ephemeral claim", 10, SearchWeights::default(), Deadline::none())
        .unwrap();
    assert!(
        outcome.hits.iter().all(|h| h.fact.id != id),
        "no rows reference the purged fact"
    );
}

#[test]
fn same_content_reinforces_instead_of_duplicating() {
    let store = setup();
    let first = store
        .store_fact("idempotent content", "test", &Default::default(), 0.5)
        .unwrap();
    let second = store
        .store_fact("idempotent content", "test", &Default::default(), 0.5)
        .unwrap();
    assert_eq!(first, second);

    let fact = store.get(&first).unwrap();
    assert_eq!(fact.support_count, 1);
    assert!(fact.confidence.value() > 0.5);
}
