//! Path-query integration tests, including contradiction suppression.

use std::sync::Arc;

use athena_core::config::AthenaConfig;
use athena_core::deadline::Deadline;
use athena_core::types::{Edge, EdgeType, Entity};
use athena_graph::GraphStore;
use athena_storage::StorageEngine;

fn setup() -> GraphStore {
    let storage = Arc::new(StorageEngine::open_in_memory(64).unwrap());
    GraphStore::new(storage, &AthenaConfig::default())
}

fn entity(store: &GraphStore, name: &str) -> String {
    store.upsert_entity(&Entity::new("concept", name)).unwrap()
}

fn link(store: &GraphStore, src: &str, dst: &str, edge_type: EdgeType, strength: f64) {
    store
        .upsert_edge(&Edge {
            source_id: src.into(),
            target_id: dst.into(),
            edge_type,
            strength,
            context: None,
        })
        .unwrap();
}

#[test]
fn finds_direct_and_indirect_paths_ordered_by_length() {
    let store = setup();
    let a = entity(&store, "a");
    let b = entity(&store, "b");
    let c = entity(&store, "c");
    link(&store, &a, &b, EdgeType::Uses, 0.9);
    link(&store, &b, &c, EdgeType::Uses, 0.8);
    link(&store, &a, &c, EdgeType::RelatedTo, 0.5);

    let paths = store.find_paths(&a, &c, 3, Deadline::none()).unwrap();
    assert_eq!(paths.len(), 2);
    assert_eq!(paths[0].nodes, vec![a.clone(), c.clone()], "direct path first");
    assert_eq!(paths[1].nodes, vec![a.clone(), b.clone(), c.clone()]);
    assert!((paths[1].strength - 0.72).abs() < 1e-9, "product of strengths");
}

#[test]
fn max_hops_bounds_path_length() {
    let store = setup();
    let a = entity(&store, "a");
    let b = entity(&store, "b");
    let c = entity(&store, "c");
    link(&store, &a, &b, EdgeType::Uses, 1.0);
    link(&store, &b, &c, EdgeType::Uses, 1.0);

    let paths = store.find_paths(&a, &c, 1, Deadline::none()).unwrap();
    assert!(paths.is_empty(), "two-hop path exceeds max_hops=1");
}

#[test]
fn contradicts_edges_are_never_traversed() {
    let store = setup();
    let a = entity(&store, "a");
    let b = entity(&store, "b");
    let c = entity(&store, "c");
    link(&store, &a, &b, EdgeType::Contradicts, 1.0);
    link(&store, &b, &c, EdgeType::Uses, 1.0);

    let paths = store.find_paths(&a, &c, 5, Deadline::none()).unwrap();
    assert!(paths.is_empty(), "no transitive inference across a contradiction");
}

#[test]
fn detect_and_summarise_round_trip() {
    let store = setup();
    let a = entity(&store, "tokenizer");
    let b = entity(&store, "parser");
    link(&store, &a, &b, EdgeType::Uses, 1.0);

    let communities = store.detect_communities(1.0).unwrap();
    assert!(!communities.is_empty());
    let with_members = communities.iter().find(|c| c.members.len() == 2).unwrap();

    let text = store.summarise_community(&with_members.id).unwrap();
    assert!(text.contains("entities"));

    let persisted = store.communities_at_level(0).unwrap();
    assert_eq!(persisted.len(), communities.len());
}
