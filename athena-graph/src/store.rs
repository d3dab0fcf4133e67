//! The graph store engine: persistence plus petgraph-backed path queries.

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::graph::{DiGraph, NodeIndex};
use tracing::info;

use athena_core::config::AthenaConfig;
use athena_core::deadline::Deadline;
use athena_core::errors::{AthenaError, AthenaResult};
use athena_core::traits::{LayerQuery, LayerStore, ScoredItem};
use athena_core::types::{Community, Edge, Entity, GraphPath};
use athena_storage::queries::graph_ops;
use athena_storage::StorageEngine;

use crate::community;
use crate::summary;

pub struct GraphStore {
    storage: Arc<StorageEngine>,
    seed: u64,
}

impl GraphStore {
    pub fn new(storage: Arc<StorageEngine>, config: &AthenaConfig) -> Self {
        Self { storage, seed: config.seed }
    }

    pub fn upsert_entity(&self, entity: &Entity) -> AthenaResult<String> {
        self.storage.with_writer(|conn| graph_ops::upsert_entity(conn, entity))
    }

    pub fn get_entity(&self, id: &str) -> AthenaResult<Entity> {
        self.storage
            .with_reader(|conn| graph_ops::get_entity(conn, id))?
            .ok_or_else(|| AthenaError::not_found("entity", id))
    }

    pub fn find_entity_by_name(&self, name: &str) -> AthenaResult<Option<Entity>> {
        self.storage.with_reader(|conn| graph_ops::find_entity_by_name(conn, name))
    }

    pub fn upsert_edge(&self, edge: &Edge) -> AthenaResult<()> {
        self.storage.with_writer(|conn| graph_ops::upsert_edge(conn, edge))
    }

    /// All simple paths from `src` to `dst` up to `max_hops` edges, ordered
    /// by hop count then descending strength. `contradicts` edges suppress
    /// transitive inference: they are never traversed.
    pub fn find_paths(
        &self,
        src: &str,
        dst: &str,
        max_hops: usize,
        deadline: Deadline,
    ) -> AthenaResult<Vec<GraphPath>> {
        if deadline.expired() {
            return Err(AthenaError::Timeout { operation: "graph.find_paths" });
        }
        let edges = self.storage.with_reader(graph_ops::all_edges)?;

        let mut graph: DiGraph<String, f64> = DiGraph::new();
        let mut nodes: HashMap<String, NodeIndex> = HashMap::new();
        for edge in &edges {
            if edge.edge_type.blocks_inference() {
                continue;
            }
            let s = *nodes
                .entry(edge.source_id.clone())
                .or_insert_with(|| graph.add_node(edge.source_id.clone()));
            let t = *nodes
                .entry(edge.target_id.clone())
                .or_insert_with(|| graph.add_node(edge.target_id.clone()));
            graph.add_edge(s, t, edge.strength);
        }

        let (Some(&start), Some(&goal)) = (nodes.get(src), nodes.get(dst)) else {
            return Ok(Vec::new());
        };

        let raw: Vec<Vec<NodeIndex>> = petgraph::algo::all_simple_paths(
            &graph,
            start,
            goal,
            0,
            Some(max_hops.saturating_sub(1)),
        )
        .collect();

        let mut paths: Vec<GraphPath> = raw
            .into_iter()
            .map(|path| {
                let strength = path
                    .windows(2)
                    .map(|pair| {
                        graph
                            .find_edge(pair[0], pair[1])
                            .map(|e| graph[e])
                            .unwrap_or(0.0)
                    })
                    .product();
                GraphPath {
                    nodes: path.into_iter().map(|n| graph[n].clone()).collect(),
                    strength,
                }
            })
            .collect();

        paths.sort_by(|a, b| {
            a.nodes
                .len()
                .cmp(&b.nodes.len())
                .then_with(|| {
                    b.strength
                        .partial_cmp(&a.strength)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.nodes.cmp(&b.nodes))
        });
        Ok(paths)
    }

    /// Detect communities by deterministic modularity maximisation and
    /// persist the partition at level 0.
    pub fn detect_communities(&self, resolution: f64) -> AthenaResult<Vec<Community>> {
        let entity_ids = self.storage.with_reader(graph_ops::all_entity_ids)?;
        let edges = self.storage.with_reader(graph_ops::all_edges)?;

        let communities = community::detect(&entity_ids, &edges, resolution, self.seed);
        self.storage
            .with_writer(|conn| graph_ops::replace_communities(conn, 0, &communities))?;
        info!(count = communities.len(), "community partition refreshed");
        Ok(communities)
    }

    /// Textual summary of one community: member names, dominant entity
    /// types, strongest internal relations.
    pub fn summarise_community(&self, community_id: &str) -> AthenaResult<String> {
        let community = self
            .storage
            .with_reader(|conn| graph_ops::get_community(conn, community_id))?
            .ok_or_else(|| AthenaError::not_found("community", community_id))?;

        let mut members = Vec::new();
        for id in &community.members {
            if let Some(entity) = self.storage.with_reader(|conn| graph_ops::get_entity(conn, id))? {
                members.push(entity);
            }
        }
        let edges = self.storage.with_reader(graph_ops::all_edges)?;
        Ok(summary::render(&community, &members, &edges))
    }

    pub fn communities_at_level(&self, level: u8) -> AthenaResult<Vec<Community>> {
        self.storage.with_reader(|conn| graph_ops::communities_at_level(conn, level))
    }
}

impl LayerStore for GraphStore {
    fn layer_name(&self) -> &'static str {
        "graph"
    }

    /// Entity search by name/type token match; score is match fraction
    /// boosted by degree.
    fn search(&self, query: &LayerQuery, deadline: Deadline) -> AthenaResult<Vec<ScoredItem>> {
        if deadline.expired() {
            return Err(AthenaError::Timeout { operation: "graph.search" });
        }
        let tokens: Vec<String> = query
            .text
            .to_lowercase()
            .split_whitespace()
            .map(String::from)
            .collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let edges = self.storage.with_reader(graph_ops::all_edges)?;
        let mut degree: HashMap<String, usize> = HashMap::new();
        for edge in &edges {
            *degree.entry(edge.source_id.clone()).or_default() += 1;
            *degree.entry(edge.target_id.clone()).or_default() += 1;
        }

        let ids = self.storage.with_reader(graph_ops::all_entity_ids)?;
        let mut items = Vec::new();
        for id in ids {
            let Some(entity) = self.storage.with_reader(|conn| graph_ops::get_entity(conn, &id))?
            else {
                continue;
            };
            let haystack = format!("{} {}", entity.name, entity.entity_type).to_lowercase();
            let hits = tokens.iter().filter(|t| haystack.contains(*t)).count();
            if hits == 0 {
                continue;
            }
            let degree_boost = 1.0 + (degree.get(&id).copied().unwrap_or(0) as f64).ln_1p() / 10.0;
            items.push(ScoredItem {
                id: id.clone(),
                layer: "graph".into(),
                score: (hits as f64 / tokens.len() as f64) * degree_boost,
                payload: serde_json::to_value(&entity).unwrap_or_default(),
            });
        }

        items.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        items.truncate(query.k);
        Ok(items)
    }

    fn upsert(&self, payload: &serde_json::Value) -> AthenaResult<String> {
        let name = payload
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AthenaError::invalid("name", "required string"))?;
        let entity_type = payload
            .get("entity_type")
            .and_then(|v| v.as_str())
            .unwrap_or("concept");
        let mut entity = Entity::new(entity_type, name);
        if let Some(props) = payload.get("properties").and_then(|v| v.as_object()) {
            entity.properties = props.clone();
        }
        self.upsert_entity(&entity)
    }

    fn delete(&self, id: &str) -> AthenaResult<()> {
        self.storage.with_writer(|conn| graph_ops::delete_entity(conn, id))
    }

    fn enumerate(&self, offset: usize, limit: usize) -> AthenaResult<Vec<String>> {
        self.storage
            .with_reader(|conn| graph_ops::enumerate_entities(conn, offset, limit))
    }

    fn count(&self) -> AthenaResult<u64> {
        self.storage.with_reader(graph_ops::entity_count)
    }
}
