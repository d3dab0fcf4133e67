use serde::{Deserialize, Serialize};

use crate::deadline::Deadline;
use crate::errors::AthenaResult;

/// A scored item as returned by any layer. The router only sees this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredItem {
    pub id: String,
    pub layer: String,
    /// Layer-specific score; the router renormalises per layer to [0, 1].
    pub score: f64,
    pub payload: serde_json::Value,
}

/// A search request fanned out to a layer.
#[derive(Debug, Clone)]
pub struct LayerQuery {
    pub text: String,
    pub k: usize,
    /// Optional domain restriction, honoured by layers that track domains.
    pub domain: Option<String>,
}

/// The capability set the router requires of a store. The router does not
/// know the concrete type of a store, only that it exposes these four
/// operations; new store kinds plug in by implementing this trait.
pub trait LayerStore: Send + Sync {
    /// Stable layer name, e.g. `"facts"`, `"events"`, `"graph"`.
    fn layer_name(&self) -> &'static str;

    fn search(&self, query: &LayerQuery, deadline: Deadline) -> AthenaResult<Vec<ScoredItem>>;

    /// Insert or replace an item from its JSON payload.
    fn upsert(&self, payload: &serde_json::Value) -> AthenaResult<String>;

    fn delete(&self, id: &str) -> AthenaResult<()>;

    /// Enumerate ids in the layer's documented order, for pagination.
    fn enumerate(&self, offset: usize, limit: usize) -> AthenaResult<Vec<String>>;

    /// Total item count, for pagination envelopes.
    fn count(&self) -> AthenaResult<u64>;
}
