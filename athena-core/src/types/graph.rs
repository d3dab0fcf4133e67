use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A node in the knowledge graph. Facts and events reference entities by id
/// only, never by ownership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub entity_type: String,
    pub name: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(entity_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_type: entity_type.into(),
            name: name.into(),
            properties: serde_json::Map::new(),
            created_at: Utc::now(),
        }
    }
}

/// Typed directed edge. `contradicts` edges suppress transitive inference:
/// path queries never traverse them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    DependsOn,
    Uses,
    RelatedTo,
    CausallyLeadsTo,
    Implements,
    Contradicts,
}

impl EdgeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DependsOn => "depends_on",
            Self::Uses => "uses",
            Self::RelatedTo => "related_to",
            Self::CausallyLeadsTo => "causally_leads_to",
            Self::Implements => "implements",
            Self::Contradicts => "contradicts",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "depends_on" => Some(Self::DependsOn),
            "uses" => Some(Self::Uses),
            "related_to" => Some(Self::RelatedTo),
            "causally_leads_to" => Some(Self::CausallyLeadsTo),
            "implements" => Some(Self::Implements),
            "contradicts" => Some(Self::Contradicts),
            _ => None,
        }
    }

    /// Contradiction edges are excluded from path traversal.
    pub fn blocks_inference(self) -> bool {
        matches!(self, Self::Contradicts)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source_id: String,
    pub target_id: String,
    pub edge_type: EdgeType,
    /// In [0, 1].
    pub strength: f64,
    pub context: Option<String>,
}

/// A path through the graph, as returned by `find_paths`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphPath {
    /// Entity ids from source to destination inclusive.
    pub nodes: Vec<String>,
    /// Product of edge strengths along the path.
    pub strength: f64,
}

/// A cluster of entities discovered by modularity-optimising partitioning.
/// Communities partition the entity set at each level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub id: String,
    pub members: BTreeSet<String>,
    pub level: u8,
}
