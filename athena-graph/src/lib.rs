//! # athena-graph
//!
//! Entities, typed directed edges with strength, path queries that refuse
//! to traverse `contradicts` edges, and deterministic modularity-based
//! community detection with textual summaries.

pub mod community;
pub mod store;
pub mod summary;

pub use store::GraphStore;
