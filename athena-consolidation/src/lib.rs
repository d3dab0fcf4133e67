//! # athena-consolidation
//!
//! The dual-process engine: fast statistical clustering and pattern mining,
//! calibrated uncertainty gating, slow-path LLM validation with a verdict
//! cache and per-run budget, and ordered cross-layer write-out.

pub mod engine;
pub mod pipeline;
pub mod validation;
pub mod window;

pub use engine::{ConsolidationEngine, RunRequest};
pub use validation::{CachedValidator, FrozenValidator};
