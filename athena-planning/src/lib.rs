//! # athena-planning
//!
//! The executable-knowledge layers: versioned procedures with Bayesian
//! effectiveness, and prospective tasks with a strict lifecycle state
//! machine, DAG-checked dependencies, and trigger predicates.

pub mod procedures;
pub mod tasks;
pub mod triggers;

pub use procedures::ProcedureStore;
pub use tasks::TaskStore;
