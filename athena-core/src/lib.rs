//! # athena-core
//!
//! Foundation crate for the Athena memory substrate.
//! Defines all types, traits, errors, config, and constants.
//! Every other crate in the workspace depends on this.

pub mod config;
pub mod constants;
pub mod deadline;
pub mod envelope;
pub mod errors;
pub mod traits;
pub mod types;

// Re-export the most commonly used types at the crate root.
pub use config::{AthenaConfig, StrategyProfile};
pub use deadline::Deadline;
pub use envelope::{EnvelopeMetadata, Pagination, ResultEnvelope, Status};
pub use errors::{AthenaError, AthenaResult};
pub use types::{Confidence, Event, EventDraft, EventType, Fact, Outcome};
