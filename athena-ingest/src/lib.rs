//! # athena-ingest
//!
//! The write pipeline in front of the append-only event log: fingerprint,
//! dedup inside a sliding window, novelty score against a ring of recent
//! descriptions, then append. Plus the event log's read API.

pub mod fingerprint;
pub mod log;
pub mod novelty;
pub mod pipeline;

pub use log::EventLog;
pub use novelty::NoveltyRing;
pub use pipeline::{RecordOutcome, WritePipeline};
