//! Workspace-wide numeric defaults. All of these are tuning knobs surfaced
//! through [`crate::config::AthenaConfig`]; the values here are the defaults.

/// Default hybrid ranking weight for the vector signal.
pub const DEFAULT_VECTOR_WEIGHT: f64 = 0.7;

/// Default hybrid ranking weight for the lexical signal.
pub const DEFAULT_LEXICAL_WEIGHT: f64 = 0.3;

/// Scores within this distance are tied and fall through to the tie-break chain.
pub const SCORE_EPSILON: f64 = 1e-6;

/// Fingerprint time bucket for write-pipeline dedup, in seconds.
pub const DEFAULT_DEDUP_BUCKET_SECS: u64 = 5;

/// Window inside which a repeated fingerprint is a duplicate, in seconds.
pub const DEFAULT_DEDUP_WINDOW_SECS: u64 = 60;

/// Size of the in-memory ring of recent descriptions used for novelty scoring.
pub const NOVELTY_RING_SIZE: usize = 1024;

/// Minimum novelty required for events flagged low-value by the heuristic.
pub const LOW_VALUE_NOVELTY_FLOOR: f32 = 0.3;

/// Logistic step size for fact reinforcement.
pub const DEFAULT_REINFORCEMENT_K: f64 = 0.25;

/// Confidence is clamped to this range so the logit stays finite.
pub const CONFIDENCE_FLOOR: f64 = 0.01;
pub const CONFIDENCE_CEIL: f64 = 0.99;

/// Default uncertainty threshold above which a candidate goes to the slow path.
pub const DEFAULT_SLOW_PATH_THRESHOLD: f64 = 0.5;

/// Default cap on slow-path validator calls per consolidation run.
pub const DEFAULT_LLM_BUDGET_PER_RUN: usize = 16;

/// Default bound on concurrent in-flight validator calls.
pub const DEFAULT_LLM_IN_FLIGHT: usize = 4;

/// Cosine similarity at which two same-session clusters merge during
/// consolidation clustering.
pub const CLUSTER_MERGE_SIMILARITY: f64 = 0.7;

/// Temporal gap (seconds) under which consecutive events share a cluster.
pub const CLUSTER_TEMPORAL_GAP_SECS: i64 = 300;

/// Conditional probability floor for co-occurrence pattern candidates.
pub const CO_OCCURRENCE_MIN_PROBABILITY: f64 = 0.7;

/// Reference support used to normalise support strength.
pub const REFERENCE_SUPPORT: usize = 3;

/// Minimum ordered steps before a pattern is also written as a procedure.
pub const PROCEDURE_MIN_STEPS: usize = 2;

/// Default purge threshold and grace period.
pub const DEFAULT_PURGE_CONFIDENCE: f64 = 0.1;
pub const DEFAULT_PURGE_GRACE_DAYS: i64 = 7;

/// Default target recall for the ANN index, drives probe count.
pub const DEFAULT_ANN_TARGET_RECALL: f64 = 0.9;

/// Below this many vectors the index scans exhaustively.
pub const ANN_FLAT_SCAN_LIMIT: usize = 4096;

/// Seed for all seeded randomness (ANN partitioning, community sweeps).
pub const DEFAULT_SEED: u64 = 0x5EED;

/// Bayesian prior for procedure effectiveness: (a, b) of Beta(a, b).
pub const EFFECTIVENESS_PRIOR: (f64, f64) = (1.0, 1.0);

/// Pagination is mandatory past this many items.
pub const PAGINATION_THRESHOLD: usize = 100;

/// Default per-family rate limits, per minute unless stated.
pub const RATE_RECALL_PER_MIN: u32 = 100;
pub const RATE_REMEMBER_PER_MIN: u32 = 50;
pub const RATE_CONSOLIDATE_PER_HOUR: u32 = 5;
pub const RATE_DEFAULT_PER_MIN: u32 = 120;
