use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::EFFECTIVENESS_PRIOR;

/// One structured action inside a procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureStep {
    pub action: String,
    /// Optional expected outcome, used when scoring executions.
    pub expected: Option<String>,
}

impl ProcedureStep {
    pub fn new(action: impl Into<String>) -> Self {
        Self { action: action.into(), expected: None }
    }
}

/// A versioned, executable workflow with effectiveness counters.
///
/// New versions append; the predecessor is kept for rollback. `version` is
/// strictly greater than the predecessor's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Procedure {
    pub id: String,
    pub name: String,
    pub category: String,
    pub steps: Vec<ProcedureStep>,
    pub version: u32,
    pub predecessor_version: Option<String>,
    pub executions: u32,
    pub successes: u32,
    /// When this procedure applies, as free text.
    pub context_predicate: String,
    pub created_at: DateTime<Utc>,
}

impl Procedure {
    /// Bayesian-smoothed success rate: `(successes + a) / (executions + a + b)`.
    /// With zero executions this is the prior mean.
    pub fn effectiveness(&self) -> f64 {
        let (a, b) = EFFECTIVENESS_PRIOR;
        (self.successes as f64 + a) / (self.executions as f64 + a + b)
    }
}

/// A procedure before it has been assigned an id and version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureDraft {
    pub name: String,
    pub category: String,
    pub steps: Vec<ProcedureStep>,
    pub context_predicate: String,
    /// Events this draft was extracted from.
    pub source_event_ids: Vec<u64>,
}
