use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of agent activity an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Work,
    Error,
    Decision,
    Milestone,
    Testing,
    CodeReview,
    Observation,
    Communication,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Error => "error",
            Self::Decision => "decision",
            Self::Milestone => "milestone",
            Self::Testing => "testing",
            Self::CodeReview => "code_review",
            Self::Observation => "observation",
            Self::Communication => "communication",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "work" => Some(Self::Work),
            "error" => Some(Self::Error),
            "decision" => Some(Self::Decision),
            "milestone" => Some(Self::Milestone),
            "testing" => Some(Self::Testing),
            "code_review" => Some(Self::CodeReview),
            "observation" => Some(Self::Observation),
            "communication" => Some(Self::Communication),
            _ => None,
        }
    }
}

/// How the recorded activity ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Partial,
    #[default]
    Unknown,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Partial => "partial",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            "partial" => Some(Self::Partial),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// Spatial context: where in the codebase/session the event happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EventContext {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub function: Option<String>,
    pub module: Option<String>,
    /// Free-form structured arguments (BTreeMap for stable serialization).
    #[serde(default)]
    pub arguments: BTreeMap<String, serde_json::Value>,
}

/// An event as submitted by a caller, before the write pipeline has
/// fingerprinted and scored it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDraft {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub event_type: EventType,
    pub description: String,
    #[serde(default)]
    pub context: EventContext,
    #[serde(default)]
    pub outcome: Outcome,
}

/// An immutable row in the event log. Created by the write pipeline,
/// never mutated, retained until archived by consolidation compression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic id (SQLite rowid).
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub event_type: EventType,
    pub description: String,
    pub context: EventContext,
    pub outcome: Outcome,
    /// 256-bit blake3 fingerprint, hex-encoded.
    pub fingerprint: String,
    /// 1 − max similarity to the recent description ring, in [0, 1].
    pub novelty: f32,
}

/// Filters accepted by the event log's range query.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<EventType>,
    pub session_id: Option<String>,
    pub outcome: Option<Outcome>,
    pub file: Option<String>,
}
