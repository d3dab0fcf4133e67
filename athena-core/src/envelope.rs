//! The unified result envelope every operation returns.

use serde::{Deserialize, Serialize};

use crate::errors::{AthenaError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Partial,
    Error,
}

/// Per-layer contribution counts for a routed query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layer_breakdown: Vec<(String, usize)>,
    pub elapsed_ms: u64,
    /// Set when vector search was unavailable and ranking was lexical-only.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub vector_disabled: bool,
    /// Set when slow-path validation was deferred for this operation.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub llm_deferred: bool,
}

/// Pagination block, mandatory for operations that can exceed 100 items.
/// `next_cursor` is opaque and stable across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub returned: u64,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub status: Status,
    pub data: serde_json::Value,
    pub metadata: EnvelopeMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
}

impl ResultEnvelope {
    pub fn ok(data: serde_json::Value, metadata: EnvelopeMetadata) -> Self {
        Self {
            status: Status::Ok,
            data,
            metadata,
            pagination: None,
            confidence: None,
            error: None,
        }
    }

    /// Partial results are always marked as such.
    pub fn partial(data: serde_json::Value, metadata: EnvelopeMetadata) -> Self {
        Self {
            status: Status::Partial,
            data,
            metadata,
            pagination: None,
            confidence: None,
            error: None,
        }
    }

    pub fn from_error(err: &AthenaError, metadata: EnvelopeMetadata) -> Self {
        Self {
            status: Status::Error,
            data: serde_json::Value::Null,
            metadata,
            pagination: None,
            confidence: None,
            error: Some(EnvelopeError { kind: err.kind(), message: err.to_string() }),
        }
    }

    /// Error envelope for an operation name that matched no registered op.
    pub fn unknown_operation(name: &str, metadata: EnvelopeMetadata) -> Self {
        Self {
            status: Status::Error,
            data: serde_json::Value::Null,
            metadata,
            pagination: None,
            confidence: None,
            error: Some(EnvelopeError {
                kind: ErrorKind::UnknownOperation,
                message: format!("unknown operation: {name}"),
            }),
        }
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}
