//! Error taxonomy for the memory core.
//!
//! Storage-layer failures are classified at the store boundary into one of
//! these kinds rather than wrapped blindly. `DependencyUnavailable` is
//! recoverable within an operation via the documented degradations;
//! `CorruptState` is fatal for the affected store.

use serde::{Deserialize, Serialize};

pub type AthenaResult<T> = Result<T, AthenaError>;

#[derive(Debug, thiserror::Error)]
pub enum AthenaError {
    #[error("invalid input in field '{field}': {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("duplicate of event {existing_id}")]
    Duplicate { existing_id: u64 },

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("a run over an overlapping window is already in progress")]
    AlreadyRunning,

    #[error("dependency '{provider}' unavailable: {reason}")]
    DependencyUnavailable { provider: &'static str, reason: String },

    #[error("deadline expired during {operation}")]
    Timeout { operation: &'static str },

    #[error("corrupt state detected: {details}")]
    CorruptState { details: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AthenaError {
    /// Machine-readable kind tag, carried in the result envelope.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Duplicate { .. } => ErrorKind::Duplicate,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::AlreadyRunning => ErrorKind::AlreadyRunning,
            Self::DependencyUnavailable { .. } => ErrorKind::DependencyUnavailable,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::CorruptState { .. } => ErrorKind::CorruptState,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether it is safe for a caller to retry the failed operation.
    /// True for transient kinds; idempotency of the operation itself is the
    /// caller's contract (all reads, fingerprinted ingest, same-window runs).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::AlreadyRunning
                | Self::DependencyUnavailable { .. }
                | Self::Timeout { .. }
        )
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput { field: field.into(), reason: reason.into() }
    }
}

/// Kind tags as they appear in the result envelope's `error.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Duplicate,
    RateLimited,
    AlreadyRunning,
    DependencyUnavailable,
    Timeout,
    CorruptState,
    Internal,
    UnknownOperation,
}
