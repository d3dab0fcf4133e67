//! # athena-storage
//!
//! SQLite persistence for all eight layers: events, facts, procedures,
//! tasks, graph, meta. Single write connection plus a round-robin read
//! pool, forward-only numbered migrations, zstd archival for events.

pub mod engine;
pub mod migrations;
pub mod pool;
pub mod queries;

pub use engine::StorageEngine;

use athena_core::errors::AthenaError;

/// Classify a SQLite error at the store boundary. Corruption is fatal
/// (`CorruptState`); busy/locked surfaces as retryable `Timeout`; the rest
/// is `Internal`.
pub(crate) fn classify_sqlite(context: &'static str, e: rusqlite::Error) -> AthenaError {
    if let rusqlite::Error::SqliteFailure(inner, ref message) = e {
        match inner.code {
            rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase => {
                return AthenaError::CorruptState {
                    details: format!(
                        "{context}: {}",
                        message.clone().unwrap_or_else(|| inner.to_string())
                    ),
                };
            }
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                return AthenaError::Timeout { operation: context };
            }
            _ => {}
        }
    }
    AthenaError::Internal(format!("{context}: {e}"))
}

/// Shorthand for non-classifiable storage failures.
pub(crate) fn to_storage_err(message: impl Into<String>) -> AthenaError {
    AthenaError::Internal(message.into())
}
