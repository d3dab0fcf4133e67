//! Opaque pagination cursors.
//!
//! Versioned keyset strings: `v1:<ordering-key>:<last-id>`. Stable across
//! restarts for unchanged data; callers must treat them as opaque.

use athena_core::errors::{AthenaError, AthenaResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    /// Ordering key of the last item served (layer-documented order).
    pub sort_key: i64,
    /// Id of the last item served, breaking sort-key ties.
    pub last_id: String,
}

impl Cursor {
    pub fn encode(&self) -> String {
        format!("v1:{}:{}", self.sort_key, self.last_id)
    }

    pub fn decode(raw: &str) -> AthenaResult<Self> {
        let mut parts = raw.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("v1"), Some(key), Some(id)) if !id.is_empty() => {
                let sort_key = key
                    .parse()
                    .map_err(|_| AthenaError::invalid("cursor", "malformed ordering key"))?;
                Ok(Self { sort_key, last_id: id.to_string() })
            }
            _ => Err(AthenaError::invalid("cursor", "unrecognised cursor format")),
        }
    }
}
