//! Read API over the event log, plus its router capability surface.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use athena_core::deadline::Deadline;
use athena_core::errors::{AthenaError, AthenaResult};
use athena_core::traits::{LayerQuery, LayerStore, ScoredItem};
use athena_core::types::{Event, EventFilter};
use athena_storage::queries::event_ops;
use athena_storage::StorageEngine;

pub struct EventLog {
    storage: Arc<StorageEngine>,
}

impl EventLog {
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Events in `[from, to]` ordered by `(timestamp, id)` ascending.
    /// `after` is the keyset cursor from the previous page.
    pub fn range_query(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        filters: &EventFilter,
        after: Option<(i64, u64)>,
        limit: usize,
    ) -> AthenaResult<Vec<Event>> {
        self.storage.with_reader(|conn| {
            event_ops::range_query(
                conn,
                from.timestamp_micros(),
                to.timestamp_micros(),
                filters,
                after,
                limit,
            )
        })
    }

    /// All events of a session in insertion order.
    pub fn query_by_session(
        &self,
        session_id: &str,
        after_id: Option<u64>,
        limit: usize,
    ) -> AthenaResult<Vec<Event>> {
        self.storage
            .with_reader(|conn| event_ops::query_by_session(conn, session_id, after_id, limit))
    }

    pub fn get(&self, id: u64) -> AthenaResult<Event> {
        self.storage
            .with_reader(|conn| event_ops::get_event(conn, id))?
            .ok_or_else(|| AthenaError::not_found("event", id.to_string()))
    }

    pub fn count_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> AthenaResult<u64> {
        self.storage.with_reader(|conn| {
            event_ops::count_range(conn, from.timestamp_micros(), to.timestamp_micros())
        })
    }

    /// Archive the given events (consolidation compression).
    pub fn archive(&self, ids: &[u64]) -> AthenaResult<usize> {
        self.storage.with_writer(|conn| event_ops::archive_events(conn, ids))
    }

    /// Restore view of an archived event.
    pub fn load_archived(&self, id: u64) -> AthenaResult<Option<Event>> {
        self.storage.with_reader(|conn| event_ops::load_archived(conn, id))
    }
}

impl LayerStore for EventLog {
    fn layer_name(&self) -> &'static str {
        "events"
    }

    /// Lexical relevance over recent events: token overlap between the query
    /// and the description, weighted by recency rank.
    fn search(&self, query: &LayerQuery, deadline: Deadline) -> AthenaResult<Vec<ScoredItem>> {
        if deadline.expired() {
            return Err(AthenaError::Timeout { operation: "events.search" });
        }
        let tokens: Vec<String> = query
            .text
            .to_lowercase()
            .split_whitespace()
            .map(String::from)
            .collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        // Scan the most recent slice of the log; the event layer answers
        // temporal questions, not corpus-wide retrieval.
        let recent = self.storage.with_reader(|conn| {
            event_ops::range_query(conn, 0, i64::MAX, &EventFilter::default(), None, 2048)
        })?;

        let mut items: Vec<ScoredItem> = recent
            .into_iter()
            .filter_map(|event| {
                let description = event.description.to_lowercase();
                let hits = tokens.iter().filter(|t| description.contains(*t)).count();
                if hits == 0 {
                    return None;
                }
                let score = hits as f64 / tokens.len() as f64;
                Some(ScoredItem {
                    id: event.id.to_string(),
                    layer: "events".into(),
                    score,
                    payload: serde_json::to_value(&event).unwrap_or_default(),
                })
            })
            .collect();

        items.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.len().cmp(&b.id.len()))
                .then_with(|| a.id.cmp(&b.id))
        });
        items.truncate(query.k);
        Ok(items)
    }

    fn upsert(&self, _payload: &serde_json::Value) -> AthenaResult<String> {
        Err(AthenaError::invalid(
            "operation",
            "the event log is append-only; use the write pipeline",
        ))
    }

    fn delete(&self, _id: &str) -> AthenaResult<()> {
        Err(AthenaError::invalid(
            "operation",
            "events are immutable; archival happens through consolidation",
        ))
    }

    fn enumerate(&self, offset: usize, limit: usize) -> AthenaResult<Vec<String>> {
        // Ordered by (timestamp, id); offset pagination over the same order
        // the range query uses.
        let events = self.storage.with_reader(|conn| {
            event_ops::range_query(
                conn,
                0,
                i64::MAX,
                &EventFilter::default(),
                None,
                offset + limit,
            )
        })?;
        Ok(events
            .into_iter()
            .skip(offset)
            .map(|e| e.id.to_string())
            .collect())
    }

    fn count(&self) -> AthenaResult<u64> {
        self.storage.with_reader(event_ops::count_all)
    }
}
