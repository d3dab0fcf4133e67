//! Insert, range query, session query, fingerprint lookup, and archival for
//! the append-only event log. Rows are never mutated.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use athena_core::types::{Event, EventContext, EventDraft, EventFilter, EventType, Outcome};
use athena_core::errors::AthenaResult;

use super::OptionalRow;
use crate::to_storage_err;

/// zstd level for archived event payloads.
const ARCHIVE_ZSTD_LEVEL: i32 = 3;

/// Insert a single event. Returns the assigned monotonic id.
pub fn insert_event(
    conn: &Connection,
    draft: &EventDraft,
    fingerprint: &str,
    novelty: f32,
) -> AthenaResult<u64> {
    let context_json =
        serde_json::to_string(&draft.context).map_err(|e| to_storage_err(e.to_string()))?;
    conn.execute(
        "INSERT INTO events (timestamp_us, session_id, event_type, description,
                             context, outcome, fingerprint, novelty)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            draft.timestamp.timestamp_micros(),
            draft.session_id,
            draft.event_type.as_str(),
            draft.description,
            context_json,
            draft.outcome.as_str(),
            fingerprint,
            novelty,
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(conn.last_insert_rowid() as u64)
}

/// Bulk insert drafts inside one transaction. All-or-nothing.
/// Returns assigned ids in input order.
pub fn insert_events_bulk(
    conn: &Connection,
    rows: &[(EventDraft, String, f32)],
) -> AthenaResult<Vec<u64>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut ids = Vec::with_capacity(rows.len());
    for (draft, fingerprint, novelty) in rows {
        match insert_event(conn, draft, fingerprint, *novelty) {
            Ok(id) => ids.push(id),
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(e);
            }
        }
    }

    conn.execute_batch("COMMIT")
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(ids)
}

/// Most recent event carrying the given fingerprint at or after `since_us`.
/// Used by the write pipeline's dedup window; never fails open.
pub fn find_fingerprint_since(
    conn: &Connection,
    fingerprint: &str,
    since_us: i64,
) -> AthenaResult<Option<u64>> {
    let mut stmt = conn
        .prepare(
            "SELECT id FROM events
             WHERE fingerprint = ?1 AND timestamp_us >= ?2
             ORDER BY id DESC LIMIT 1",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let id: Option<i64> = stmt
        .query_row(params![fingerprint, since_us], |row| row.get(0))
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(id.map(|i| i as u64))
}

/// Events in `[from_us, to_us]` ordered by `(timestamp_us, id)` ascending.
/// Keyset pagination: pass the last seen `(timestamp_us, id)` as `after`.
pub fn range_query(
    conn: &Connection,
    from_us: i64,
    to_us: i64,
    filter: &EventFilter,
    after: Option<(i64, u64)>,
    limit: usize,
) -> AthenaResult<Vec<Event>> {
    let (after_ts, after_id) = after.map(|(t, i)| (t, i as i64)).unwrap_or((i64::MIN, 0));
    let mut sql = String::from(
        "SELECT id, timestamp_us, session_id, event_type, description, context,
                outcome, fingerprint, novelty
         FROM events
         WHERE timestamp_us >= ?1 AND timestamp_us <= ?2
           AND (timestamp_us > ?3 OR (timestamp_us = ?3 AND id > ?4))",
    );
    let mut bound: Vec<Box<dyn rusqlite::ToSql>> = vec![
        Box::new(from_us),
        Box::new(to_us),
        Box::new(after_ts),
        Box::new(after_id),
    ];

    if let Some(et) = filter.event_type {
        bound.push(Box::new(et.as_str().to_string()));
        sql.push_str(&format!(" AND event_type = ?{}", bound.len()));
    }
    if let Some(ref session) = filter.session_id {
        bound.push(Box::new(session.clone()));
        sql.push_str(&format!(" AND session_id = ?{}", bound.len()));
    }
    if let Some(outcome) = filter.outcome {
        bound.push(Box::new(outcome.as_str().to_string()));
        sql.push_str(&format!(" AND outcome = ?{}", bound.len()));
    }
    if let Some(ref file) = filter.file {
        bound.push(Box::new(format!("%\"file\":\"{file}\"%")));
        sql.push_str(&format!(" AND context LIKE ?{}", bound.len()));
    }

    bound.push(Box::new(limit.min(i64::MAX as usize) as i64));
    sql.push_str(&format!(
        " ORDER BY timestamp_us ASC, id ASC LIMIT ?{}",
        bound.len()
    ));

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| to_storage_err(e.to_string()))?;
    let params_ref: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|b| b.as_ref()).collect();
    let rows = stmt
        .query_map(params_ref.as_slice(), |row| Ok(row_to_event(row)))
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut events = Vec::new();
    for row in rows {
        events.push(row.map_err(|e| to_storage_err(e.to_string()))??);
    }
    Ok(events)
}

/// All live events for a session, ordered by insertion (id) ascending.
pub fn query_by_session(
    conn: &Connection,
    session_id: &str,
    after_id: Option<u64>,
    limit: usize,
) -> AthenaResult<Vec<Event>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, timestamp_us, session_id, event_type, description, context,
                    outcome, fingerprint, novelty
             FROM events
             WHERE session_id = ?1 AND id > ?2
             ORDER BY id ASC LIMIT ?3",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(
            params![session_id, after_id.unwrap_or(0) as i64, limit as i64],
            |row| Ok(row_to_event(row)),
        )
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut events = Vec::new();
    for row in rows {
        events.push(row.map_err(|e| to_storage_err(e.to_string()))??);
    }
    Ok(events)
}

/// Single event by id.
pub fn get_event(conn: &Connection, id: u64) -> AthenaResult<Option<Event>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, timestamp_us, session_id, event_type, description, context,
                    outcome, fingerprint, novelty
             FROM events WHERE id = ?1",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let result = stmt
        .query_row(params![id as i64], |row| Ok(row_to_event(row)))
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    match result {
        Some(Ok(event)) => Ok(Some(event)),
        Some(Err(e)) => Err(e),
        None => Ok(None),
    }
}

/// Count of live events inside a window (for pagination totals).
pub fn count_range(conn: &Connection, from_us: i64, to_us: i64) -> AthenaResult<u64> {
    conn.query_row(
        "SELECT COUNT(*) FROM events WHERE timestamp_us >= ?1 AND timestamp_us <= ?2",
        params![from_us, to_us],
        |row| row.get::<_, i64>(0),
    )
    .map(|c| c as u64)
    .map_err(|e| to_storage_err(e.to_string()))
}

pub fn count_all(conn: &Connection) -> AthenaResult<u64> {
    conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get::<_, i64>(0))
        .map(|c| c as u64)
        .map_err(|e| to_storage_err(e.to_string()))
}

/// The last `n` descriptions by insertion order, oldest first. Warm-starts
/// the novelty ring after a restart.
pub fn recent_descriptions(conn: &Connection, n: usize) -> AthenaResult<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT description FROM
               (SELECT id, description FROM events ORDER BY id DESC LIMIT ?1)
             ORDER BY id ASC",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![n as i64], |row| row.get::<_, String>(0))
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Archive events with id in `ids`: compress the serialized rows into
/// archived_events and delete the originals, in one transaction.
/// Returns the number archived.
pub fn archive_events(conn: &Connection, ids: &[u64]) -> AthenaResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| to_storage_err(e.to_string()))?;

    let result = archive_events_inner(conn, ids);
    match result {
        Ok(count) => {
            conn.execute_batch("COMMIT")
                .map_err(|e| to_storage_err(e.to_string()))?;
            Ok(count)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

fn archive_events_inner(conn: &Connection, ids: &[u64]) -> AthenaResult<usize> {
    let mut count = 0;
    for &id in ids {
        let Some(event) = get_event(conn, id)? else { continue };
        let json = serde_json::to_vec(&event).map_err(|e| to_storage_err(e.to_string()))?;
        let payload = zstd::encode_all(json.as_slice(), ARCHIVE_ZSTD_LEVEL)
            .map_err(|e| to_storage_err(format!("archive compress: {e}")))?;
        conn.execute(
            "INSERT OR REPLACE INTO archived_events (id, timestamp_us, payload) VALUES (?1, ?2, ?3)",
            params![id as i64, event.timestamp.timestamp_micros(), payload],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
        conn.execute("DELETE FROM events WHERE id = ?1", params![id as i64])
            .map_err(|e| to_storage_err(e.to_string()))?;
        count += 1;
    }
    Ok(count)
}

/// Restore an archived event (decompressed), without re-inserting it.
pub fn load_archived(conn: &Connection, id: u64) -> AthenaResult<Option<Event>> {
    let mut stmt = conn
        .prepare("SELECT payload FROM archived_events WHERE id = ?1")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let blob: Option<Vec<u8>> = stmt
        .query_row(params![id as i64], |row| row.get(0))
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    let Some(blob) = blob else { return Ok(None) };
    let json = zstd::decode_all(blob.as_slice())
        .map_err(|e| to_storage_err(format!("archive decompress: {e}")))?;
    let event = serde_json::from_slice(&json).map_err(|e| to_storage_err(e.to_string()))?;
    Ok(Some(event))
}

/// Total serialized bytes of the given events, for compression metrics.
pub fn events_byte_size(conn: &Connection, ids: &[u64]) -> AthenaResult<u64> {
    let mut total = 0u64;
    for &id in ids {
        if let Some(event) = get_event(conn, id)? {
            total += serde_json::to_vec(&event)
                .map(|v| v.len() as u64)
                .unwrap_or(0);
        }
    }
    Ok(total)
}

/// Parse a row from the events table into an Event.
fn row_to_event(row: &rusqlite::Row<'_>) -> AthenaResult<Event> {
    let id: i64 = row.get(0).map_err(|e| to_storage_err(e.to_string()))?;
    let timestamp_us: i64 = row.get(1).map_err(|e| to_storage_err(e.to_string()))?;
    let event_type_str: String = row.get(3).map_err(|e| to_storage_err(e.to_string()))?;
    let context_json: String = row.get(5).map_err(|e| to_storage_err(e.to_string()))?;
    let outcome_str: String = row.get(6).map_err(|e| to_storage_err(e.to_string()))?;

    let timestamp: DateTime<Utc> = DateTime::from_timestamp_micros(timestamp_us)
        .ok_or_else(|| to_storage_err(format!("invalid timestamp_us {timestamp_us}")))?;
    let event_type = EventType::parse(&event_type_str)
        .ok_or_else(|| to_storage_err(format!("unknown event_type '{event_type_str}'")))?;
    let outcome = Outcome::parse(&outcome_str)
        .ok_or_else(|| to_storage_err(format!("unknown outcome '{outcome_str}'")))?;
    let context: EventContext = serde_json::from_str(&context_json)
        .map_err(|e| to_storage_err(format!("parse context: {e}")))?;

    Ok(Event {
        id: id as u64,
        timestamp,
        session_id: row.get(2).map_err(|e| to_storage_err(e.to_string()))?,
        event_type,
        description: row.get(4).map_err(|e| to_storage_err(e.to_string()))?,
        context,
        outcome,
        fingerprint: row.get(7).map_err(|e| to_storage_err(e.to_string()))?,
        novelty: row.get(8).map_err(|e| to_storage_err(e.to_string()))?,
    })
}
