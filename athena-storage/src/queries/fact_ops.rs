//! Insert, lookup, reinforcement, FTS5 search, embeddings, and purge for
//! the fact store.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use athena_core::types::{Confidence, Fact};
use athena_core::errors::{AthenaError, AthenaResult};

use super::OptionalRow;
use crate::to_storage_err;

/// Insert a fact and its FTS row in one transaction.
pub fn insert_fact(conn: &Connection, fact: &Fact) -> AthenaResult<()> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| to_storage_err(format!("insert_fact begin: {e}")))?;

    match insert_fact_inner(&tx, fact) {
        Ok(()) => {
            tx.commit()
                .map_err(|e| to_storage_err(format!("insert_fact commit: {e}")))?;
            Ok(())
        }
        Err(e) => {
            let _ = tx.rollback();
            Err(e)
        }
    }
}

fn insert_fact_inner(conn: &Connection, fact: &Fact) -> AthenaResult<()> {
    let source_ids =
        serde_json::to_string(&fact.source_event_ids).map_err(|e| to_storage_err(e.to_string()))?;
    conn.execute(
        "INSERT INTO facts (id, content, domain, confidence, support_count,
                            contradiction_count, usefulness, created_at,
                            last_used_at, source_event_ids, content_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            fact.id,
            fact.content,
            fact.domain,
            fact.confidence.value(),
            fact.support_count,
            fact.contradiction_count,
            fact.usefulness,
            fact.created_at.to_rfc3339(),
            fact.last_used_at.to_rfc3339(),
            source_ids,
            fact.content_hash,
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    let rowid: i64 = conn
        .query_row("SELECT rowid FROM facts WHERE id = ?1", params![fact.id], |row| row.get(0))
        .map_err(|e| to_storage_err(e.to_string()))?;
    conn.execute(
        "INSERT INTO fact_fts (rowid, content, domain) VALUES (?1, ?2, ?3)",
        params![rowid, fact.content, fact.domain],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

pub fn get_fact(conn: &Connection, id: &str) -> AthenaResult<Option<Fact>> {
    let mut stmt = conn
        .prepare(&format!("{FACT_COLUMNS} WHERE id = ?1"))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let result = stmt
        .query_row(params![id], |row| Ok(row_to_fact(row)))
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    match result {
        Some(Ok(fact)) => Ok(Some(fact)),
        Some(Err(e)) => Err(e),
        None => Ok(None),
    }
}

/// Lookup by content hash, used for consolidation idempotency.
pub fn get_fact_by_hash(conn: &Connection, content_hash: &str) -> AthenaResult<Option<Fact>> {
    let mut stmt = conn
        .prepare(&format!("{FACT_COLUMNS} WHERE content_hash = ?1"))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let result = stmt
        .query_row(params![content_hash], |row| Ok(row_to_fact(row)))
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    match result {
        Some(Ok(fact)) => Ok(Some(fact)),
        Some(Err(e)) => Err(e),
        None => Ok(None),
    }
}

/// Persist a reinforcement outcome.
pub fn update_reinforcement(
    conn: &Connection,
    id: &str,
    confidence: Confidence,
    support_count: u32,
    contradiction_count: u32,
) -> AthenaResult<()> {
    let rows = conn
        .execute(
            "UPDATE facts SET confidence = ?2, support_count = ?3, contradiction_count = ?4
             WHERE id = ?1",
            params![id, confidence.value(), support_count, contradiction_count],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    if rows == 0 {
        return Err(AthenaError::not_found("fact", id));
    }
    Ok(())
}

/// Bump usefulness EWMA and last_used_at on retrieval.
pub fn touch_fact(conn: &Connection, id: &str, now: DateTime<Utc>) -> AthenaResult<()> {
    conn.execute(
        "UPDATE facts SET usefulness = usefulness * 0.9 + 0.1, last_used_at = ?2 WHERE id = ?1",
        params![id, now.to_rfc3339()],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Delete a fact, its FTS row, and its embedding in one transaction.
pub fn delete_fact(conn: &Connection, id: &str) -> AthenaResult<()> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| to_storage_err(format!("delete_fact begin: {e}")))?;
    match delete_fact_inner(&tx, id) {
        Ok(()) => {
            tx.commit()
                .map_err(|e| to_storage_err(format!("delete_fact commit: {e}")))?;
            Ok(())
        }
        Err(e) => {
            let _ = tx.rollback();
            Err(e)
        }
    }
}

fn delete_fact_inner(conn: &Connection, id: &str) -> AthenaResult<()> {
    let rowid: Option<i64> = conn
        .query_row("SELECT rowid FROM facts WHERE id = ?1", params![id], |row| row.get(0))
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    if let Some(rowid) = rowid {
        conn.execute("DELETE FROM fact_fts WHERE rowid = ?1", params![rowid])
            .map_err(|e| to_storage_err(e.to_string()))?;
    }
    conn.execute("DELETE FROM fact_embeddings WHERE fact_id = ?1", params![id])
        .map_err(|e| to_storage_err(e.to_string()))?;
    conn.execute("DELETE FROM facts WHERE id = ?1", params![id])
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Facts with `confidence < threshold` and `created_at` older than the grace
/// cutoff. Returns removed ids so the caller can evict the ANN index.
pub fn purge_facts(
    conn: &Connection,
    confidence_threshold: f64,
    created_before: DateTime<Utc>,
) -> AthenaResult<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT id FROM facts WHERE confidence < ?1 AND created_at < ?2")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let ids: Vec<String> = stmt
        .query_map(
            params![confidence_threshold, created_before.to_rfc3339()],
            |row| row.get(0),
        )
        .map_err(|e| to_storage_err(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))?;

    for id in &ids {
        delete_fact(conn, id)?;
    }
    Ok(ids)
}

/// FTS5 lexical search. Returns `(fact_id, relevance)` with relevance
/// positive and higher-better (negated bm25), ordered best first.
pub fn fts_search(conn: &Connection, query: &str, k: usize) -> AthenaResult<Vec<(String, f64)>> {
    let match_expr = fts_match_expression(query);
    if match_expr.is_empty() {
        return Ok(Vec::new());
    }
    let mut stmt = conn
        .prepare(
            "SELECT f.id, -bm25(fact_fts) AS relevance
             FROM fact_fts
             JOIN facts f ON f.rowid = fact_fts.rowid
             WHERE fact_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![match_expr, k as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Tokenise a free-text query into an OR expression of quoted terms so FTS5
/// syntax characters in user input cannot break the match expression.
fn fts_match_expression(query: &str) -> String {
    query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() >= 2)
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Convert f32 slice to bytes (little-endian).
fn f32_vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert bytes back to f32 vec.
fn bytes_to_f32_vec(bytes: &[u8], expected_dims: usize) -> Vec<f32> {
    let mut result = Vec::with_capacity(expected_dims);
    for chunk in bytes.chunks_exact(4) {
        result.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    result
}

/// Store (or replace) the embedding for a fact.
pub fn store_embedding(conn: &Connection, fact_id: &str, embedding: &[f32]) -> AthenaResult<()> {
    let blob = f32_vec_to_bytes(embedding);
    conn.execute(
        "INSERT INTO fact_embeddings (fact_id, embedding, dimensions)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(fact_id) DO UPDATE SET
            embedding = excluded.embedding,
            dimensions = excluded.dimensions",
        params![fact_id, blob, embedding.len() as i64],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// All stored embeddings, for cold-start index rebuild.
pub fn all_embeddings(conn: &Connection) -> AthenaResult<Vec<(String, Vec<f32>)>> {
    let mut stmt = conn
        .prepare("SELECT fact_id, embedding, dimensions FROM fact_embeddings")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            let dims: i64 = row.get(2)?;
            Ok((id, blob, dims as usize))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut out = Vec::new();
    for row in rows {
        let (id, blob, dims) = row.map_err(|e| to_storage_err(e.to_string()))?;
        out.push((id, bytes_to_f32_vec(&blob, dims)));
    }
    Ok(out)
}

/// All facts in a domain (used by the consistency metric).
pub fn facts_by_domain(conn: &Connection, domain: &str) -> AthenaResult<Vec<Fact>> {
    let mut stmt = conn
        .prepare(&format!("{FACT_COLUMNS} WHERE domain = ?1 ORDER BY id"))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![domain], |row| Ok(row_to_fact(row)))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| to_storage_err(e.to_string()))??);
    }
    Ok(out)
}

/// Deterministic enumeration for pagination: `(created_at, id)` ascending.
pub fn enumerate_facts(conn: &Connection, offset: usize, limit: usize) -> AthenaResult<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT id FROM facts ORDER BY created_at ASC, id ASC LIMIT ?1 OFFSET ?2")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![limit as i64, offset as i64], |row| row.get(0))
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

pub fn count_facts(conn: &Connection) -> AthenaResult<u64> {
    conn.query_row("SELECT COUNT(*) FROM facts", [], |row| row.get::<_, i64>(0))
        .map(|c| c as u64)
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Per-domain fact counts and mean confidence, for expertise tracking.
pub fn domain_stats(conn: &Connection) -> AthenaResult<Vec<(String, u64, f64)>> {
    let mut stmt = conn
        .prepare(
            "SELECT domain, COUNT(*), AVG(confidence) FROM facts GROUP BY domain ORDER BY domain",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)? as u64,
                row.get::<_, f64>(2)?,
            ))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

const FACT_COLUMNS: &str = "SELECT id, content, domain, confidence, support_count,
        contradiction_count, usefulness, created_at, last_used_at,
        source_event_ids, content_hash FROM facts";

fn row_to_fact(row: &rusqlite::Row<'_>) -> AthenaResult<Fact> {
    let created_str: String = row.get(7).map_err(|e| to_storage_err(e.to_string()))?;
    let used_str: String = row.get(8).map_err(|e| to_storage_err(e.to_string()))?;
    let sources_json: String = row.get(9).map_err(|e| to_storage_err(e.to_string()))?;

    let parse_dt = |s: &str| -> AthenaResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| to_storage_err(format!("parse datetime '{s}': {e}")))
    };
    let source_event_ids: BTreeSet<u64> = serde_json::from_str(&sources_json)
        .map_err(|e| to_storage_err(format!("parse source_event_ids: {e}")))?;

    Ok(Fact {
        id: row.get(0).map_err(|e| to_storage_err(e.to_string()))?,
        content: row.get(1).map_err(|e| to_storage_err(e.to_string()))?,
        domain: row.get(2).map_err(|e| to_storage_err(e.to_string()))?,
        confidence: Confidence::new(row.get(3).map_err(|e| to_storage_err(e.to_string()))?),
        support_count: row.get(4).map_err(|e| to_storage_err(e.to_string()))?,
        contradiction_count: row.get(5).map_err(|e| to_storage_err(e.to_string()))?,
        usefulness: row.get(6).map_err(|e| to_storage_err(e.to_string()))?,
        created_at: parse_dt(&created_str)?,
        last_used_at: parse_dt(&used_str)?,
        source_event_ids,
        content_hash: row.get(10).map_err(|e| to_storage_err(e.to_string()))?,
    })
}
