//! Procedure heads, version lineage, execution counters, rollback.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use athena_core::types::{Procedure, ProcedureStep};
use athena_core::errors::{AthenaError, AthenaResult};

use super::OptionalRow;
use crate::to_storage_err;

/// Insert a new head. If a head with the same name exists it is moved into
/// procedure_versions first; the new head's version must be strictly
/// greater. One transaction.
pub fn save_head(conn: &Connection, procedure: &Procedure) -> AthenaResult<()> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| to_storage_err(format!("save_head begin: {e}")))?;

    match save_head_inner(&tx, procedure) {
        Ok(()) => {
            tx.commit()
                .map_err(|e| to_storage_err(format!("save_head commit: {e}")))?;
            Ok(())
        }
        Err(e) => {
            let _ = tx.rollback();
            Err(e)
        }
    }
}

fn save_head_inner(conn: &Connection, procedure: &Procedure) -> AthenaResult<()> {
    if let Some(existing) = get_by_name(conn, &procedure.name)? {
        if procedure.version <= existing.version {
            return Err(AthenaError::invalid(
                "version",
                format!(
                    "new version {} must exceed current {}",
                    procedure.version, existing.version
                ),
            ));
        }
        demote_to_version(conn, &existing)?;
        conn.execute("DELETE FROM procedures WHERE id = ?1", params![existing.id])
            .map_err(|e| to_storage_err(e.to_string()))?;
    }

    let steps =
        serde_json::to_string(&procedure.steps).map_err(|e| to_storage_err(e.to_string()))?;
    conn.execute(
        "INSERT INTO procedures (id, name, category, steps, version, predecessor_version,
                                 executions, successes, context_predicate, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            procedure.id,
            procedure.name,
            procedure.category,
            steps,
            procedure.version,
            procedure.predecessor_version,
            procedure.executions,
            procedure.successes,
            procedure.context_predicate,
            procedure.created_at.to_rfc3339(),
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Copy a head row into procedure_versions (kept for rollback).
fn demote_to_version(conn: &Connection, procedure: &Procedure) -> AthenaResult<()> {
    let steps =
        serde_json::to_string(&procedure.steps).map_err(|e| to_storage_err(e.to_string()))?;
    conn.execute(
        "INSERT OR REPLACE INTO procedure_versions
            (id, name, category, steps, version, predecessor_version,
             executions, successes, context_predicate, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            procedure.id,
            procedure.name,
            procedure.category,
            steps,
            procedure.version,
            procedure.predecessor_version,
            procedure.executions,
            procedure.successes,
            procedure.context_predicate,
            procedure.created_at.to_rfc3339(),
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> AthenaResult<Option<Procedure>> {
    fetch_one(conn, &format!("{PROC_COLUMNS} FROM procedures WHERE id = ?1"), id)
}

pub fn get_by_name(conn: &Connection, name: &str) -> AthenaResult<Option<Procedure>> {
    fetch_one(conn, &format!("{PROC_COLUMNS} FROM procedures WHERE name = ?1"), name)
}

/// A historical version by id.
pub fn get_version(conn: &Connection, id: &str) -> AthenaResult<Option<Procedure>> {
    fetch_one(
        conn,
        &format!("{PROC_COLUMNS} FROM procedure_versions WHERE id = ?1"),
        id,
    )
}

fn fetch_one(conn: &Connection, sql: &str, key: &str) -> AthenaResult<Option<Procedure>> {
    let mut stmt = conn.prepare(sql).map_err(|e| to_storage_err(e.to_string()))?;
    let result = stmt
        .query_row(params![key], |row| Ok(row_to_procedure(row)))
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    match result {
        Some(Ok(p)) => Ok(Some(p)),
        Some(Err(e)) => Err(e),
        None => Ok(None),
    }
}

/// Current heads, optionally filtered, ordered by name.
pub fn list(
    conn: &Connection,
    category: Option<&str>,
    min_effectiveness: Option<f64>,
) -> AthenaResult<Vec<Procedure>> {
    let mut stmt = conn
        .prepare(&format!("{PROC_COLUMNS} FROM procedures ORDER BY name ASC"))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| Ok(row_to_procedure(row)))
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut out = Vec::new();
    for row in rows {
        let p = row.map_err(|e| to_storage_err(e.to_string()))??;
        if let Some(cat) = category {
            if p.category != cat {
                continue;
            }
        }
        if let Some(min) = min_effectiveness {
            if p.effectiveness() < min {
                continue;
            }
        }
        out.push(p);
    }
    Ok(out)
}

/// Record an execution outcome on the head row.
pub fn record_execution(conn: &Connection, id: &str, success: bool) -> AthenaResult<Procedure> {
    let rows = conn
        .execute(
            "UPDATE procedures SET executions = executions + 1,
                                   successes = successes + ?2
             WHERE id = ?1",
            params![id, success as i64],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    if rows == 0 {
        return Err(AthenaError::not_found("procedure", id));
    }
    get(conn, id)?.ok_or_else(|| AthenaError::not_found("procedure", id))
}

/// Replace the head with its predecessor version. Returns the predecessor id,
/// or None when the head has no predecessor. One transaction.
pub fn rollback(conn: &Connection, id: &str) -> AthenaResult<Option<String>> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| to_storage_err(format!("rollback begin: {e}")))?;

    let result = rollback_inner(&tx, id);
    match result {
        Ok(out) => {
            tx.commit()
                .map_err(|e| to_storage_err(format!("rollback commit: {e}")))?;
            Ok(out)
        }
        Err(e) => {
            let _ = tx.rollback();
            Err(e)
        }
    }
}

fn rollback_inner(conn: &Connection, id: &str) -> AthenaResult<Option<String>> {
    let head = get(conn, id)?.ok_or_else(|| AthenaError::not_found("procedure", id))?;
    let Some(pred_id) = head.predecessor_version.clone() else {
        return Ok(None);
    };
    let predecessor =
        get_version(conn, &pred_id)?.ok_or_else(|| AthenaError::not_found("procedure", &pred_id))?;

    conn.execute("DELETE FROM procedures WHERE id = ?1", params![head.id])
        .map_err(|e| to_storage_err(e.to_string()))?;
    conn.execute(
        "DELETE FROM procedure_versions WHERE id = ?1",
        params![pred_id],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    let steps =
        serde_json::to_string(&predecessor.steps).map_err(|e| to_storage_err(e.to_string()))?;
    conn.execute(
        "INSERT INTO procedures (id, name, category, steps, version, predecessor_version,
                                 executions, successes, context_predicate, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            predecessor.id,
            predecessor.name,
            predecessor.category,
            steps,
            predecessor.version,
            predecessor.predecessor_version,
            predecessor.executions,
            predecessor.successes,
            predecessor.context_predicate,
            predecessor.created_at.to_rfc3339(),
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(Some(predecessor.id))
}

pub fn count(conn: &Connection) -> AthenaResult<u64> {
    conn.query_row("SELECT COUNT(*) FROM procedures", [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|c| c as u64)
    .map_err(|e| to_storage_err(e.to_string()))
}

pub fn enumerate(conn: &Connection, offset: usize, limit: usize) -> AthenaResult<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT id FROM procedures ORDER BY name ASC LIMIT ?1 OFFSET ?2")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![limit as i64, offset as i64], |row| row.get(0))
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

const PROC_COLUMNS: &str = "SELECT id, name, category, steps, version, predecessor_version,
        executions, successes, context_predicate, created_at";

fn row_to_procedure(row: &rusqlite::Row<'_>) -> AthenaResult<Procedure> {
    let steps_json: String = row.get(3).map_err(|e| to_storage_err(e.to_string()))?;
    let created_str: String = row.get(9).map_err(|e| to_storage_err(e.to_string()))?;

    let steps: Vec<ProcedureStep> =
        serde_json::from_str(&steps_json).map_err(|e| to_storage_err(format!("parse steps: {e}")))?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| to_storage_err(format!("parse created_at: {e}")))?;

    Ok(Procedure {
        id: row.get(0).map_err(|e| to_storage_err(e.to_string()))?,
        name: row.get(1).map_err(|e| to_storage_err(e.to_string()))?,
        category: row.get(2).map_err(|e| to_storage_err(e.to_string()))?,
        steps,
        version: row.get(4).map_err(|e| to_storage_err(e.to_string()))?,
        predecessor_version: row.get(5).map_err(|e| to_storage_err(e.to_string()))?,
        executions: row.get(6).map_err(|e| to_storage_err(e.to_string()))?,
        successes: row.get(7).map_err(|e| to_storage_err(e.to_string()))?,
        context_predicate: row.get(8).map_err(|e| to_storage_err(e.to_string()))?,
        created_at,
    })
}
