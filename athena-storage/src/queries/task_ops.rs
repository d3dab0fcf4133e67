//! Task rows, trigger rows, and status transitions.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use athena_core::types::{Task, TaskPriority, TaskStatus, Trigger, TriggerKind};
use athena_core::errors::{AthenaError, AthenaResult};

use super::OptionalRow;
use crate::to_storage_err;

/// Insert a task and its triggers in one transaction.
pub fn insert_task(conn: &Connection, task: &Task) -> AthenaResult<()> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| to_storage_err(format!("insert_task begin: {e}")))?;

    match insert_task_inner(&tx, task) {
        Ok(()) => {
            tx.commit()
                .map_err(|e| to_storage_err(format!("insert_task commit: {e}")))?;
            Ok(())
        }
        Err(e) => {
            let _ = tx.rollback();
            Err(e)
        }
    }
}

fn insert_task_inner(conn: &Connection, task: &Task) -> AthenaResult<()> {
    let deps =
        serde_json::to_string(&task.dependencies).map_err(|e| to_storage_err(e.to_string()))?;
    conn.execute(
        "INSERT INTO tasks (id, title, status, priority, created_at, deadline,
                            completed_at, dependencies)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            task.id,
            task.title,
            task.status.as_str(),
            task.priority.as_str(),
            task.created_at.to_rfc3339(),
            task.deadline.map(|t| t.to_rfc3339()),
            task.completed_at.map(|t| t.to_rfc3339()),
            deps,
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    for trigger in &task.triggers {
        conn.execute(
            "INSERT OR IGNORE INTO task_triggers (task_id, kind, predicate) VALUES (?1, ?2, ?3)",
            params![task.id, trigger.kind.as_str(), trigger.predicate],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    }
    Ok(())
}

pub fn get_task(conn: &Connection, id: &str) -> AthenaResult<Option<Task>> {
    let mut stmt = conn
        .prepare(&format!("{TASK_COLUMNS} WHERE id = ?1"))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let result = stmt
        .query_row(params![id], |row| Ok(row_to_task(row)))
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    match result {
        Some(Ok(mut task)) => {
            task.triggers = load_triggers(conn, &task.id)?;
            Ok(Some(task))
        }
        Some(Err(e)) => Err(e),
        None => Ok(None),
    }
}

/// Persist a status change. Sets completed_at when entering Completed.
pub fn update_status(
    conn: &Connection,
    id: &str,
    status: TaskStatus,
    completed_at: Option<DateTime<Utc>>,
) -> AthenaResult<()> {
    let rows = conn
        .execute(
            "UPDATE tasks SET status = ?2, completed_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), completed_at.map(|t| t.to_rfc3339())],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    if rows == 0 {
        return Err(AthenaError::not_found("task", id));
    }
    Ok(())
}

/// Tasks in a status, ordered by (created_at, id).
pub fn list_by_status(conn: &Connection, status: Option<TaskStatus>) -> AthenaResult<Vec<Task>> {
    // Bind against an always-true sentinel when no status filter is given so
    // a single prepared statement covers both cases.
    let sql = format!(
        "{TASK_COLUMNS} WHERE (?1 = '' OR status = ?1) ORDER BY created_at ASC, id ASC"
    );
    let bind = status.map(|s| s.as_str().to_string()).unwrap_or_default();
    let mut stmt = conn.prepare(&sql).map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![bind], |row| Ok(row_to_task(row)))
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut tasks = Vec::new();
    for row in rows {
        tasks.push(row.map_err(|e| to_storage_err(e.to_string()))??);
    }
    for task in &mut tasks {
        task.triggers = load_triggers(conn, &task.id)?;
    }
    Ok(tasks)
}

/// Non-terminal tasks carrying at least one trigger of the given kind.
pub fn tasks_with_trigger_kind(conn: &Connection, kind: TriggerKind) -> AthenaResult<Vec<Task>> {
    let mut stmt = conn
        .prepare(&format!(
            "{TASK_COLUMNS} WHERE status IN ('pending', 'active', 'blocked')
             AND id IN (SELECT task_id FROM task_triggers WHERE kind = ?1)
             ORDER BY created_at ASC, id ASC"
        ))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![kind.as_str()], |row| Ok(row_to_task(row)))
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut tasks = Vec::new();
    for row in rows {
        let mut task = row.map_err(|e| to_storage_err(e.to_string()))??;
        task.triggers = load_triggers(conn, &task.id)?;
        tasks.push(task);
    }
    Ok(tasks)
}

/// The full dependency relation `(task_id, dependency_id)`, for cycle checks.
pub fn all_dependencies(conn: &Connection) -> AthenaResult<Vec<(String, String)>> {
    let mut stmt = conn
        .prepare("SELECT id, dependencies FROM tasks")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut out = Vec::new();
    for row in rows {
        let (id, deps_json) = row.map_err(|e| to_storage_err(e.to_string()))?;
        let deps: BTreeSet<String> = serde_json::from_str(&deps_json)
            .map_err(|e| to_storage_err(format!("parse dependencies: {e}")))?;
        for dep in deps {
            out.push((id.clone(), dep));
        }
    }
    Ok(out)
}

pub fn count(conn: &Connection) -> AthenaResult<u64> {
    conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get::<_, i64>(0))
        .map(|c| c as u64)
        .map_err(|e| to_storage_err(e.to_string()))
}

pub fn enumerate(conn: &Connection, offset: usize, limit: usize) -> AthenaResult<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT id FROM tasks ORDER BY created_at ASC, id ASC LIMIT ?1 OFFSET ?2")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![limit as i64, offset as i64], |row| row.get(0))
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

pub fn delete_task(conn: &Connection, id: &str) -> AthenaResult<()> {
    conn.execute("DELETE FROM task_triggers WHERE task_id = ?1", params![id])
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = conn
        .execute("DELETE FROM tasks WHERE id = ?1", params![id])
        .map_err(|e| to_storage_err(e.to_string()))?;
    if rows == 0 {
        return Err(AthenaError::not_found("task", id));
    }
    Ok(())
}

fn load_triggers(conn: &Connection, task_id: &str) -> AthenaResult<Vec<Trigger>> {
    let mut stmt = conn
        .prepare("SELECT kind, predicate FROM task_triggers WHERE task_id = ?1 ORDER BY kind, predicate")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![task_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut triggers = Vec::new();
    for row in rows {
        let (kind_str, predicate) = row.map_err(|e| to_storage_err(e.to_string()))?;
        let kind = TriggerKind::parse(&kind_str)
            .ok_or_else(|| to_storage_err(format!("unknown trigger kind '{kind_str}'")))?;
        triggers.push(Trigger { kind, predicate });
    }
    Ok(triggers)
}

const TASK_COLUMNS: &str = "SELECT id, title, status, priority, created_at, deadline,
        completed_at, dependencies FROM tasks";

fn row_to_task(row: &rusqlite::Row<'_>) -> AthenaResult<Task> {
    let status_str: String = row.get(2).map_err(|e| to_storage_err(e.to_string()))?;
    let priority_str: String = row.get(3).map_err(|e| to_storage_err(e.to_string()))?;
    let created_str: String = row.get(4).map_err(|e| to_storage_err(e.to_string()))?;
    let deadline_str: Option<String> = row.get(5).map_err(|e| to_storage_err(e.to_string()))?;
    let completed_str: Option<String> = row.get(6).map_err(|e| to_storage_err(e.to_string()))?;
    let deps_json: String = row.get(7).map_err(|e| to_storage_err(e.to_string()))?;

    let parse_dt = |s: &str| -> AthenaResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| to_storage_err(format!("parse datetime '{s}': {e}")))
    };

    Ok(Task {
        id: row.get(0).map_err(|e| to_storage_err(e.to_string()))?,
        title: row.get(1).map_err(|e| to_storage_err(e.to_string()))?,
        status: TaskStatus::parse(&status_str)
            .ok_or_else(|| to_storage_err(format!("unknown status '{status_str}'")))?,
        priority: TaskPriority::parse(&priority_str)
            .ok_or_else(|| to_storage_err(format!("unknown priority '{priority_str}'")))?,
        created_at: parse_dt(&created_str)?,
        deadline: deadline_str.as_deref().map(parse_dt).transpose()?,
        completed_at: completed_str.as_deref().map(parse_dt).transpose()?,
        triggers: Vec::new(),
        dependencies: serde_json::from_str(&deps_json)
            .map_err(|e| to_storage_err(format!("parse dependencies: {e}")))?,
    })
}
