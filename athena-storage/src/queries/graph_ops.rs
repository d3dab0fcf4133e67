//! Entities, typed edges, and community persistence.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use athena_core::types::{Community, Edge, EdgeType, Entity};
use athena_core::errors::{AthenaError, AthenaResult};

use super::OptionalRow;
use crate::to_storage_err;

/// Insert or update an entity keyed by (type, name). Returns the entity id.
pub fn upsert_entity(conn: &Connection, entity: &Entity) -> AthenaResult<String> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM entities WHERE entity_type = ?1 AND name = ?2",
            params![entity.entity_type, entity.name],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;

    let properties =
        serde_json::to_string(&entity.properties).map_err(|e| to_storage_err(e.to_string()))?;

    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE entities SET properties = ?2 WHERE id = ?1",
                params![id, properties],
            )
            .map_err(|e| to_storage_err(e.to_string()))?;
            Ok(id)
        }
        None => {
            conn.execute(
                "INSERT INTO entities (id, entity_type, name, properties, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entity.id,
                    entity.entity_type,
                    entity.name,
                    properties,
                    entity.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| to_storage_err(e.to_string()))?;
            Ok(entity.id.clone())
        }
    }
}

pub fn get_entity(conn: &Connection, id: &str) -> AthenaResult<Option<Entity>> {
    let mut stmt = conn
        .prepare("SELECT id, entity_type, name, properties, created_at FROM entities WHERE id = ?1")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let result = stmt
        .query_row(params![id], |row| Ok(row_to_entity(row)))
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    match result {
        Some(Ok(entity)) => Ok(Some(entity)),
        Some(Err(e)) => Err(e),
        None => Ok(None),
    }
}

pub fn find_entity_by_name(conn: &Connection, name: &str) -> AthenaResult<Option<Entity>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, entity_type, name, properties, created_at FROM entities
             WHERE name = ?1 ORDER BY id LIMIT 1",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let result = stmt
        .query_row(params![name], |row| Ok(row_to_entity(row)))
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    match result {
        Some(Ok(entity)) => Ok(Some(entity)),
        Some(Err(e)) => Err(e),
        None => Ok(None),
    }
}

/// Insert or update an edge. Both endpoints must exist (edges reference
/// existing entities).
pub fn upsert_edge(conn: &Connection, edge: &Edge) -> AthenaResult<()> {
    for id in [&edge.source_id, &edge.target_id] {
        let exists: Option<i64> = conn
            .query_row("SELECT 1 FROM entities WHERE id = ?1", params![id], |row| row.get(0))
            .optional()
            .map_err(|e| to_storage_err(e.to_string()))?;
        if exists.is_none() {
            return Err(AthenaError::not_found("entity", id.clone()));
        }
    }
    conn.execute(
        "INSERT INTO edges (source_id, target_id, edge_type, strength, context)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(source_id, target_id, edge_type) DO UPDATE SET
            strength = excluded.strength,
            context = excluded.context",
        params![
            edge.source_id,
            edge.target_id,
            edge.edge_type.as_str(),
            edge.strength.clamp(0.0, 1.0),
            edge.context,
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// All edges, ordered for deterministic traversal.
pub fn all_edges(conn: &Connection) -> AthenaResult<Vec<Edge>> {
    let mut stmt = conn
        .prepare(
            "SELECT source_id, target_id, edge_type, strength, context FROM edges
             ORDER BY source_id, target_id, edge_type",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| Ok(row_to_edge(row)))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| to_storage_err(e.to_string()))??);
    }
    Ok(out)
}

pub fn all_entity_ids(conn: &Connection) -> AthenaResult<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT id FROM entities ORDER BY id")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| row.get(0))
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Replace the community partition at one level, in one transaction.
/// Communities partition the entity set at each level.
pub fn replace_communities(
    conn: &Connection,
    level: u8,
    communities: &[Community],
) -> AthenaResult<()> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| to_storage_err(format!("replace_communities begin: {e}")))?;

    let result = (|| -> AthenaResult<()> {
        tx.execute("DELETE FROM communities WHERE level = ?1", params![level])
            .map_err(|e| to_storage_err(e.to_string()))?;
        for community in communities {
            let members = serde_json::to_string(&community.members)
                .map_err(|e| to_storage_err(e.to_string()))?;
            tx.execute(
                "INSERT INTO communities (id, level, members) VALUES (?1, ?2, ?3)",
                params![community.id, community.level, members],
            )
            .map_err(|e| to_storage_err(e.to_string()))?;
        }
        Ok(())
    })();

    match result {
        Ok(()) => {
            tx.commit()
                .map_err(|e| to_storage_err(format!("replace_communities commit: {e}")))?;
            Ok(())
        }
        Err(e) => {
            let _ = tx.rollback();
            Err(e)
        }
    }
}

pub fn get_community(conn: &Connection, id: &str) -> AthenaResult<Option<Community>> {
    let mut stmt = conn
        .prepare("SELECT id, level, members FROM communities WHERE id = ?1")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let result = stmt
        .query_row(params![id], |row| Ok(row_to_community(row)))
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    match result {
        Some(Ok(c)) => Ok(Some(c)),
        Some(Err(e)) => Err(e),
        None => Ok(None),
    }
}

pub fn communities_at_level(conn: &Connection, level: u8) -> AthenaResult<Vec<Community>> {
    let mut stmt = conn
        .prepare("SELECT id, level, members FROM communities WHERE level = ?1 ORDER BY id")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![level], |row| Ok(row_to_community(row)))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| to_storage_err(e.to_string()))??);
    }
    Ok(out)
}

pub fn entity_count(conn: &Connection) -> AthenaResult<u64> {
    conn.query_row("SELECT COUNT(*) FROM entities", [], |row| row.get::<_, i64>(0))
        .map(|c| c as u64)
        .map_err(|e| to_storage_err(e.to_string()))
}

pub fn enumerate_entities(
    conn: &Connection,
    offset: usize,
    limit: usize,
) -> AthenaResult<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT id FROM entities ORDER BY id LIMIT ?1 OFFSET ?2")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![limit as i64, offset as i64], |row| row.get(0))
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

pub fn delete_entity(conn: &Connection, id: &str) -> AthenaResult<()> {
    // Edges cascade via foreign keys.
    let rows = conn
        .execute("DELETE FROM entities WHERE id = ?1", params![id])
        .map_err(|e| to_storage_err(e.to_string()))?;
    if rows == 0 {
        return Err(AthenaError::not_found("entity", id));
    }
    Ok(())
}

fn row_to_entity(row: &rusqlite::Row<'_>) -> AthenaResult<Entity> {
    let properties_json: String = row.get(3).map_err(|e| to_storage_err(e.to_string()))?;
    let created_str: String = row.get(4).map_err(|e| to_storage_err(e.to_string()))?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| to_storage_err(format!("parse created_at: {e}")))?;

    Ok(Entity {
        id: row.get(0).map_err(|e| to_storage_err(e.to_string()))?,
        entity_type: row.get(1).map_err(|e| to_storage_err(e.to_string()))?,
        name: row.get(2).map_err(|e| to_storage_err(e.to_string()))?,
        properties: serde_json::from_str(&properties_json)
            .map_err(|e| to_storage_err(format!("parse properties: {e}")))?,
        created_at,
    })
}

fn row_to_edge(row: &rusqlite::Row<'_>) -> AthenaResult<Edge> {
    let type_str: String = row.get(2).map_err(|e| to_storage_err(e.to_string()))?;
    Ok(Edge {
        source_id: row.get(0).map_err(|e| to_storage_err(e.to_string()))?,
        target_id: row.get(1).map_err(|e| to_storage_err(e.to_string()))?,
        edge_type: EdgeType::parse(&type_str)
            .ok_or_else(|| to_storage_err(format!("unknown edge type '{type_str}'")))?,
        strength: row.get(3).map_err(|e| to_storage_err(e.to_string()))?,
        context: row.get(4).map_err(|e| to_storage_err(e.to_string()))?,
    })
}

fn row_to_community(row: &rusqlite::Row<'_>) -> AthenaResult<Community> {
    let members_json: String = row.get(2).map_err(|e| to_storage_err(e.to_string()))?;
    Ok(Community {
        id: row.get(0).map_err(|e| to_storage_err(e.to_string()))?,
        level: row.get::<_, i64>(1).map_err(|e| to_storage_err(e.to_string()))? as u8,
        members: serde_json::from_str(&members_json)
            .map_err(|e| to_storage_err(format!("parse members: {e}")))?,
    })
}
