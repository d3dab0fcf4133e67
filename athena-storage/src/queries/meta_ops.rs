//! Write-heavy metric counters with aggregation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use athena_core::types::meta::MetricSummary;
use athena_core::types::MetricKind;
use athena_core::errors::AthenaResult;

use crate::to_storage_err;

/// Append one metric observation.
pub fn record(
    conn: &Connection,
    layer: &str,
    domain: &str,
    metric: MetricKind,
    value: f64,
    at: DateTime<Utc>,
) -> AthenaResult<()> {
    conn.execute(
        "INSERT INTO meta_metrics (layer, domain, metric, value, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![layer, domain, metric.as_str(), value, at.to_rfc3339()],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Aggregate metrics grouped by kind over an optional (layer, domain, since)
/// selection. `last` is the most recent value in the selection.
pub fn summary(
    conn: &Connection,
    layer: Option<&str>,
    domain: Option<&str>,
    since: Option<DateTime<Utc>>,
) -> AthenaResult<Vec<MetricSummary>> {
    let mut stmt = conn
        .prepare(
            "SELECT metric, COUNT(*), AVG(value), MIN(value), MAX(value)
             FROM meta_metrics
             WHERE (?1 IS NULL OR layer = ?1)
               AND (?2 IS NULL OR domain = ?2)
               AND (?3 IS NULL OR updated_at >= ?3)
             GROUP BY metric
             ORDER BY metric",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;

    let since_str = since.map(|t| t.to_rfc3339());
    let rows = stmt
        .query_map(params![layer, domain, since_str], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
            ))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut out = Vec::new();
    for row in rows {
        let (metric_str, count, mean, min, max) =
            row.map_err(|e| to_storage_err(e.to_string()))?;
        let Some(metric) = MetricKind::parse(&metric_str) else {
            continue;
        };
        let (last, last_updated_at) = latest(conn, &metric_str, layer, domain)?;
        out.push(MetricSummary {
            metric,
            count: count as u64,
            mean,
            min,
            max,
            last,
            last_updated_at,
        });
    }
    Ok(out)
}

/// Latest value of a metric under the selection.
fn latest(
    conn: &Connection,
    metric: &str,
    layer: Option<&str>,
    domain: Option<&str>,
) -> AthenaResult<(f64, DateTime<Utc>)> {
    conn.query_row(
        "SELECT value, updated_at FROM meta_metrics
         WHERE metric = ?1
           AND (?2 IS NULL OR layer = ?2)
           AND (?3 IS NULL OR domain = ?3)
         ORDER BY id DESC LIMIT 1",
        params![metric, layer, domain],
        |row| {
            Ok((row.get::<_, f64>(0)?, row.get::<_, String>(1)?))
        },
    )
    .map_err(|e| to_storage_err(e.to_string()))
    .and_then(|(value, at)| {
        let at = DateTime::parse_from_rfc3339(&at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| to_storage_err(format!("parse updated_at: {e}")))?;
        Ok((value, at))
    })
}

/// Sum of a metric since a cutoff, e.g. slow-path calls per window.
pub fn sum_since(
    conn: &Connection,
    layer: &str,
    metric: MetricKind,
    since: DateTime<Utc>,
) -> AthenaResult<f64> {
    conn.query_row(
        "SELECT COALESCE(SUM(value), 0.0) FROM meta_metrics
         WHERE layer = ?1 AND metric = ?2 AND updated_at >= ?3",
        params![layer, metric.as_str(), since.to_rfc3339()],
        |row| row.get(0),
    )
    .map_err(|e| to_storage_err(e.to_string()))
}

pub fn count(conn: &Connection) -> AthenaResult<u64> {
    conn.query_row("SELECT COUNT(*) FROM meta_metrics", [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|c| c as u64)
    .map_err(|e| to_storage_err(e.to_string()))
}
