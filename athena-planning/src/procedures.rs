//! Procedure store: extraction drafts, version appends, effectiveness
//! counters, rollback.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use athena_core::deadline::Deadline;
use athena_core::errors::{AthenaError, AthenaResult};
use athena_core::traits::{LayerQuery, LayerStore, ScoredItem};
use athena_core::types::{Event, Procedure, ProcedureDraft, ProcedureStep};
use athena_storage::queries::procedure_ops;
use athena_storage::StorageEngine;

pub struct ProcedureStore {
    storage: Arc<StorageEngine>,
}

impl ProcedureStore {
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Build a draft from an ordered run of events (consolidator entry
    /// point). Consecutive repeats collapse into one step.
    pub fn extract_from_events(&self, events: &[Event]) -> AthenaResult<ProcedureDraft> {
        if events.is_empty() {
            return Err(AthenaError::invalid("events", "at least one event required"));
        }

        let mut steps: Vec<ProcedureStep> = Vec::new();
        for event in events {
            let action = event.description.trim().to_string();
            if steps.last().map(|s| s.action == action).unwrap_or(false) {
                continue;
            }
            steps.push(ProcedureStep::new(action));
        }

        let name = format!(
            "{} workflow",
            steps
                .first()
                .map(|s| s.action.clone())
                .unwrap_or_else(|| "unnamed".into())
        );
        Ok(ProcedureDraft {
            name,
            category: events[0].event_type.as_str().to_string(),
            steps,
            context_predicate: format!("session pattern from {} events", events.len()),
            source_event_ids: events.iter().map(|e| e.id).collect(),
        })
    }

    /// Persist a draft as a new version. With a predecessor the version is
    /// predecessor+1; otherwise 1.
    pub fn save_version(
        &self,
        draft: &ProcedureDraft,
        predecessor_id: Option<&str>,
    ) -> AthenaResult<String> {
        let (version, predecessor_version) = match predecessor_id {
            Some(pred) => {
                let predecessor = self
                    .storage
                    .with_reader(|conn| procedure_ops::get(conn, pred))?
                    .ok_or_else(|| AthenaError::not_found("procedure", pred))?;
                (predecessor.version + 1, Some(predecessor.id))
            }
            None => {
                // A same-name head without an explicit predecessor still
                // chains onto it; versions are strictly increasing per name.
                match self
                    .storage
                    .with_reader(|conn| procedure_ops::get_by_name(conn, &draft.name))?
                {
                    Some(head) => (head.version + 1, Some(head.id)),
                    None => (1, None),
                }
            }
        };

        let procedure = Procedure {
            id: uuid::Uuid::new_v4().to_string(),
            name: draft.name.clone(),
            category: draft.category.clone(),
            steps: draft.steps.clone(),
            version,
            predecessor_version,
            executions: 0,
            successes: 0,
            context_predicate: draft.context_predicate.clone(),
            created_at: Utc::now(),
        };

        self.storage
            .with_writer(|conn| procedure_ops::save_head(conn, &procedure))?;
        debug!(id = %procedure.id, version, "saved procedure version");
        Ok(procedure.id)
    }

    pub fn get(&self, id: &str) -> AthenaResult<Procedure> {
        self.storage
            .with_reader(|conn| procedure_ops::get(conn, id))?
            .ok_or_else(|| AthenaError::not_found("procedure", id))
    }

    pub fn get_by_name(&self, name: &str) -> AthenaResult<Option<Procedure>> {
        self.storage.with_reader(|conn| procedure_ops::get_by_name(conn, name))
    }

    pub fn list(
        &self,
        category: Option<&str>,
        min_effectiveness: Option<f64>,
    ) -> AthenaResult<Vec<Procedure>> {
        self.storage
            .with_reader(|conn| procedure_ops::list(conn, category, min_effectiveness))
    }

    /// Record an execution outcome; returns the Bayesian-smoothed
    /// effectiveness. Not retried by the core: this is non-idempotent.
    pub fn record_execution(&self, id: &str, success: bool) -> AthenaResult<f64> {
        let updated = self
            .storage
            .with_writer(|conn| procedure_ops::record_execution(conn, id, success))?;
        Ok(updated.effectiveness())
    }

    /// Replace the head with its predecessor. `None` when no predecessor.
    pub fn rollback(&self, id: &str) -> AthenaResult<Option<String>> {
        self.storage.with_writer(|conn| procedure_ops::rollback(conn, id))
    }
}

impl LayerStore for ProcedureStore {
    fn layer_name(&self) -> &'static str {
        "procedures"
    }

    /// Token match over name, category, and step actions, weighted by
    /// effectiveness.
    fn search(&self, query: &LayerQuery, deadline: Deadline) -> AthenaResult<Vec<ScoredItem>> {
        if deadline.expired() {
            return Err(AthenaError::Timeout { operation: "procedures.search" });
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

        let procedures = self.list(None, None)?;
        let mut items: Vec<ScoredItem> = procedures
            .into_iter()
            .filter_map(|p| {
                let haystack = format!(
                    "{} {} {}",
                    p.name,
                    p.category,
                    p.steps
                        .iter()
                        .map(|s| s.action.as_str())
                        .collect::<Vec<_>>()
                        .join(" ")
                )
                .to_lowercase();
                let hits = tokens.iter().filter(|t| haystack.contains(*t)).count();
                if hits == 0 {
                    return None;
                }
                let score = (hits as f64 / tokens.len() as f64) * (0.5 + 0.5 * p.effectiveness());
                Some(ScoredItem {
                    id: p.id.clone(),
                    layer: "procedures".into(),
                    score,
                    payload: serde_json::to_value(&p).unwrap_or_default(),
                })
            })
            .collect();

        items.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        items.truncate(query.k);
        Ok(items)
    }

    fn upsert(&self, payload: &serde_json::Value) -> AthenaResult<String> {
        let draft: ProcedureDraft = serde_json::from_value(payload.clone())
            .map_err(|e| AthenaError::invalid("procedure", e.to_string()))?;
        self.save_version(&draft, None)
    }

    fn delete(&self, _id: &str) -> AthenaResult<()> {
        Err(AthenaError::invalid(
            "operation",
            "procedures roll back instead of deleting",
        ))
    }

    fn enumerate(&self, offset: usize, limit: usize) -> AthenaResult<Vec<String>> {
        self.storage
            .with_reader(|conn| procedure_ops::enumerate(conn, offset, limit))
    }

    fn count(&self) -> AthenaResult<u64> {
        self.storage.with_reader(procedure_ops::count)
    }
}
