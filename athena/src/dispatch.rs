//! Operation dispatch: rate limit → resolve → validate → execute → envelope.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::debug;

use athena_core::constants::PAGINATION_THRESHOLD;
use athena_core::deadline::Deadline;
use athena_core::envelope::{EnvelopeMetadata, Pagination, ResultEnvelope};
use athena_core::errors::{AthenaError, AthenaResult};
use athena_core::traits::StoreView;
use athena_core::types::{
    EventContext, EventDraft, EventFilter, EventType, Outcome, ProcedureDraft, ProcedureStep,
    Task, TaskPriority, TaskStatus, Trigger, TriggerKind,
};
use athena_consolidation::RunRequest;
use athena_core::config::StrategyProfile;
use athena_ingest::RecordOutcome;
use athena_router::{Cursor, Registry, RoutedQuery};
use athena_semantic::SearchWeights;

use crate::Athena;

/// Rate-limit bucket for an operation: the named verb buckets where they
/// exist, the family bucket otherwise.
fn bucket_for(family: &str, verb: &str) -> String {
    match (family, verb) {
        ("memory", "recall") => "recall".into(),
        ("memory", "remember") => "remember".into(),
        ("consolidation", _) => "consolidation".into(),
        _ => family.to_string(),
    }
}

pub fn dispatch(
    athena: &Athena,
    family: &str,
    verb: &str,
    input: &Value,
    deadline: Deadline,
) -> ResultEnvelope {
    let started = Instant::now();
    let metadata = |elapsed: Instant| EnvelopeMetadata {
        elapsed_ms: elapsed.elapsed().as_millis() as u64,
        ..Default::default()
    };

    let Some(spec) = Registry::resolve(family, verb) else {
        return ResultEnvelope::unknown_operation(&format!("{family}.{verb}"), metadata(started));
    };
    if let Err(e) = athena.limiter.check(&bucket_for(family, verb)) {
        return ResultEnvelope::from_error(&e, metadata(started));
    }
    if let Err(e) = spec.validate(input) {
        return ResultEnvelope::from_error(&e, metadata(started));
    }

    debug!(operation = %spec.name(), "dispatch");
    let result = execute(athena, family, verb, input, deadline);
    let mut envelope = match result {
        Ok(envelope) => envelope,
        Err(e) => ResultEnvelope::from_error(&e, EnvelopeMetadata::default()),
    };
    envelope.metadata.elapsed_ms = started.elapsed().as_millis() as u64;
    envelope
}

fn execute(
    athena: &Athena,
    family: &str,
    verb: &str,
    input: &Value,
    deadline: Deadline,
) -> AthenaResult<ResultEnvelope> {
    match (family, verb) {
        ("memory", "remember") => memory_remember(athena, input),
        ("memory", "recall") => memory_recall(athena, input, deadline),
        ("memory", "reinforce") => memory_reinforce(athena, input),
        ("memory", "purge") => memory_purge(athena, input),
        ("episodic", "record") => episodic_record(athena, input, deadline),
        ("episodic", "record_batch") => episodic_record_batch(athena, input, deadline),
        ("episodic", "timeline") => episodic_timeline(athena, input),
        ("episodic", "session") => episodic_session(athena, input),
        ("graph", "upsert_entity") => graph_upsert_entity(athena, input),
        ("graph", "upsert_edge") => graph_upsert_edge(athena, input),
        ("graph", "find_paths") => graph_find_paths(athena, input, deadline),
        ("graph", "detect_communities") => graph_detect_communities(athena, input),
        ("graph", "summarise_community") => graph_summarise(athena, input),
        ("planning", "create_task") => planning_create(athena, input),
        ("planning", "transition") => planning_transition(athena, input),
        ("planning", "list_tasks") => planning_list(athena, input),
        ("planning", "get_task") => planning_get(athena, input),
        ("consolidation", "run") => consolidation_run(athena, input, deadline),
        ("consolidation", "status") => consolidation_status(athena),
        ("procedural", "save") => procedural_save(athena, input),
        ("procedural", "list") => procedural_list(athena, input),
        ("procedural", "record_execution") => procedural_execute(athena, input),
        ("procedural", "rollback") => procedural_rollback(athena, input),
        ("prospective", "activate_due") => prospective_activate(athena, input),
        ("prospective", "notify_event") => prospective_notify(athena, input),
        ("rag", "query") => rag_query(athena, input, deadline),
        ("code", "run_snippet") => code_run_snippet(athena, input, deadline),
        ("agent", "stats") => agent_stats(athena, input),
        ("agent", "expertise") => agent_expertise(athena, input),
        _ => unreachable!("registry and dispatch table out of sync for {family}.{verb}"),
    }
}

// --- helpers ---------------------------------------------------------------

fn str_field<'a>(input: &'a Value, name: &str) -> &'a str {
    input.get(name).and_then(|v| v.as_str()).unwrap_or_default()
}

fn parse_rfc3339(input: &Value, name: &str) -> AthenaResult<DateTime<Utc>> {
    let raw = str_field(input, name);
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AthenaError::invalid(name, format!("RFC 3339 timestamp required: {e}")))
}

fn ok(data: Value) -> AthenaResult<ResultEnvelope> {
    Ok(ResultEnvelope::ok(data, EnvelopeMetadata::default()))
}

// --- memory ----------------------------------------------------------------

fn memory_remember(athena: &Athena, input: &Value) -> AthenaResult<ResultEnvelope> {
    let sources = input
        .get("source_event_ids")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|x| x.as_u64()).collect())
        .unwrap_or_default();
    let fact_id = athena.facts.store_fact(
        str_field(input, "content"),
        input.get("domain").and_then(|v| v.as_str()).unwrap_or("general"),
        &sources,
        input.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.5),
    )?;
    ok(json!({ "fact_id": fact_id }))
}

fn memory_recall(
    athena: &Athena,
    input: &Value,
    deadline: Deadline,
) -> AthenaResult<ResultEnvelope> {
    let k = input.get("k").and_then(|v| v.as_u64()).unwrap_or(10) as usize;
    let weights = SearchWeights {
        vector: input
            .get("vector_weight")
            .and_then(|v| v.as_f64())
            .unwrap_or(athena.config.vector_weight),
        lexical: input
            .get("lexical_weight")
            .and_then(|v| v.as_f64())
            .unwrap_or(athena.config.lexical_weight),
    };
    let outcome = athena
        .facts
        .search(str_field(input, "query"), k, weights, deadline)?;

    let hits: Vec<Value> = outcome
        .hits
        .iter()
        .map(|h| {
            json!({
                "fact": h.fact,
                "score": h.score,
                "vector_score": h.vector_score,
                "lexical_score": h.lexical_score,
            })
        })
        .collect();
    let confidence = outcome
        .hits
        .first()
        .map(|h| h.fact.confidence.value() as f32);

    let mut envelope = if deadline.expired() {
        ResultEnvelope::partial(json!({ "hits": hits }), EnvelopeMetadata::default())
    } else {
        ResultEnvelope::ok(json!({ "hits": hits }), EnvelopeMetadata::default())
    };
    envelope.metadata.vector_disabled = outcome.vector_disabled;
    if let Some(c) = confidence {
        envelope = envelope.with_confidence(c);
    }
    Ok(envelope)
}

fn memory_reinforce(athena: &Athena, input: &Value) -> AthenaResult<ResultEnvelope> {
    let confidence = athena.facts.reinforce(
        str_field(input, "fact_id"),
        input.get("support").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
        input.get("contradict").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
    )?;
    ok(json!({ "new_confidence": confidence.value() }))
}

fn memory_purge(athena: &Athena, input: &Value) -> AthenaResult<ResultEnvelope> {
    let removed = athena.facts.purge(
        input
            .get("confidence_threshold")
            .and_then(|v| v.as_f64())
            .unwrap_or(athena.config.purge_confidence_threshold),
        input
            .get("grace_days")
            .and_then(|v| v.as_i64())
            .unwrap_or(athena.config.purge_grace_days),
    )?;
    ok(json!({ "count_removed": removed }))
}

// --- episodic --------------------------------------------------------------

fn parse_draft(input: &Value) -> AthenaResult<EventDraft> {
    let event_type = EventType::parse(str_field(input, "event_type"))
        .ok_or_else(|| AthenaError::invalid("event_type", "unknown event type"))?;
    let outcome = match input.get("outcome").and_then(|v| v.as_str()) {
        Some(raw) => {
            Outcome::parse(raw).ok_or_else(|| AthenaError::invalid("outcome", "unknown outcome"))?
        }
        None => Outcome::Unknown,
    };
    let timestamp = match input.get("timestamp").and_then(|v| v.as_str()) {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| AthenaError::invalid("timestamp", e.to_string()))?,
        None => Utc::now(),
    };
    let context: EventContext = match input.get("context") {
        Some(raw) => serde_json::from_value(raw.clone())
            .map_err(|e| AthenaError::invalid("context", e.to_string()))?,
        None => EventContext::default(),
    };
    Ok(EventDraft {
        timestamp,
        session_id: str_field(input, "session_id").to_string(),
        event_type,
        description: str_field(input, "description").to_string(),
        context,
        outcome,
    })
}

fn record_outcome_json(outcome: &RecordOutcome) -> Value {
    match outcome {
        RecordOutcome::Recorded(id) => json!({ "recorded": true, "event_id": id }),
        RecordOutcome::Duplicate { existing_id } => {
            json!({ "recorded": false, "duplicate": true, "existing_id": existing_id })
        }
        RecordOutcome::Rejected { reason } => {
            json!({ "recorded": false, "rejected": true, "reason": reason })
        }
    }
}

fn episodic_record(
    athena: &Athena,
    input: &Value,
    deadline: Deadline,
) -> AthenaResult<ResultEnvelope> {
    let draft = parse_draft(input)?;
    let outcome = athena.pipeline.record_event(&draft, deadline)?;
    ok(record_outcome_json(&outcome))
}

fn episodic_record_batch(
    athena: &Athena,
    input: &Value,
    deadline: Deadline,
) -> AthenaResult<ResultEnvelope> {
    let raw = input
        .get("events")
        .and_then(|v| v.as_array())
        .ok_or_else(|| AthenaError::invalid("events", "array required"))?;
    let mut drafts = Vec::with_capacity(raw.len());
    for item in raw {
        drafts.push(parse_draft(item)?);
    }
    let outcomes = athena.pipeline.record_batch(&drafts, deadline)?;
    ok(json!({
        "outcomes": outcomes.iter().map(record_outcome_json).collect::<Vec<_>>()
    }))
}

fn episodic_timeline(athena: &Athena, input: &Value) -> AthenaResult<ResultEnvelope> {
    let from = parse_rfc3339(input, "from")?;
    let to = parse_rfc3339(input, "to")?;
    let limit = (input.get("limit").and_then(|v| v.as_u64()).unwrap_or(100) as usize)
        .min(PAGINATION_THRESHOLD);
    let after = match input.get("cursor").and_then(|v| v.as_str()) {
        Some(raw) => {
            let cursor = Cursor::decode(raw)?;
            let id = cursor
                .last_id
                .parse::<u64>()
                .map_err(|_| AthenaError::invalid("cursor", "malformed event id"))?;
            Some((cursor.sort_key, id))
        }
        None => None,
    };
    let filter = EventFilter {
        event_type: input
            .get("event_type")
            .and_then(|v| v.as_str())
            .and_then(EventType::parse),
        session_id: input
            .get("session_id")
            .and_then(|v| v.as_str())
            .map(String::from),
        ..Default::default()
    };

    let events = athena.event_log.range_query(from, to, &filter, after, limit)?;
    let total = athena.event_log.count_range(from, to)?;
    let next_cursor = if events.len() == limit {
        events.last().map(|e| {
            Cursor {
                sort_key: e.timestamp.timestamp_micros(),
                last_id: e.id.to_string(),
            }
            .encode()
        })
    } else {
        None
    };

    let returned = events.len() as u64;
    Ok(ResultEnvelope::ok(json!({ "events": events }), EnvelopeMetadata::default())
        .with_pagination(Pagination {
            total,
            returned,
            has_more: next_cursor.is_some(),
            next_cursor,
        }))
}

fn episodic_session(athena: &Athena, input: &Value) -> AthenaResult<ResultEnvelope> {
    let session_id = str_field(input, "session_id");
    let limit = (input.get("limit").and_then(|v| v.as_u64()).unwrap_or(100) as usize)
        .min(PAGINATION_THRESHOLD);
    let after_id = match input.get("cursor").and_then(|v| v.as_str()) {
        Some(raw) => Some(
            Cursor::decode(raw)?
                .last_id
                .parse::<u64>()
                .map_err(|_| AthenaError::invalid("cursor", "malformed event id"))?,
        ),
        None => None,
    };

    let events = athena.event_log.query_by_session(session_id, after_id, limit)?;
    let next_cursor = if events.len() == limit {
        events.last().map(|e| {
            Cursor { sort_key: e.id as i64, last_id: e.id.to_string() }.encode()
        })
    } else {
        None
    };
    let returned = events.len() as u64;
    Ok(ResultEnvelope::ok(json!({ "events": events }), EnvelopeMetadata::default())
        .with_pagination(Pagination {
            total: returned, // Per-session totals are the page sum; cheap cursor walk.
            returned,
            has_more: next_cursor.is_some(),
            next_cursor,
        }))
}

// --- graph -----------------------------------------------------------------

fn graph_upsert_entity(athena: &Athena, input: &Value) -> AthenaResult<ResultEnvelope> {
    let mut entity = athena_core::types::Entity::new(
        input.get("entity_type").and_then(|v| v.as_str()).unwrap_or("concept"),
        str_field(input, "name"),
    );
    if let Some(props) = input.get("properties").and_then(|v| v.as_object()) {
        entity.properties = props.clone();
    }
    let id = athena.graph.upsert_entity(&entity)?;
    ok(json!({ "entity_id": id }))
}

fn graph_upsert_edge(athena: &Athena, input: &Value) -> AthenaResult<ResultEnvelope> {
    let edge_type = athena_core::types::EdgeType::parse(str_field(input, "edge_type"))
        .ok_or_else(|| AthenaError::invalid("edge_type", "unknown edge type"))?;
    athena.graph.upsert_edge(&athena_core::types::Edge {
        source_id: str_field(input, "source_id").to_string(),
        target_id: str_field(input, "target_id").to_string(),
        edge_type,
        strength: input.get("strength").and_then(|v| v.as_f64()).unwrap_or(1.0),
        context: input.get("context").and_then(|v| v.as_str()).map(String::from),
    })?;
    ok(json!({ "upserted": true }))
}

fn graph_find_paths(
    athena: &Athena,
    input: &Value,
    deadline: Deadline,
) -> AthenaResult<ResultEnvelope> {
    let max_hops = input.get("max_hops").and_then(|v| v.as_u64()).unwrap_or(4) as usize;
    let paths = athena.graph.find_paths(
        str_field(input, "src"),
        str_field(input, "dst"),
        max_hops,
        deadline,
    )?;
    ok(json!({ "paths": paths }))
}

fn graph_detect_communities(athena: &Athena, input: &Value) -> AthenaResult<ResultEnvelope> {
    let resolution = input.get("resolution").and_then(|v| v.as_f64()).unwrap_or(1.0);
    let communities = athena.graph.detect_communities(resolution)?;
    ok(json!({ "communities": communities }))
}

fn graph_summarise(athena: &Athena, input: &Value) -> AthenaResult<ResultEnvelope> {
    let summary = athena
        .graph
        .summarise_community(str_field(input, "community_id"))?;
    ok(json!({ "summary": summary }))
}

// --- planning --------------------------------------------------------------

fn planning_create(athena: &Athena, input: &Value) -> AthenaResult<ResultEnvelope> {
    let priority = match input.get("priority").and_then(|v| v.as_str()) {
        Some(raw) => TaskPriority::parse(raw)
            .ok_or_else(|| AthenaError::invalid("priority", "unknown priority"))?,
        None => TaskPriority::Medium,
    };
    let mut task = Task::new(str_field(input, "title"), priority);
    if let Some(raw) = input.get("deadline").and_then(|v| v.as_str()) {
        task.deadline = Some(
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| AthenaError::invalid("deadline", e.to_string()))?,
        );
    }
    if let Some(triggers) = input.get("triggers").and_then(|v| v.as_array()) {
        for trigger in triggers {
            let kind = TriggerKind::parse(str_field(trigger, "kind"))
                .ok_or_else(|| AthenaError::invalid("triggers", "unknown trigger kind"))?;
            task.triggers.push(Trigger {
                kind,
                predicate: str_field(trigger, "predicate").to_string(),
            });
        }
    }
    if let Some(deps) = input.get("dependencies").and_then(|v| v.as_array()) {
        task.dependencies = deps
            .iter()
            .filter_map(|d| d.as_str().map(String::from))
            .collect();
    }
    let id = athena.tasks.create(&task)?;
    ok(json!({ "task_id": id }))
}

fn planning_transition(athena: &Athena, input: &Value) -> AthenaResult<ResultEnvelope> {
    let status = TaskStatus::parse(str_field(input, "status"))
        .ok_or_else(|| AthenaError::invalid("status", "unknown status"))?;
    let task = athena.tasks.transition(str_field(input, "task_id"), status)?;
    ok(json!({ "task": task }))
}

fn planning_list(athena: &Athena, input: &Value) -> AthenaResult<ResultEnvelope> {
    let status = match input.get("status").and_then(|v| v.as_str()) {
        Some(raw) => Some(
            TaskStatus::parse(raw).ok_or_else(|| AthenaError::invalid("status", "unknown status"))?,
        ),
        None => None,
    };
    let tasks = athena.tasks.list(status)?;
    let total = tasks.len() as u64;
    Ok(
        ResultEnvelope::ok(json!({ "tasks": tasks }), EnvelopeMetadata::default()).with_pagination(
            Pagination { total, returned: total, has_more: false, next_cursor: None },
        ),
    )
}

fn planning_get(athena: &Athena, input: &Value) -> AthenaResult<ResultEnvelope> {
    let task = athena.tasks.get(str_field(input, "task_id"))?;
    ok(json!({ "task": task }))
}

// --- consolidation ---------------------------------------------------------

fn consolidation_run(
    athena: &Athena,
    input: &Value,
    deadline: Deadline,
) -> AthenaResult<ResultEnvelope> {
    let strategy = match input.get("strategy").and_then(|v| v.as_str()) {
        Some(raw) => Some(
            StrategyProfile::parse(raw)
                .ok_or_else(|| AthenaError::invalid("strategy", "unknown strategy"))?,
        ),
        None => None,
    };
    let domain_filter = match input.get("domain_filter").and_then(|v| v.as_str()) {
        Some(raw) => Some(
            EventType::parse(raw)
                .ok_or_else(|| AthenaError::invalid("domain_filter", "unknown event type"))?,
        ),
        None => None,
    };
    let request = RunRequest {
        window_start: parse_rfc3339(input, "window_start")?,
        window_end: parse_rfc3339(input, "window_end")?,
        strategy,
        domain_filter,
    };
    let report = athena.consolidator.run(&request, deadline)?;
    let partial = report.partial;
    let vector_degraded = report.vector_degraded;
    let llm_deferred = report.deferred > 0;
    let data = json!({ "report": report });
    let mut envelope = if partial {
        ResultEnvelope::partial(data, EnvelopeMetadata::default())
    } else {
        ResultEnvelope::ok(data, EnvelopeMetadata::default())
    };
    envelope.metadata.vector_disabled = vector_degraded;
    envelope.metadata.llm_deferred = llm_deferred;
    Ok(envelope)
}

fn consolidation_status(athena: &Athena) -> AthenaResult<ResultEnvelope> {
    ok(json!({
        "deferred_candidates": athena.consolidator.deferred_count(),
        "storage_read_only": athena.storage.is_read_only(),
    }))
}

// --- procedural ------------------------------------------------------------

fn procedural_save(athena: &Athena, input: &Value) -> AthenaResult<ResultEnvelope> {
    let steps = input
        .get("steps")
        .and_then(|v| v.as_array())
        .ok_or_else(|| AthenaError::invalid("steps", "array required"))?
        .iter()
        .map(|s| match s {
            Value::String(action) => Ok(ProcedureStep::new(action.clone())),
            Value::Object(_) => serde_json::from_value(s.clone())
                .map_err(|e| AthenaError::invalid("steps", e.to_string())),
            _ => Err(AthenaError::invalid("steps", "string or object steps required")),
        })
        .collect::<AthenaResult<Vec<_>>>()?;

    let draft = ProcedureDraft {
        name: str_field(input, "name").to_string(),
        category: input
            .get("category")
            .and_then(|v| v.as_str())
            .unwrap_or("general")
            .to_string(),
        steps,
        context_predicate: input
            .get("context_predicate")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        source_event_ids: Vec::new(),
    };
    let id = athena
        .procedures
        .save_version(&draft, input.get("predecessor_id").and_then(|v| v.as_str()))?;
    ok(json!({ "procedure_id": id }))
}

fn procedural_list(athena: &Athena, input: &Value) -> AthenaResult<ResultEnvelope> {
    let procedures = athena.procedures.list(
        input.get("category").and_then(|v| v.as_str()),
        input.get("min_effectiveness").and_then(|v| v.as_f64()),
    )?;
    let with_effectiveness: Vec<Value> = procedures
        .iter()
        .map(|p| json!({ "procedure": p, "effectiveness": p.effectiveness() }))
        .collect();
    let total = with_effectiveness.len() as u64;
    Ok(ResultEnvelope::ok(
        json!({ "procedures": with_effectiveness }),
        EnvelopeMetadata::default(),
    )
    .with_pagination(Pagination {
        total,
        returned: total,
        has_more: false,
        next_cursor: None,
    }))
}

fn procedural_execute(athena: &Athena, input: &Value) -> AthenaResult<ResultEnvelope> {
    let success = input
        .get("success")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| AthenaError::invalid("success", "bool required"))?;
    let effectiveness = athena
        .procedures
        .record_execution(str_field(input, "procedure_id"), success)?;
    ok(json!({ "effectiveness": effectiveness }))
}

fn procedural_rollback(athena: &Athena, input: &Value) -> AthenaResult<ResultEnvelope> {
    let predecessor = athena.procedures.rollback(str_field(input, "procedure_id"))?;
    ok(json!({ "predecessor_id": predecessor }))
}

// --- prospective -----------------------------------------------------------

fn prospective_activate(athena: &Athena, input: &Value) -> AthenaResult<ResultEnvelope> {
    let now = match input.get("now").and_then(|v| v.as_str()) {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| AthenaError::invalid("now", e.to_string()))?,
        None => Utc::now(),
    };
    let activated = athena.tasks.activate_due(now)?;
    ok(json!({ "activated": activated }))
}

fn prospective_notify(athena: &Athena, input: &Value) -> AthenaResult<ResultEnvelope> {
    let event_id = input
        .get("event_id")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| AthenaError::invalid("event_id", "integer required"))?;
    let event = athena.event_log.get(event_id)?;
    let matched = athena.tasks.notify_event(&event)?;
    ok(json!({ "matched": matched }))
}

// --- rag -------------------------------------------------------------------

fn rag_query(athena: &Athena, input: &Value, deadline: Deadline) -> AthenaResult<ResultEnvelope> {
    let request = RoutedQuery {
        text: str_field(input, "query").to_string(),
        k: input.get("k").and_then(|v| v.as_u64()).unwrap_or(10) as usize,
        domain: input.get("domain").and_then(|v| v.as_str()).map(String::from),
        layers: input.get("layers").and_then(|v| v.as_array()).map(|a| {
            a.iter()
                .filter_map(|l| l.as_str().map(String::from))
                .collect()
        }),
    };
    let result = athena.router.query(&request, deadline)?;

    let vector_disabled = athena.embedder.degradation().is_degraded();
    let data = json!({
        "intent": format!("{:?}", result.intent),
        "items": result.items,
    });
    let mut envelope = if result.partial {
        ResultEnvelope::partial(data, EnvelopeMetadata::default())
    } else {
        ResultEnvelope::ok(data, EnvelopeMetadata::default())
    };
    envelope.metadata.layer_breakdown = result.layer_breakdown;
    envelope.metadata.vector_disabled = vector_disabled;
    Ok(envelope)
}

// --- code ------------------------------------------------------------------

fn code_run_snippet(
    athena: &Athena,
    input: &Value,
    deadline: Deadline,
) -> AthenaResult<ResultEnvelope> {
    let layer_names: Vec<String> = input
        .get("layers")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|l| l.as_str().map(String::from)).collect())
        .unwrap_or_else(|| vec!["facts".to_string()]);

    // Read-only views only; the runner never touches the stores.
    let mut views = Vec::new();
    for name in layer_names {
        let query = RoutedQuery {
            text: String::new(),
            k: 64,
            domain: None,
            layers: Some(vec![name.clone()]),
        };
        let snapshot = athena.router.query(&query, deadline)?;
        views.push(StoreView {
            layer: name,
            items: snapshot.items.into_iter().map(|i| i.payload).collect(),
        });
    }

    let output = athena.runner.run(str_field(input, "code"), &views)?;
    ok(json!({ "output": output }))
}

// --- agent -----------------------------------------------------------------

fn agent_stats(athena: &Athena, input: &Value) -> AthenaResult<ResultEnvelope> {
    let since = match input.get("since").and_then(|v| v.as_str()) {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| AthenaError::invalid("since", e.to_string()))?,
        ),
        None => None,
    };
    let summaries = athena.meta.summary(
        input.get("layer").and_then(|v| v.as_str()),
        input.get("domain").and_then(|v| v.as_str()),
        since,
    )?;
    ok(json!({ "metrics": summaries }))
}

fn agent_expertise(athena: &Athena, input: &Value) -> AthenaResult<ResultEnvelope> {
    let filter = input.get("domain").and_then(|v| v.as_str());
    let stats = athena.facts.domain_stats()?;
    let expertise: Vec<Value> = stats
        .into_iter()
        .filter(|(domain, _, _)| filter.map(|f| f == domain).unwrap_or(true))
        .map(|(domain, count, mean_confidence)| {
            json!({
                "domain": domain,
                "fact_count": count,
                "mean_confidence": mean_confidence,
                "expertise": athena_meta::quality::expertise(count, mean_confidence),
            })
        })
        .collect();
    ok(json!({ "expertise": expertise }))
}
