//! Integration tests for the SQLite layer: migrations, event log ordering,
//! fact FTS, procedure versioning, task triggers, meta aggregation.

use chrono::{Duration, TimeZone, Utc};

use athena_core::types::{
    Community, Edge, EdgeType, Entity, EventDraft, EventFilter, EventType, Fact, MetricKind,
    Outcome, Procedure, ProcedureStep, Task, TaskPriority, TaskStatus, Trigger, TriggerKind,
};
use athena_storage::queries::{event_ops, fact_ops, graph_ops, meta_ops, procedure_ops, task_ops};
use athena_storage::StorageEngine;

fn engine() -> StorageEngine {
    StorageEngine::open_in_memory(64).expect("in-memory storage")
}

fn draft(description: &str, session: &str, ts_secs: i64) -> EventDraft {
    EventDraft {
        timestamp: Utc.timestamp_opt(ts_secs, 0).unwrap(),
        session_id: session.to_string(),
        event_type: EventType::Work,
        description: description.to_string(),
        context: Default::default(),
        outcome: Outcome::Success,
    }
}

#[test]
fn migrations_are_idempotent_across_reopens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("athena.db");
    {
        let _first = StorageEngine::open(&path, 64).unwrap();
    }
    // Second open re-runs the migration ledger without error.
    let second = StorageEngine::open(&path, 64).unwrap();
    assert!(!second.is_read_only());
}

#[test]
fn dimension_marker_rejects_changed_dimension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("athena.db");
    {
        let _first = StorageEngine::open(&path, 64).unwrap();
    }
    let err = StorageEngine::open(&path, 128).unwrap_err();
    assert!(err.to_string().contains("re-embed"));
}

#[test]
fn events_are_ordered_by_timestamp_then_id() {
    let engine = engine();
    engine
        .with_writer(|conn| {
            event_ops::insert_event(conn, &draft("b", "s1", 100), "fp-b", 1.0)?;
            event_ops::insert_event(conn, &draft("a", "s1", 50), "fp-a", 1.0)?;
            event_ops::insert_event(conn, &draft("c", "s2", 100), "fp-c", 1.0)?;
            Ok(())
        })
        .unwrap();

    let events = engine
        .with_reader(|conn| {
            event_ops::range_query(
                conn,
                0,
                i64::MAX,
                &EventFilter::default(),
                None,
                100,
            )
        })
        .unwrap();
    let descriptions: Vec<_> = events.iter().map(|e| e.description.as_str()).collect();
    // Same timestamp ties break by id (insertion order).
    assert_eq!(descriptions, vec!["a", "b", "c"]);
}

#[test]
fn range_query_keyset_pagination_returns_each_event_once() {
    let engine = engine();
    engine
        .with_writer(|conn| {
            for i in 0..10 {
                event_ops::insert_event(
                    conn,
                    &draft(&format!("event {i}"), "s1", 100 + i),
                    &format!("fp-{i}"),
                    1.0,
                )?;
            }
            Ok(())
        })
        .unwrap();

    let mut seen = Vec::new();
    let mut after = None;
    loop {
        let page = engine
            .with_reader(|conn| {
                event_ops::range_query(conn, 0, i64::MAX, &EventFilter::default(), after, 3)
            })
            .unwrap();
        if page.is_empty() {
            break;
        }
        let last = page.last().unwrap();
        after = Some((last.timestamp.timestamp_micros(), last.id));
        seen.extend(page.into_iter().map(|e| e.id));
    }
    assert_eq!(seen.len(), 10);
    let mut sorted = seen.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), 10, "every event exactly once");
}

#[test]
fn archived_events_leave_live_log_and_round_trip() {
    let engine = engine();
    let id = engine
        .with_writer(|conn| event_ops::insert_event(conn, &draft("old work", "s1", 10), "fp", 0.8))
        .unwrap();

    let archived = engine
        .with_writer(|conn| event_ops::archive_events(conn, &[id]))
        .unwrap();
    assert_eq!(archived, 1);

    let live = engine
        .with_reader(|conn| {
            event_ops::range_query(conn, 0, i64::MAX, &EventFilter::default(), None, 10)
        })
        .unwrap();
    assert!(live.is_empty());

    let restored = engine
        .with_reader(|conn| event_ops::load_archived(conn, id))
        .unwrap()
        .expect("archived event restorable");
    assert_eq!(restored.description, "old work");
    assert_eq!(restored.novelty, 0.8);
}

#[test]
fn fact_fts_search_finds_by_token() {
    let engine = engine();
    let fact = Fact::new("Redis is an in-memory key-value store", "infra");
    engine.with_writer(|conn| fact_ops::insert_fact(conn, &fact)).unwrap();

    let hits = engine
        .with_reader(|conn| fact_ops::fts_search(conn, "key value cache", 10))
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, fact.id);
    assert!(hits[0].1 > 0.0, "relevance is positive, higher-better");
}

#[test]
fn purge_removes_fact_fts_and_embedding() {
    let engine = engine();
    let mut fact = Fact::new("stale knowledge", "misc");
    fact.confidence = 0.02.into();
    fact.created_at = Utc::now() - Duration::days(10);
    engine
        .with_writer(|conn| {
            fact_ops::insert_fact(conn, &fact)?;
            fact_ops::store_embedding(conn, &fact.id, &[0.1; 64])
        })
        .unwrap();

    let removed = engine
        .with_writer(|conn| {
            fact_ops::purge_facts(conn, 0.1, Utc::now() - Duration::days(7))
        })
        .unwrap();
    assert_eq!(removed, vec![fact.id.clone()]);

    let hits = engine
        .with_reader(|conn| fact_ops::fts_search(conn, "stale", 10))
        .unwrap();
    assert!(hits.is_empty());
    let embeddings = engine.with_reader(fact_ops::all_embeddings).unwrap();
    assert!(embeddings.is_empty());
}

#[test]
fn procedure_version_chain_and_rollback() {
    let engine = engine();
    let v1 = Procedure {
        id: "proc-v1".into(),
        name: "deploy".into(),
        category: "ops".into(),
        steps: vec![ProcedureStep::new("build")],
        version: 1,
        predecessor_version: None,
        executions: 4,
        successes: 3,
        context_predicate: String::new(),
        created_at: Utc::now(),
    };
    engine.with_writer(|conn| procedure_ops::save_head(conn, &v1)).unwrap();

    let v2 = Procedure {
        id: "proc-v2".into(),
        version: 2,
        predecessor_version: Some("proc-v1".into()),
        steps: vec![ProcedureStep::new("build"), ProcedureStep::new("push")],
        executions: 0,
        successes: 0,
        ..v1.clone()
    };
    engine.with_writer(|conn| procedure_ops::save_head(conn, &v2)).unwrap();

    // Stale version number is rejected.
    let stale = Procedure { id: "proc-v0".into(), version: 2, ..v1.clone() };
    assert!(engine
        .with_writer(|conn| procedure_ops::save_head(conn, &stale))
        .is_err());

    let rolled = engine
        .with_writer(|conn| procedure_ops::rollback(conn, "proc-v2"))
        .unwrap();
    assert_eq!(rolled.as_deref(), Some("proc-v1"));

    let head = engine
        .with_reader(|conn| procedure_ops::get_by_name(conn, "deploy"))
        .unwrap()
        .unwrap();
    assert_eq!(head.id, "proc-v1");
    assert_eq!(head.executions, 4, "predecessor counters survive rollback");
}

#[test]
fn task_triggers_round_trip() {
    let engine = engine();
    let mut task = Task::new("ship release", TaskPriority::High);
    task.triggers = vec![
        Trigger { kind: TriggerKind::Time, predicate: "2026-01-01T00:00:00Z".into() },
        Trigger { kind: TriggerKind::Event, predicate: "type:milestone".into() },
    ];
    engine.with_writer(|conn| task_ops::insert_task(conn, &task)).unwrap();

    let loaded = engine
        .with_reader(|conn| task_ops::get_task(conn, &task.id))
        .unwrap()
        .unwrap();
    assert_eq!(loaded.triggers.len(), 2);
    assert_eq!(loaded.status, TaskStatus::Pending);

    let timed = engine
        .with_reader(|conn| task_ops::tasks_with_trigger_kind(conn, TriggerKind::Time))
        .unwrap();
    assert_eq!(timed.len(), 1);
}

#[test]
fn edges_require_existing_entities() {
    let engine = engine();
    let a = Entity::new("service", "api");
    let b = Entity::new("service", "db");
    engine
        .with_writer(|conn| {
            graph_ops::upsert_entity(conn, &a)?;
            graph_ops::upsert_entity(conn, &b)
        })
        .unwrap();

    let ok_edge = Edge {
        source_id: a.id.clone(),
        target_id: b.id.clone(),
        edge_type: EdgeType::DependsOn,
        strength: 0.9,
        context: None,
    };
    engine.with_writer(|conn| graph_ops::upsert_edge(conn, &ok_edge)).unwrap();

    let dangling = Edge { target_id: "missing".into(), ..ok_edge };
    assert!(engine
        .with_writer(|conn| graph_ops::upsert_edge(conn, &dangling))
        .is_err());
}

#[test]
fn community_replacement_is_per_level() {
    let engine = engine();
    let a = Entity::new("module", "parser");
    engine.with_writer(|conn| graph_ops::upsert_entity(conn, &a)).unwrap();

    let community = Community {
        id: "c0".into(),
        members: [a.id.clone()].into_iter().collect(),
        level: 0,
    };
    engine
        .with_writer(|conn| graph_ops::replace_communities(conn, 0, &[community.clone()]))
        .unwrap();
    engine
        .with_writer(|conn| graph_ops::replace_communities(conn, 0, &[community.clone()]))
        .unwrap();

    let at_level = engine
        .with_reader(|conn| graph_ops::communities_at_level(conn, 0))
        .unwrap();
    assert_eq!(at_level.len(), 1, "replacement, not accumulation");
}

#[test]
fn meta_summary_aggregates_by_metric() {
    let engine = engine();
    let now = Utc::now();
    engine
        .with_writer(|conn| {
            meta_ops::record(conn, "facts", "infra", MetricKind::CompressionRatio, 0.2, now)?;
            meta_ops::record(conn, "facts", "infra", MetricKind::CompressionRatio, 0.4, now)?;
            meta_ops::record(conn, "facts", "infra", MetricKind::ConsistencyScore, 1.0, now)
        })
        .unwrap();

    let summaries = engine
        .with_reader(|conn| meta_ops::summary(conn, Some("facts"), Some("infra"), None))
        .unwrap();
    assert_eq!(summaries.len(), 2);
    let compression = summaries
        .iter()
        .find(|s| s.metric == MetricKind::CompressionRatio)
        .unwrap();
    assert_eq!(compression.count, 2);
    assert!((compression.mean - 0.3).abs() < 1e-9);
    assert!((compression.last - 0.4).abs() < 1e-9);
}
