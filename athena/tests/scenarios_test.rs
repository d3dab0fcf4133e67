//! End-to-end scenarios through the operation surface: dedup, hybrid
//! ranking, consolidation fast/slow paths, degradation, purge, router
//! determinism, pagination.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;

use athena::{Athena, DenyAllRunner, Providers};
use athena_core::config::AthenaConfig;
use athena_core::deadline::Deadline;
use athena_core::envelope::Status;
use athena_core::errors::AthenaResult;
use athena_core::traits::{
    LlmValidator, ValidationRequest, ValidationResponse, Verdict,
};
use athena_embeddings::HashedTfIdf;

const DIMS: usize = 256;

struct CountingValidator {
    calls: Arc<AtomicUsize>,
    verdict: Verdict,
}

impl LlmValidator for CountingValidator {
    fn validate(&self, _request: &ValidationRequest) -> AthenaResult<ValidationResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ValidationResponse {
            verdict: self.verdict,
            refined_summary: None,
            confidence: 0.8,
            rationale: "test".into(),
        })
    }
}

fn instance() -> (Athena, Arc<AtomicUsize>) {
    instance_with_verdict(Verdict::Valid)
}

fn instance_with_verdict(verdict: Verdict) -> (Athena, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let athena = Athena::in_memory(
        AthenaConfig { embedding_dimension: DIMS, ..Default::default() },
        Providers {
            embedder: Arc::new(HashedTfIdf::new(DIMS)),
            validator: Arc::new(CountingValidator { calls: Arc::clone(&calls), verdict }),
            runner: Arc::new(DenyAllRunner),
        },
    )
    .unwrap();
    (athena, calls)
}

fn record(athena: &Athena, ts: &str, session: &str, event_type: &str, description: &str) -> serde_json::Value {
    let envelope = athena.dispatch(
        "episodic",
        "record",
        &json!({
            "description": description,
            "session_id": session,
            "event_type": event_type,
            "timestamp": ts,
            "outcome": "success",
        }),
        Deadline::none(),
    );
    assert_eq!(envelope.status, Status::Ok, "record failed: {:?}", envelope.error);
    envelope.data
}

// --- S1: dedup -------------------------------------------------------------

#[test]
fn s1_duplicate_event_inside_bucket_yields_one_row() {
    let (athena, _) = instance();

    let first = athena.dispatch(
        "episodic",
        "record",
        &json!({
            "description": "deploy staging",
            "session_id": "s1",
            "event_type": "work",
            "timestamp": "1970-01-01T00:16:40Z", // ts=1000
            "context": {"file": "deploy.sh", "line": 12},
        }),
        Deadline::none(),
    );
    assert_eq!(first.data["event_id"], 1);

    let second = athena.dispatch(
        "episodic",
        "record",
        &json!({
            "description": "deploy staging",
            "session_id": "s1",
            "event_type": "work",
            "timestamp": "1970-01-01T00:16:43Z", // ts=1003, same 5s bucket
            "context": {"file": "deploy.sh", "line": 12},
        }),
        Deadline::none(),
    );
    assert_eq!(second.data["duplicate"], true);
    assert_eq!(second.data["existing_id"], 1);

    let timeline = athena.dispatch(
        "episodic",
        "timeline",
        &json!({"from": "1970-01-01T00:00:00Z", "to": "1970-01-02T00:00:00Z"}),
        Deadline::none(),
    );
    assert_eq!(timeline.data["events"].as_array().unwrap().len(), 1);
}

// --- S2: hybrid ranking ----------------------------------------------------

#[test]
fn s2_hybrid_ranking_prefers_redis_for_key_value_query() {
    let (athena, _) = instance();
    for (content, _) in [
        ("Redis is an in-memory key-value store", "a"),
        ("Postgres supports JSONB columns for document-like workloads", "b"),
    ] {
        let envelope = athena.dispatch(
            "memory",
            "remember",
            &json!({"content": content, "domain": "infra", "confidence": 0.9}),
            Deadline::none(),
        );
        assert_eq!(envelope.status, Status::Ok);
    }

    let hybrid = athena.dispatch(
        "memory",
        "recall",
        &json!({"query": "key value cache", "k": 2, "vector_weight": 0.7, "lexical_weight": 0.3}),
        Deadline::none(),
    );
    let hits = hybrid.data["hits"].as_array().unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits[0]["fact"]["content"].as_str().unwrap().contains("Redis"));

    // Exchange the weights: lexical-only still ranks Redis first.
    let lexical = athena.dispatch(
        "memory",
        "recall",
        &json!({"query": "key value cache", "k": 2, "vector_weight": 0.0, "lexical_weight": 1.0}),
        Deadline::none(),
    );
    let lexical_hits = lexical.data["hits"].as_array().unwrap();
    assert!(lexical_hits[0]["fact"]["content"].as_str().unwrap().contains("Redis"));
}

// --- S3: consolidation fast path -------------------------------------------

#[test]
fn s3_fast_path_consolidation_without_llm() {
    let (athena, llm_calls) = instance();
    let at = |secs: i64| {
        chrono::TimeZone::timestamp_opt(&chrono::Utc, secs, 0)
            .unwrap()
            .to_rfc3339()
    };
    // Five alternating pairs inside two minutes, one session.
    for i in 0..5i64 {
        record(&athena, &at(1000 + i * 24), "s1", "work", "write test");
        record(&athena, &at(1012 + i * 24), "s1", "work", "run tests");
    }

    let envelope = athena.dispatch(
        "consolidation",
        "run",
        &json!({
            "window_start": "1970-01-01T00:00:00Z",
            "window_end": "1970-01-01T01:00:00Z",
            "strategy": "balanced",
        }),
        Deadline::none(),
    );
    assert_eq!(envelope.status, Status::Ok, "{:?}", envelope.error);
    let report = &envelope.data["report"];
    assert!(report["facts_written"].as_u64().unwrap() >= 1);
    assert_eq!(report["slow_path_calls"], 0);
    assert_eq!(llm_calls.load(Ordering::SeqCst), 0, "no LLM calls on the fast path");

    // The distilled pattern fact is recallable with confidence >= 0.6.
    let recall = athena.dispatch(
        "memory",
        "recall",
        &json!({"query": "pattern write test run tests", "k": 5}),
        Deadline::none(),
    );
    let hits = recall.data["hits"].as_array().unwrap();
    let pattern = hits
        .iter()
        .find(|h| h["fact"]["content"].as_str().unwrap().starts_with("pattern: write test"))
        .expect("pattern fact recallable");
    assert!(pattern["fact"]["confidence"].as_f64().unwrap() >= 0.6);

    // And a procedure with the two steps at the prior effectiveness.
    let procedures = athena.dispatch("procedural", "list", &json!({}), Deadline::none());
    let list = procedures.data["procedures"].as_array().unwrap();
    let two_step = list
        .iter()
        .find(|p| {
            let steps = p["procedure"]["steps"].as_array().unwrap();
            steps.len() == 2
                && steps[0]["action"] == "write test"
                && steps[1]["action"] == "run tests"
        })
        .expect("write-test/run-tests procedure");
    assert!((two_step["effectiveness"].as_f64().unwrap() - 0.5).abs() < 1e-9);
}

// --- S4: consolidation slow path -------------------------------------------

fn ingest_incoherent_window(athena: &Athena) {
    let filler = [
        "inspect dns resolver cache",
        "rotate access credentials",
        "annotate quarterly roadmap",
        "profile allocator behaviour",
    ];
    for round in 0..4usize {
        let base_minute = round * 20;
        record(
            athena,
            &format!("1970-01-01T01:{:02}:00Z", base_minute),
            &format!("s{round}"),
            "work",
            "sync upstream fork",
        );
        record(
            athena,
            &format!("1970-01-01T01:{:02}:10Z", base_minute),
            &format!("s{round}"),
            "work",
            "rebuild container image",
        );
        record(
            athena,
            &format!("1970-01-01T01:{:02}:20Z", base_minute),
            &format!("s{round}"),
            "work",
            filler[round],
        );
    }
}

#[test]
fn s4_uncertain_candidates_route_to_validator() {
    let (athena, llm_calls) = instance();
    ingest_incoherent_window(&athena);

    let envelope = athena.dispatch(
        "consolidation",
        "run",
        &json!({
            "window_start": "1970-01-01T01:00:00Z",
            "window_end": "1970-01-01T02:00:00Z",
        }),
        Deadline::none(),
    );
    assert_eq!(envelope.status, Status::Ok, "{:?}", envelope.error);
    let report = &envelope.data["report"];
    assert!(report["slow_path_calls"].as_u64().unwrap() >= 1);
    assert!(llm_calls.load(Ordering::SeqCst) >= 1);

    // Meta records the slow-path calls.
    let stats = athena.dispatch(
        "agent",
        "stats",
        &json!({"layer": "consolidation"}),
        Deadline::none(),
    );
    let metrics = stats.data["metrics"].as_array().unwrap();
    let slow = metrics
        .iter()
        .find(|m| m["metric"] == "slow_path_calls")
        .expect("slow_path_calls metric");
    assert!(slow["last"].as_f64().unwrap() >= 1.0);
}

#[test]
fn s4_invalid_verdict_writes_no_fact() {
    let (athena, llm_calls) = instance_with_verdict(Verdict::Invalid);
    ingest_incoherent_window(&athena);

    let envelope = athena.dispatch(
        "consolidation",
        "run",
        &json!({
            "window_start": "1970-01-01T01:00:00Z",
            "window_end": "1970-01-01T02:00:00Z",
        }),
        Deadline::none(),
    );
    assert_eq!(envelope.status, Status::Ok);
    assert!(llm_calls.load(Ordering::SeqCst) >= 1);

    let recall = athena.dispatch(
        "memory",
        "recall",
        &json!({"query": "sync upstream fork rebuild container image", "k": 10}),
        Deadline::none(),
    );
    let hits = recall.data["hits"].as_array().unwrap();
    assert!(
        hits.iter().all(|h| {
            !h["fact"]["content"]
                .as_str()
                .unwrap()
                .starts_with("pattern: sync upstream fork")
        }),
        "invalid candidates leave no fact behind"
    );
}

// --- S5: degradation -------------------------------------------------------

#[test]
fn s5_lexical_only_search_when_embeddings_disabled() {
    let (athena, _) = instance();
    athena.dispatch(
        "memory",
        "remember",
        &json!({"content": "Redis is an in-memory key-value store", "domain": "infra", "confidence": 0.9}),
        Deadline::none(),
    );

    athena.embedder().degradation().disable();

    let envelope = athena.dispatch(
        "memory",
        "recall",
        &json!({"query": "redis", "k": 5}),
        Deadline::none(),
    );
    assert_eq!(envelope.status, Status::Ok);
    assert!(envelope.metadata.vector_disabled, "vector_disabled flag set");
    let hits = envelope.data["hits"].as_array().unwrap();
    assert!(hits[0]["fact"]["content"].as_str().unwrap().contains("Redis"));
}

// --- S6: purge -------------------------------------------------------------

#[test]
fn s6_purge_removes_fact_and_its_vector() {
    let (athena, _) = instance();
    let remembered = athena.dispatch(
        "memory",
        "remember",
        &json!({"content": "obsolete assumption about caching", "domain": "infra", "confidence": 0.02}),
        Deadline::none(),
    );
    let fact_id = remembered.data["fact_id"].as_str().unwrap().to_string();

    let purged = athena.dispatch(
        "memory",
        "purge",
        &json!({"confidence_threshold": 0.1, "grace_days": 0}),
        Deadline::none(),
    );
    assert_eq!(purged.data["count_removed"], 1);

    let recall = athena.dispatch(
        "memory",
        "recall",
        &json!({"query": "obsolete assumption caching", "k": 10}),
        Deadline::none(),
    );
    let hits = recall.data["hits"].as_array().unwrap();
    assert!(hits.iter().all(|h| h["fact"]["id"] != fact_id.as_str()));
}

// --- router determinism & envelope contracts -------------------------------

#[test]
fn routed_query_is_deterministic_on_unchanged_state() {
    let (athena, _) = instance();
    for content in [
        "Redis is an in-memory key-value store",
        "Postgres supports JSONB columns",
        "The deploy pipeline tags releases before pushing",
    ] {
        athena.dispatch(
            "memory",
            "remember",
            &json!({"content": content, "domain": "infra"}),
            Deadline::none(),
        );
    }

    let run = || {
        let envelope = athena.dispatch(
            "rag",
            "query",
            &json!({"query": "redis postgres deploy", "k": 10}),
            Deadline::none(),
        );
        envelope.data["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["id"].as_str().unwrap().to_string())
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn unknown_operation_and_invalid_input_envelopes() {
    let (athena, _) = instance();

    let unknown = athena.dispatch("memory", "transmogrify", &json!({}), Deadline::none());
    assert_eq!(unknown.status, Status::Error);
    assert_eq!(
        serde_json::to_value(&unknown.error.unwrap().kind).unwrap(),
        json!("unknown_operation")
    );

    let invalid = athena.dispatch("memory", "recall", &json!({}), Deadline::none());
    assert_eq!(invalid.status, Status::Error);
    let error = invalid.error.unwrap();
    assert!(error.message.contains("query"));
}

#[test]
fn consolidation_rate_limit_enforced() {
    let (athena, _) = instance();
    let input = json!({
        "window_start": "1970-01-01T00:00:00Z",
        "window_end": "1970-01-01T00:00:01Z",
    });
    let mut limited = false;
    for _ in 0..6 {
        let envelope = athena.dispatch("consolidation", "run", &input, Deadline::none());
        if let Some(error) = envelope.error {
            assert!(error.message.contains("rate limited"));
            limited = true;
        }
    }
    assert!(limited, "sixth consolidation call within the hour is limited");
}

#[test]
fn timeline_pagination_round_trips_every_event_once() {
    let (athena, _) = instance();
    for i in 0..12i64 {
        record(
            &athena,
            &format!("1970-01-01T03:00:{:02}Z", i * 4),
            "s-page",
            "milestone",
            &format!("milestone number {i} reached"),
        );
    }

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let mut input = json!({
            "from": "1970-01-01T03:00:00Z",
            "to": "1970-01-01T04:00:00Z",
            "limit": 5,
        });
        if let Some(c) = &cursor {
            input["cursor"] = json!(c);
        }
        let envelope = athena.dispatch("episodic", "timeline", &input, Deadline::none());
        assert_eq!(envelope.status, Status::Ok);
        let events = envelope.data["events"].as_array().unwrap().clone();
        seen.extend(events.iter().map(|e| e["id"].as_u64().unwrap()));

        let pagination = envelope.pagination.unwrap();
        assert_eq!(pagination.total, 12);
        match pagination.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(seen.len(), 12);
    let mut deduped = seen.clone();
    deduped.sort_unstable();
    deduped.dedup();
    assert_eq!(deduped.len(), 12, "each event exactly once");
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "documented order");
}

#[test]
fn code_family_reports_missing_runner_as_dependency_unavailable() {
    let (athena, _) = instance();
    let envelope = athena.dispatch(
        "code",
        "run_snippet",
        &json!({"code": "print(len(views))"}),
        Deadline::none(),
    );
    assert_eq!(envelope.status, Status::Error);
    assert_eq!(
        serde_json::to_value(&envelope.error.unwrap().kind).unwrap(),
        json!("dependency_unavailable")
    );
}
