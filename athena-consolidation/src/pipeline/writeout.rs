//! Write-out of accepted patterns in the crash-safe cross-store order:
//! facts first, then graph, then procedures, then meta. A crash between
//! stores leaves strictly less, never inconsistent more.

use std::collections::BTreeSet;

use tracing::{debug, info};

use athena_core::constants::PROCEDURE_MIN_STEPS;
use athena_core::errors::AthenaResult;
use athena_core::types::{
    ConsolidationReport, Edge, EdgeType, Entity, Pattern, PatternKind, ProcedureDraft,
    ProcedureStep,
};
use athena_graph::GraphStore;
use athena_planning::ProcedureStore;
use athena_semantic::FactStore;

/// Confidence assigned to a fast-path accept: `0.5 + 0.5·(1−u)`, clamped.
fn fast_confidence(uncertainty: f64) -> f64 {
    (0.5 + 0.5 * (1.0 - uncertainty)).clamp(0.5, 0.95)
}

/// Slow-path accepts blend the gate's view with the validator's.
fn slow_confidence(uncertainty: f64, validator_confidence: f64) -> f64 {
    (0.5 * (1.0 - uncertainty) + 0.5 * validator_confidence).clamp(0.3, 0.95)
}

/// Ids of events whose patterns were written (archival candidates).
pub struct WriteOutcome {
    pub consumed_event_ids: BTreeSet<u64>,
}

/// Write accepted patterns to C2 → C5 → C3 in order, updating the report.
/// Meta (C6) follows in the engine once totals are known.
pub fn write_patterns(
    patterns: &[Pattern],
    facts: &FactStore,
    graph: &GraphStore,
    procedures: &ProcedureStore,
    report: &mut ConsolidationReport,
) -> AthenaResult<WriteOutcome> {
    let mut consumed = BTreeSet::new();

    // Facts (C2). Existing content is left untouched so a re-run over the
    // same window adds nothing.
    for pattern in patterns {
        if facts.find_by_content(&pattern.summary)?.is_some() {
            debug!(summary = %pattern.summary, "fact already present, skipping");
            continue;
        }
        let confidence = match pattern.slow_path_confidence {
            Some(validator_confidence) => slow_confidence(pattern.uncertainty, validator_confidence),
            None => fast_confidence(pattern.uncertainty),
        };
        facts.store_fact(&pattern.summary, &pattern.domain, &pattern.support, confidence)?;
        report.facts_written += 1;
        consumed.extend(pattern.support.iter().copied());
    }

    // Graph (C5): entities and co-occurrence edges.
    for pattern in patterns {
        match pattern.kind {
            PatternKind::CoOccurrence => {
                let names: Vec<&str> = pattern.summary.split(' ').collect();
                // Summary shape is "<a> events co-occur with <b> events".
                let (Some(a), Some(b)) = (names.first(), names.get(4)) else { continue };
                let source = ensure_entity(graph, "event_type", a, report)?;
                let target = ensure_entity(graph, "event_type", b, report)?;
                graph.upsert_edge(&Edge {
                    source_id: source,
                    target_id: target,
                    edge_type: EdgeType::CausallyLeadsTo,
                    strength: pattern.co_occurrence.clamp(0.0, 1.0),
                    context: Some(pattern.summary.clone()),
                })?;
                report.edges_written += 1;
            }
            PatternKind::FrequentSequence => {
                let mut previous: Option<String> = None;
                for action in &pattern.template {
                    let id = ensure_entity(graph, "action", action, report)?;
                    if let Some(source) = previous.take() {
                        graph.upsert_edge(&Edge {
                            source_id: source,
                            target_id: id.clone(),
                            edge_type: EdgeType::CausallyLeadsTo,
                            strength: (pattern.co_occurrence / 8.0).clamp(0.1, 1.0),
                            context: Some(pattern.summary.clone()),
                        })?;
                        report.edges_written += 1;
                    }
                    previous = Some(id);
                }
            }
        }
    }

    // Procedures (C3): action-ordered templates long enough to execute.
    for pattern in patterns {
        if pattern.kind != PatternKind::FrequentSequence
            || pattern.template.len() < PROCEDURE_MIN_STEPS
        {
            continue;
        }
        let name = format!("{} workflow", pattern.template.join(" \u{2192} "));
        if let Some(existing) = procedures.get_by_name(&name)? {
            let same_steps = existing
                .steps
                .iter()
                .map(|s| s.action.as_str())
                .eq(pattern.template.iter().map(|s| s.as_str()));
            if same_steps {
                continue; // Re-run over the same window: nothing new.
            }
        }
        let draft = ProcedureDraft {
            name,
            category: pattern.domain.clone(),
            steps: pattern
                .template
                .iter()
                .map(|action| ProcedureStep::new(action.clone()))
                .collect(),
            context_predicate: pattern.summary.clone(),
            source_event_ids: pattern.support.iter().copied().collect(),
        };
        procedures.save_version(&draft, None)?;
        report.procedures_written += 1;
    }

    info!(
        facts = report.facts_written,
        edges = report.edges_written,
        procedures = report.procedures_written,
        "write-out complete"
    );
    Ok(WriteOutcome { consumed_event_ids: consumed })
}

fn ensure_entity(
    graph: &GraphStore,
    entity_type: &str,
    name: &str,
    report: &mut ConsolidationReport,
) -> AthenaResult<String> {
    let already = graph.find_entity_by_name(name)?;
    let id = graph.upsert_entity(&Entity::new(entity_type, name))?;
    if already.is_none() {
        report.entities_written += 1;
    }
    Ok(id)
}
