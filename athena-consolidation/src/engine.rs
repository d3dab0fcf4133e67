//! ConsolidationEngine: window locks, strategy resolution, the slow-path
//! loop with budget and deferral, ordered write-out, archival, and meta
//! reporting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use athena_core::config::{AthenaConfig, StrategyProfile};
use athena_core::deadline::Deadline;
use athena_core::errors::{AthenaError, AthenaResult};
use athena_core::traits::{ValidationRequest, Verdict};
use athena_core::types::{ConsolidationReport, EventType, MetricKind, Pattern};
use athena_embeddings::CachedEmbedder;
use athena_graph::GraphStore;
use athena_ingest::EventLog;
use athena_meta::quality;
use athena_meta::MetaStore;
use athena_planning::ProcedureStore;
use athena_semantic::FactStore;
use athena_storage::queries::event_ops;
use athena_storage::StorageEngine;

use crate::pipeline::{self, StageSettings};
use crate::validation::CachedValidator;
use crate::window::WindowLocks;

/// One consolidation request.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub strategy: Option<StrategyProfile>,
    /// Restrict to events of one type (the domain filter).
    pub domain_filter: Option<EventType>,
}

pub struct ConsolidationEngine {
    storage: Arc<StorageEngine>,
    event_log: EventLog,
    facts: Arc<FactStore>,
    graph: Arc<GraphStore>,
    procedures: Arc<ProcedureStore>,
    meta: Arc<MetaStore>,
    embedder: Arc<CachedEmbedder>,
    validator: CachedValidator,
    config: AthenaConfig,
    locks: WindowLocks,
    /// Slow-path candidates that exceeded the budget or hit an unavailable
    /// provider. Retried at the start of the next run, never silently
    /// dropped. Process state; a restart re-derives them from the still
    /// unarchived events.
    deferred: Mutex<Vec<Pattern>>,
}

impl ConsolidationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<StorageEngine>,
        facts: Arc<FactStore>,
        graph: Arc<GraphStore>,
        procedures: Arc<ProcedureStore>,
        meta: Arc<MetaStore>,
        embedder: Arc<CachedEmbedder>,
        validator: CachedValidator,
        config: AthenaConfig,
    ) -> Self {
        Self {
            event_log: EventLog::new(Arc::clone(&storage)),
            storage,
            facts,
            graph,
            procedures,
            meta,
            embedder,
            validator,
            config,
            locks: WindowLocks::new(),
            deferred: Mutex::new(Vec::new()),
        }
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.lock().map(|d| d.len()).unwrap_or(0)
    }

    /// Seed the verdict cache (test/replay path).
    pub fn validator(&self) -> &CachedValidator {
        &self.validator
    }

    /// Run the dual-process pipeline over a window. Overlapping concurrent
    /// runs return `AlreadyRunning`; a deadline mid-run returns the partial
    /// report with `partial = true` and keeps everything already written.
    pub fn run(&self, request: &RunRequest, deadline: Deadline) -> AthenaResult<ConsolidationReport> {
        let start_us = request.window_start.timestamp_micros();
        let end_us = request.window_end.timestamp_micros();
        if start_us > end_us {
            return Err(AthenaError::invalid("window", "start must not exceed end"));
        }
        let _guard = self.locks.acquire(start_us, end_us)?;

        let strategy = request.strategy.unwrap_or(self.config.consolidator_strategy);
        let settings = StageSettings {
            min_support: match strategy {
                StrategyProfile::Speed => 3,
                _ => 2,
            },
            slow_path_threshold: if request.strategy.is_some() {
                strategy.slow_path_threshold()
            } else {
                self.config.slow_path_threshold()
            },
            uses_slow_path: strategy.uses_slow_path(),
            llm_budget: self.config.consolidator_llm_budget,
        };

        let mut report = ConsolidationReport {
            window_start_us: start_us,
            window_end_us: end_us,
            ..Default::default()
        };

        // Read the window.
        let filter = athena_core::types::EventFilter {
            event_type: request.domain_filter,
            ..Default::default()
        };
        let events = self.storage.with_reader(|conn| {
            event_ops::range_query(conn, start_us, end_us, &filter, None, usize::MAX)
        })?;
        report.events_considered = events.len();
        if events.is_empty() && self.deferred_count() == 0 {
            return Ok(report);
        }

        // Fast half: cluster, extract, score, gate.
        let fast = pipeline::run_fast(&events, self.embedder.as_ref(), settings);
        report.clusters = fast.clusters.clusters.len();
        report.vector_degraded = fast.clusters.vector_degraded;

        let mut accepted = fast.accepted;
        let mut uncertain = fast.uncertain;
        report.candidates = accepted.len() + uncertain.len();

        // Deferred candidates from earlier runs re-enter ahead of new ones.
        if let Ok(mut deferred) = self.deferred.lock() {
            if !deferred.is_empty() {
                debug!(count = deferred.len(), "retrying deferred candidates");
                let mut retry: Vec<Pattern> = deferred.drain(..).collect();
                retry.append(&mut uncertain);
                uncertain = retry;
            }
        }

        // Slow path.
        let index_by_id: HashMap<u64, usize> =
            events.iter().enumerate().map(|(i, e)| (e.id, i)).collect();
        let mut slow_accepted =
            self.run_slow_path(&mut report, uncertain, settings, &events, &index_by_id, deadline);
        accepted.append(&mut slow_accepted);
        report.accepted_fast = accepted.len() - report.accepted_slow;

        // Write-out: C2 → C5 → C3, then meta (C6) and archival.
        let outcome = pipeline::writeout::write_patterns(
            &accepted,
            &self.facts,
            &self.graph,
            &self.procedures,
            &mut report,
        )?;

        let consumed: Vec<u64> = outcome.consumed_event_ids.iter().copied().collect();
        if !consumed.is_empty() {
            let event_bytes = self
                .storage
                .with_reader(|conn| event_ops::events_byte_size(conn, &consumed))?;
            let fact_bytes: u64 = accepted.iter().map(|p| p.summary.len() as u64).sum();
            let descriptions: Vec<String> = consumed
                .iter()
                .filter_map(|id| index_by_id.get(id).map(|&i| events[i].description.clone()))
                .collect();
            let contents: Vec<String> = accepted.iter().map(|p| p.summary.clone()).collect();

            self.record_quality(
                &mut report,
                quality::compression_ratio(fact_bytes, event_bytes),
                quality::lexical_recall(&descriptions, &contents),
            )?;

            report.events_archived = self.event_log.archive(&consumed)?;
        } else {
            self.record_quality(&mut report, 1.0, 1.0)?;
        }

        info!(
            window_start = %request.window_start,
            window_end = %request.window_end,
            facts = report.facts_written,
            deferred = report.deferred,
            partial = report.partial,
            "consolidation run finished"
        );
        Ok(report)
    }

    /// Validate uncertain candidates under the per-run budget. Returns the
    /// accepted ones; overflow and provider failures defer.
    fn run_slow_path(
        &self,
        report: &mut ConsolidationReport,
        uncertain: Vec<Pattern>,
        settings: StageSettings,
        events: &[athena_core::types::Event],
        index_by_id: &HashMap<u64, usize>,
        deadline: Deadline,
    ) -> Vec<Pattern> {
        let mut accepted = Vec::new();
        let mut queue: std::collections::VecDeque<Pattern> = uncertain.into();

        while let Some(mut pattern) = queue.pop_front() {
            if !settings.uses_slow_path {
                self.defer(report, pattern);
                continue;
            }
            if deadline.expired() {
                report.partial = true;
                self.defer(report, pattern);
                continue;
            }
            if report.slow_path_calls >= settings.llm_budget {
                self.defer(report, pattern);
                continue;
            }

            let request = validation_request(&pattern);
            match self.validator.validate(&request) {
                Ok(response) => {
                    report.slow_path_calls += 1;
                    match response.verdict {
                        Verdict::Valid => {
                            pattern.slow_path_confidence = Some(response.confidence);
                            report.accepted_slow += 1;
                            accepted.push(pattern);
                        }
                        Verdict::Invalid => {
                            report.rejected += 1;
                        }
                        Verdict::NeedsRefinement => {
                            if pattern.refinement_round >= 2 {
                                report.rejected += 1;
                                continue;
                            }
                            if let Some(refined) = response.refined_summary {
                                pattern.summary = refined;
                            }
                            pattern.refinement_round += 1;
                            pattern.slow_path_confidence = Some(response.confidence);
                            // Re-enter uncertainty scoring with the refined
                            // content, then the gate.
                            let clusters = pipeline::ClusterOutput {
                                clusters: Vec::new(),
                                embeddings: Vec::new(),
                                vector_degraded: true,
                            };
                            pipeline::score_uncertainty(
                                &mut pattern,
                                events,
                                &clusters,
                                index_by_id,
                            );
                            if pattern.uncertainty < settings.slow_path_threshold {
                                report.accepted_slow += 1;
                                accepted.push(pattern);
                            } else {
                                queue.push_back(pattern);
                            }
                        }
                    }
                }
                Err(AthenaError::DependencyUnavailable { .. }) => {
                    // Deferred, not dropped, not auto-accepted.
                    warn!("validator unavailable, deferring candidate");
                    self.defer(report, pattern);
                }
                Err(AthenaError::RateLimited { .. }) => {
                    self.defer(report, pattern);
                }
                Err(e) => {
                    warn!(error = %e, "validator error, deferring candidate");
                    self.defer(report, pattern);
                }
            }
        }
        accepted
    }

    fn defer(&self, report: &mut ConsolidationReport, pattern: Pattern) {
        report.deferred += 1;
        if let Ok(mut deferred) = self.deferred.lock() {
            // One copy per summary is enough.
            if !deferred.iter().any(|p| p.summary == pattern.summary) {
                deferred.push(pattern);
            } else {
                report.deferred -= 1;
            }
        }
    }

    fn record_quality(
        &self,
        report: &mut ConsolidationReport,
        compression: f64,
        recall: f64,
    ) -> AthenaResult<()> {
        self.meta
            .record("consolidation", "", MetricKind::CompressionRatio, compression)?;
        self.meta
            .record("consolidation", "", MetricKind::RecallAccuracy, recall)?;
        self.meta.record(
            "consolidation",
            "",
            MetricKind::SlowPathCalls,
            report.slow_path_calls as f64,
        )?;
        if report.vector_degraded {
            self.meta
                .record("embeddings", "", MetricKind::Degradation, 1.0)?;
        }

        // Consistency and expertise per fact domain.
        for (domain, count, mean_confidence) in self.facts.domain_stats()? {
            let facts = self.facts.facts_by_domain(&domain)?;
            self.meta.record(
                "facts",
                &domain,
                MetricKind::ConsistencyScore,
                quality::consistency_score(&facts),
            )?;
            self.meta.record(
                "facts",
                &domain,
                MetricKind::Expertise,
                quality::expertise(count, mean_confidence),
            )?;
        }
        Ok(())
    }
}

/// The structured prompt sent to the validator. Its text is the cache key,
/// so identical candidates in identical windows reuse verdicts.
fn validation_request(pattern: &Pattern) -> ValidationRequest {
    let support: Vec<u64> = pattern.support.iter().copied().collect();
    ValidationRequest {
        prompt: format!(
            "Assess whether this mined pattern is a durable, correct statement.\n\
             summary: {}\ntemplate: {}\nsupport_events: {:?}\nuncertainty: {:.3}\n\
             Respond with verdict (valid | invalid | needs_refinement), an optional \
             refined summary, and a confidence in [0,1].",
            pattern.summary,
            pattern.template.join(" -> "),
            support,
            pattern.uncertainty,
        ),
        schema: serde_json::json!({
            "type": "object",
            "properties": {
                "verdict": {"enum": ["valid", "invalid", "needs_refinement"]},
                "refined_summary": {"type": "string"},
                "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0}
            },
            "required": ["verdict", "confidence"]
        }),
    }
}
