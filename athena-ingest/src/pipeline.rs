//! The write pipeline gating insertions into the event log.
//!
//! record_event is atomic: fingerprint → dedup-window check → novelty gate →
//! append, all on the writer lane, so a failure mid-pipeline leaves no
//! partial state. Duplicate detection never fails open.

use std::sync::Arc;

use tracing::debug;

use athena_core::config::AthenaConfig;
use athena_core::constants::LOW_VALUE_NOVELTY_FLOOR;
use athena_core::deadline::Deadline;
use athena_core::errors::{AthenaError, AthenaResult};
use athena_core::types::{EventDraft, EventType, Outcome};
use athena_storage::queries::event_ops;
use athena_storage::StorageEngine;

use crate::fingerprint;
use crate::novelty::NoveltyRing;

/// Outcome of `record_event`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded(u64),
    Duplicate { existing_id: u64 },
    Rejected { reason: String },
}

impl RecordOutcome {
    /// The event id this outcome points at, for recorded and duplicate.
    pub fn event_id(&self) -> Option<u64> {
        match self {
            Self::Recorded(id) => Some(*id),
            Self::Duplicate { existing_id } => Some(*existing_id),
            Self::Rejected { .. } => None,
        }
    }
}

pub struct WritePipeline {
    storage: Arc<StorageEngine>,
    ring: NoveltyRing,
    dedup_bucket_secs: u64,
    dedup_window_secs: u64,
}

impl WritePipeline {
    pub fn new(storage: Arc<StorageEngine>, config: &AthenaConfig) -> Self {
        let pipeline = Self {
            storage,
            ring: NoveltyRing::new(),
            dedup_bucket_secs: config.dedup_bucket_seconds,
            dedup_window_secs: config.dedup_window_seconds,
        };
        pipeline.warm_ring();
        pipeline
    }

    /// Warm the novelty ring from the tail of the persisted log.
    fn warm_ring(&self) {
        let warm = self
            .storage
            .with_reader(|conn| event_ops::recent_descriptions(conn, 1024));
        if let Ok(descriptions) = warm {
            self.ring.warm(descriptions);
        }
    }

    /// Validate, fingerprint, dedup, novelty-gate, and append one draft.
    pub fn record_event(&self, draft: &EventDraft, deadline: Deadline) -> AthenaResult<RecordOutcome> {
        if deadline.expired() {
            // Ingest is atomic: nothing was written yet, report cancellation.
            return Err(AthenaError::Timeout { operation: "record_event" });
        }
        validate_draft(draft)?;

        let fingerprint = fingerprint::compute(draft, self.dedup_bucket_secs);
        let window_start_us =
            draft.timestamp.timestamp_micros() - (self.dedup_window_secs as i64) * 1_000_000;

        // Dedup check and append run on the same writer lane, so a racing
        // duplicate cannot slip between them.
        let fingerprint_for_insert = fingerprint.clone();
        let outcome = self.storage.with_writer(move |conn| {
            if let Some(existing_id) =
                event_ops::find_fingerprint_since(conn, &fingerprint_for_insert, window_start_us)?
            {
                return Ok(RecordOutcome::Duplicate { existing_id });
            }

            let novelty = self.ring.score_and_push(&draft.description);
            if is_low_value(draft) && novelty < LOW_VALUE_NOVELTY_FLOOR {
                return Ok(RecordOutcome::Rejected {
                    reason: format!("low-value event with novelty {novelty:.2} below floor"),
                });
            }

            let id = event_ops::insert_event(conn, draft, &fingerprint_for_insert, novelty)?;
            Ok(RecordOutcome::Recorded(id))
        })?;

        debug!(?outcome, "record_event");
        Ok(outcome)
    }

    /// Bulk ingest: one transaction, all-or-nothing. Duplicates inside the
    /// batch collapse onto the first occurrence.
    pub fn record_batch(
        &self,
        drafts: &[EventDraft],
        deadline: Deadline,
    ) -> AthenaResult<Vec<RecordOutcome>> {
        if deadline.expired() {
            return Err(AthenaError::Timeout { operation: "record_batch" });
        }
        for draft in drafts {
            validate_draft(draft)?;
        }

        // Per-input plan, resolved to final outcomes once ids are assigned.
        enum Plan {
            Insert(usize),
            Existing(u64),
            SameBatch(usize),
            Rejected(String),
        }

        self.storage.with_writer(|conn| {
            let mut plans = Vec::with_capacity(drafts.len());
            let mut to_insert: Vec<(athena_core::types::EventDraft, String, f32)> = Vec::new();
            let mut batch_fingerprints: Vec<(String, usize)> = Vec::new();

            for draft in drafts {
                let fp = fingerprint::compute(draft, self.dedup_bucket_secs);
                let window_start_us = draft.timestamp.timestamp_micros()
                    - (self.dedup_window_secs as i64) * 1_000_000;

                if let Some(existing_id) =
                    event_ops::find_fingerprint_since(conn, &fp, window_start_us)?
                {
                    plans.push(Plan::Existing(existing_id));
                    continue;
                }
                if let Some((_, slot)) = batch_fingerprints.iter().find(|(f, _)| *f == fp) {
                    plans.push(Plan::SameBatch(*slot));
                    continue;
                }

                let novelty = self.ring.score_and_push(&draft.description);
                if is_low_value(draft) && novelty < LOW_VALUE_NOVELTY_FLOOR {
                    plans.push(Plan::Rejected(format!(
                        "low-value event with novelty {novelty:.2} below floor"
                    )));
                    continue;
                }

                batch_fingerprints.push((fp.clone(), to_insert.len()));
                plans.push(Plan::Insert(to_insert.len()));
                to_insert.push((draft.clone(), fp, novelty));
            }

            let ids = event_ops::insert_events_bulk(conn, &to_insert)?;
            let outcomes = plans
                .into_iter()
                .map(|plan| match plan {
                    Plan::Insert(slot) => RecordOutcome::Recorded(ids[slot]),
                    Plan::Existing(id) => RecordOutcome::Duplicate { existing_id: id },
                    Plan::SameBatch(slot) => RecordOutcome::Duplicate { existing_id: ids[slot] },
                    Plan::Rejected(reason) => RecordOutcome::Rejected { reason },
                })
                .collect();
            Ok(outcomes)
        })
    }
}

/// Low-value heuristic: short, outcome-less routine work events must clear
/// the novelty floor to be recorded.
fn is_low_value(draft: &EventDraft) -> bool {
    draft.event_type == EventType::Work
        && draft.description.len() < 16
        && draft.outcome == Outcome::Unknown
}

fn validate_draft(draft: &EventDraft) -> AthenaResult<()> {
    if draft.description.trim().is_empty() {
        return Err(AthenaError::invalid("description", "must not be empty"));
    }
    if draft.session_id.trim().is_empty() {
        return Err(AthenaError::invalid("session_id", "must not be empty"));
    }
    Ok(())
}
