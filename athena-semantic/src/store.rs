//! The fact store engine: storage rows + FTS + the shared ANN index.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info};

use athena_core::config::AthenaConfig;
use athena_core::deadline::Deadline;
use athena_core::errors::{AthenaError, AthenaResult};
use athena_core::traits::{EmbeddingProvider, LayerQuery, LayerStore, ScoredItem};
use athena_core::types::{Confidence, Fact};
use athena_embeddings::{cosine_similarity, CachedEmbedder};
use athena_index::EmbeddingIndex;
use athena_storage::queries::fact_ops;
use athena_storage::StorageEngine;

use crate::search::{
    merge_candidates, normalise_lexical, sort_hits, SearchHit, SearchOutcome, SearchWeights,
};

/// How many candidates each source contributes before merging.
const CANDIDATES_PER_SOURCE: usize = 64;

pub struct FactStore {
    storage: Arc<StorageEngine>,
    index: Arc<EmbeddingIndex>,
    embedder: Arc<CachedEmbedder>,
    reinforcement_k: f64,
}

impl FactStore {
    pub fn new(
        storage: Arc<StorageEngine>,
        index: Arc<EmbeddingIndex>,
        embedder: Arc<CachedEmbedder>,
        config: &AthenaConfig,
    ) -> Self {
        Self {
            storage,
            index,
            embedder,
            reinforcement_k: config.reinforcement_k,
        }
    }

    /// Rebuild the derived ANN index from persisted embeddings (cold start).
    pub fn rebuild_index(&self) -> AthenaResult<usize> {
        let rows = self.storage.with_reader(fact_ops::all_embeddings)?;
        self.index.rebuild_from(&rows)
    }

    /// Store a fact. Existing content (by hash) reinforces instead of
    /// duplicating and returns the existing id.
    pub fn store_fact(
        &self,
        content: &str,
        domain: &str,
        source_event_ids: &BTreeSet<u64>,
        initial_confidence: f64,
    ) -> AthenaResult<String> {
        let content_hash = Fact::compute_content_hash(content);
        if let Some(existing) = self
            .storage
            .with_reader(|conn| fact_ops::get_fact_by_hash(conn, &content_hash))?
        {
            debug!(id = %existing.id, "store_fact hit existing content hash");
            self.reinforce(&existing.id, 1, 0)?;
            return Ok(existing.id);
        }

        let mut fact = Fact::new(content, domain);
        fact.confidence = Confidence::new(initial_confidence);
        fact.source_event_ids = source_event_ids.clone();
        let fact_id = fact.id.clone();

        self.storage.with_writer(|conn| fact_ops::insert_fact(conn, &fact))?;

        // Embedding failure degrades to lexical-only retrieval for this fact;
        // the row is already durable either way.
        match self.embedder.embed(content) {
            Ok(vector) => {
                self.storage
                    .with_writer(|conn| fact_ops::store_embedding(conn, &fact_id, &vector))?;
                self.index.upsert(&fact_id, &vector)?;
            }
            Err(e) => {
                debug!(error = %e, id = %fact_id, "stored fact without embedding");
            }
        }

        Ok(fact_id)
    }

    /// Lookup by exact content (hash), used by consolidation idempotency.
    pub fn find_by_content(&self, content: &str) -> AthenaResult<Option<Fact>> {
        let hash = Fact::compute_content_hash(content);
        self.storage
            .with_reader(|conn| fact_ops::get_fact_by_hash(conn, &hash))
    }

    pub fn get(&self, id: &str) -> AthenaResult<Fact> {
        self.storage
            .with_reader(|conn| fact_ops::get_fact(conn, id))?
            .ok_or_else(|| AthenaError::not_found("fact", id))
    }

    /// Hybrid search per the documented ranking contract.
    pub fn search(
        &self,
        query: &str,
        k: usize,
        weights: SearchWeights,
        deadline: Deadline,
    ) -> AthenaResult<SearchOutcome> {
        if deadline.expired() {
            return Err(AthenaError::Timeout { operation: "facts.search" });
        }

        // Lexical candidates always; vector candidates when the provider is up.
        let lexical_hits = self
            .storage
            .with_reader(|conn| fact_ops::fts_search(conn, query, CANDIDATES_PER_SOURCE))?;

        let (query_vector, vector_disabled) = if self.embedder.is_available() {
            match self.embedder.embed(query) {
                Ok(v) => (Some(v), false),
                Err(_) => (None, true),
            }
        } else {
            (None, true)
        };

        let vector_hits = match &query_vector {
            Some(qv) => self.index.knn(qv, CANDIDATES_PER_SOURCE)?,
            None => Vec::new(),
        };

        let mut signals = merge_candidates(&vector_hits, &lexical_hits);
        normalise_lexical(&mut signals);

        let mut hits = Vec::with_capacity(signals.len());
        for (id, signal) in &signals {
            if deadline.expired() {
                break; // Partial results, flagged by the caller's envelope.
            }
            let Some(fact) = self.storage.with_reader(|conn| fact_ops::get_fact(conn, id))? else {
                continue; // Purged between candidate sourcing and fetch.
            };

            // A lexical-only candidate still gets its true cosine when its
            // vector is in the index.
            let vector_score = match (signal.vector, &query_vector) {
                (Some(v), _) => v,
                (None, Some(qv)) => self
                    .index
                    .vector(id)
                    .map(|stored| cosine_similarity(qv, &stored))
                    .unwrap_or(0.0),
                (None, None) => 0.0,
            };
            let lexical_score = signal.lexical.unwrap_or(0.0);

            let score = if vector_disabled {
                // Degraded: lexical-only ranking with full weight.
                lexical_score
            } else {
                weights.vector * vector_score + weights.lexical * lexical_score
            };

            hits.push(SearchHit { fact, score, vector_score, lexical_score });
        }

        sort_hits(&mut hits);
        hits.truncate(k);

        // Retrieval feedback for the tie-break chain.
        let now = Utc::now();
        for hit in &hits {
            let _ = self
                .storage
                .with_writer(|conn| fact_ops::touch_fact(conn, &hit.fact.id, now));
        }

        Ok(SearchOutcome { hits, vector_disabled })
    }

    /// Apply the logistic reinforcement rule and persist counters.
    pub fn reinforce(
        &self,
        fact_id: &str,
        support_delta: u32,
        contradict_delta: u32,
    ) -> AthenaResult<Confidence> {
        let fact = self.get(fact_id)?;
        let updated = fact
            .confidence
            .reinforced(support_delta, contradict_delta, self.reinforcement_k);
        self.storage.with_writer(|conn| {
            fact_ops::update_reinforcement(
                conn,
                fact_id,
                updated,
                fact.support_count + support_delta,
                fact.contradiction_count + contradict_delta,
            )
        })?;
        Ok(updated)
    }

    /// Remove facts below the confidence threshold and older than the grace
    /// period; their vectors leave the index with them. Procedure and task
    /// references are left dangling by contract.
    pub fn purge(&self, confidence_threshold: f64, grace_days: i64) -> AthenaResult<usize> {
        let cutoff = Utc::now() - Duration::days(grace_days);
        let removed = self
            .storage
            .with_writer(|conn| fact_ops::purge_facts(conn, confidence_threshold, cutoff))?;
        for id in &removed {
            self.index.delete(id)?;
        }
        if !removed.is_empty() {
            info!(count = removed.len(), "purged low-confidence facts");
        }
        Ok(removed.len())
    }

    /// Per-domain `(count, mean_confidence)` pairs for expertise tracking.
    pub fn domain_stats(&self) -> AthenaResult<Vec<(String, u64, f64)>> {
        self.storage.with_reader(fact_ops::domain_stats)
    }

    pub fn facts_by_domain(&self, domain: &str) -> AthenaResult<Vec<Fact>> {
        self.storage.with_reader(|conn| fact_ops::facts_by_domain(conn, domain))
    }
}

impl LayerStore for FactStore {
    fn layer_name(&self) -> &'static str {
        "facts"
    }

    fn search(&self, query: &LayerQuery, deadline: Deadline) -> AthenaResult<Vec<ScoredItem>> {
        let outcome = FactStore::search(self, &query.text, query.k, SearchWeights::default(), deadline)?;
        Ok(outcome
            .hits
            .into_iter()
            .filter(|h| {
                query
                    .domain
                    .as_deref()
                    .map(|d| h.fact.domain == d)
                    .unwrap_or(true)
            })
            .map(|h| ScoredItem {
                id: h.fact.id.clone(),
                layer: "facts".into(),
                score: h.score,
                payload: serde_json::to_value(&h.fact).unwrap_or_default(),
            })
            .collect())
    }

    fn upsert(&self, payload: &serde_json::Value) -> AthenaResult<String> {
        let content = payload
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AthenaError::invalid("content", "required string"))?;
        let domain = payload
            .get("domain")
            .and_then(|v| v.as_str())
            .unwrap_or("general");
        let confidence = payload
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.5);
        let sources = payload
            .get("source_event_ids")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|x| x.as_u64()).collect())
            .unwrap_or_default();
        self.store_fact(content, domain, &sources, confidence)
    }

    fn delete(&self, id: &str) -> AthenaResult<()> {
        self.storage.with_writer(|conn| fact_ops::delete_fact(conn, id))?;
        self.index.delete(id)
    }

    fn enumerate(&self, offset: usize, limit: usize) -> AthenaResult<Vec<String>> {
        self.storage
            .with_reader(|conn| fact_ops::enumerate_facts(conn, offset, limit))
    }

    fn count(&self) -> AthenaResult<u64> {
        self.storage.with_reader(fact_ops::count_facts)
    }
}
