//! # athena
//!
//! The root object. Everything mutable and shared (the storage engine,
//! the ANN index, the embedding cache, the validator cache, the rate
//! limiter) is constructed here at start-up and reachable only through
//! this struct; there are no hidden singletons.

mod dispatch;
mod runner;

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use athena_core::config::AthenaConfig;
use athena_core::deadline::Deadline;
use athena_core::envelope::ResultEnvelope;
use athena_core::errors::AthenaResult;
use athena_core::traits::{EmbeddingProvider, LayerStore, LlmValidator, SnippetRunner};
use athena_consolidation::{CachedValidator, ConsolidationEngine};
use athena_embeddings::CachedEmbedder;
use athena_graph::GraphStore;
use athena_index::EmbeddingIndex;
use athena_ingest::{EventLog, WritePipeline};
use athena_meta::MetaStore;
use athena_planning::{ProcedureStore, TaskStore};
use athena_router::{QueryRouter, RateLimiter};
use athena_semantic::FactStore;
use athena_storage::StorageEngine;

pub use athena_core::config::StrategyProfile;
pub use runner::DenyAllRunner;

/// External collaborators injected at start-up.
pub struct Providers {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub validator: Arc<dyn LlmValidator>,
    pub runner: Arc<dyn SnippetRunner>,
}

/// The memory core. One instance per database; construct at start-up,
/// drop at shutdown.
pub struct Athena {
    pub(crate) config: AthenaConfig,
    pub(crate) storage: Arc<StorageEngine>,
    pub(crate) embedder: Arc<CachedEmbedder>,
    pub(crate) event_log: Arc<EventLog>,
    pub(crate) pipeline: WritePipeline,
    pub(crate) facts: Arc<FactStore>,
    pub(crate) graph: Arc<GraphStore>,
    pub(crate) procedures: Arc<ProcedureStore>,
    pub(crate) tasks: Arc<TaskStore>,
    pub(crate) meta: Arc<MetaStore>,
    pub(crate) consolidator: ConsolidationEngine,
    pub(crate) router: QueryRouter,
    pub(crate) limiter: RateLimiter,
    pub(crate) runner: Arc<dyn SnippetRunner>,
}

impl Athena {
    /// Open against a database file.
    pub fn open(path: &Path, config: AthenaConfig, providers: Providers) -> AthenaResult<Self> {
        config.validate()?;
        let storage = Arc::new(StorageEngine::open(path, config.embedding_dimension)?);
        Self::wire(storage, config, providers)
    }

    /// In-memory instance (tests, scratch agents).
    pub fn in_memory(config: AthenaConfig, providers: Providers) -> AthenaResult<Self> {
        config.validate()?;
        let storage = Arc::new(StorageEngine::open_in_memory(config.embedding_dimension)?);
        Self::wire(storage, config, providers)
    }

    fn wire(
        storage: Arc<StorageEngine>,
        config: AthenaConfig,
        providers: Providers,
    ) -> AthenaResult<Self> {
        let embedder = Arc::new(CachedEmbedder::new(providers.embedder, 100_000));
        let index = Arc::new(EmbeddingIndex::new(
            config.embedding_dimension,
            config.seed,
            config.ann_index_target_recall,
        ));

        let facts = Arc::new(FactStore::new(
            Arc::clone(&storage),
            Arc::clone(&index),
            Arc::clone(&embedder),
            &config,
        ));
        // The index is derived; cold start rebuilds it from the fact store.
        let rebuilt = facts.rebuild_index()?;
        info!(vectors = rebuilt, "embedding index ready");

        let graph = Arc::new(GraphStore::new(Arc::clone(&storage), &config));
        let procedures = Arc::new(ProcedureStore::new(Arc::clone(&storage)));
        let tasks = Arc::new(TaskStore::new(Arc::clone(&storage)));
        let meta = Arc::new(MetaStore::new(Arc::clone(&storage)));
        let event_log = Arc::new(EventLog::new(Arc::clone(&storage)));
        let pipeline = WritePipeline::new(Arc::clone(&storage), &config);

        let consolidator = ConsolidationEngine::new(
            Arc::clone(&storage),
            Arc::clone(&facts),
            Arc::clone(&graph),
            Arc::clone(&procedures),
            Arc::clone(&meta),
            Arc::clone(&embedder),
            CachedValidator::new(providers.validator),
            config.clone(),
        );

        // The router sees capabilities only, never concrete store types.
        let layers: Vec<Arc<dyn LayerStore>> = vec![
            Arc::clone(&facts) as Arc<dyn LayerStore>,
            Arc::clone(&event_log) as Arc<dyn LayerStore>,
            Arc::clone(&graph) as Arc<dyn LayerStore>,
            Arc::clone(&procedures) as Arc<dyn LayerStore>,
            Arc::clone(&tasks) as Arc<dyn LayerStore>,
            Arc::clone(&meta) as Arc<dyn LayerStore>,
        ];
        let router = QueryRouter::new(layers);

        Ok(Self {
            config,
            storage,
            embedder,
            event_log,
            pipeline,
            facts,
            graph,
            procedures,
            tasks,
            meta,
            consolidator,
            router,
            limiter: RateLimiter::new(),
            runner: providers.runner,
        })
    }

    /// Execute one named operation. Never panics; every failure becomes an
    /// error envelope.
    pub fn dispatch(
        &self,
        family: &str,
        verb: &str,
        input: &serde_json::Value,
        deadline: Deadline,
    ) -> ResultEnvelope {
        dispatch::dispatch(self, family, verb, input, deadline)
    }

    /// Direct access for embedders (tests, degradation control).
    pub fn embedder(&self) -> &Arc<CachedEmbedder> {
        &self.embedder
    }

    /// Verdict-cache seeding for frozen-mode tests and replay.
    pub fn consolidator(&self) -> &ConsolidationEngine {
        &self.consolidator
    }
}

/// Initialise tracing with the conventional env-filter setup. Call once
/// from the embedding process; tests call it freely (errors ignored).
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}
