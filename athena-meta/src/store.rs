//! The meta store engine.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use athena_core::deadline::Deadline;
use athena_core::errors::{AthenaError, AthenaResult};
use athena_core::traits::{LayerQuery, LayerStore, ScoredItem};
use athena_core::types::meta::MetricSummary;
use athena_core::types::MetricKind;
use athena_storage::queries::meta_ops;
use athena_storage::StorageEngine;

pub struct MetaStore {
    storage: Arc<StorageEngine>,
}

impl MetaStore {
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    pub fn record(
        &self,
        layer: &str,
        domain: &str,
        metric: MetricKind,
        value: f64,
    ) -> AthenaResult<()> {
        self.storage
            .with_writer(|conn| meta_ops::record(conn, layer, domain, metric, value, Utc::now()))
    }

    pub fn summary(
        &self,
        layer: Option<&str>,
        domain: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> AthenaResult<Vec<MetricSummary>> {
        self.storage
            .with_reader(|conn| meta_ops::summary(conn, layer, domain, since))
    }

    /// Sum of a metric for a layer since a cutoff (e.g. slow-path calls).
    pub fn sum_since(
        &self,
        layer: &str,
        metric: MetricKind,
        since: DateTime<Utc>,
    ) -> AthenaResult<f64> {
        self.storage
            .with_reader(|conn| meta_ops::sum_since(conn, layer, metric, since))
    }
}

impl LayerStore for MetaStore {
    fn layer_name(&self) -> &'static str {
        "meta"
    }

    /// Metric summaries whose metric name matches a query token, scored by
    /// match fraction. Meta answers "how confident/quality of" intents.
    fn search(&self, query: &LayerQuery, deadline: Deadline) -> AthenaResult<Vec<ScoredItem>> {
        if deadline.expired() {
            return Err(AthenaError::Timeout { operation: "meta.search" });
        }
        let text = query.text.to_lowercase();
        let summaries = self.summary(None, query.domain.as_deref(), None)?;

        let mut items: Vec<ScoredItem> = summaries
            .into_iter()
            .map(|s| {
                let name = s.metric.as_str().replace('_', " ");
                let score = if text.contains(&name)
                    || name.split(' ').any(|w| text.contains(w))
                {
                    1.0
                } else {
                    0.25
                };
                ScoredItem {
                    id: s.metric.as_str().to_string(),
                    layer: "meta".into(),
                    score,
                    payload: serde_json::to_value(&s).unwrap_or_default(),
                }
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
        let layer = payload
            .get("layer")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AthenaError::invalid("layer", "required string"))?;
        let metric_str = payload
            .get("metric")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AthenaError::invalid("metric", "required string"))?;
        let metric = MetricKind::parse(metric_str)
            .ok_or_else(|| AthenaError::invalid("metric", format!("unknown metric '{metric_str}'")))?;
        let value = payload
            .get("value")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| AthenaError::invalid("value", "required number"))?;
        let domain = payload.get("domain").and_then(|v| v.as_str()).unwrap_or("");
        self.record(layer, domain, metric, value)?;
        Ok(metric_str.to_string())
    }

    fn delete(&self, _id: &str) -> AthenaResult<()> {
        Err(AthenaError::invalid("operation", "meta metrics are append-only"))
    }

    fn enumerate(&self, _offset: usize, _limit: usize) -> AthenaResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn count(&self) -> AthenaResult<u64> {
        self.storage.with_reader(meta_ops::count)
    }
}
