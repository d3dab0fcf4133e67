use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which quality statistic a meta record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// bytes(facts derived) / bytes(source events) for a window.
    CompressionRatio,
    /// Estimated fraction of source events reconstructible from facts.
    RecallAccuracy,
    /// 1 − contradicting_fact_pairs / total_fact_pairs in a domain.
    ConsistencyScore,
    /// Per-domain expertise, saturating in consolidated volume.
    Expertise,
    /// Operational load indicator.
    CognitiveLoad,
    /// Count of slow-path validator calls in a consolidation run.
    SlowPathCalls,
    /// Provider degradation marker (1.0 = degraded during the window).
    Degradation,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CompressionRatio => "compression_ratio",
            Self::RecallAccuracy => "recall_accuracy",
            Self::ConsistencyScore => "consistency_score",
            Self::Expertise => "expertise",
            Self::CognitiveLoad => "cognitive_load",
            Self::SlowPathCalls => "slow_path_calls",
            Self::Degradation => "degradation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "compression_ratio" => Some(Self::CompressionRatio),
            "recall_accuracy" => Some(Self::RecallAccuracy),
            "consistency_score" => Some(Self::ConsistencyScore),
            "expertise" => Some(Self::Expertise),
            "cognitive_load" => Some(Self::CognitiveLoad),
            "slow_path_calls" => Some(Self::SlowPathCalls),
            "degradation" => Some(Self::Degradation),
            _ => None,
        }
    }
}

/// One per-layer, per-domain metric observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaRecord {
    pub layer: String,
    pub domain: String,
    pub metric: MetricKind,
    pub value: f64,
    pub updated_at: DateTime<Utc>,
}

/// Aggregation over meta records for a (layer, domain, since) selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub metric: MetricKind,
    pub count: u64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub last: f64,
    pub last_updated_at: DateTime<Utc>,
}
