//! Runtime configuration, deserializable from TOML.

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::errors::{AthenaError, AthenaResult};

/// Consolidator strategy profile. Sets the uncertainty gate and slow-path
/// budget; `minimal` skips the slow path entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyProfile {
    #[default]
    Balanced,
    Speed,
    Quality,
    Minimal,
}

impl StrategyProfile {
    /// Uncertainty threshold above which candidates go to the slow path.
    /// Higher for speed (fewer LLM calls), lower for quality (more).
    pub fn slow_path_threshold(self) -> f64 {
        match self {
            Self::Balanced => constants::DEFAULT_SLOW_PATH_THRESHOLD,
            Self::Speed => 0.65,
            Self::Quality => 0.35,
            Self::Minimal => constants::DEFAULT_SLOW_PATH_THRESHOLD,
        }
    }

    /// Whether uncertain candidates are validated at all. `minimal` defers
    /// everything above the gate.
    pub fn uses_slow_path(self) -> bool {
        !matches!(self, Self::Minimal)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "balanced" => Some(Self::Balanced),
            "speed" => Some(Self::Speed),
            "quality" => Some(Self::Quality),
            "minimal" => Some(Self::Minimal),
            _ => None,
        }
    }
}

/// All recognised configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AthenaConfig {
    /// Fixed embedding dimensionality. Changing it requires a full re-embed;
    /// the value is recorded in a migrations marker at first open.
    pub embedding_dimension: usize,
    /// Hybrid ranking mix.
    pub vector_weight: f64,
    pub lexical_weight: f64,
    /// Write-pipeline dedup.
    pub dedup_bucket_seconds: u64,
    pub dedup_window_seconds: u64,
    /// Consolidator gating.
    pub uncertainty_threshold_slow: f64,
    pub consolidator_llm_budget: usize,
    pub consolidator_strategy: StrategyProfile,
    /// Fact purge.
    pub purge_confidence_threshold: f64,
    pub purge_grace_days: i64,
    /// ANN tuning.
    pub ann_index_target_recall: f64,
    /// Seed for all seeded randomness (ANN partitioning, community sweeps).
    pub seed: u64,
    /// Reinforcement step size.
    pub reinforcement_k: f64,
}

impl Default for AthenaConfig {
    fn default() -> Self {
        Self {
            embedding_dimension: 384,
            vector_weight: constants::DEFAULT_VECTOR_WEIGHT,
            lexical_weight: constants::DEFAULT_LEXICAL_WEIGHT,
            dedup_bucket_seconds: constants::DEFAULT_DEDUP_BUCKET_SECS,
            dedup_window_seconds: constants::DEFAULT_DEDUP_WINDOW_SECS,
            uncertainty_threshold_slow: constants::DEFAULT_SLOW_PATH_THRESHOLD,
            consolidator_llm_budget: constants::DEFAULT_LLM_BUDGET_PER_RUN,
            consolidator_strategy: StrategyProfile::Balanced,
            purge_confidence_threshold: constants::DEFAULT_PURGE_CONFIDENCE,
            purge_grace_days: constants::DEFAULT_PURGE_GRACE_DAYS,
            ann_index_target_recall: constants::DEFAULT_ANN_TARGET_RECALL,
            seed: constants::DEFAULT_SEED,
            reinforcement_k: constants::DEFAULT_REINFORCEMENT_K,
        }
    }
}

impl AthenaConfig {
    /// Parse from a TOML string and validate ranges.
    pub fn from_toml_str(s: &str) -> AthenaResult<Self> {
        let config: Self = toml::from_str(s)
            .map_err(|e| AthenaError::invalid("config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The effective slow-path gate: explicit threshold unless the strategy
    /// overrides it away from the default.
    pub fn slow_path_threshold(&self) -> f64 {
        if (self.uncertainty_threshold_slow - constants::DEFAULT_SLOW_PATH_THRESHOLD).abs()
            > f64::EPSILON
        {
            self.uncertainty_threshold_slow
        } else {
            self.consolidator_strategy.slow_path_threshold()
        }
    }

    pub fn validate(&self) -> AthenaResult<()> {
        if self.embedding_dimension == 0 {
            return Err(AthenaError::invalid("embedding_dimension", "must be > 0"));
        }
        for (name, v) in [
            ("vector_weight", self.vector_weight),
            ("lexical_weight", self.lexical_weight),
            ("uncertainty_threshold_slow", self.uncertainty_threshold_slow),
            ("purge_confidence_threshold", self.purge_confidence_threshold),
            ("ann_index_target_recall", self.ann_index_target_recall),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(AthenaError::invalid(name, "must be in [0, 1]"));
            }
        }
        if self.reinforcement_k <= 0.0 {
            return Err(AthenaError::invalid("reinforcement_k", "must be > 0"));
        }
        if self.purge_grace_days < 0 {
            return Err(AthenaError::invalid("purge_grace_days", "must be >= 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        AthenaConfig::default().validate().unwrap();
    }

    #[test]
    fn toml_roundtrip_with_overrides() {
        let config = AthenaConfig::from_toml_str(
            r#"
            embedding_dimension = 128
            vector_weight = 0.5
            lexical_weight = 0.5
            consolidator_strategy = "quality"
            "#,
        )
        .unwrap();
        assert_eq!(config.embedding_dimension, 128);
        assert_eq!(config.consolidator_strategy, StrategyProfile::Quality);
        assert!((config.slow_path_threshold() - 0.35).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_weight_is_rejected() {
        let err = AthenaConfig::from_toml_str("vector_weight = 1.5").unwrap_err();
        assert!(matches!(err, AthenaError::InvalidInput { .. }));
    }

    #[test]
    fn explicit_threshold_overrides_strategy() {
        let config = AthenaConfig::from_toml_str(
            "uncertainty_threshold_slow = 0.4\nconsolidator_strategy = \"speed\"",
        )
        .unwrap();
        assert!((config.slow_path_threshold() - 0.4).abs() < 1e-9);
    }
}
