use serde::{Deserialize, Serialize};

use crate::errors::AthenaResult;

/// Slow-path verdict on a candidate pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Valid,
    Invalid,
    NeedsRefinement,
}

/// A structured prompt for the validator. The prompt string is the cache
/// key material; callers cache responses by its 256-bit hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub prompt: String,
    /// JSON schema the response fields must satisfy.
    pub schema: serde_json::Value,
}

impl ValidationRequest {
    /// Hex digest of the prompt, used as the verdict cache key.
    pub fn prompt_hash(&self) -> String {
        blake3::hash(self.prompt.as_bytes()).to_hex().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub verdict: Verdict,
    /// Refined summary, present when verdict is `needs_refinement`.
    pub refined_summary: Option<String>,
    pub confidence: f64,
    pub rationale: String,
}

/// The opaque LLM collaborator used only during slow-path consolidation.
///
/// Non-determinism is bounded by the verdict cache: within a run the same
/// prompt hash returns the same response. Tests use a frozen wrapper that
/// fails any call that would miss the cache.
pub trait LlmValidator: Send + Sync {
    fn validate(&self, request: &ValidationRequest) -> AthenaResult<ValidationResponse>;

    fn is_available(&self) -> bool {
        true
    }
}
