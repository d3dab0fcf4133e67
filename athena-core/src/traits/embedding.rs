use crate::errors::AthenaResult;

/// The opaque embedding collaborator: `embed(texts) → vectors of fixed D`.
///
/// Implementations must return unit-comparable vectors of exactly
/// `dimensions()` floats. Availability is advisory; callers degrade to
/// lexical-only ranking when a provider reports or becomes unavailable.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> AthenaResult<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> AthenaResult<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize;

    fn name(&self) -> &str;

    fn is_available(&self) -> bool {
        true
    }
}
