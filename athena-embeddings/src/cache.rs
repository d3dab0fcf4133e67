//! Content-hash embedding cache wrapping any provider.

use std::sync::Arc;

use moka::sync::Cache;

use athena_core::errors::AthenaResult;
use athena_core::traits::EmbeddingProvider;

use crate::degradation::DegradationState;

/// Wraps a provider with a moka cache keyed by blake3(content). Batch calls
/// deduplicate texts and only forward cache misses to the provider.
pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    cache: Cache<String, Arc<Vec<f32>>>,
    degradation: Arc<DegradationState>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, capacity: u64) -> Self {
        Self {
            inner,
            cache: Cache::new(capacity),
            degradation: Arc::new(DegradationState::new()),
        }
    }

    /// Shared degradation latch, consulted by search and consolidation.
    pub fn degradation(&self) -> Arc<DegradationState> {
        Arc::clone(&self.degradation)
    }

    fn cache_key(text: &str) -> String {
        blake3::hash(text.as_bytes()).to_hex().to_string()
    }

    fn embed_uncached(&self, text: &str) -> AthenaResult<Arc<Vec<f32>>> {
        match self.inner.embed(text) {
            Ok(v) => {
                self.degradation.mark_available();
                Ok(Arc::new(v))
            }
            Err(e) => {
                self.degradation.mark_failed(&e.to_string());
                Err(e)
            }
        }
    }
}

impl EmbeddingProvider for CachedEmbedder {
    fn embed(&self, text: &str) -> AthenaResult<Vec<f32>> {
        let key = Self::cache_key(text);
        if let Some(hit) = self.cache.get(&key) {
            return Ok((*hit).clone());
        }
        let vector = self.embed_uncached(text)?;
        self.cache.insert(key, Arc::clone(&vector));
        Ok((*vector).clone())
    }

    fn embed_batch(&self, texts: &[String]) -> AthenaResult<Vec<Vec<f32>>> {
        let mut out: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut missing: Vec<(usize, String)> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let key = Self::cache_key(text);
            match self.cache.get(&key) {
                Some(hit) => out[i] = Some((*hit).clone()),
                None => missing.push((i, key)),
            }
        }

        if !missing.is_empty() {
            let miss_texts: Vec<String> =
                missing.iter().map(|(i, _)| texts[*i].clone()).collect();
            let vectors = match self.inner.embed_batch(&miss_texts) {
                Ok(v) => {
                    self.degradation.mark_available();
                    v
                }
                Err(e) => {
                    self.degradation.mark_failed(&e.to_string());
                    return Err(e);
                }
            };
            for ((i, key), vector) in missing.into_iter().zip(vectors) {
                self.cache.insert(key, Arc::new(vector.clone()));
                out[i] = Some(vector);
            }
        }

        Ok(out.into_iter().map(|v| v.unwrap_or_default()).collect())
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_available(&self) -> bool {
        self.inner.is_available() && !self.degradation.is_degraded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    impl EmbeddingProvider for CountingProvider {
        fn embed(&self, _text: &str) -> AthenaResult<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0.5; 8])
        }
        fn dimensions(&self) -> usize {
            8
        }
        fn name(&self) -> &str {
            "counting"
        }
    }

    #[test]
    fn repeated_embed_hits_cache() {
        let provider = Arc::new(CountingProvider { calls: AtomicUsize::new(0) });
        let cached = CachedEmbedder::new(provider.clone(), 100);
        cached.embed("same text").unwrap();
        cached.embed("same text").unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn batch_only_forwards_misses() {
        let provider = Arc::new(CountingProvider { calls: AtomicUsize::new(0) });
        let cached = CachedEmbedder::new(provider.clone(), 100);
        cached.embed("a").unwrap();
        let out = cached
            .embed_batch(&["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(out.len(), 2);
        // One direct call for "a", one default-batch call for "b".
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
