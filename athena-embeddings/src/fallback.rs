//! Hashed TF-IDF fallback embedding provider.
//!
//! Generates fixed-dimension vectors from term frequency scores hashed into
//! buckets. No external dependencies, so it works in air-gapped environments and
//! gives tests a deterministic provider.

use std::collections::HashMap;

use athena_core::errors::AthenaResult;
use athena_core::traits::EmbeddingProvider;

/// Deterministic dense vectors from hashed term frequencies. Not as
/// semantically rich as neural embeddings, but always available.
pub struct HashedTfIdf {
    dimensions: usize,
}

impl HashedTfIdf {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Hash a term into a bucket index using FNV-1a.
    fn hash_term(term: &str, dims: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h as usize) % dims
    }

    /// Tokenize text into lowercase alphanumeric terms, with a light plural
    /// strip so "test"/"tests" land in the same bucket.
    fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|s| s.len() >= 2)
            .map(|s| {
                let lowered = s.to_lowercase();
                if lowered.len() > 3 && lowered.ends_with('s') && !lowered.ends_with("ss") {
                    lowered[..lowered.len() - 1].to_string()
                } else {
                    lowered
                }
            })
            .collect()
    }

    fn tfidf_vector(&self, text: &str) -> Vec<f32> {
        let tokens = Self::tokenize(text);
        if tokens.is_empty() {
            return vec![0.0; self.dimensions];
        }

        let mut tf: HashMap<String, f32> = HashMap::new();
        for tok in &tokens {
            *tf.entry(tok.clone()).or_default() += 1.0;
        }

        let total = tokens.len() as f32;
        let mut vec = vec![0.0f32; self.dimensions];

        for (term, count) in &tf {
            let freq = count / total;
            // IDF approximation: penalize very short terms (likely stopwords).
            let idf = 1.0 + (term.len() as f32).ln();
            let bucket = Self::hash_term(term, self.dimensions);
            vec[bucket] += freq * idf;
        }

        // L2 normalize.
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }

        vec
    }
}

impl EmbeddingProvider for HashedTfIdf {
    fn embed(&self, text: &str) -> AthenaResult<Vec<f32>> {
        Ok(self.tfidf_vector(text))
    }

    fn embed_batch(&self, texts: &[String]) -> AthenaResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.tfidf_vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hashed-tfidf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_returns_zero_vector() {
        let p = HashedTfIdf::new(128);
        let v = p.embed("").unwrap();
        assert_eq!(v.len(), 128);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn output_is_normalized() {
        let p = HashedTfIdf::new(256);
        let v = p.embed("rust systems programming language").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "expected unit norm, got {norm}");
    }

    #[test]
    fn deterministic() {
        let p = HashedTfIdf::new(256);
        assert_eq!(p.embed("deterministic test").unwrap(), p.embed("deterministic test").unwrap());
    }

    #[test]
    fn similar_texts_have_higher_cosine() {
        let p = HashedTfIdf::new(256);
        let a = p.embed("redis key value store").unwrap();
        let b = p.embed("redis key value cache").unwrap();
        let c = p.embed("postgres jsonb columns").unwrap();

        let cos_ab: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        let cos_ac: f32 = a.iter().zip(&c).map(|(x, y)| x * y).sum();
        assert!(cos_ab > cos_ac);
    }
}
