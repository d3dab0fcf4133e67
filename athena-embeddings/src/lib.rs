//! # athena-embeddings
//!
//! Plumbing around the opaque embedding collaborator: a content-hash cache,
//! a deterministic hashed TF-IDF fallback for air-gapped and test use, and
//! a degradation latch the search and consolidation paths consult before
//! choosing lexical-only ranking.

pub mod cache;
pub mod degradation;
pub mod fallback;

pub use cache::CachedEmbedder;
pub use degradation::DegradationState;
pub use fallback::HashedTfIdf;

/// Cosine similarity between two vectors; 0.0 when either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0; 4], &[1.0; 4]), 0.0);
    }
}
