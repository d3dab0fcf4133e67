//! # athena-index
//!
//! Approximate nearest-neighbour index over fact embeddings. IVF-flat with
//! seeded k-means partitioning: below the flat-scan limit every query scans
//! exhaustively (exact); above it, queries probe the nearest inverted lists.
//! Deterministic for a fixed seed. Derived structure: cold start rebuilds
//! from the fact store's persisted embeddings.

mod kmeans;

use std::collections::HashMap;
use std::sync::RwLock;

use rayon::prelude::*;
use tracing::{debug, info};

use athena_core::constants::ANN_FLAT_SCAN_LIMIT;
use athena_core::errors::{AthenaError, AthenaResult};

/// How many upserts/deletes may accumulate before partitions are rebuilt.
const PARTITION_STALENESS_LIMIT: usize = 512;

struct Partitions {
    centroids: Vec<Vec<f32>>,
    /// Inverted lists of vector ids, parallel to `centroids`.
    lists: Vec<Vec<String>>,
}

struct IndexInner {
    /// Unit-normalized vectors keyed by id.
    vectors: HashMap<String, Vec<f32>>,
    partitions: Option<Partitions>,
    stale_ops: usize,
}

/// Shared ANN index. Interior writer lock; reads take the shared lock and
/// never block each other.
pub struct EmbeddingIndex {
    inner: RwLock<IndexInner>,
    dimensions: usize,
    seed: u64,
    target_recall: f64,
}

impl EmbeddingIndex {
    pub fn new(dimensions: usize, seed: u64, target_recall: f64) -> Self {
        Self {
            inner: RwLock::new(IndexInner {
                vectors: HashMap::new(),
                partitions: None,
                stale_ops: 0,
            }),
            dimensions,
            seed,
            target_recall: target_recall.clamp(0.0, 1.0),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.vectors.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace a vector. Rejects dimension mismatches.
    pub fn upsert(&self, id: &str, vector: &[f32]) -> AthenaResult<()> {
        if vector.len() != self.dimensions {
            return Err(AthenaError::invalid(
                "vector",
                format!("expected {} dimensions, got {}", self.dimensions, vector.len()),
            ));
        }
        let normalized = normalize(vector);
        let mut inner = self.write_lock()?;
        inner.vectors.insert(id.to_string(), normalized);
        inner.stale_ops += 1;
        maybe_repartition(&mut inner, self.seed);
        Ok(())
    }

    pub fn delete(&self, id: &str) -> AthenaResult<()> {
        let mut inner = self.write_lock()?;
        inner.vectors.remove(id);
        inner.stale_ops += 1;
        maybe_repartition(&mut inner, self.seed);
        Ok(())
    }

    /// k nearest ids by cosine similarity, best first. Deterministic:
    /// ties in similarity break on the lower id.
    pub fn knn(&self, query: &[f32], k: usize) -> AthenaResult<Vec<(String, f64)>> {
        if query.len() != self.dimensions {
            return Err(AthenaError::invalid(
                "query",
                format!("expected {} dimensions, got {}", self.dimensions, query.len()),
            ));
        }
        let inner = self
            .inner
            .read()
            .map_err(|e| AthenaError::Internal(format!("index lock poisoned: {e}")))?;
        if inner.vectors.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query = normalize(query);

        let candidates: Vec<(&String, &Vec<f32>)> = match &inner.partitions {
            Some(partitions) if inner.vectors.len() > ANN_FLAT_SCAN_LIMIT => {
                let nprobe = self.nprobe(partitions.centroids.len());
                let probe = kmeans::nearest_centroids(&query, &partitions.centroids, nprobe);
                let mut out = Vec::new();
                for list_idx in probe {
                    for id in &partitions.lists[list_idx] {
                        if let Some(v) = inner.vectors.get(id) {
                            out.push((id, v));
                        }
                    }
                }
                out
            }
            _ => inner.vectors.iter().collect(),
        };

        let mut scored: Vec<(String, f64)> = candidates
            .par_iter()
            .map(|(id, v)| ((*id).clone(), dot(&query, v)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// The stored (normalized) vector for an id, if present.
    pub fn vector(&self, id: &str) -> Option<Vec<f32>> {
        self.inner.read().ok()?.vectors.get(id).cloned()
    }

    /// Rebuild from persisted `(id, vector)` rows, replacing all state.
    pub fn rebuild_from(&self, rows: &[(String, Vec<f32>)]) -> AthenaResult<usize> {
        let mut inner = self.write_lock()?;
        inner.vectors.clear();
        for (id, vector) in rows {
            if vector.len() != self.dimensions {
                debug!(id, "skipping vector with stale dimensionality");
                continue;
            }
            inner.vectors.insert(id.clone(), normalize(vector));
        }
        inner.partitions = None;
        inner.stale_ops = usize::MAX; // Force repartition when large enough.
        maybe_repartition(&mut inner, self.seed);
        info!(count = inner.vectors.len(), "rebuilt embedding index");
        Ok(inner.vectors.len())
    }

    fn nprobe(&self, nlist: usize) -> usize {
        // Higher target recall probes more lists; 1.0 degenerates to exact.
        let fraction = (self.target_recall * self.target_recall).max(0.05);
        ((nlist as f64 * fraction).ceil() as usize).clamp(1, nlist)
    }

    fn write_lock(&self) -> AthenaResult<std::sync::RwLockWriteGuard<'_, IndexInner>> {
        self.inner
            .write()
            .map_err(|e| AthenaError::Internal(format!("index lock poisoned: {e}")))
    }
}

/// Repartition once enough mutations accumulated and the corpus is past the
/// flat-scan limit. Sorted id order keeps k-means input stable.
fn maybe_repartition(inner: &mut IndexInner, seed: u64) {
    if inner.vectors.len() <= ANN_FLAT_SCAN_LIMIT {
        inner.partitions = None;
        inner.stale_ops = 0;
        return;
    }
    if inner.partitions.is_some() && inner.stale_ops < PARTITION_STALENESS_LIMIT {
        return;
    }

    let mut ids: Vec<&String> = inner.vectors.keys().collect();
    ids.sort_unstable();
    let points: Vec<Vec<f32>> = ids.iter().map(|id| inner.vectors[*id].clone()).collect();

    let nlist = ((points.len() as f64).sqrt().ceil() as usize).clamp(1, 256);
    let centroids = kmeans::kmeans(&points, nlist, seed, 10);

    let mut lists: Vec<Vec<String>> = vec![Vec::new(); centroids.len()];
    for (id, point) in ids.iter().zip(points.iter()) {
        let c = kmeans::nearest_centroid(point, &centroids);
        lists[c].push((*id).clone());
    }

    inner.partitions = Some(Partitions { centroids, lists });
    inner.stale_ops = 0;
}

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(i: usize, dims: usize) -> Vec<f32> {
        let mut v = vec![0.0; dims];
        v[i % dims] = 1.0;
        v
    }

    #[test]
    fn knn_returns_most_similar_first() {
        let index = EmbeddingIndex::new(4, 7, 0.9);
        index.upsert("x", &[1.0, 0.0, 0.0, 0.0]).unwrap();
        index.upsert("y", &[0.0, 1.0, 0.0, 0.0]).unwrap();
        index.upsert("near-x", &[0.9, 0.1, 0.0, 0.0]).unwrap();

        let hits = index.knn(&[1.0, 0.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].0, "x");
        assert_eq!(hits[1].0, "near-x");
    }

    #[test]
    fn knn_is_deterministic_on_ties() {
        let index = EmbeddingIndex::new(4, 7, 0.9);
        index.upsert("b", &[1.0, 0.0, 0.0, 0.0]).unwrap();
        index.upsert("a", &[1.0, 0.0, 0.0, 0.0]).unwrap();
        let hits = index.knn(&[1.0, 0.0, 0.0, 0.0], 2).unwrap();
        // Equal similarity: lower id first.
        assert_eq!(hits[0].0, "a");
        assert_eq!(hits[1].0, "b");
    }

    #[test]
    fn delete_evicts_vector() {
        let index = EmbeddingIndex::new(4, 7, 0.9);
        index.upsert("gone", &unit(0, 4)).unwrap();
        index.delete("gone").unwrap();
        assert!(index.knn(&unit(0, 4), 1).unwrap().is_empty());
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let index = EmbeddingIndex::new(4, 7, 0.9);
        assert!(index.upsert("bad", &[1.0, 0.0]).is_err());
        assert!(index.knn(&[1.0, 0.0], 1).is_err());
    }

    #[test]
    fn rebuild_replaces_state() {
        let index = EmbeddingIndex::new(4, 7, 0.9);
        index.upsert("old", &unit(0, 4)).unwrap();
        let rows = vec![("new".to_string(), unit(1, 4))];
        let count = index.rebuild_from(&rows).unwrap();
        assert_eq!(count, 1);
        assert!(index.knn(&unit(0, 4), 10).unwrap().iter().all(|(id, _)| id != "old"));
    }
}
