//! Seeded k-means for IVF partitioning. Deterministic for a fixed seed:
//! centroid seeding uses an xorshift stream and ties resolve by lowest index.

/// Minimal xorshift64* stream; reproducible across platforms.
pub(crate) struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    pub fn new(seed: u64) -> Self {
        // Zero state would be a fixed point.
        Self { state: seed.max(1) }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    pub fn next_index(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound as u64) as usize
    }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x - *y) as f64;
            d * d
        })
        .sum()
}

/// Index of the nearest centroid; ties break on the lower index.
pub(crate) fn nearest_centroid(point: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_distance(point, c);
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}

/// The `nprobe` nearest centroid indices, closest first, stable order.
pub(crate) fn nearest_centroids(point: &[f32], centroids: &[Vec<f32>], nprobe: usize) -> Vec<usize> {
    let mut scored: Vec<(usize, f64)> = centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, squared_distance(point, c)))
        .collect();
    scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
    scored.into_iter().take(nprobe).map(|(i, _)| i).collect()
}

/// Lloyd's algorithm with seeded initialisation. `points` iteration order is
/// the caller's responsibility to keep stable.
pub(crate) fn kmeans(points: &[Vec<f32>], k: usize, seed: u64, max_iters: usize) -> Vec<Vec<f32>> {
    assert!(!points.is_empty());
    let k = k.min(points.len());
    let dims = points[0].len();

    // Seeded initialisation: k distinct sample indices.
    let mut rng = XorShift64::new(seed);
    let mut chosen: Vec<usize> = Vec::with_capacity(k);
    while chosen.len() < k {
        let idx = rng.next_index(points.len());
        if !chosen.contains(&idx) {
            chosen.push(idx);
        }
    }
    let mut centroids: Vec<Vec<f32>> = chosen.into_iter().map(|i| points[i].clone()).collect();

    for _ in 0..max_iters {
        let mut sums = vec![vec![0.0f64; dims]; k];
        let mut counts = vec![0usize; k];

        for p in points {
            let c = nearest_centroid(p, &centroids);
            counts[c] += 1;
            for (s, v) in sums[c].iter_mut().zip(p.iter()) {
                *s += *v as f64;
            }
        }

        let mut moved = false;
        for (i, centroid) in centroids.iter_mut().enumerate() {
            if counts[i] == 0 {
                continue; // Empty cluster keeps its centroid.
            }
            for (j, value) in centroid.iter_mut().enumerate() {
                let mean = (sums[i][j] / counts[i] as f64) as f32;
                if (mean - *value).abs() > 1e-6 {
                    moved = true;
                }
                *value = mean;
            }
        }
        if !moved {
            break;
        }
    }

    centroids
}
