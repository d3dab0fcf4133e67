//! Novelty scoring against an in-memory ring of recent descriptions.
//!
//! `novelty = 1 − max trigram-Jaccard similarity` to the last N=1024
//! descriptions. The ring is process state; restarts warm it from the tail
//! of the event log.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use athena_core::constants::NOVELTY_RING_SIZE;

pub struct NoveltyRing {
    ring: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl NoveltyRing {
    pub fn new() -> Self {
        Self::with_capacity(NOVELTY_RING_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Warm-start from persisted descriptions, oldest first.
    pub fn warm(&self, descriptions: impl IntoIterator<Item = String>) {
        let mut ring = match self.ring.lock() {
            Ok(r) => r,
            Err(_) => return,
        };
        for d in descriptions {
            if ring.len() == self.capacity {
                ring.pop_front();
            }
            ring.push_back(d);
        }
    }

    /// Score a description's novelty in [0, 1] and remember it.
    pub fn score_and_push(&self, description: &str) -> f32 {
        let grams = trigrams(description);
        let mut ring = match self.ring.lock() {
            Ok(r) => r,
            Err(_) => return 1.0,
        };

        let max_sim = ring
            .iter()
            .map(|prev| jaccard(&grams, &trigrams(prev)))
            .fold(0.0f32, f32::max);

        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(description.to_string());

        (1.0 - max_sim).clamp(0.0, 1.0)
    }

    pub fn len(&self) -> usize {
        self.ring.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NoveltyRing {
    fn default() -> Self {
        Self::new()
    }
}

fn trigrams(text: &str) -> HashSet<[char; 3]> {
    let chars: Vec<char> = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ')
        .collect();
    chars
        .windows(3)
        .map(|w| [w[0], w[1], w[2]])
        .collect()
}

fn jaccard(a: &HashSet<[char; 3]>, b: &HashSet<[char; 3]>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f32 / union as f32
}
