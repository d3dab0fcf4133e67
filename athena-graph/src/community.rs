//! Deterministic community detection by greedy modularity maximisation.
//!
//! Louvain-style local sweep over an undirected projection of the graph
//! (edge strengths as weights, `contradicts` edges excluded), with a fixed
//! vertex visiting order derived from the seed. Deterministic for a fixed
//! seed; the resolution parameter scales the null-model term.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use athena_core::types::{Community, Edge};

/// Maximum local-move sweeps before settling.
const MAX_SWEEPS: usize = 16;

/// Partition the entity set. Every entity lands in exactly one community.
pub fn detect(entity_ids: &[String], edges: &[Edge], resolution: f64, seed: u64) -> Vec<Community> {
    let mut ids: Vec<String> = entity_ids.to_vec();
    ids.sort_unstable();
    if ids.is_empty() {
        return Vec::new();
    }

    let index_of: HashMap<&str, usize> =
        ids.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
    let n = ids.len();

    // Undirected weighted adjacency; contradicting relations do not bind.
    let mut weights: HashMap<(usize, usize), f64> = HashMap::new();
    let mut node_weight = vec![0.0f64; n];
    let mut total_weight = 0.0f64;
    for edge in edges {
        if edge.edge_type.blocks_inference() {
            continue;
        }
        let (Some(&a), Some(&b)) = (
            index_of.get(edge.source_id.as_str()),
            index_of.get(edge.target_id.as_str()),
        ) else {
            continue;
        };
        if a == b {
            continue;
        }
        let key = (a.min(b), a.max(b));
        *weights.entry(key).or_default() += edge.strength;
        node_weight[a] += edge.strength;
        node_weight[b] += edge.strength;
        total_weight += edge.strength;
    }

    let mut assignment: Vec<usize> = (0..n).collect();
    if total_weight > 0.0 {
        let order = visiting_order(n, seed);
        let mut neighbours: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        for (&(a, b), &w) in weights.iter() {
            neighbours[a].push((b, w));
            neighbours[b].push((a, w));
        }
        for nbrs in &mut neighbours {
            nbrs.sort_by(|x, y| x.0.cmp(&y.0));
        }

        for _ in 0..MAX_SWEEPS {
            let mut moved = false;
            for &node in &order {
                let current = assignment[node];

                // Weight from `node` into each neighbouring community.
                let mut into: BTreeMap<usize, f64> = BTreeMap::new();
                for &(nbr, w) in &neighbours[node] {
                    *into.entry(assignment[nbr]).or_default() += w;
                }

                // Total degree weight per candidate community (node removed).
                let mut community_degree: BTreeMap<usize, f64> = BTreeMap::new();
                for other in 0..n {
                    if other != node {
                        *community_degree.entry(assignment[other]).or_default() +=
                            node_weight[other];
                    }
                }

                let m2 = 2.0 * total_weight;
                let gain = |community: usize| -> f64 {
                    let k_in = into.get(&community).copied().unwrap_or(0.0);
                    let sigma = community_degree.get(&community).copied().unwrap_or(0.0);
                    k_in - resolution * sigma * node_weight[node] / m2
                };

                let mut best = current;
                let mut best_gain = gain(current);
                for &candidate in into.keys() {
                    let g = gain(candidate);
                    // Strict improvement keeps the sweep deterministic;
                    // BTreeMap order fixes equal-gain choices.
                    if g > best_gain + 1e-12 {
                        best_gain = g;
                        best = candidate;
                    }
                }

                if best != current {
                    assignment[node] = best;
                    moved = true;
                }
            }
            if !moved {
                break;
            }
        }
    }

    // Materialise: stable community ids derived from the smallest member.
    let mut groups: BTreeMap<usize, BTreeSet<String>> = BTreeMap::new();
    for (node, &community) in assignment.iter().enumerate() {
        groups.entry(community).or_default().insert(ids[node].clone());
    }
    groups
        .into_values()
        .map(|members| {
            let anchor = members.iter().next().cloned().unwrap_or_default();
            Community {
                id: format!("community:{anchor}"),
                members,
                level: 0,
            }
        })
        .collect()
}

/// Seeded but fixed visiting order: a deterministic shuffle of 0..n.
fn visiting_order(n: usize, seed: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    let mut state = seed.max(1);
    for i in (1..n).rev() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let j = (state % (i as u64 + 1)) as usize;
        order.swap(i, j);
    }
    order
}
