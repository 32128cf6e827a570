//! Local Personalized PageRank fallback
//!
//! Power iteration with damping 0.85 over the expanded neighborhood,
//! restarting on the seed set. Used when the graph store exposes no
//! native PPR primitive.

use std::collections::{HashMap, HashSet};

/// Score a neighborhood by Personalized PageRank.
///
/// `adjacency` maps a node to its outgoing neighbors within the expanded
/// subgraph. Dangling mass flows back to the seeds, so scores always sum
/// to ~1 over the subgraph.
#[must_use]
pub fn personalized_pagerank(
    adjacency: &HashMap<String, Vec<String>>,
    seeds: &[String],
    damping: f64,
    iterations: usize,
) -> HashMap<String, f64> {
    if seeds.is_empty() {
        return HashMap::new();
    }

    let mut nodes: HashSet<&str> = HashSet::new();
    for (from, targets) in adjacency {
        nodes.insert(from.as_str());
        for to in targets {
            nodes.insert(to.as_str());
        }
    }
    for seed in seeds {
        nodes.insert(seed.as_str());
    }

    let restart_mass = 1.0 / seeds.len() as f64;
    let restart: HashMap<&str, f64> = seeds.iter().map(|s| (s.as_str(), restart_mass)).collect();

    let mut scores: HashMap<&str, f64> = restart.clone();

    for _ in 0..iterations {
        let mut next: HashMap<&str, f64> = HashMap::with_capacity(nodes.len());
        let mut dangling = 0.0;

        for node in &nodes {
            let score = scores.get(node).copied().unwrap_or(0.0);
            match adjacency.get(*node).filter(|targets| !targets.is_empty()) {
                Some(targets) => {
                    let share = score / targets.len() as f64;
                    for to in targets {
                        *next.entry(to.as_str()).or_insert(0.0) += share;
                    }
                }
                None => dangling += score,
            }
        }

        let mut updated: HashMap<&str, f64> = HashMap::with_capacity(nodes.len());
        for node in &nodes {
            let walked = next.get(node).copied().unwrap_or(0.0);
            let restart_share = restart.get(node).copied().unwrap_or(0.0);
            let value = damping * (walked + dangling * restart_share)
                + (1.0 - damping) * restart_share;
            updated.insert(node, value);
        }
        scores = updated;
    }

    scores
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::retrieval::{PPR_DAMPING, PPR_ITERATIONS};

    fn adjacency(edges: &[(&str, &str)]) -> HashMap<String, Vec<String>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (from, to) in edges {
            map.entry((*from).to_string())
                .or_default()
                .push((*to).to_string());
        }
        map
    }

    #[test]
    fn test_seed_dominates_its_neighborhood() {
        let adj = adjacency(&[("seed", "near"), ("near", "far"), ("far", "seed")]);
        let scores = personalized_pagerank(
            &adj,
            &["seed".to_string()],
            PPR_DAMPING,
            PPR_ITERATIONS,
        );
        assert!(scores["seed"] > scores["near"]);
        assert!(scores["near"] > scores["far"]);
    }

    #[test]
    fn test_scores_sum_to_one() {
        let adj = adjacency(&[("a", "b"), ("b", "c"), ("c", "a"), ("a", "c")]);
        let scores =
            personalized_pagerank(&adj, &["a".to_string()], PPR_DAMPING, PPR_ITERATIONS);
        let total: f64 = scores.values().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_seeds_yield_nothing() {
        let adj = adjacency(&[("a", "b")]);
        assert!(personalized_pagerank(&adj, &[], PPR_DAMPING, PPR_ITERATIONS).is_empty());
    }

    #[test]
    fn test_dangling_mass_returns_to_seeds() {
        // "sink" has no outgoing edges; its mass must not vanish
        let adj = adjacency(&[("seed", "sink")]);
        let scores =
            personalized_pagerank(&adj, &["seed".to_string()], PPR_DAMPING, PPR_ITERATIONS);
        let total: f64 = scores.values().sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!(scores["seed"] > 0.0);
    }
}
