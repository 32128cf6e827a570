//! Reciprocal Rank Fusion
//!
//! Merges the vector, lexical, and graph rankings into one list:
//! `score = Σ 1/(k + rank_i)` with k = 60. Ties break by vector score,
//! then lexical score, then stable id order.

use crate::constants::retrieval::RRF_K;
use std::collections::HashMap;

/// A candidate after fusion, with its per-signal components
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub id: String,
    pub score: f64,
    pub vector_score: Option<f32>,
    pub lexical_score: Option<f32>,
    pub graph_score: Option<f64>,
}

/// Fuse three ranked lists (each best-first) into one
#[must_use]
pub fn fuse(
    vector: &[(String, f32)],
    lexical: &[(String, f32)],
    graph: &[(String, f64)],
) -> Vec<FusedHit> {
    let ensure = |hits: &mut HashMap<String, FusedHit>, id: &str| {
        if !hits.contains_key(id) {
            hits.insert(
                id.to_string(),
                FusedHit {
                    id: id.to_string(),
                    score: 0.0,
                    vector_score: None,
                    lexical_score: None,
                    graph_score: None,
                },
            );
        }
    };

    let mut map: HashMap<String, FusedHit> = HashMap::new();
    for (rank, (id, score)) in vector.iter().enumerate() {
        ensure(&mut map, id);
        // rank is 0-based; RRF ranks start at 1
        if let Some(hit) = map.get_mut(id) {
            hit.score += 1.0 / (RRF_K + rank as f64 + 1.0);
            hit.vector_score = Some(*score);
        }
    }
    for (rank, (id, score)) in lexical.iter().enumerate() {
        ensure(&mut map, id);
        if let Some(hit) = map.get_mut(id) {
            hit.score += 1.0 / (RRF_K + rank as f64 + 1.0);
            hit.lexical_score = Some(*score);
        }
    }
    for (rank, (id, score)) in graph.iter().enumerate() {
        ensure(&mut map, id);
        if let Some(hit) = map.get_mut(id) {
            hit.score += 1.0 / (RRF_K + rank as f64 + 1.0);
            hit.graph_score = Some(*score);
        }
    }

    let mut fused: Vec<FusedHit> = map.into_values().collect();
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.vector_score
                    .unwrap_or(f32::MIN)
                    .partial_cmp(&a.vector_score.unwrap_or(f32::MIN))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| {
                b.lexical_score
                    .unwrap_or(f32::MIN)
                    .partial_cmp(&a.lexical_score.unwrap_or(f32::MIN))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.id.cmp(&b.id))
    });
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_in_all_lists_wins() {
        let vector = vec![("both".to_string(), 0.9), ("v_only".to_string(), 0.8)];
        let lexical = vec![("both".to_string(), 5.0), ("l_only".to_string(), 4.0)];
        let graph = vec![("both".to_string(), 0.5)];

        let fused = fuse(&vector, &lexical, &graph);
        assert_eq!(fused[0].id, "both");
        assert_eq!(fused.len(), 3);
        // Rank-1 in all three lists: 3 * 1/(60+1)
        assert!((fused[0].score - 3.0 / 61.0).abs() < 1e-9);
    }

    #[test]
    fn test_tie_breaks_by_vector_score() {
        // Same ranks in disjoint lists, so equal RRF scores
        let vector = vec![("a".to_string(), 0.9)];
        let lexical = vec![("b".to_string(), 3.0)];

        let fused = fuse(&vector, &lexical, &[]);
        assert_eq!(fused[0].id, "a");
    }

    #[test]
    fn test_tie_breaks_by_id_when_signals_match() {
        let graph = vec![("z".to_string(), 0.5)];
        let graph_b = vec![("a".to_string(), 0.5)];
        // Fuse twice into one call: same rank, same (absent) vector and
        // lexical scores -> stable id order decides
        let fused = fuse(&[], &[], &[graph[0].clone(), graph_b[0].clone()]);
        assert_eq!(fused[0].id, "z"); // rank 1 beats rank 2
        let tied = fuse(
            &[],
            &[("z".to_string(), 1.0), ("a".to_string(), 1.0)],
            &[("a".to_string(), 0.1), ("z".to_string(), 0.1)],
        );
        // z: lexical rank 1 + graph rank 2; a: lexical rank 2 + graph rank 1
        // RRF scores are equal; lexical raw scores are equal; id sorts
        assert_eq!(tied[0].id, "a");
    }

    #[test]
    fn test_empty_lists_fuse_to_empty() {
        assert!(fuse(&[], &[], &[]).is_empty());
    }
}
