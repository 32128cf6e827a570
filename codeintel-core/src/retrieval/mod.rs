//! # Hybrid Retrieval Engine
//!
//! Fuses three signals over the project-scoped graph: vector similarity,
//! lexical (BM25) scoring, and Personalized PageRank over the graph
//! neighborhood of the top seeds. Fusion is Reciprocal Rank Fusion with
//! the standard k = 60.

pub mod bm25;
pub mod pagerank;
pub mod rrf;

use crate::constants::retrieval::{GRAPH_EXPANSION_HOPS, GRAPH_SEED_COUNT, PPR_DAMPING, PPR_ITERATIONS};
use crate::embedding::EmbeddingEngine;
use crate::error::{Error, Result};
use crate::index::SharedIndex;
use crate::store::GraphStore;
use crate::types::{EdgeKind, GraphNode, NodeLabel, OutputProfile};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

pub use rrf::FusedHit;

/// Retrieval scope: local stays close to the seeds, global widens the
/// expansion by one hop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    #[default]
    Local,
    Global,
}

/// A retrieval request
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalQuery {
    pub text: String,
    #[serde(default)]
    pub mode: RetrievalMode,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub profile: OutputProfile,
}

fn default_limit() -> usize {
    10
}

/// One ranked hit, shaped by the requested profile
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalHit {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// How the response was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    Hybrid,
    LexicalFallback,
}

/// Ranked results plus the mode annotation
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResponse {
    pub hits: Vec<RetrievalHit>,
    pub mode: ResponseMode,
}

/// Edge kinds followed during graph expansion
const EXPANSION_KINDS: &[EdgeKind] = &[
    EdgeKind::Calls,
    EdgeKind::Imports,
    EdgeKind::Contains,
    EdgeKind::DependsOn,
];

/// Executes hybrid retrieval for one project at a time
pub struct HybridRetriever {
    graph: Arc<dyn GraphStore>,
    embeddings: Arc<EmbeddingEngine>,
}

impl HybridRetriever {
    /// Retriever over the shared stores
    pub fn new(graph: Arc<dyn GraphStore>, embeddings: Arc<EmbeddingEngine>) -> Self {
        Self { graph, embeddings }
    }

    /// Run the three-signal retrieval and fuse the results.
    ///
    /// The index view is handed in per call by the session registry, so
    /// the retriever never caches a stale reference.
    pub async fn retrieve(
        &self,
        project_id: &str,
        index: &SharedIndex,
        query: &RetrievalQuery,
    ) -> Result<RetrievalResponse> {
        let tokens = bm25::tokenize(&query.text);
        if !bm25::has_scoreable_token(&tokens) {
            return Err(Error::QueryTooShort);
        }
        let limit = query.limit.clamp(1, 100);
        let candidate_pool = limit * 2;

        // Signal 1: vector similarity
        let (vector_hits, vector_failed) = match self
            .embeddings
            .find_similar_text(project_id, &query.text, candidate_pool)
            .await
        {
            Ok(hits) => (
                hits.into_iter()
                    .map(|h| (h.original_id, h.score))
                    .collect::<Vec<_>>(),
                false,
            ),
            Err(err) => {
                warn!(project_id, %err, "vector retrieval failed");
                (Vec::new(), true)
            }
        };

        // Signal 2: lexical, preferring the store's native text search
        let (lexical_hits, text_search_failed) =
            match self.graph.text_search(project_id, &query.text, candidate_pool).await {
                Ok(Some(hits)) => (hits, false),
                Ok(None) => (self.local_lexical(index, &tokens, candidate_pool), false),
                Err(err) => {
                    warn!(project_id, %err, "store text search failed, using local scorer");
                    (self.local_lexical(index, &tokens, candidate_pool), true)
                }
            };

        // Signal 3: graph expansion around the best seeds
        let mut seeds: Vec<String> = Vec::new();
        for (id, _) in vector_hits.iter().chain(lexical_hits.iter()) {
            if seeds.len() >= GRAPH_SEED_COUNT {
                break;
            }
            if !seeds.contains(id) {
                seeds.push(id.clone());
            }
        }
        let graph_hits = self.expand_and_rank(index, &seeds, query.mode);

        let index_empty = index.read().is_empty();
        if vector_failed && text_search_failed && index_empty {
            return Err(Error::RetrievalUnavailable);
        }

        let mode = if vector_hits.is_empty() {
            ResponseMode::LexicalFallback
        } else {
            ResponseMode::Hybrid
        };

        let fused = rrf::fuse(&vector_hits, &lexical_hits, &graph_hits);
        debug!(
            project_id,
            vector = vector_hits.len(),
            lexical = lexical_hits.len(),
            graph = graph_hits.len(),
            fused = fused.len(),
            "hybrid retrieval complete"
        );

        let guard = index.read();
        let hits = fused
            .into_iter()
            .take(limit)
            .map(|hit| shape_hit(&hit, guard.get_node(&hit.id), query.profile))
            .collect();

        Ok(RetrievalResponse { hits, mode })
    }

    /// BM25 over the code nodes resident in the project index
    fn local_lexical(
        &self,
        index: &SharedIndex,
        tokens: &[String],
        limit: usize,
    ) -> Vec<(String, f32)> {
        let guard = index.read();
        let mut docs = Vec::new();
        for label in [NodeLabel::Function, NodeLabel::Class, NodeLabel::File] {
            for node in guard.nodes_by_label(label) {
                docs.push(bm25::LexicalDoc {
                    id: node.id.clone(),
                    text: lexical_text(node),
                });
            }
        }
        bm25::rank(tokens, &docs, limit)
    }

    /// Expand 2-3 hops from the seeds and score the neighborhood by PPR
    fn expand_and_rank(
        &self,
        index: &SharedIndex,
        seeds: &[String],
        mode: RetrievalMode,
    ) -> Vec<(String, f64)> {
        if seeds.is_empty() {
            return Vec::new();
        }
        let hops = match mode {
            RetrievalMode::Local => GRAPH_EXPANSION_HOPS,
            RetrievalMode::Global => GRAPH_EXPANSION_HOPS + 1,
        };

        let guard = index.read();
        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        let mut visited: HashSet<String> = seeds.iter().cloned().collect();
        let mut queue: VecDeque<(String, usize)> =
            seeds.iter().map(|s| (s.clone(), 0)).collect();

        while let Some((id, depth)) = queue.pop_front() {
            if depth >= hops {
                continue;
            }
            let mut neighbors: Vec<String> = Vec::new();
            for edge in guard.edges_from(&id) {
                if EXPANSION_KINDS.contains(&edge.kind) {
                    neighbors.push(edge.to_id.clone());
                }
            }
            for edge in guard.edges_to(&id) {
                if EXPANSION_KINDS.contains(&edge.kind) {
                    neighbors.push(edge.from_id.clone());
                }
            }
            for neighbor in neighbors {
                adjacency.entry(id.clone()).or_default().push(neighbor.clone());
                if visited.insert(neighbor.clone()) {
                    queue.push_back((neighbor, depth + 1));
                }
            }
        }
        drop(guard);

        let scores = pagerank::personalized_pagerank(&adjacency, seeds, PPR_DAMPING, PPR_ITERATIONS);
        let mut ranked: Vec<(String, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked
    }
}

fn lexical_text(node: &GraphNode) -> String {
    let mut text = node.name().to_string();
    for key in ["path", "file_path", "doc", "content"] {
        if let Some(value) = node.prop_str(key) {
            text.push(' ');
            text.push_str(value);
        }
    }
    text
}

fn shape_hit(hit: &FusedHit, node: Option<&GraphNode>, profile: OutputProfile) -> RetrievalHit {
    let name = node.map(|n| n.name().to_string());
    let summary = match profile {
        OutputProfile::Compact => None,
        OutputProfile::Balanced | OutputProfile::Debug => node.map(|n| {
            let place = n
                .prop_str("file_path")
                .or_else(|| n.prop_str("path"))
                .unwrap_or("?");
            format!("{} {} in {}", n.label, n.name(), place)
        }),
    };
    let payload = match profile {
        OutputProfile::Debug => node.and_then(|n| serde_json::to_value(n).ok()),
        _ => None,
    };
    RetrievalHit {
        id: hit.id.clone(),
        name,
        score: hit.score,
        summary,
        payload,
    }
}
