//! # Embedding Engine
//!
//! Generates per-symbol embeddings and owns the vector-store side of the
//! id bridge: points are keyed by the FNV-1a hash of the string node id,
//! payloads preserve `original_id`, and callers only ever see strings.
//!
//! The default [`Embedder`] is a deterministic hash projection. It keeps
//! the engine self-contained and testable; real model providers plug in
//! behind the same trait.

use crate::constants::embedding::{CODE_COLLECTION, DIMENSION};
use crate::constants::index::MAX_CACHED_VECTORS;
use crate::error::Result;
use crate::store::{PayloadFilter, VectorPoint, VectorStore, ids};
use crate::types::GraphNode;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Produces a fixed-dimension vector for a text snippet
pub trait Embedder: Send + Sync {
    /// Vector dimension, fixed per collection at creation time
    fn dimension(&self) -> usize;

    /// Embed one text
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Deterministic, dependency-free embedder using a hash-seeded projection
///
/// A djb2 hash of the text seeds a linear-congruential sequence that
/// fills the vector, which is then L2-normalized. Identical texts map to
/// identical unit vectors.
pub struct HashProjectionEmbedder {
    dim: usize,
}

impl HashProjectionEmbedder {
    /// Embedder with an explicit dimension
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self { dim: dimension }
    }
}

impl Default for HashProjectionEmbedder {
    fn default() -> Self {
        Self::new(DIMENSION)
    }
}

impl Embedder for HashProjectionEmbedder {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut hash: u32 = 5381;
        for b in text.as_bytes() {
            hash = hash.wrapping_mul(33).wrapping_add(u32::from(*b));
        }
        let mut state = hash;
        let mut v = vec![0.0f32; self.dim];
        for val in v.iter_mut() {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            *val = ((state as f32 / u32::MAX as f32) - 0.5) * 2.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

/// Cosine similarity between two vectors of equal dimension
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

/// A search hit mapped back to the string node id
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarSymbol {
    pub original_id: String,
    pub score: f32,
}

/// Generates, stores, and retrieves code symbol embeddings
pub struct EmbeddingEngine {
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    collection: String,
    /// Per-project fallback cache used when the filtered store search
    /// comes back empty (store empty or unreachable)
    cache: Mutex<HashMap<String, HashMap<String, Vec<f32>>>>,
}

impl EmbeddingEngine {
    /// Engine over a vector store with the default embedder
    pub fn new(vectors: Arc<dyn VectorStore>) -> Self {
        Self::with_embedder(vectors, Arc::new(HashProjectionEmbedder::default()))
    }

    /// Engine with a custom embedder
    pub fn with_embedder(vectors: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            vectors,
            embedder,
            collection: CODE_COLLECTION.to_string(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Vector dimension in use
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Embed and upsert the given code nodes.
    ///
    /// The `project_id` written on every point is the node's own
    /// `project_id` property, never a substring of the node id.
    pub async fn generate(&self, project_id: &str, nodes: &[GraphNode]) -> Result<usize> {
        let mut points = Vec::with_capacity(nodes.len());
        let mut cached: Vec<(String, Vec<f32>)> = Vec::with_capacity(nodes.len());

        for node in nodes {
            if node.project_id != project_id {
                warn!(
                    node_id = %node.id,
                    expected = project_id,
                    actual = %node.project_id,
                    "skipping node from another project during embedding"
                );
                continue;
            }
            let text = embedding_text(node);
            let vector = self.embedder.embed(&text);

            let mut payload = Map::new();
            payload.insert("project_id".into(), Value::String(node.project_id.clone()));
            payload.insert("original_id".into(), Value::String(node.id.clone()));
            payload.insert("name".into(), Value::String(node.name().to_string()));
            payload.insert("label".into(), Value::String(node.label.to_string()));
            if let Some(path) = node.prop_str("file_path").or_else(|| node.prop_str("path")) {
                payload.insert("file_path".into(), Value::String(path.to_string()));
            }

            cached.push((node.id.clone(), vector.clone()));
            points.push(VectorPoint {
                id: ids::fnv1a_32(&node.id),
                vector,
                payload,
            });
        }

        let count = points.len();
        if count > 0 {
            self.vectors.upsert(&self.collection, points).await?;
        }

        let mut cache = self.cache.lock();
        let project_cache = cache.entry(project_id.to_string()).or_default();
        for (id, vector) in cached {
            if project_cache.len() >= MAX_CACHED_VECTORS && !project_cache.contains_key(&id) {
                break;
            }
            project_cache.insert(id, vector);
        }
        debug!(project_id, count, "embedded code symbols");
        Ok(count)
    }

    /// k-NN by query text within a project
    pub async fn find_similar_text(
        &self,
        project_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SimilarSymbol>> {
        let vector = self.embedder.embed(query);
        self.find_similar_vector(project_id, &vector, k).await
    }

    /// k-NN by raw vector within a project, with in-memory fallback
    pub async fn find_similar_vector(
        &self,
        project_id: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<SimilarSymbol>> {
        let filter = PayloadFilter::project(project_id);
        let hits = match self
            .vectors
            .search(&self.collection, vector, k, &filter)
            .await
        {
            Ok(hits) => hits,
            Err(err) => {
                warn!(project_id, %err, "vector search failed, using local cache");
                Vec::new()
            }
        };

        if !hits.is_empty() {
            return Ok(hits
                .into_iter()
                .filter_map(|p| {
                    p.original_id().map(|id| SimilarSymbol {
                        original_id: id.to_string(),
                        score: p.score,
                    })
                })
                .collect());
        }

        Ok(self.cache_search(project_id, vector, k))
    }

    /// k-NN neighbors of an already-embedded symbol, excluding itself.
    ///
    /// Uses the cached vector when present; an unknown symbol falls back
    /// to embedding its id text, which still lands in its lexical
    /// neighborhood.
    pub async fn find_similar_symbol(
        &self,
        project_id: &str,
        symbol_id: &str,
        k: usize,
    ) -> Result<Vec<SimilarSymbol>> {
        let cached = self
            .cache
            .lock()
            .get(project_id)
            .and_then(|project_cache| project_cache.get(symbol_id).cloned());
        let vector = cached.unwrap_or_else(|| self.embedder.embed(symbol_id));

        let mut hits = self.find_similar_vector(project_id, &vector, k + 1).await?;
        hits.retain(|h| h.original_id != symbol_id);
        hits.truncate(k);
        Ok(hits)
    }

    /// Purge every point of a project (full rebuild prelude)
    pub async fn purge_project(&self, project_id: &str) -> Result<usize> {
        self.cache.lock().remove(project_id);
        self.vectors
            .delete_by_filter(&self.collection, &PayloadFilter::project(project_id))
            .await
    }

    /// Stored point count for a project
    pub async fn count(&self, project_id: &str) -> Result<usize> {
        self.vectors
            .count_by_filter(&self.collection, &PayloadFilter::project(project_id))
            .await
    }

    /// Vector store health passthrough
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.vectors.is_connected()
    }

    fn cache_search(&self, project_id: &str, vector: &[f32], k: usize) -> Vec<SimilarSymbol> {
        let cache = self.cache.lock();
        let Some(project_cache) = cache.get(project_id) else {
            return Vec::new();
        };
        let mut scored: Vec<SimilarSymbol> = project_cache
            .iter()
            .map(|(id, candidate)| SimilarSymbol {
                original_id: id.clone(),
                score: cosine_similarity(vector, candidate),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.original_id.cmp(&b.original_id))
        });
        scored.truncate(k);
        scored
    }
}

/// Text fed to the embedder for a code node
fn embedding_text(node: &GraphNode) -> String {
    let mut text = String::new();
    text.push_str(&node.label.to_string());
    text.push(' ');
    text.push_str(node.name());
    if let Some(path) = node.prop_str("file_path").or_else(|| node.prop_str("path")) {
        text.push(' ');
        text.push_str(path);
    }
    if let Some(doc) = node.prop_str("doc") {
        text.push(' ');
        text.push_str(doc);
    }
    if text.len() > 4096 {
        text.truncate(4096);
    }
    text
}
