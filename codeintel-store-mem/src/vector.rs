//! In-memory brute-force cosine vector store

use async_trait::async_trait;
use codeintel_core::embedding::cosine_similarity;
use codeintel_core::error::{Error, Result};
use codeintel_core::store::{PayloadFilter, ScoredPoint, VectorPoint, VectorStore};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Brute-force [`VectorStore`]: exact cosine scan per search.
///
/// Fine for the project sizes tests exercise; a real deployment swaps in
/// an ANN-backed driver behind the same trait.
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, HashMap<u32, VectorPoint>>>,
    connected: AtomicBool,
}

impl MemoryVectorStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            connected: AtomicBool::new(true),
        }
    }

    /// Toggle simulated connectivity
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn check_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::StoreUnavailable("vector store offline".into()))
        }
    }

    /// Point count in one collection (test helper)
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, HashMap::len)
    }

    /// Whether a collection is empty or absent
    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()> {
        self.check_connected()?;
        let mut collections = self.collections.write();
        let stored = collections.entry(collection.to_string()).or_default();
        for point in points {
            stored.insert(point.id, point);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
        filter: &PayloadFilter,
    ) -> Result<Vec<ScoredPoint>> {
        self.check_connected()?;
        let collections = self.collections.read();
        let Some(stored) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut scored: Vec<ScoredPoint> = stored
            .values()
            .filter(|point| filter.matches(&point.payload))
            .map(|point| ScoredPoint {
                id: point.id,
                score: cosine_similarity(vector, &point.vector),
                payload: point.payload.clone(),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete_by_filter(&self, collection: &str, filter: &PayloadFilter) -> Result<usize> {
        self.check_connected()?;
        let mut collections = self.collections.write();
        let Some(stored) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = stored.len();
        stored.retain(|_, point| !filter.matches(&point.payload));
        Ok(before - stored.len())
    }

    async fn count_by_filter(&self, collection: &str, filter: &PayloadFilter) -> Result<usize> {
        self.check_connected()?;
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .map_or(0, |stored| {
                stored
                    .values()
                    .filter(|point| filter.matches(&point.payload))
                    .count()
            }))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};

    fn point(id: u32, vector: Vec<f32>, project: &str, original: &str) -> VectorPoint {
        let mut payload = Map::new();
        payload.insert("project_id".into(), Value::String(project.into()));
        payload.insert("original_id".into(), Value::String(original.into()));
        VectorPoint {
            id,
            vector,
            payload,
        }
    }

    #[tokio::test]
    async fn test_search_filters_by_project() {
        let store = MemoryVectorStore::new();
        store
            .upsert(
                "code",
                vec![
                    point(1, vec![1.0, 0.0], "a", "a:func:x"),
                    point(2, vec![1.0, 0.0], "b", "b:func:y"),
                ],
            )
            .await
            .unwrap();

        let hits = store
            .search("code", &[1.0, 0.0], 10, &PayloadFilter::project("a"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].original_id(), Some("a:func:x"));
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_id() {
        let store = MemoryVectorStore::new();
        store
            .upsert("code", vec![point(7, vec![1.0, 0.0], "a", "a:func:x")])
            .await
            .unwrap();
        store
            .upsert("code", vec![point(7, vec![0.0, 1.0], "a", "a:func:x")])
            .await
            .unwrap();
        assert_eq!(store.len("code"), 1);

        let hits = store
            .search("code", &[0.0, 1.0], 1, &PayloadFilter::project("a"))
            .await
            .unwrap();
        assert!((hits[0].score - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_delete_and_count_by_filter() {
        let store = MemoryVectorStore::new();
        store
            .upsert(
                "code",
                vec![
                    point(1, vec![1.0], "a", "a:1"),
                    point(2, vec![1.0], "a", "a:2"),
                    point(3, vec![1.0], "b", "b:1"),
                ],
            )
            .await
            .unwrap();

        let filter = PayloadFilter::project("a");
        assert_eq!(store.count_by_filter("code", &filter).await.unwrap(), 2);
        assert_eq!(store.delete_by_filter("code", &filter).await.unwrap(), 2);
        assert_eq!(store.len("code"), 1);
    }

    #[tokio::test]
    async fn test_missing_collection_is_empty() {
        let store = MemoryVectorStore::new();
        let hits = store
            .search("nope", &[1.0], 5, &PayloadFilter::project("a"))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}
