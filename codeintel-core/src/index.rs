//! # Project-Scoped In-Memory Index
//!
//! A derived cache over the graph store: one [`InMemoryIndex`] per active
//! project, owned by an [`IndexRegistry`] that bounds residency with an
//! LRU. The orchestrator writes through the registry, so there is exactly
//! one index per project and engines always observe the synced copy.
//!
//! Lock discipline: indexes sit behind a `parking_lot::RwLock`. Readers
//! of one project never block on another project's index, and locks are
//! never held across store calls: reloads fetch first, then fill.

use crate::constants::index::MAX_RESIDENT_PROJECTS;
use crate::error::Result;
use crate::store::{GraphStore, PropertyFilter};
use crate::types::{GraphEdge, GraphNode, IndexStats, NodeLabel};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Shared handle to one project's index
pub type SharedIndex = Arc<RwLock<InMemoryIndex>>;

/// Fast per-project lookup: nodes by id, nodes by label, adjacency
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    nodes: HashMap<String, GraphNode>,
    by_label: HashMap<NodeLabel, HashSet<String>>,
    edges_from: HashMap<String, Vec<GraphEdge>>,
    edges_to: HashMap<String, Vec<GraphEdge>>,
    edge_keys: HashSet<(String, String, crate::types::EdgeKind)>,
}

impl InMemoryIndex {
    /// Empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node
    pub fn add_node(&mut self, node: GraphNode) {
        if let Some(previous) = self.nodes.get(&node.id)
            && previous.label != node.label
            && let Some(ids) = self.by_label.get_mut(&previous.label)
        {
            ids.remove(&node.id);
        }
        self.by_label
            .entry(node.label)
            .or_default()
            .insert(node.id.clone());
        self.nodes.insert(node.id.clone(), node);
    }

    /// Insert an edge; duplicate `(from, to, kind)` tuples are ignored
    pub fn add_edge(&mut self, edge: GraphEdge) {
        let key = edge.merge_key();
        if !self.edge_keys.insert(key) {
            return;
        }
        self.edges_to
            .entry(edge.to_id.clone())
            .or_default()
            .push(edge.clone());
        self.edges_from
            .entry(edge.from_id.clone())
            .or_default()
            .push(edge);
    }

    /// Node lookup by id
    #[must_use]
    pub fn get_node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// All nodes carrying a label
    #[must_use]
    pub fn nodes_by_label(&self, label: NodeLabel) -> Vec<&GraphNode> {
        self.by_label
            .get(&label)
            .map(|ids| ids.iter().filter_map(|id| self.nodes.get(id)).collect())
            .unwrap_or_default()
    }

    /// Outgoing edges of a node
    #[must_use]
    pub fn edges_from(&self, id: &str) -> &[GraphEdge] {
        self.edges_from.get(id).map_or(&[], Vec::as_slice)
    }

    /// Incoming edges of a node
    #[must_use]
    pub fn edges_to(&self, id: &str) -> &[GraphEdge] {
        self.edges_to.get(id).map_or(&[], Vec::as_slice)
    }

    /// Find a node by `name` property and label
    #[must_use]
    pub fn find_by_name(&self, label: NodeLabel, name: &str) -> Option<&GraphNode> {
        self.by_label.get(&label).and_then(|ids| {
            ids.iter()
                .filter_map(|id| self.nodes.get(id))
                .find(|node| node.prop_str("name") == Some(name))
        })
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.by_label.clear();
        self.edges_from.clear();
        self.edges_to.clear();
        self.edge_keys.clear();
    }

    /// Whether the index holds no nodes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Snapshot counters
    #[must_use]
    pub fn statistics(&self) -> IndexStats {
        let nodes_by_label = self
            .by_label
            .iter()
            .map(|(label, ids)| (label.to_string(), ids.len()))
            .collect();
        IndexStats {
            total_nodes: self.nodes.len(),
            total_edges: self.edge_keys.len(),
            nodes_by_label,
        }
    }
}

/// Bounded registry of per-project indexes
///
/// Eviction is silent; the next use of an evicted project triggers a lazy
/// reload from the graph store.
pub struct IndexRegistry {
    inner: Mutex<LruCache<String, SharedIndex>>,
}

impl IndexRegistry {
    /// Registry with the default residency bound
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_RESIDENT_PROJECTS)
    }

    /// Registry with an explicit residency bound
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Resident index for a project, creating an empty one on miss
    pub fn get_or_create(&self, project_id: &str) -> SharedIndex {
        let mut cache = self.inner.lock();
        if let Some(index) = cache.get(project_id) {
            return Arc::clone(index);
        }
        let index: SharedIndex = Arc::new(RwLock::new(InMemoryIndex::new()));
        cache.put(project_id.to_string(), Arc::clone(&index));
        index
    }

    /// Resident index for a project, reloading it from the store when the
    /// project was evicted (or never built)
    pub async fn get_or_reload(
        &self,
        project_id: &str,
        store: &dyn GraphStore,
    ) -> Result<SharedIndex> {
        let (index, needs_reload) = {
            let mut cache = self.inner.lock();
            match cache.get(project_id) {
                Some(index) => (Arc::clone(index), false),
                None => {
                    let index: SharedIndex = Arc::new(RwLock::new(InMemoryIndex::new()));
                    cache.put(project_id.to_string(), Arc::clone(&index));
                    (index, true)
                }
            }
        };

        if needs_reload {
            // Fetch outside the lock, then fill
            let nodes = store
                .find_nodes(project_id, None, &PropertyFilter::new())
                .await?;
            let edges = store.project_edges(project_id).await?;
            let mut guard = index.write();
            if guard.is_empty() {
                for node in nodes {
                    guard.add_node(node);
                }
                for edge in edges {
                    guard.add_edge(edge);
                }
            }
        }

        Ok(index)
    }

    /// Clear one project's index (project switch, full rebuild prelude)
    pub fn clear_project(&self, project_id: &str) {
        let mut cache = self.inner.lock();
        if let Some(index) = cache.get(project_id) {
            index.write().clear();
        }
    }

    /// Number of resident projects
    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.inner.lock().len()
    }
}

impl Default for IndexRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EdgeKind;

    fn node(id: &str, label: NodeLabel) -> GraphNode {
        GraphNode::new(id, label, "p")
    }

    #[test]
    fn test_add_and_lookup() {
        let mut index = InMemoryIndex::new();
        index.add_node(node("p:file:a.ts", NodeLabel::File));
        index.add_node(node("p:func:a.ts:foo:1", NodeLabel::Function));

        assert!(index.get_node("p:file:a.ts").is_some());
        assert_eq!(index.nodes_by_label(NodeLabel::Function).len(), 1);
        assert_eq!(index.nodes_by_label(NodeLabel::Class).len(), 0);
    }

    #[test]
    fn test_edge_dedup_on_merge_key() {
        let mut index = InMemoryIndex::new();
        index.add_edge(GraphEdge::new("a", "b", EdgeKind::Contains, "p"));
        index.add_edge(GraphEdge::new("a", "b", EdgeKind::Contains, "p"));
        index.add_edge(GraphEdge::new("a", "b", EdgeKind::Imports, "p"));

        assert_eq!(index.edges_from("a").len(), 2);
        assert_eq!(index.edges_to("b").len(), 2);
        assert_eq!(index.statistics().total_edges, 2);
    }

    #[test]
    fn test_clear_resets_statistics() {
        let mut index = InMemoryIndex::new();
        index.add_node(node("n1", NodeLabel::File));
        index.add_edge(GraphEdge::new("n1", "n2", EdgeKind::Contains, "p"));
        index.clear();

        let stats = index.statistics();
        assert_eq!(stats.total_nodes, 0);
        assert_eq!(stats.total_edges, 0);
        assert!(index.is_empty());
    }

    #[test]
    fn test_registry_bounds_residency() {
        let registry = IndexRegistry::with_capacity(2);
        let a = registry.get_or_create("a");
        let _b = registry.get_or_create("b");
        let _c = registry.get_or_create("c");

        assert_eq!(registry.resident_count(), 2);
        // "a" was evicted but existing handles stay usable
        a.write().add_node(node("n1", NodeLabel::File));
        assert_eq!(a.read().statistics().total_nodes, 1);
    }

    #[test]
    fn test_registry_returns_same_instance() {
        let registry = IndexRegistry::new();
        let first = registry.get_or_create("p");
        first.write().add_node(node("n1", NodeLabel::File));

        let second = registry.get_or_create("p");
        assert_eq!(second.read().statistics().total_nodes, 1);
    }
}
