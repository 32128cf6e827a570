//! # Store Abstractions
//!
//! Narrow adapter contracts over the labeled-property-graph database and
//! the vector database. Engines depend only on these traits; driver
//! crates implement them. All durable state lives behind [`GraphStore`].
//!
//! Every typed operation is scoped by `project_id` inside the adapter:
//! this is where project isolation is enforced, not in each caller.

pub mod ids;

use crate::error::Result;
use crate::types::{GraphEdge, GraphNode, NodeLabel, TransactionRecord};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Equality filter over node properties
///
/// Every entry must match the node's property of the same key. A `null`
/// value matches nodes where the property is absent or explicitly null,
/// which is how open claims (`valid_to = null`) are selected.
#[derive(Debug, Clone, Default)]
pub struct PropertyFilter(pub Map<String, Value>);

impl PropertyFilter {
    /// Empty filter matching every node
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style entry
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Check a node against the filter
    #[must_use]
    pub fn matches(&self, node: &GraphNode) -> bool {
        self.0.iter().all(|(key, expected)| {
            match node.properties.get(key) {
                Some(actual) => actual == expected,
                None => expected.is_null(),
            }
        })
    }
}

/// Thin contract over a labeled-property-graph database
///
/// Writes use MERGE semantics: nodes key on `(label, id)` with
/// unconditional property overwrite, edges on `(from, to, kind)`.
/// Re-running a write on unchanged input is a database-level no-op apart
/// from the `valid_from` refresh.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Upsert a batch of nodes; returns how many were newly created
    async fn upsert_nodes(&self, nodes: &[GraphNode]) -> Result<usize>;

    /// Upsert a batch of edges; returns how many were newly created
    async fn upsert_edges(&self, edges: &[GraphEdge]) -> Result<usize>;

    /// Fetch one node by id within a project
    async fn get_node(&self, project_id: &str, id: &str) -> Result<Option<GraphNode>>;

    /// Find nodes by label and property filter within a project
    async fn find_nodes(
        &self,
        project_id: &str,
        label: Option<NodeLabel>,
        filter: &PropertyFilter,
    ) -> Result<Vec<GraphNode>>;

    /// Merge properties into an existing node; returns whether it existed
    ///
    /// The node's `valid_from` is NOT refreshed: claim closure must not
    /// look like a content change.
    async fn update_node(
        &self,
        project_id: &str,
        id: &str,
        props: Map<String, Value>,
    ) -> Result<bool>;

    /// All edges whose endpoints belong to the project
    async fn project_edges(&self, project_id: &str) -> Result<Vec<GraphEdge>>;

    /// Remove the project's code nodes (FILE, FUNCTION, CLASS, IMPORT,
    /// COMMUNITY) and their edges; returns nodes removed. Claims,
    /// episodes, and learnings survive. Full-rebuild prelude only.
    async fn delete_code_nodes(&self, project_id: &str) -> Result<usize>;

    /// Raw parameterized query passthrough for stores that support it.
    ///
    /// Queries are parameterized; callers must never concatenate user
    /// input into `query`. Stores without a query language return
    /// [`crate::Error::Unsupported`].
    async fn execute_query(
        &self,
        query: &str,
        params: &Map<String, Value>,
    ) -> Result<Vec<Map<String, Value>>>;

    /// Ranked full-text search when the store exposes one.
    ///
    /// `Ok(None)` means unsupported and callers fall back to the local
    /// lexical scorer.
    async fn text_search(
        &self,
        project_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Option<Vec<(String, f32)>>>;

    /// Persist a rebuild transaction record (insert or overwrite by id)
    async fn record_transaction(&self, tx: &TransactionRecord) -> Result<()>;

    /// Most recently started transaction for the project
    async fn last_transaction(&self, project_id: &str) -> Result<Option<TransactionRecord>>;

    /// Connection health
    fn is_connected(&self) -> bool;
}

/// A stored embedding point
///
/// Point ids are the FNV-1a hash of the original string node id; the
/// payload keeps `original_id` so search results map back to strings.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VectorPoint {
    pub id: u32,
    pub vector: Vec<f32>,
    pub payload: Map<String, Value>,
}

/// A search hit from the vector store
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: u32,
    pub score: f32,
    pub payload: Map<String, Value>,
}

impl ScoredPoint {
    /// The original string node id preserved in the payload
    #[must_use]
    pub fn original_id(&self) -> Option<&str> {
        self.payload.get("original_id").and_then(Value::as_str)
    }
}

/// Equality filter over point payloads
#[derive(Debug, Clone, Default)]
pub struct PayloadFilter(pub Map<String, Value>);

impl PayloadFilter {
    /// Filter restricted to one project
    #[must_use]
    pub fn project(project_id: &str) -> Self {
        let mut map = Map::new();
        map.insert("project_id".to_string(), Value::String(project_id.to_string()));
        Self(map)
    }

    /// Check a payload against the filter
    #[must_use]
    pub fn matches(&self, payload: &Map<String, Value>) -> bool {
        self.0
            .iter()
            .all(|(key, expected)| payload.get(key) == Some(expected))
    }
}

/// Contract over a vector database
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upsert points into a collection (same id replaces the point)
    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()>;

    /// Cosine k-NN restricted by payload filter
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
        filter: &PayloadFilter,
    ) -> Result<Vec<ScoredPoint>>;

    /// Delete points matching the filter; returns how many were removed
    async fn delete_by_filter(&self, collection: &str, filter: &PayloadFilter) -> Result<usize>;

    /// Count points matching the filter
    async fn count_by_filter(&self, collection: &str, filter: &PayloadFilter) -> Result<usize>;

    /// Connection health
    fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeLabel;

    #[test]
    fn test_property_filter_null_matches_absent() {
        let filter = PropertyFilter::new().with("valid_to", Value::Null);
        let open = GraphNode::new("c1", NodeLabel::Claim, "p");
        assert!(filter.matches(&open));

        let closed = GraphNode::new("c2", NodeLabel::Claim, "p").with_prop("valid_to", 123);
        assert!(!filter.matches(&closed));
    }

    #[test]
    fn test_property_filter_equality() {
        let node = GraphNode::new("c1", NodeLabel::Claim, "p")
            .with_prop("target_id", "p:file:a.ts")
            .with_prop("agent_id", "x");

        let hit = PropertyFilter::new().with("target_id", "p:file:a.ts");
        assert!(hit.matches(&node));

        let miss = PropertyFilter::new()
            .with("target_id", "p:file:a.ts")
            .with("agent_id", "y");
        assert!(!miss.matches(&node));
    }

    #[test]
    fn test_payload_filter_project_scope() {
        let filter = PayloadFilter::project("alpha");
        let mut payload = Map::new();
        payload.insert("project_id".into(), Value::String("alpha".into()));
        payload.insert("original_id".into(), Value::String("alpha:file:x".into()));
        assert!(filter.matches(&payload));

        payload.insert("project_id".into(), Value::String("beta".into()));
        assert!(!filter.matches(&payload));
    }
}
