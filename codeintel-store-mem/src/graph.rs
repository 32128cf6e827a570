//! In-memory labeled-property-graph store

use async_trait::async_trait;
use codeintel_core::error::{Error, Result};
use codeintel_core::store::{GraphStore, PropertyFilter};
use codeintel_core::types::{EdgeKind, GraphEdge, GraphNode, NodeLabel, TransactionRecord};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

#[derive(Default)]
struct GraphState {
    nodes: HashMap<String, GraphNode>,
    edges: HashMap<(String, String, EdgeKind), GraphEdge>,
    transactions: HashMap<String, Vec<TransactionRecord>>,
}

/// HashMap-backed [`GraphStore`] with MERGE semantics.
///
/// `set_connected(false)` makes every operation fail with
/// `StoreUnavailable`, which is how tests exercise degraded paths.
pub struct MemoryGraphStore {
    state: RwLock<GraphState>,
    connected: AtomicBool,
}

impl MemoryGraphStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GraphState::default()),
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
            Err(Error::StoreUnavailable("graph store offline".into()))
        }
    }

    /// Total node count across projects (test helper)
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.state.read().nodes.len()
    }
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn upsert_nodes(&self, nodes: &[GraphNode]) -> Result<usize> {
        self.check_connected()?;
        let mut state = self.state.write();
        let mut created = 0;
        for node in nodes {
            if state.nodes.insert(node.id.clone(), node.clone()).is_none() {
                created += 1;
            }
        }
        trace!(upserted = nodes.len(), created, "nodes upserted");
        Ok(created)
    }

    async fn upsert_edges(&self, edges: &[GraphEdge]) -> Result<usize> {
        self.check_connected()?;
        let mut state = self.state.write();
        let mut created = 0;
        for edge in edges {
            if state
                .edges
                .insert(edge.merge_key(), edge.clone())
                .is_none()
            {
                created += 1;
            }
        }
        Ok(created)
    }

    async fn get_node(&self, project_id: &str, id: &str) -> Result<Option<GraphNode>> {
        self.check_connected()?;
        let state = self.state.read();
        Ok(state
            .nodes
            .get(id)
            .filter(|node| node.project_id == project_id)
            .cloned())
    }

    async fn find_nodes(
        &self,
        project_id: &str,
        label: Option<NodeLabel>,
        filter: &PropertyFilter,
    ) -> Result<Vec<GraphNode>> {
        self.check_connected()?;
        let state = self.state.read();
        let mut out: Vec<GraphNode> = state
            .nodes
            .values()
            .filter(|node| node.project_id == project_id)
            .filter(|node| label.is_none_or(|l| node.label == l))
            .filter(|node| filter.matches(node))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn update_node(
        &self,
        project_id: &str,
        id: &str,
        props: Map<String, Value>,
    ) -> Result<bool> {
        self.check_connected()?;
        let mut state = self.state.write();
        let Some(node) = state
            .nodes
            .get_mut(id)
            .filter(|node| node.project_id == project_id)
        else {
            return Ok(false);
        };
        for (key, value) in props {
            node.properties.insert(key, value);
        }
        Ok(true)
    }

    async fn project_edges(&self, project_id: &str) -> Result<Vec<GraphEdge>> {
        self.check_connected()?;
        let state = self.state.read();
        let mut out: Vec<GraphEdge> = state
            .edges
            .values()
            .filter(|edge| edge.project_id == project_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.merge_key().cmp(&b.merge_key()));
        Ok(out)
    }

    async fn delete_code_nodes(&self, project_id: &str) -> Result<usize> {
        self.check_connected()?;
        let mut state = self.state.write();
        let doomed: Vec<String> = state
            .nodes
            .values()
            .filter(|node| {
                node.project_id == project_id
                    && (node.label.is_code() || node.label == NodeLabel::Community)
            })
            .map(|node| node.id.clone())
            .collect();
        for id in &doomed {
            state.nodes.remove(id);
        }
        state
            .edges
            .retain(|(from, to, _), _| !doomed.contains(from) && !doomed.contains(to));
        Ok(doomed.len())
    }

    async fn execute_query(
        &self,
        _query: &str,
        _params: &Map<String, Value>,
    ) -> Result<Vec<Map<String, Value>>> {
        self.check_connected()?;
        Err(Error::Unsupported(
            "the in-memory store has no query language".into(),
        ))
    }

    async fn text_search(
        &self,
        _project_id: &str,
        _query: &str,
        _limit: usize,
    ) -> Result<Option<Vec<(String, f32)>>> {
        self.check_connected()?;
        // No native full-text index; callers fall back to local scoring
        Ok(None)
    }

    async fn record_transaction(&self, tx: &TransactionRecord) -> Result<()> {
        self.check_connected()?;
        let mut state = self.state.write();
        let records = state.transactions.entry(tx.project_id.clone()).or_default();
        match records.iter_mut().find(|r| r.tx_id == tx.tx_id) {
            Some(existing) => *existing = tx.clone(),
            None => records.push(tx.clone()),
        }
        Ok(())
    }

    async fn last_transaction(&self, project_id: &str) -> Result<Option<TransactionRecord>> {
        self.check_connected()?;
        let state = self.state.read();
        Ok(state
            .transactions
            .get(project_id)
            .and_then(|records| records.iter().max_by_key(|r| r.started_at).cloned()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
