//! # Graph Orchestrator
//!
//! Owns the build pipeline: discovery → parse → mutate → batch write →
//! post-build hooks → index sync. Builds are non-blocking: callers get a
//! QUEUED acknowledgement and a worker runs the pipeline; one build per
//! project may be in flight and competing requests coalesce as BUSY.
//!
//! Pipeline ordering and the post-batch hook sequence (staleness
//! invalidation, community detection, embedding generation) are fixed;
//! see `execute` for the single place that encodes it.

use crate::builder::GraphBuilder;
use crate::constants::build::{DEFAULT_EXCLUDES, MANIFEST_PATH};
use crate::coordination::CoordinationEngine;
use crate::embedding::EmbeddingEngine;
use crate::error::{Error, Result};
use crate::index::IndexRegistry;
use crate::parser::ParserRegistry;
use crate::store::{GraphStore, ids};
use crate::types::{
    BuildAck, BuildAckStatus, BuildMode, BuildResult, GraphEdge, GraphNode, IndexStats, NodeLabel,
    ParsedFile, ProjectContext, TransactionRecord, TxStatus, normalize_rel_path, now_ms,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// Symbols are embedded in chunks with a yield between them so long
/// builds do not starve interactive queries
const EMBED_CHUNK: usize = 256;

/// Health snapshot for the `health` tool
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub graph_connected: bool,
    pub vector_connected: bool,
    pub index_stats: IndexStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tx: Option<TransactionRecord>,
    pub drift_detected: bool,
}

/// Drives full and incremental rebuilds for every project
pub struct GraphOrchestrator {
    graph: Arc<dyn GraphStore>,
    embeddings: Arc<EmbeddingEngine>,
    parsers: Arc<ParserRegistry>,
    indexes: Arc<IndexRegistry>,
    coordination: Arc<CoordinationEngine>,
    /// Projects with a build in flight, mapped to the running tx
    active: Mutex<HashMap<String, Uuid>>,
    excludes: Vec<String>,
}

impl GraphOrchestrator {
    /// Orchestrator over the shared stores and engines
    pub fn new(
        graph: Arc<dyn GraphStore>,
        embeddings: Arc<EmbeddingEngine>,
        parsers: Arc<ParserRegistry>,
        indexes: Arc<IndexRegistry>,
        coordination: Arc<CoordinationEngine>,
    ) -> Self {
        Self {
            graph,
            embeddings,
            parsers,
            indexes,
            coordination,
            active: Mutex::new(HashMap::new()),
            excludes: DEFAULT_EXCLUDES.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Queue a build and return immediately.
    ///
    /// Returns BUSY with the running transaction id when the project
    /// already has a build in flight.
    pub fn request_build(self: Arc<Self>, ctx: ProjectContext, mode: BuildMode) -> BuildAck {
        let tx_id = Uuid::new_v4();
        {
            let mut active = self.active.lock();
            if let Some(running) = active.get(&ctx.project_id) {
                return BuildAck {
                    status: BuildAckStatus::Busy,
                    tx_id: *running,
                };
            }
            active.insert(ctx.project_id.clone(), tx_id);
        }

        let this = Arc::clone(&self);
        tokio::spawn(async move {
            let project_id = ctx.project_id.clone();
            if let Err(err) = this.execute(&ctx, mode, tx_id).await {
                error!(project_id = %project_id, %err, "build failed");
            }
            this.active.lock().remove(&project_id);
        });

        BuildAck {
            status: BuildAckStatus::Queued,
            tx_id,
        }
    }

    /// Run a build to completion on the caller's task. Used by tests and
    /// the watcher; tool calls go through [`Self::request_build`].
    pub async fn build_and_wait(
        &self,
        ctx: &ProjectContext,
        mode: BuildMode,
    ) -> Result<BuildResult> {
        let tx_id = Uuid::new_v4();
        {
            let mut active = self.active.lock();
            if let Some(running) = active.get(&ctx.project_id) {
                return Err(Error::InvalidArguments(format!(
                    "build already running for {} (tx {running})",
                    ctx.project_id
                )));
            }
            active.insert(ctx.project_id.clone(), tx_id);
        }
        let result = self.execute(ctx, mode, tx_id).await;
        self.active.lock().remove(&ctx.project_id);
        result
    }

    /// Index snapshot for the project
    pub fn get_statistics(&self, project_id: &str) -> IndexStats {
        self.indexes.get_or_create(project_id).read().statistics()
    }

    /// Health report combining store connectivity, index stats, the last
    /// transaction, and manifest drift
    pub async fn health(&self, ctx: &ProjectContext) -> Result<HealthReport> {
        let index_stats = self.get_statistics(&ctx.project_id);
        let last_tx = self.graph.last_transaction(&ctx.project_id).await?;
        let drift_detected = self.detect_drift(ctx).await?;
        Ok(HealthReport {
            graph_connected: self.graph.is_connected(),
            vector_connected: self.embeddings.is_connected(),
            index_stats,
            last_tx,
            drift_detected,
        })
    }

    /// The pipeline. Fatal store errors abort the build but still close
    /// the transaction record as failed.
    async fn execute(
        &self,
        ctx: &ProjectContext,
        mode: BuildMode,
        tx_id: Uuid,
    ) -> Result<BuildResult> {
        let started = Instant::now();
        let mut tx = TransactionRecord::open(&ctx.project_id, mode);
        tx.tx_id = tx_id;
        self.graph.record_transaction(&tx).await?;
        info!(project_id = %ctx.project_id, %tx_id, ?mode, "build started");

        match self.run_pipeline(ctx, mode, tx_id).await {
            Ok(mut result) => {
                tx.stats.insert("files".into(), result.files_processed as u64);
                tx.stats.insert("nodes".into(), result.nodes_created as u64);
                tx.stats.insert("edges".into(), result.edges_created as u64);
                tx.close(TxStatus::Succeeded, None);
                self.graph.record_transaction(&tx).await?;
                result.duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    project_id = %ctx.project_id,
                    %tx_id,
                    files = result.files_processed,
                    nodes = result.nodes_created,
                    edges = result.edges_created,
                    duration_ms = result.duration_ms,
                    "build finished"
                );
                Ok(result)
            }
            Err(err) => {
                tx.close(TxStatus::Failed, Some(err.to_string()));
                // Best effort: the store that failed the batch may also
                // refuse the closing record
                if let Err(record_err) = self.graph.record_transaction(&tx).await {
                    warn!(%record_err, "failed to persist failed transaction record");
                }
                Err(err)
            }
        }
    }

    async fn run_pipeline(
        &self,
        ctx: &ProjectContext,
        mode: BuildMode,
        tx_id: Uuid,
    ) -> Result<BuildResult> {
        let project_id = ctx.project_id.clone();
        let mut warnings: Vec<String> = Vec::new();
        let errors: Vec<String> = Vec::new();

        // 1. Discovery, stable-sorted for determinism
        let discovered = self.discover(ctx).await?;

        // Incremental builds narrow to files whose hash changed
        let (to_parse, all_paths) = match mode {
            BuildMode::Full => {
                let paths: HashSet<String> =
                    discovered.iter().map(|(path, _)| path.clone()).collect();
                (discovered, paths)
            }
            BuildMode::Incremental => {
                let paths: HashSet<String> =
                    discovered.iter().map(|(path, _)| path.clone()).collect();
                let known = self.known_hashes(ctx).await?;
                let changed: Vec<(String, Vec<u8>)> = discovered
                    .into_iter()
                    .filter(|(path, bytes)| {
                        known.get(path).is_none_or(|hash| *hash != ids::content_hash(bytes))
                    })
                    .collect();
                (changed, paths)
            }
        };

        if mode == BuildMode::Full {
            // Clear derived state before rebuilding from scratch
            self.indexes.clear_project(&project_id);
            self.graph.delete_code_nodes(&project_id).await?;
            self.embeddings.purge_project(&project_id).await?;
        }

        // 2. Parse; per-file failures degrade, they never abort
        let mut parsed_files: Vec<ParsedFile> = Vec::with_capacity(to_parse.len());
        for (path, bytes) in &to_parse {
            match self.parsers.parse_file(bytes, path) {
                Ok(parsed) => parsed_files.push(parsed),
                Err(err) => {
                    warnings.push(err.to_string());
                    parsed_files.push(ParsedFile::file_only(path.clone(), "unknown", bytes));
                }
            }
        }

        // 3. Mutations
        let builder = GraphBuilder::new(&project_id);
        let stamp = now_ms();
        let mut nodes: Vec<GraphNode> = Vec::new();
        let mut edges: Vec<GraphEdge> = Vec::new();
        for parsed in &parsed_files {
            let muts = builder.build_file(parsed, stamp);
            nodes.extend(muts.nodes);
            edges.extend(muts.edges);
        }
        let known_refs: HashSet<&str> = all_paths.iter().map(String::as_str).collect();
        edges.extend(builder.build_dependencies_against(&parsed_files, &known_refs));

        // 4. One batch against the store
        let nodes_created = self.graph.upsert_nodes(&nodes).await?;
        let edges_created = self.graph.upsert_edges(&edges).await?;

        // 5. Post-batch hooks, in order
        let stale = self.coordination.invalidate_stale(&project_id).await?;
        if stale > 0 {
            debug!(project_id = %project_id, stale, "post-build staleness pass");
        }
        let community = self.detect_communities(&project_id, &nodes, &edges).await?;
        nodes.extend(community.0);
        edges.extend(community.1);

        let symbols: Vec<GraphNode> = nodes
            .iter()
            .filter(|n| matches!(n.label, NodeLabel::Function | NodeLabel::Class))
            .cloned()
            .collect();
        for chunk in symbols.chunks(EMBED_CHUNK) {
            self.embeddings.generate(&project_id, chunk).await?;
            tokio::task::yield_now().await;
        }

        // 6. Index sync mirrors everything written this build
        let index = self.indexes.get_or_create(&project_id);
        {
            let mut guard = index.write();
            for node in &nodes {
                guard.add_node(node.clone());
            }
            for edge in &edges {
                guard.add_edge(edge.clone());
            }
        }

        self.write_manifest(ctx).await?;

        Ok(BuildResult {
            files_processed: parsed_files.len(),
            nodes_created,
            edges_created,
            duration_ms: 0,
            errors,
            warnings,
            tx_id,
            mode,
        })
    }

    /// Walk the source tree off the async runtime; returns
    /// `(relative path, bytes)` sorted by path
    async fn discover(&self, ctx: &ProjectContext) -> Result<Vec<(String, Vec<u8>)>> {
        let root = ctx.source_root();
        let excludes = self.excludes.clone();
        let files = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<(String, Vec<u8>)>> {
            let mut out = Vec::new();
            if !root.exists() {
                return Ok(out);
            }
            let walker = WalkDir::new(&root).into_iter().filter_entry(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_none_or(|name| !excludes.iter().any(|ex| ex == name))
            });
            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(_) => continue,
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = entry
                    .path()
                    .strip_prefix(&root)
                    .map(normalize_rel_path)
                    .unwrap_or_else(|_| entry.path().display().to_string());
                let bytes = std::fs::read(entry.path())?;
                out.push((rel, bytes));
            }
            out.sort_by(|a, b| a.0.cmp(&b.0));
            Ok(out)
        })
        .await
        .map_err(|e| Error::StoreUnavailable(format!("discovery task failed: {e}")))??;
        Ok(files)
    }

    /// Known content hashes: the advisory manifest when readable, else
    /// the FILE nodes' `content_hash` properties
    async fn known_hashes(&self, ctx: &ProjectContext) -> Result<HashMap<String, String>> {
        if let Some(manifest) = read_manifest(&ctx.workspace_root) {
            return Ok(manifest);
        }
        let files = self
            .graph
            .find_nodes(&ctx.project_id, Some(NodeLabel::File), &crate::store::PropertyFilter::new())
            .await?;
        Ok(files
            .into_iter()
            .filter_map(|node| {
                let path = node.prop_str("path")?.to_string();
                let hash = node.content_hash.clone()?;
                Some((path, hash))
            })
            .collect())
    }

    /// Connected components over DEPENDS_ON among FILE nodes; components
    /// with at least two files become COMMUNITY nodes
    async fn detect_communities(
        &self,
        project_id: &str,
        nodes: &[GraphNode],
        edges: &[GraphEdge],
    ) -> Result<(Vec<GraphNode>, Vec<GraphEdge>)> {
        let file_ids: Vec<&str> = nodes
            .iter()
            .filter(|n| n.label == NodeLabel::File)
            .map(|n| n.id.as_str())
            .collect();
        if file_ids.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        let file_set: HashSet<&str> = file_ids.iter().copied().collect();

        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in edges {
            if !matches!(edge.kind, crate::types::EdgeKind::DependsOn) {
                continue;
            }
            if file_set.contains(edge.from_id.as_str()) && file_set.contains(edge.to_id.as_str()) {
                adjacency
                    .entry(edge.from_id.as_str())
                    .or_default()
                    .push(edge.to_id.as_str());
                adjacency
                    .entry(edge.to_id.as_str())
                    .or_default()
                    .push(edge.from_id.as_str());
            }
        }

        let mut assigned: HashMap<&str, usize> = HashMap::new();
        let mut component = 0usize;
        for start in &file_ids {
            if assigned.contains_key(start) {
                continue;
            }
            let mut stack = vec![*start];
            while let Some(id) = stack.pop() {
                if assigned.insert(id, component).is_some() {
                    continue;
                }
                if let Some(neighbors) = adjacency.get(id) {
                    stack.extend(neighbors.iter().copied());
                }
            }
            component += 1;
        }

        let mut members: HashMap<usize, Vec<&str>> = HashMap::new();
        for (id, comp) in &assigned {
            members.entry(*comp).or_default().push(id);
        }

        let mut new_nodes = Vec::new();
        let mut new_edges = Vec::new();
        let mut ordinal = 0usize;
        let mut comps: Vec<_> = members.into_iter().collect();
        comps.sort_by_key(|(comp, _)| *comp);
        for (_, mut files) in comps {
            if files.len() < 2 {
                continue;
            }
            files.sort_unstable();
            let community_id = ids::community_node_id(project_id, ordinal);
            let mut node = GraphNode::new(&community_id, NodeLabel::Community, project_id)
                .with_prop("name", format!("community-{ordinal}"))
                .with_prop("size", files.len() as i64);
            node.valid_from = now_ms();
            new_nodes.push(node);
            for file in files {
                new_edges.push(GraphEdge::new(
                    file,
                    &community_id,
                    crate::types::EdgeKind::BelongsTo,
                    project_id,
                ));
            }
            ordinal += 1;
        }
        if ordinal > 0 {
            self.graph.upsert_nodes(&new_nodes).await?;
            self.graph.upsert_edges(&new_edges).await?;
        }
        Ok((new_nodes, new_edges))
    }

    /// Rewrite the advisory manifest from the current tree
    async fn write_manifest(&self, ctx: &ProjectContext) -> Result<()> {
        let discovered = self.discover(ctx).await?;
        let manifest: HashMap<String, String> = discovered
            .iter()
            .map(|(path, bytes)| (path.clone(), ids::content_hash(bytes)))
            .collect();
        let path = ctx.workspace_root.join(MANIFEST_PATH);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(&manifest)?;
        tokio::fs::write(&path, body).await?;
        Ok(())
    }

    /// Drift: FILE nodes whose stored hash no longer matches the
    /// manifest entry for the same path
    async fn detect_drift(&self, ctx: &ProjectContext) -> Result<bool> {
        let Some(manifest) = read_manifest(&ctx.workspace_root) else {
            return Ok(false);
        };
        let files = self
            .graph
            .find_nodes(&ctx.project_id, Some(NodeLabel::File), &crate::store::PropertyFilter::new())
            .await?;
        for node in files {
            let (Some(path), Some(hash)) = (node.prop_str("path"), node.content_hash.as_ref())
            else {
                continue;
            };
            if manifest.get(path).is_some_and(|m| m != hash) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn read_manifest(workspace_root: &Path) -> Option<HashMap<String, String>> {
    let bytes = std::fs::read(workspace_root.join(MANIFEST_PATH)).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Serialize a build ack with bounds-checked integers for the RPC layer
#[must_use]
pub fn ack_to_value(ack: &BuildAck) -> Value {
    serde_json::json!({
        "status": ack.status,
        "tx_id": ack.tx_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_to_value_shape() {
        let ack = BuildAck {
            status: BuildAckStatus::Queued,
            tx_id: Uuid::nil(),
        };
        let value = ack_to_value(&ack);
        assert_eq!(value["status"], "QUEUED");
        assert_eq!(value["tx_id"], Uuid::nil().to_string());
    }
}
