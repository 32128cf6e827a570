//! # Test Utilities
//!
//! Shared fixtures for the code intelligence server:
//!
//! - Temporary source workspaces with real files on disk
//! - A fully wired engine stack over the in-memory stores
//! - Parsed-file and node builders

use codeintel_core::coordination::CoordinationEngine;
use codeintel_core::embedding::EmbeddingEngine;
use codeintel_core::episode::EpisodeEngine;
use codeintel_core::index::IndexRegistry;
use codeintel_core::orchestrator::GraphOrchestrator;
use codeintel_core::parser::ParserRegistry;
use codeintel_core::retrieval::HybridRetriever;
use codeintel_core::session::SessionRegistry;
use codeintel_core::types::{GraphNode, NodeLabel, ProjectContext};
use codeintel_store_mem::{MemoryGraphStore, MemoryVectorStore};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A workspace on disk plus the context pointing at it.
///
/// The temp directory lives as long as the fixture.
pub struct FixtureWorkspace {
    pub dir: TempDir,
    pub context: ProjectContext,
}

/// Create a workspace with the given `(relative path, content)` files
/// under `src/` and a context named `project_id`
pub fn workspace_with_files(project_id: &str, files: &[(&str, &str)]) -> FixtureWorkspace {
    let dir = TempDir::new().expect("create temp workspace");
    write_files(dir.path(), files);
    let context = ProjectContext::new(
        dir.path().to_path_buf(),
        Some("src".to_string()),
        Some(project_id.to_string()),
    );
    FixtureWorkspace { dir, context }
}

/// Write files (relative to the workspace root) creating parent dirs
pub fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (rel, content) in files {
        let path = root.join("src").join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture dirs");
        }
        std::fs::write(path, content).expect("write fixture file");
    }
}

/// A small TypeScript project: three files, five functions
pub fn typescript_project(project_id: &str) -> FixtureWorkspace {
    workspace_with_files(
        project_id,
        &[
            (
                "db.ts",
                "export function connect() {}\n\nexport function query(sql: string) {}\n",
            ),
            (
                "auth.ts",
                "import { connect, query } from './db';\n\n\
export function login(user: string) {\n  return query(user);\n}\n\n\
export function logout(user: string) {}\n",
            ),
            (
                "api.ts",
                "import { login } from './auth';\n\n\
export function handleRequest(req: string) {\n  return login(req);\n}\n",
            ),
        ],
    )
}

/// Every engine wired over fresh in-memory stores
pub struct TestStack {
    pub graph: Arc<MemoryGraphStore>,
    pub vectors: Arc<MemoryVectorStore>,
    pub indexes: Arc<IndexRegistry>,
    pub embeddings: Arc<EmbeddingEngine>,
    pub coordination: Arc<CoordinationEngine>,
    pub episodes: EpisodeEngine,
    pub orchestrator: Arc<GraphOrchestrator>,
    pub sessions: Arc<SessionRegistry>,
    pub retriever: HybridRetriever,
}

impl TestStack {
    /// Build the stack; watchers are disabled for determinism
    #[must_use]
    pub fn new() -> Self {
        let graph = Arc::new(MemoryGraphStore::new());
        let vectors = Arc::new(MemoryVectorStore::new());
        let indexes = Arc::new(IndexRegistry::new());
        let parsers = Arc::new(ParserRegistry::with_default_parsers());
        let embeddings = Arc::new(EmbeddingEngine::new(
            Arc::clone(&vectors) as Arc<dyn codeintel_core::store::VectorStore>
        ));
        let coordination = Arc::new(CoordinationEngine::new(
            Arc::clone(&graph) as Arc<dyn codeintel_core::store::GraphStore>
        ));
        let orchestrator = Arc::new(GraphOrchestrator::new(
            Arc::clone(&graph) as Arc<dyn codeintel_core::store::GraphStore>,
            Arc::clone(&embeddings),
            parsers,
            Arc::clone(&indexes),
            Arc::clone(&coordination),
        ));
        let sessions = Arc::new(
            SessionRegistry::new(
                Arc::clone(&indexes),
                Arc::clone(&orchestrator),
                Arc::clone(&graph) as Arc<dyn codeintel_core::store::GraphStore>,
            )
            .without_watchers(),
        );
        let retriever = HybridRetriever::new(
            Arc::clone(&graph) as Arc<dyn codeintel_core::store::GraphStore>,
            Arc::clone(&embeddings),
        );
        let episodes = EpisodeEngine::new(
            Arc::clone(&graph) as Arc<dyn codeintel_core::store::GraphStore>
        );

        Self {
            graph,
            vectors,
            indexes,
            embeddings,
            coordination,
            episodes,
            orchestrator,
            sessions,
            retriever,
        }
    }
}

impl Default for TestStack {
    fn default() -> Self {
        Self::new()
    }
}

/// A function node with sensible properties for engine tests
pub fn function_node(project_id: &str, path: &str, name: &str, line: usize) -> GraphNode {
    GraphNode::new(
        codeintel_core::store::ids::function_node_id(project_id, path, name, line),
        NodeLabel::Function,
        project_id,
    )
    .with_prop("name", name)
    .with_prop("file_path", path)
    .with_prop("start_line", line as i64)
}
