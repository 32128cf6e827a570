#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_docs_in_private_items)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]

//! # Codeintel Core
//!
//! Core engines of the code intelligence server: a long-running process
//! that ingests a source repository into a hybrid graph + vector +
//! lexical index, serves tool calls from coding agents, and maintains
//! agent coordination state across concurrent sessions.
//!
//! ## Subsystems
//!
//! - [`session`]: session-scoped project contexts and file watchers
//! - [`orchestrator`]: the incremental graph build pipeline
//! - [`retrieval`]: hybrid vector + lexical + graph retrieval with RRF
//! - [`coordination`]: agent claims with conflict and staleness handling
//! - [`episode`]: append-only episodic memory with ranked recall
//! - [`architecture`]: layer rules, violations, and placement advice
//!
//! ## Support modules
//!
//! - [`types`]: the shared data model (nodes, edges, contexts, results)
//! - [`store`]: adapter contracts over the graph and vector databases
//! - [`parser`]: per-language dispatch producing neutral parse results
//! - [`index`]: the per-project in-memory index and its LRU registry
//! - [`builder`]: parsed file → idempotent graph mutations
//! - [`embedding`]: symbol embeddings and the string/u32 id bridge
//! - [`analysis`]: symbol explanation and impact analysis
//!
//! ## Ownership
//!
//! The graph store is the source of truth; every in-memory index is a
//! derived, project-scoped cache owned by one [`index::IndexRegistry`].
//! Engines are stateless over the stores and receive their index view
//! per call from the [`session::SessionRegistry`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use codeintel_core::{
//!     coordination::CoordinationEngine,
//!     embedding::EmbeddingEngine,
//!     index::IndexRegistry,
//!     orchestrator::GraphOrchestrator,
//!     parser::ParserRegistry,
//!     session::SessionRegistry,
//!     store::{GraphStore, VectorStore},
//!     types::{BuildMode, ProjectContext},
//! };
//!
//! async fn rebuild(
//!     graph: Arc<dyn GraphStore>,
//!     vectors: Arc<dyn VectorStore>,
//! ) -> codeintel_core::Result<()> {
//!     let indexes = Arc::new(IndexRegistry::new());
//!     let embeddings = Arc::new(EmbeddingEngine::new(vectors));
//!     let coordination = Arc::new(CoordinationEngine::new(Arc::clone(&graph)));
//!     let orchestrator = Arc::new(GraphOrchestrator::new(
//!         Arc::clone(&graph),
//!         embeddings,
//!         Arc::new(ParserRegistry::with_default_parsers()),
//!         Arc::clone(&indexes),
//!         coordination,
//!     ));
//!     let sessions = SessionRegistry::new(indexes, Arc::clone(&orchestrator), graph);
//!
//!     let ctx = ProjectContext::new("/work/app", None, None);
//!     sessions.set_workspace(Some("session-1"), ctx.clone())?;
//!     orchestrator.build_and_wait(&ctx, BuildMode::Full).await?;
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod architecture;
pub mod builder;
pub mod constants;
pub mod coordination;
pub mod embedding;
pub mod episode;
pub mod error;
pub mod index;
pub mod orchestrator;
pub mod parser;
pub mod retrieval;
pub mod session;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use analysis::{ImpactReport, SymbolExplanation};
pub use architecture::{ArchitectureConfig, ArchitectureEngine, ValidationReport};
pub use builder::GraphBuilder;
pub use coordination::{ClaimInput, ClaimResult, CoordinationEngine};
pub use embedding::{Embedder, EmbeddingEngine, HashProjectionEmbedder};
pub use episode::{EpisodeEngine, EpisodeInput, RecallQuery};
pub use error::{Error, Result};
pub use index::{InMemoryIndex, IndexRegistry, SharedIndex};
pub use orchestrator::{GraphOrchestrator, HealthReport};
pub use parser::{Parser, ParserRegistry};
pub use retrieval::{HybridRetriever, RetrievalQuery, RetrievalResponse};
pub use session::SessionRegistry;
pub use store::{GraphStore, PayloadFilter, PropertyFilter, ScoredPoint, VectorPoint, VectorStore};
pub use types::{
    BuildAck, BuildMode, BuildResult, GraphEdge, GraphNode, IndexStats, NodeLabel, OutputProfile,
    ParsedFile, ProjectContext, TransactionRecord,
};
