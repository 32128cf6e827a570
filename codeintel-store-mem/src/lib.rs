//! # Codeintel Store - In-Memory
//!
//! HashMap-backed implementations of the [`codeintel_core::store`]
//! contracts: a labeled-property-graph store and a brute-force cosine
//! vector store. They power standalone operation and every integration
//! test; external driver crates replace them in production deployments.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use codeintel_store_mem::{MemoryGraphStore, MemoryVectorStore};
//! use codeintel_core::store::{GraphStore, VectorStore};
//!
//! let graph: Arc<dyn GraphStore> = Arc::new(MemoryGraphStore::new());
//! let vectors: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());
//! ```

mod graph;
mod vector;

pub use graph::MemoryGraphStore;
pub use vector::MemoryVectorStore;
