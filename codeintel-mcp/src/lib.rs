//! # Codeintel MCP
//!
//! Model Context Protocol server exposing the code intelligence engines
//! to coding agents over JSON-RPC 2.0 on stdio.
//!
//! The transport accepts already-framed requests; the core consumes a
//! resolved `{session_id, method, params}` triple. Session identity
//! travels in `params._meta.session_id`; a null session maps to the
//! process-wide default context.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use codeintel_mcp::server::CodeIntelServer;
//! use codeintel_store_mem::{MemoryGraphStore, MemoryVectorStore};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let server = CodeIntelServer::new(
//!     Arc::new(MemoryGraphStore::new()),
//!     Arc::new(MemoryVectorStore::new()),
//! );
//! let result = server
//!     .dispatch(None, "set_workspace", json!({"workspace_root": "/work/app"}))
//!     .await?;
//! println!("{result}");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod jsonrpc;
pub mod protocol;
pub mod server;
pub mod tools;

pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use protocol::{McpTool, SUPPORTED_VERSIONS};
pub use server::CodeIntelServer;
pub use tools::tool_definitions;
