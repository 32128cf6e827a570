//! Code intelligence MCP server binary
//!
//! Reads JSON-RPC requests from stdin (line-delimited or Content-Length
//! framed) and writes responses to stdout. All logging goes to stderr so
//! the protocol stream stays clean.

use anyhow::Result;
use clap::Parser;
use codeintel_mcp::jsonrpc::{self, JsonRpcRequest};
use codeintel_mcp::server::CodeIntelServer;
use codeintel_store_mem::{MemoryGraphStore, MemoryVectorStore};
use std::io::{BufReader, Write};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "codeintel-mcp-server")]
#[command(about = "Code intelligence server speaking MCP over stdio")]
struct Args {
    /// Bind the default session to this workspace at startup
    #[arg(long)]
    workspace: Option<String>,

    /// Source directory relative to the workspace root
    #[arg(long)]
    source_dir: Option<String>,

    /// Project id override (defaults to the workspace directory name)
    #[arg(long)]
    project_id: Option<String>,

    /// Disable file watchers (one-shot indexing runs)
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let graph = Arc::new(MemoryGraphStore::new());
    let vectors = Arc::new(MemoryVectorStore::new());
    let server = if args.no_watch {
        CodeIntelServer::without_watchers(graph, vectors)
    } else {
        CodeIntelServer::new(graph, vectors)
    };

    if let Some(workspace) = &args.workspace {
        let params = serde_json::json!({
            "workspace_root": workspace,
            "source_dir": args.source_dir,
            "project_id": args.project_id,
        });
        match server.dispatch(None, "set_workspace", params).await {
            Ok(_) => info!(workspace, "default workspace bound"),
            Err(err) => warn!(%err, "failed to bind default workspace"),
        }
    }

    info!("codeintel-mcp-server listening on stdio");
    serve_stdio(&server).await
}

/// Request loop: stdin is read on a blocking thread, requests are
/// handled in arrival order so per-session ordering holds
async fn serve_stdio(server: &CodeIntelServer) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::channel::<(String, bool)>(64);

    let reader_handle = tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        let mut reader = BufReader::new(stdin.lock());
        loop {
            match jsonrpc::read_next_message(&mut reader) {
                Ok(Some(message)) => {
                    if tx.blocking_send(message).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    error!(%err, "stdin read failed");
                    break;
                }
            }
        }
    });

    let stdout = std::io::stdout();
    while let Some((message, framed)) = rx.recv().await {
        let request: JsonRpcRequest = match serde_json::from_str(&message) {
            Ok(request) => request,
            Err(err) => {
                warn!(%err, "malformed request skipped");
                continue;
            }
        };
        let shutting_down = request.method == "shutdown";

        if let Some(response) = server.handle_request(request).await {
            let body = serde_json::to_string(&response)?;
            let mut out = stdout.lock();
            jsonrpc::write_message(&mut out, &body, framed)?;
            out.flush()?;
        }
        if shutting_down {
            break;
        }
    }

    reader_handle.abort();
    info!("server stopped");
    Ok(())
}
