//! MCP server wiring and tool dispatch
//!
//! Resolves each request's session to its project context, hands the
//! engines a fresh index view, and routes the tool call. Conflicts and
//! busy builds are successful results; everything in the §-error
//! taxonomy becomes a structured JSON-RPC error.

use crate::error::to_rpc_error;
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::protocol;
use crate::tools::{
    AgentStatusParams, ArchSuggestParams, ArchValidateParams, CodeExplainParams, ImpactParams,
    QueryLanguage, QueryParams, RebuildParams, ReleaseParams, SemanticSearchParams,
    SetWorkspaceParams, TaskCompleteParams, tool_definitions,
};
use codeintel_core::analysis;
use codeintel_core::coordination::{ClaimInput, CoordinationEngine};
use codeintel_core::embedding::EmbeddingEngine;
use codeintel_core::episode::{EpisodeEngine, EpisodeInput, RecallQuery, ReflectScope};
use codeintel_core::error::{Error, Result};
use codeintel_core::index::IndexRegistry;
use codeintel_core::orchestrator::{GraphOrchestrator, ack_to_value};
use codeintel_core::parser::ParserRegistry;
use codeintel_core::retrieval::{HybridRetriever, RetrievalQuery};
use codeintel_core::session::SessionRegistry;
use codeintel_core::store::{GraphStore, VectorStore};
use codeintel_core::types::{OutputProfile, ProjectContext};
use codeintel_core::{ArchitectureEngine, coordination};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// The assembled code intelligence server
pub struct CodeIntelServer {
    graph: Arc<dyn GraphStore>,
    sessions: Arc<SessionRegistry>,
    orchestrator: Arc<GraphOrchestrator>,
    retriever: HybridRetriever,
    coordination: Arc<CoordinationEngine>,
    episodes: EpisodeEngine,
    embeddings: Arc<EmbeddingEngine>,
    parsers: Arc<ParserRegistry>,
}

impl CodeIntelServer {
    /// Wire every engine over the given stores
    pub fn new(graph: Arc<dyn GraphStore>, vectors: Arc<dyn VectorStore>) -> Self {
        Self::assemble(graph, vectors, true)
    }

    /// Server variant without file watchers (tests, one-shot runs)
    pub fn without_watchers(graph: Arc<dyn GraphStore>, vectors: Arc<dyn VectorStore>) -> Self {
        Self::assemble(graph, vectors, false)
    }

    fn assemble(
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStore>,
        watch: bool,
    ) -> Self {
        let indexes = Arc::new(IndexRegistry::new());
        let parsers = Arc::new(ParserRegistry::with_default_parsers());
        let embeddings = Arc::new(EmbeddingEngine::new(vectors));
        let coordination = Arc::new(CoordinationEngine::new(Arc::clone(&graph)));
        let orchestrator = Arc::new(GraphOrchestrator::new(
            Arc::clone(&graph),
            Arc::clone(&embeddings),
            Arc::clone(&parsers),
            Arc::clone(&indexes),
            Arc::clone(&coordination),
        ));
        let mut sessions =
            SessionRegistry::new(indexes, Arc::clone(&orchestrator), Arc::clone(&graph));
        if !watch {
            sessions = sessions.without_watchers();
        }
        let retriever = HybridRetriever::new(Arc::clone(&graph), Arc::clone(&embeddings));
        let episodes = EpisodeEngine::new(Arc::clone(&graph));

        info!(tools = tool_definitions().len(), "code intelligence server initialized");
        Self {
            graph,
            sessions: Arc::new(sessions),
            orchestrator,
            retriever,
            coordination,
            episodes,
            embeddings,
            parsers,
        }
    }

    /// Session registry handle (used by integration tests)
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Orchestrator handle (used by integration tests)
    #[must_use]
    pub fn orchestrator(&self) -> &Arc<GraphOrchestrator> {
        &self.orchestrator
    }

    /// Handle one JSON-RPC request. Notifications yield no response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        match request.method.as_str() {
            "initialize" => protocol::handle_initialize(&request),
            "notifications/initialized" => None,
            "tools/list" => protocol::handle_list_tools(&request, tool_definitions()),
            "shutdown" => protocol::handle_shutdown(&request),
            "tools/call" => {
                let id = request.id.clone()?;
                let params = request.params.unwrap_or_else(|| json!({}));
                let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
                let arguments = params
                    .get("arguments")
                    .cloned()
                    .unwrap_or_else(|| json!({}));
                Some(self.call_tool(Some(id), name, arguments).await)
            }
            // Direct method calls bypass the tools/call envelope
            _ => {
                let id = request.id.clone()?;
                let method = request.method.clone();
                let arguments = request.params.unwrap_or_else(|| json!({}));
                Some(self.call_tool(Some(id), &method, arguments).await)
            }
        }
    }

    async fn call_tool(&self, id: Option<Value>, name: &str, arguments: Value) -> JsonRpcResponse {
        let session_id = meta_str(&arguments, "session_id");
        let timeout_ms = meta_u64(&arguments, "timeout_ms");
        debug!(tool = name, session = ?session_id, "tool call");

        let fut = self.dispatch(session_id.as_deref(), name, arguments);
        let outcome = match timeout_ms {
            // A zero deadline is already expired
            Some(0) => Err(Error::Timeout),
            Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), fut).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout),
            },
            None => fut.await,
        };

        match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => JsonRpcResponse::failure(id, to_rpc_error(&err)),
        }
    }

    /// Route a resolved `{session_id, method, params}` triple
    pub async fn dispatch(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Value> {
        match method {
            "set_workspace" => {
                let p: SetWorkspaceParams = parse(params)?;
                let context = ProjectContext::new(p.workspace_root, p.source_dir, p.project_id);
                let status = self.sessions.set_workspace(session_id, context)?;
                Ok(serde_json::to_value(status)?)
            }
            "rebuild" => {
                let p: RebuildParams = parse(params)?;
                let ctx = self.sessions.resolve(session_id)?;
                if p.verbose {
                    info!(project_id = %ctx.project_id, mode = ?p.mode, "verbose rebuild requested");
                }
                let ack = Arc::clone(&self.orchestrator).request_build(ctx, p.mode);
                Ok(ack_to_value(&ack))
            }
            "health" => {
                let ctx = self.sessions.resolve(session_id)?;
                let report = self.orchestrator.health(&ctx).await?;
                Ok(serde_json::to_value(report)?)
            }
            "query" => {
                let p: QueryParams = parse(params)?;
                let ctx = self.sessions.resolve(session_id)?;
                match p.language {
                    QueryLanguage::Cypher => self.raw_query(&p.query).await,
                    QueryLanguage::Natural => {
                        let index = self.sessions.index_for(&ctx).await?;
                        let response = self
                            .retriever
                            .retrieve(
                                &ctx.project_id,
                                &index,
                                &RetrievalQuery {
                                    text: p.query,
                                    mode: p.mode,
                                    limit: p.limit,
                                    profile: p.profile,
                                },
                            )
                            .await?;
                        Ok(serde_json::to_value(response)?)
                    }
                }
            }
            "code_explain" => {
                let p: CodeExplainParams = parse(params)?;
                let ctx = self.sessions.resolve(session_id)?;
                let index = self.sessions.index_for(&ctx).await?;
                let explanation = analysis::explain(&index, &p.symbol, p.depth)?;
                Ok(serde_json::to_value(explanation)?)
            }
            "impact_analyze" => {
                let p: ImpactParams = parse(params)?;
                let ctx = self.sessions.resolve(session_id)?;
                let index = self.sessions.index_for(&ctx).await?;
                let report = analysis::impact(&index, &ctx.project_id, &p.changed_files);
                Ok(serde_json::to_value(report)?)
            }
            "semantic_search" => {
                let p: SemanticSearchParams = parse(params)?;
                let ctx = self.sessions.resolve(session_id)?;
                let limit = p.limit.clamp(1, 100);
                let hits = match (&p.query, &p.symbol) {
                    (Some(query), _) => {
                        self.embeddings
                            .find_similar_text(&ctx.project_id, query, limit)
                            .await?
                    }
                    (None, Some(symbol)) => {
                        self.embeddings
                            .find_similar_symbol(&ctx.project_id, symbol, limit)
                            .await?
                    }
                    (None, None) => {
                        return Err(Error::InvalidArguments(
                            "semantic_search needs a query or a symbol".into(),
                        ));
                    }
                };
                let shaped: Vec<Value> = hits
                    .into_iter()
                    .map(|h| json!({ "id": h.original_id, "score": h.score }))
                    .collect();
                Ok(json!({ "hits": shaped }))
            }
            "agent_claim" => {
                let p: ClaimInput = parse(params)?;
                let ctx = self.sessions.resolve(session_id)?;
                let result = self.coordination.claim(&ctx.project_id, &p).await?;
                Ok(serde_json::to_value(result)?)
            }
            "agent_release" => {
                let p: ReleaseParams = parse(params)?;
                let ctx = self.sessions.resolve(session_id)?;
                let result = self
                    .coordination
                    .release(&ctx.project_id, &p.claim_id, p.outcome.as_deref())
                    .await?;
                Ok(serde_json::to_value(result)?)
            }
            "agent_status" => {
                let p: AgentStatusParams = parse(params)?;
                let ctx = self.sessions.resolve(session_id)?;
                let status = self.coordination.status(&ctx.project_id, &p.agent_id).await?;
                Ok(shape_status(status, p.profile))
            }
            "coordination_overview" => {
                let ctx = self.sessions.resolve(session_id)?;
                let overview = self.coordination.overview(&ctx.project_id).await?;
                Ok(serde_json::to_value(overview)?)
            }
            "task_complete" => {
                let p: TaskCompleteParams = parse(params)?;
                let ctx = self.sessions.resolve(session_id)?;
                let closed = self
                    .coordination
                    .on_task_completed(&ctx.project_id, &p.task_id, &p.agent_id)
                    .await?;
                Ok(json!({ "closed": closed }))
            }
            "episode_add" => {
                let p: EpisodeInput = parse(params)?;
                let ctx = self.sessions.resolve(session_id)?;
                let episode_id = self.episodes.add(&ctx.project_id, &p).await?;
                Ok(json!({ "episode_id": episode_id }))
            }
            "episode_recall" => {
                let p: RecallQuery = parse(params)?;
                let ctx = self.sessions.resolve(session_id)?;
                let episodes = self.episodes.recall(&ctx.project_id, &p).await?;
                Ok(serde_json::to_value(episodes)?)
            }
            "episode_reflect" => {
                let p: ReflectScope = parse(params)?;
                let ctx = self.sessions.resolve(session_id)?;
                let reflection = self.episodes.reflect(&ctx.project_id, &p).await?;
                Ok(serde_json::to_value(reflection)?)
            }
            "arch_validate" => {
                let p: ArchValidateParams = parse(params)?;
                let ctx = self.sessions.resolve(session_id)?;
                let engine = ArchitectureEngine::for_workspace(&ctx, Arc::clone(&self.parsers))?;
                let report = engine.validate(&ctx, p.files).await?;
                Ok(serde_json::to_value(report)?)
            }
            "arch_suggest" => {
                let p: ArchSuggestParams = parse(params)?;
                let ctx = self.sessions.resolve(session_id)?;
                let engine = ArchitectureEngine::for_workspace(&ctx, Arc::clone(&self.parsers))?;
                let suggestion = engine.suggest(&p.code_name, &p.code_type, &p.deps);
                Ok(serde_json::to_value(suggestion)?)
            }
            other => Err(Error::Unsupported(format!("unknown tool: {other}"))),
        }
    }

    /// Raw parameterized query passthrough for stores with a query
    /// language. User text is always a parameter, never concatenated.
    async fn raw_query(&self, query: &str) -> Result<Value> {
        let rows = self.graph.execute_query(query, &Map::new()).await?;
        Ok(json!({ "rows": rows }))
    }
}

/// Deserialize tool params, mapping failures to `InvalidArguments`
fn parse<T: DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| Error::InvalidArguments(e.to_string()))
}

fn meta_str(arguments: &Value, key: &str) -> Option<String> {
    arguments
        .get("_meta")
        .and_then(|meta| meta.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn meta_u64(arguments: &Value, key: &str) -> Option<u64> {
    arguments
        .get("_meta")
        .and_then(|meta| meta.get(key))
        .and_then(Value::as_u64)
}

/// Compact status drops the episode bodies; balanced and debug keep them
fn shape_status(status: coordination::AgentStatus, profile: OutputProfile) -> Value {
    match serde_json::to_value(&status) {
        Ok(mut value) => {
            if profile == OutputProfile::Compact
                && let Some(obj) = value.as_object_mut()
            {
                obj.remove("recent_episodes");
            }
            value
        }
        Err(_) => json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeintel_store_mem::{MemoryGraphStore, MemoryVectorStore};

    fn server() -> CodeIntelServer {
        CodeIntelServer::without_watchers(
            Arc::new(MemoryGraphStore::new()),
            Arc::new(MemoryVectorStore::new()),
        )
    }

    #[tokio::test]
    async fn test_unknown_tool_is_unsupported() {
        let server = server();
        let err = server
            .dispatch(None, "no_such_tool", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_tool_without_workspace_fails() {
        let server = server();
        let err = server
            .dispatch(Some("s1"), "rebuild", json!({"mode": "full"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_meta_extraction() {
        let arguments = json!({
            "query": "x",
            "_meta": { "session_id": "s9", "timeout_ms": 250 }
        });
        assert_eq!(meta_str(&arguments, "session_id").as_deref(), Some("s9"));
        assert_eq!(meta_u64(&arguments, "timeout_ms"), Some(250));
    }

    #[tokio::test]
    async fn test_initialize_handshake() {
        let server = server();
        let request = JsonRpcRequest {
            jsonrpc: Some("2.0".into()),
            id: Some(json!(1)),
            method: "initialize".into(),
            params: Some(json!({"protocolVersion": "2025-11-25"})),
        };
        let response = server.handle_request(request).await.unwrap();
        assert!(response.result.is_some());
    }
}
