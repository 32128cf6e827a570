//! Tool surface definitions
//!
//! Parameter types for every exposed tool plus the schema listing served
//! by `tools/list`. Every tool accepts a `profile` (compact | balanced |
//! debug) controlling output shape, and an optional `_meta` block with
//! `session_id` and `timeout_ms`.

use crate::protocol::McpTool;
use codeintel_core::types::{BuildMode, OutputProfile};
use serde::Deserialize;
use serde_json::json;

/// `set_workspace` parameters
#[derive(Debug, Deserialize)]
pub struct SetWorkspaceParams {
    pub workspace_root: String,
    #[serde(default)]
    pub source_dir: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

/// `rebuild` parameters
#[derive(Debug, Deserialize)]
pub struct RebuildParams {
    pub mode: BuildMode,
    /// Emit per-file progress to the server log
    #[serde(default)]
    pub verbose: bool,
}

/// `query` parameters
#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub query: String,
    #[serde(default)]
    pub language: QueryLanguage,
    #[serde(default)]
    pub mode: codeintel_core::retrieval::RetrievalMode,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub profile: OutputProfile,
}

/// Natural-language retrieval or raw parameterized cypher passthrough
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryLanguage {
    #[default]
    Natural,
    Cypher,
}

/// `code_explain` parameters
#[derive(Debug, Deserialize)]
pub struct CodeExplainParams {
    pub symbol: String,
    #[serde(default = "default_depth")]
    pub depth: usize,
}

/// `impact_analyze` parameters
#[derive(Debug, Deserialize)]
pub struct ImpactParams {
    pub changed_files: Vec<String>,
}

/// `semantic_search` parameters: free text, or a symbol id to find the
/// neighborhood of an existing node
#[derive(Debug, Deserialize)]
pub struct SemanticSearchParams {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// `agent_release` parameters
#[derive(Debug, Deserialize)]
pub struct ReleaseParams {
    pub claim_id: String,
    #[serde(default)]
    pub outcome: Option<String>,
}

/// `agent_status` parameters
#[derive(Debug, Deserialize)]
pub struct AgentStatusParams {
    pub agent_id: String,
    #[serde(default)]
    pub profile: OutputProfile,
}

/// `task_complete` parameters
#[derive(Debug, Deserialize)]
pub struct TaskCompleteParams {
    pub task_id: String,
    pub agent_id: String,
}

/// `arch_validate` parameters
#[derive(Debug, Default, Deserialize)]
pub struct ArchValidateParams {
    #[serde(default)]
    pub files: Option<Vec<String>>,
}

/// `arch_suggest` parameters
#[derive(Debug, Deserialize)]
pub struct ArchSuggestParams {
    pub code_name: String,
    pub code_type: String,
    #[serde(default)]
    pub deps: Vec<String>,
}

fn default_limit() -> usize {
    10
}

fn default_depth() -> usize {
    1
}

/// The tool listing served by `tools/list`
#[must_use]
pub fn tool_definitions() -> Vec<McpTool> {
    fn profile_schema() -> serde_json::Value {
        json!({
            "type": "string",
            "enum": ["compact", "balanced", "debug"],
            "description": "Output shaping level"
        })
    }

    vec![
        McpTool {
            name: "set_workspace".into(),
            description: "Bind this session to a project workspace and start its file watcher"
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "workspace_root": { "type": "string" },
                    "source_dir": { "type": "string" },
                    "project_id": { "type": "string" },
                    "profile": profile_schema(),
                },
                "required": ["workspace_root"]
            }),
        },
        McpTool {
            name: "rebuild".into(),
            description: "Queue a full or incremental graph rebuild; returns immediately".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "mode": { "type": "string", "enum": ["full", "incremental"] },
                    "profile": profile_schema(),
                },
                "required": ["mode"]
            }),
        },
        McpTool {
            name: "health".into(),
            description: "Store connectivity, index statistics, last transaction, and drift"
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": { "profile": profile_schema() }
            }),
        },
        McpTool {
            name: "query".into(),
            description: "Hybrid retrieval (vector + lexical + graph, RRF-fused) or raw cypher"
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "language": { "type": "string", "enum": ["natural", "cypher"] },
                    "mode": { "type": "string", "enum": ["local", "global"] },
                    "limit": { "type": "integer" },
                    "profile": profile_schema(),
                },
                "required": ["query"]
            }),
        },
        McpTool {
            name: "code_explain".into(),
            description: "Symbol metadata plus incoming and outgoing edges up to a depth".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "symbol": { "type": "string" },
                    "depth": { "type": "integer" },
                    "profile": profile_schema(),
                },
                "required": ["symbol"]
            }),
        },
        McpTool {
            name: "impact_analyze".into(),
            description: "Transitive dependents and affected tests of changed files".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "changed_files": { "type": "array", "items": { "type": "string" } },
                    "profile": profile_schema(),
                },
                "required": ["changed_files"]
            }),
        },
        McpTool {
            name: "semantic_search".into(),
            description: "Vector-only ranked search by free text or by symbol neighborhood".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "symbol": { "type": "string" },
                    "limit": { "type": "integer" },
                    "profile": profile_schema(),
                },
            }),
        },
        McpTool {
            name: "agent_claim".into(),
            description: "Claim a target for exclusive work; conflicts are reported, not errors"
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "agent_id": { "type": "string" },
                    "session_id": { "type": "string" },
                    "target_id": { "type": "string" },
                    "claim_type": { "type": "string", "enum": ["task", "file", "function", "feature"] },
                    "intent": { "type": "string" },
                    "task_id": { "type": "string" },
                    "profile": profile_schema(),
                },
                "required": ["agent_id", "session_id", "target_id", "claim_type", "intent"]
            }),
        },
        McpTool {
            name: "agent_release".into(),
            description: "Release a claim; releasing twice reports already_closed".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "claim_id": { "type": "string" },
                    "outcome": { "type": "string" },
                    "profile": profile_schema(),
                },
                "required": ["claim_id"]
            }),
        },
        McpTool {
            name: "agent_status".into(),
            description: "An agent's active claims, recent episodes, and current task".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "agent_id": { "type": "string" },
                    "profile": profile_schema(),
                },
                "required": ["agent_id"]
            }),
        },
        McpTool {
            name: "coordination_overview".into(),
            description: "Project-wide claim overview: active, stale, contested, per-agent".into(),
            input_schema: json!({
                "type": "object",
                "properties": { "profile": profile_schema() }
            }),
        },
        McpTool {
            name: "task_complete".into(),
            description: "Close every open claim on a completed task".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "task_id": { "type": "string" },
                    "agent_id": { "type": "string" },
                    "profile": profile_schema(),
                },
                "required": ["task_id", "agent_id"]
            }),
        },
        McpTool {
            name: "episode_add".into(),
            description: "Append an episodic memory record with entity links".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "agent_id": { "type": "string" },
                    "session_id": { "type": "string" },
                    "type": { "type": "string" },
                    "content": { "type": "string" },
                    "entities": { "type": "array", "items": { "type": "string" } },
                    "task_id": { "type": "string" },
                    "outcome": { "type": "string" },
                    "sensitive": { "type": "boolean" },
                    "profile": profile_schema(),
                },
                "required": ["agent_id", "session_id", "type", "content"]
            }),
        },
        McpTool {
            name: "episode_recall".into(),
            description: "Ranked episode recall blending lexical, temporal, and entity signals"
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "agent_id": { "type": "string" },
                    "task_id": { "type": "string" },
                    "types": { "type": "array", "items": { "type": "string" } },
                    "since": { "type": "integer" },
                    "limit": { "type": "integer" },
                    "profile": profile_schema(),
                }
            }),
        },
        McpTool {
            name: "episode_reflect".into(),
            description: "Synthesize recent episodes into a reflection and learning nodes".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "agent_id": { "type": "string" },
                    "task_id": { "type": "string" },
                    "profile": profile_schema(),
                },
                "required": ["agent_id"]
            }),
        },
        McpTool {
            name: "arch_validate".into(),
            description: "Validate imports against layer rules; reports violations and cycles"
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "files": { "type": "array", "items": { "type": "string" } },
                    "profile": profile_schema(),
                }
            }),
        },
        McpTool {
            name: "arch_suggest".into(),
            description: "Suggest a layer and file path for a new symbol".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "code_name": { "type": "string" },
                    "code_type": { "type": "string" },
                    "deps": { "type": "array", "items": { "type": "string" } },
                    "profile": profile_schema(),
                },
                "required": ["code_name", "code_type"]
            }),
        },
    ]
}
