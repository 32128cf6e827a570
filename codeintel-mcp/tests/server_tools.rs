//! Tool-level integration tests against the assembled server

use codeintel_mcp::error::codes;
use codeintel_mcp::jsonrpc::JsonRpcRequest;
use codeintel_mcp::server::CodeIntelServer;
use codeintel_store_mem::{MemoryGraphStore, MemoryVectorStore};
use serde_json::{Value, json};
use std::sync::Arc;
use test_utils::{typescript_project, workspace_with_files};

fn server() -> CodeIntelServer {
    CodeIntelServer::without_watchers(
        Arc::new(MemoryGraphStore::new()),
        Arc::new(MemoryVectorStore::new()),
    )
}

async fn set_workspace(server: &CodeIntelServer, session: &str, fixture: &test_utils::FixtureWorkspace) {
    server
        .dispatch(
            Some(session),
            "set_workspace",
            json!({
                "workspace_root": fixture.dir.path().to_string_lossy(),
                "source_dir": "src",
                "project_id": fixture.context.project_id,
            }),
        )
        .await
        .unwrap();
}

async fn full_build(server: &CodeIntelServer, session: &str) {
    let ctx = server.sessions().resolve(Some(session)).unwrap();
    server
        .orchestrator()
        .build_and_wait(&ctx, codeintel_core::types::BuildMode::Full)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_project_switch_isolation() {
    let server = server();
    let a = typescript_project("proj-a");
    let b = workspace_with_files("proj-b", &[("main.ts", "export function solo() {}\n")]);

    // Session 1 builds A, then switches to B and rebuilds
    set_workspace(&server, "s1", &a).await;
    full_build(&server, "s1").await;
    set_workspace(&server, "s1", &b).await;
    full_build(&server, "s1").await;

    // Health for session 1 reflects project B only
    let health = server.dispatch(Some("s1"), "health", json!({})).await.unwrap();
    assert_eq!(health["index_stats"]["nodes_by_label"]["FUNCTION"], 1);

    // A second session bound to A sees only A's symbols
    set_workspace(&server, "s2", &a).await;
    let hits = server
        .dispatch(Some("s2"), "semantic_search", json!({"query": "anything", "limit": 50}))
        .await
        .unwrap();
    let hits = hits["hits"].as_array().unwrap();
    assert!(!hits.is_empty());
    for hit in hits {
        let id = hit["id"].as_str().unwrap();
        assert!(id.starts_with("proj-a:"), "leaked {id}");
    }
}

#[tokio::test]
async fn test_rebuild_tool_returns_queued() {
    let server = server();
    let fixture = typescript_project("alpha");
    set_workspace(&server, "s1", &fixture).await;

    let ack = server
        .dispatch(Some("s1"), "rebuild", json!({"mode": "full"}))
        .await
        .unwrap();
    assert_eq!(ack["status"], "QUEUED");
    assert!(ack["tx_id"].is_string());
}

#[tokio::test]
async fn test_query_tool_end_to_end() {
    let server = server();
    let fixture = typescript_project("alpha");
    set_workspace(&server, "s1", &fixture).await;
    full_build(&server, "s1").await;

    let response = server
        .dispatch(
            Some("s1"),
            "query",
            json!({"query": "login handler", "limit": 5, "profile": "balanced"}),
        )
        .await
        .unwrap();
    let hits = response["hits"].as_array().unwrap();
    assert!(!hits.is_empty());
    assert!(hits[0]["score"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_cypher_query_unsupported_on_memory_store() {
    let server = server();
    let fixture = typescript_project("alpha");
    set_workspace(&server, "s1", &fixture).await;

    let err = server
        .dispatch(
            Some("s1"),
            "query",
            json!({"query": "MATCH (n) RETURN n", "language": "cypher"}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, codeintel_core::Error::Unsupported(_)));
}

#[tokio::test]
async fn test_claim_release_via_tools() {
    let server = server();
    let fixture = typescript_project("alpha");
    set_workspace(&server, "s1", &fixture).await;
    full_build(&server, "s1").await;

    let claim = server
        .dispatch(
            Some("s1"),
            "agent_claim",
            json!({
                "agent_id": "X",
                "session_id": "s1",
                "target_id": "alpha:file:auth.ts",
                "claim_type": "file",
                "intent": "refactor",
            }),
        )
        .await
        .unwrap();
    assert_eq!(claim["status"], "ok");
    let claim_id = claim["claim_id"].as_str().unwrap();

    let conflict = server
        .dispatch(
            Some("s1"),
            "agent_claim",
            json!({
                "agent_id": "Y",
                "session_id": "s1",
                "target_id": "alpha:file:auth.ts",
                "claim_type": "file",
                "intent": "reformat",
            }),
        )
        .await
        .unwrap();
    assert_eq!(conflict["status"], "CONFLICT");
    assert_eq!(conflict["conflict"]["agent_id"], "X");

    let release = server
        .dispatch(Some("s1"), "agent_release", json!({"claim_id": claim_id, "outcome": "done"}))
        .await
        .unwrap();
    assert_eq!(release["found"], true);
    assert_eq!(release["already_closed"], false);
}

#[tokio::test]
async fn test_episode_tools_round_trip() {
    let server = server();
    let fixture = typescript_project("alpha");
    set_workspace(&server, "s1", &fixture).await;

    let added = server
        .dispatch(
            Some("s1"),
            "episode_add",
            json!({
                "agent_id": "X",
                "session_id": "s1",
                "type": "DECISION",
                "content": "route auth through middleware",
            }),
        )
        .await
        .unwrap();
    assert!(added["episode_id"].is_string());

    let recalled = server
        .dispatch(
            Some("s1"),
            "episode_recall",
            json!({"text": "auth middleware", "agent_id": "X"}),
        )
        .await
        .unwrap();
    let episodes = recalled.as_array().unwrap();
    assert_eq!(episodes.len(), 1);
    assert_eq!(episodes[0]["type"], "DECISION");
}

#[tokio::test]
async fn test_error_codes_on_the_wire() {
    let server = server();
    let fixture = typescript_project("alpha");
    set_workspace(&server, "s1", &fixture).await;
    full_build(&server, "s1").await;

    // Too-short query surfaces its dedicated code through handle_request
    let request = JsonRpcRequest {
        jsonrpc: Some("2.0".into()),
        id: Some(json!(5)),
        method: "tools/call".into(),
        params: Some(json!({
            "name": "query",
            "arguments": {"query": "a b", "_meta": {"session_id": "s1"}},
        })),
    };
    let response = server.handle_request(request).await.unwrap();
    let error = response.error.unwrap();
    assert_eq!(error.code, codes::QUERY_TOO_SHORT);

    // Unknown symbol is a structured not-found
    let err = server
        .dispatch(Some("s1"), "code_explain", json!({"symbol": "alpha:func:ghost:1"}))
        .await
        .unwrap_err();
    assert!(matches!(err, codeintel_core::Error::NotFound { .. }));
}

#[tokio::test]
async fn test_tool_deadline_enforced() {
    let server = server();
    let fixture = typescript_project("alpha");
    set_workspace(&server, "s1", &fixture).await;
    full_build(&server, "s1").await;

    // A zero-millisecond deadline always expires
    let request = JsonRpcRequest {
        jsonrpc: Some("2.0".into()),
        id: Some(json!(9)),
        method: "tools/call".into(),
        params: Some(json!({
            "name": "query",
            "arguments": {
                "query": "login handler",
                "_meta": {"session_id": "s1", "timeout_ms": 0},
            },
        })),
    };
    let response = server.handle_request(request).await.unwrap();
    let error = response.error.unwrap();
    assert_eq!(error.code, codes::TIMEOUT);
}

#[tokio::test]
async fn test_impact_and_explain_tools() {
    let server = server();
    let fixture = typescript_project("alpha");
    set_workspace(&server, "s1", &fixture).await;
    full_build(&server, "s1").await;

    let explanation = server
        .dispatch(Some("s1"), "code_explain", json!({"symbol": "auth.ts:login:4", "depth": 1}))
        .await
        .unwrap();
    assert_eq!(explanation["name"], "login");

    let impact = server
        .dispatch(Some("s1"), "impact_analyze", json!({"changed_files": ["db.ts"]}))
        .await
        .unwrap();
    let impacted: Vec<&str> = impact["impacted_files"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(impacted.contains(&"alpha:file:auth.ts"));
    assert!(impacted.contains(&"alpha:file:api.ts"));
}

#[tokio::test]
async fn test_arch_suggest_tool() {
    let server = server();
    let fixture = typescript_project("alpha");
    std::fs::write(
        fixture.dir.path().join("layers.toml"),
        r#"source_globs = ["src/**/*.ts"]

[[layers]]
name = "services"
globs = ["src/services/**"]
can_import = ["data"]

[[layers]]
name = "data"
globs = ["src/data/**"]
"#,
    )
    .unwrap();
    set_workspace(&server, "s1", &fixture).await;

    let suggestion = server
        .dispatch(
            Some("s1"),
            "arch_suggest",
            json!({"code_name": "UserFetcher", "code_type": "service", "deps": ["data", "express"]}),
        )
        .await
        .unwrap();
    assert_eq!(suggestion["layer"], "services");
    assert!(suggestion["path"].as_str().unwrap().ends_with("user_fetcher_service.ts"));

    let report = server
        .dispatch(Some("s1"), "arch_validate", json!({}))
        .await
        .unwrap();
    assert!(report["stats"]["files_scanned"].as_u64().unwrap() >= 3);
}
