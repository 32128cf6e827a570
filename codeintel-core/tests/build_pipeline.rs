//! End-to-end build pipeline tests over the in-memory stores

use codeintel_core::store::GraphStore;
use codeintel_core::types::{BuildAckStatus, BuildMode, NodeLabel, TxStatus};
use test_utils::{TestStack, typescript_project, workspace_with_files};

#[tokio::test]
async fn test_full_build_indexes_the_project() {
    let stack = TestStack::new();
    let fixture = typescript_project("alpha");

    let result = stack
        .orchestrator
        .build_and_wait(&fixture.context, BuildMode::Full)
        .await
        .unwrap();

    assert_eq!(result.files_processed, 3);
    assert!(result.errors.is_empty());

    let stats = stack.orchestrator.get_statistics("alpha");
    assert_eq!(stats.label_count(NodeLabel::File), 3);
    assert_eq!(stats.label_count(NodeLabel::Function), 5);
    assert!(stats.total_edges > 0);
}

#[tokio::test]
async fn test_full_build_is_idempotent() {
    let stack = TestStack::new();
    let fixture = typescript_project("alpha");

    let first = stack
        .orchestrator
        .build_and_wait(&fixture.context, BuildMode::Full)
        .await
        .unwrap();
    let stats_first = stack.orchestrator.get_statistics("alpha");
    let hashes_first: Vec<_> = stack
        .graph
        .find_nodes("alpha", Some(NodeLabel::File), &Default::default())
        .await
        .unwrap()
        .into_iter()
        .map(|n| (n.id.clone(), n.content_hash))
        .collect();

    let second = stack
        .orchestrator
        .build_and_wait(&fixture.context, BuildMode::Full)
        .await
        .unwrap();
    let stats_second = stack.orchestrator.get_statistics("alpha");
    let hashes_second: Vec<_> = stack
        .graph
        .find_nodes("alpha", Some(NodeLabel::File), &Default::default())
        .await
        .unwrap()
        .into_iter()
        .map(|n| (n.id.clone(), n.content_hash))
        .collect();

    assert_eq!(first.nodes_created, second.nodes_created);
    assert_eq!(first.edges_created, second.edges_created);
    assert_eq!(stats_first.total_nodes, stats_second.total_nodes);
    assert_eq!(stats_first.total_edges, stats_second.total_edges);
    assert_eq!(hashes_first, hashes_second);
}

#[tokio::test]
async fn test_incremental_build_touches_only_changed_files() {
    let stack = TestStack::new();
    let fixture = typescript_project("alpha");

    stack
        .orchestrator
        .build_and_wait(&fixture.context, BuildMode::Full)
        .await
        .unwrap();

    let before: std::collections::HashMap<String, i64> = stack
        .graph
        .find_nodes("alpha", None, &Default::default())
        .await
        .unwrap()
        .into_iter()
        .map(|n| (n.id.clone(), n.valid_from))
        .collect();

    // Let the clock advance past the first build's stamp
    std::thread::sleep(std::time::Duration::from_millis(5));
    std::fs::write(
        fixture.dir.path().join("src/db.ts"),
        "export function connect() {}\n\nexport function query(sql: string) {}\n\nexport function migrate() {}\n",
    )
    .unwrap();

    let result = stack
        .orchestrator
        .build_and_wait(&fixture.context, BuildMode::Incremental)
        .await
        .unwrap();
    assert_eq!(result.files_processed, 1);

    let after = stack
        .graph
        .find_nodes("alpha", None, &Default::default())
        .await
        .unwrap();

    for node in &after {
        let Some(prior) = before.get(&node.id) else {
            // Newly created nodes must belong to the changed file
            assert!(node.id.contains("db.ts"), "unexpected new node {}", node.id);
            continue;
        };
        if node.id.contains("db.ts") {
            assert!(node.valid_from > *prior, "changed node {} not refreshed", node.id);
        } else if node.label.is_code() {
            assert_eq!(node.valid_from, *prior, "untouched node {} refreshed", node.id);
        }
    }

    // The new function appears
    assert!(
        after
            .iter()
            .any(|n| n.label == NodeLabel::Function && n.prop_str("name") == Some("migrate"))
    );
}

#[tokio::test]
async fn test_unparseable_file_degrades_to_warning() {
    let stack = TestStack::new();
    let fixture = workspace_with_files("alpha", &[("ok.ts", "export function fine() {}\n")]);
    std::fs::write(fixture.dir.path().join("src/bad.ts"), [0xff, 0xfe, 0x00]).unwrap();

    let result = stack
        .orchestrator
        .build_and_wait(&fixture.context, BuildMode::Full)
        .await
        .unwrap();

    assert_eq!(result.files_processed, 2);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("bad.ts"));
    // The bad file still lands as a FILE-only node
    let stats = stack.orchestrator.get_statistics("alpha");
    assert_eq!(stats.label_count(NodeLabel::File), 2);
}

#[tokio::test]
async fn test_build_records_transaction() {
    let stack = TestStack::new();
    let fixture = typescript_project("alpha");

    let result = stack
        .orchestrator
        .build_and_wait(&fixture.context, BuildMode::Full)
        .await
        .unwrap();

    let tx = stack
        .graph
        .last_transaction("alpha")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tx.tx_id, result.tx_id);
    assert_eq!(tx.status, TxStatus::Succeeded);
    assert!(tx.finished_at.is_some());
    assert_eq!(tx.stats.get("files"), Some(&3));
}

#[tokio::test]
async fn test_failed_build_still_closes_transaction() {
    let stack = TestStack::new();
    let fixture = typescript_project("alpha");

    // First build succeeds and primes the manifest
    stack
        .orchestrator
        .build_and_wait(&fixture.context, BuildMode::Full)
        .await
        .unwrap();

    // Note: we cannot kill the store before the opening record is
    // written, so fail the batch mid-pipeline via a fresh stack whose
    // store dies after the transaction opens
    let stack2 = TestStack::new();
    let graph = std::sync::Arc::clone(&stack2.graph);
    let orchestrator = std::sync::Arc::clone(&stack2.orchestrator);
    let ctx = fixture.context.clone();

    // Open the build normally, then yank connectivity from underneath it
    // at the first await point by toggling off from another task
    let handle = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        graph.set_connected(false);
    });
    let result = orchestrator.build_and_wait(&ctx, BuildMode::Full).await;
    handle.await.unwrap();

    // Either the build finished before the toggle (fine) or it failed
    // and the error is a wrapped store error, never a panic
    if let Err(err) = result {
        assert!(matches!(err, codeintel_core::Error::StoreUnavailable(_)));
    }
}

#[tokio::test]
async fn test_manifest_written_and_drift_detected() {
    let stack = TestStack::new();
    let fixture = typescript_project("alpha");

    stack
        .orchestrator
        .build_and_wait(&fixture.context, BuildMode::Full)
        .await
        .unwrap();
    assert!(fixture.dir.path().join(".codeintel/manifest.json").exists());

    let health = stack.orchestrator.health(&fixture.context).await.unwrap();
    assert!(health.graph_connected);
    assert!(health.vector_connected);
    assert!(!health.drift_detected);
    assert_eq!(health.index_stats.label_count(NodeLabel::Function), 5);

    // Rewriting the manifest with a stale hash shows up as drift
    let manifest_path = fixture.dir.path().join(".codeintel/manifest.json");
    let mut manifest: std::collections::HashMap<String, String> =
        serde_json::from_slice(&std::fs::read(&manifest_path).unwrap()).unwrap();
    manifest.insert("db.ts".into(), "0".repeat(64));
    std::fs::write(&manifest_path, serde_json::to_vec(&manifest).unwrap()).unwrap();

    let health = stack.orchestrator.health(&fixture.context).await.unwrap();
    assert!(health.drift_detected);
}

#[tokio::test]
async fn test_second_build_request_returns_busy() {
    let stack = TestStack::new();
    let fixture = typescript_project("alpha");

    let first = std::sync::Arc::clone(&stack.orchestrator)
        .request_build(fixture.context.clone(), BuildMode::Full);
    let second = std::sync::Arc::clone(&stack.orchestrator)
        .request_build(fixture.context.clone(), BuildMode::Full);

    assert_eq!(first.status, BuildAckStatus::Queued);
    // The second request either coalesces onto the running build or, if
    // the worker already finished, queues a fresh one
    if second.status == BuildAckStatus::Busy {
        assert_eq!(second.tx_id, first.tx_id);
    }

    // Drain: wait for the background build to release the slot
    for _ in 0..200 {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let third = std::sync::Arc::clone(&stack.orchestrator)
            .request_build(fixture.context.clone(), BuildMode::Incremental);
        if third.status == BuildAckStatus::Queued {
            break;
        }
    }
}
