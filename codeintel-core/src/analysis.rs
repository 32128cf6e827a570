//! Graph analysis helpers behind the `code_explain` and
//! `impact_analyze` tools. Pure functions over an index view.

use crate::error::{Error, Result};
use crate::index::SharedIndex;
use crate::store::ids;
use crate::types::{EdgeKind, GraphNode, NodeLabel};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};

/// One edge in an explanation, with the neighbor's display name
#[derive(Debug, Clone, Serialize)]
pub struct EdgeView {
    pub from_id: String,
    pub to_id: String,
    pub kind: EdgeKind,
    pub neighbor_name: String,
}

/// Symbol metadata plus its neighborhood up to the requested depth
#[derive(Debug, Clone, Serialize)]
pub struct SymbolExplanation {
    pub id: String,
    pub label: NodeLabel,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scip_id: Option<String>,
    pub outgoing: Vec<EdgeView>,
    pub incoming: Vec<EdgeView>,
}

/// Transitive dependents of a set of changed files
#[derive(Debug, Clone, Serialize)]
pub struct ImpactReport {
    /// File node ids reachable via reverse dependency edges
    pub impacted_files: Vec<String>,
    /// Impacted files that look like tests, plus TESTS-edge sources
    pub affected_tests: Vec<String>,
}

/// Resolve a symbol reference against the index: exact node id first,
/// then `basename:name:line` normalization over symbol labels
pub fn resolve_symbol(index: &SharedIndex, symbol: &str) -> Result<GraphNode> {
    let guard = index.read();
    if let Some(node) = guard.get_node(symbol) {
        return Ok(node.clone());
    }
    if let Some(name) = ids::normalize_symbol_name(symbol) {
        for label in [NodeLabel::Function, NodeLabel::Class, NodeLabel::File] {
            if let Some(node) = guard.find_by_name(label, name) {
                return Ok(node.clone());
            }
        }
    }
    Err(Error::node_not_found(symbol))
}

/// Explain a symbol: metadata plus outgoing and incoming edges expanded
/// breadth-first up to `depth` hops
pub fn explain(index: &SharedIndex, symbol: &str, depth: usize) -> Result<SymbolExplanation> {
    let node = resolve_symbol(index, symbol)?;
    let guard = index.read();
    let depth = depth.clamp(1, 5);

    let mut outgoing = Vec::new();
    let mut incoming = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(String, usize)> = VecDeque::new();
    visited.insert(node.id.clone());
    queue.push_back((node.id.clone(), 0));

    while let Some((id, hop)) = queue.pop_front() {
        if hop >= depth {
            continue;
        }
        for edge in guard.edges_from(&id) {
            outgoing.push(EdgeView {
                from_id: edge.from_id.clone(),
                to_id: edge.to_id.clone(),
                kind: edge.kind,
                neighbor_name: guard
                    .get_node(&edge.to_id)
                    .map_or_else(|| edge.to_id.clone(), |n| n.name().to_string()),
            });
            if visited.insert(edge.to_id.clone()) {
                queue.push_back((edge.to_id.clone(), hop + 1));
            }
        }
        for edge in guard.edges_to(&id) {
            incoming.push(EdgeView {
                from_id: edge.from_id.clone(),
                to_id: edge.to_id.clone(),
                kind: edge.kind,
                neighbor_name: guard
                    .get_node(&edge.from_id)
                    .map_or_else(|| edge.from_id.clone(), |n| n.name().to_string()),
            });
            if visited.insert(edge.from_id.clone()) {
                queue.push_back((edge.from_id.clone(), hop + 1));
            }
        }
    }

    Ok(SymbolExplanation {
        id: node.id.clone(),
        label: node.label,
        name: node.name().to_string(),
        file_path: node
            .prop_str("file_path")
            .or_else(|| node.prop_str("path"))
            .map(str::to_string),
        scip_id: node.scip_id.clone(),
        outgoing,
        incoming,
    })
}

/// Reverse-dependency closure from the changed files.
///
/// A dependent is any file reaching a changed file over DEPENDS_ON or
/// IMPORTS edges; tests are picked out by path convention and by TESTS
/// edges targeting the impacted set.
pub fn impact(index: &SharedIndex, project_id: &str, changed_files: &[String]) -> ImpactReport {
    let guard = index.read();

    let mut queue: VecDeque<String> = VecDeque::new();
    let mut impacted: HashSet<String> = HashSet::new();
    for path in changed_files {
        let id = if path.contains(':') {
            path.clone()
        } else {
            ids::file_node_id(project_id, path)
        };
        if impacted.insert(id.clone()) {
            queue.push_back(id);
        }
    }

    while let Some(id) = queue.pop_front() {
        for edge in guard.edges_to(&id) {
            if !matches!(edge.kind, EdgeKind::DependsOn | EdgeKind::Imports) {
                continue;
            }
            if impacted.insert(edge.from_id.clone()) {
                queue.push_back(edge.from_id.clone());
            }
        }
    }

    let mut affected_tests: HashSet<String> = impacted
        .iter()
        .filter(|id| is_test_path(id))
        .cloned()
        .collect();
    for id in &impacted {
        for edge in guard.edges_to(id) {
            if edge.kind == EdgeKind::Tests {
                affected_tests.insert(edge.from_id.clone());
            }
        }
    }

    let mut impacted_files: Vec<String> = impacted.into_iter().collect();
    impacted_files.sort_unstable();
    let mut affected_tests: Vec<String> = affected_tests.into_iter().collect();
    affected_tests.sort_unstable();

    ImpactReport {
        impacted_files,
        affected_tests,
    }
}

fn is_test_path(id: &str) -> bool {
    id.contains(".test.")
        || id.contains(".spec.")
        || id.contains("/tests/")
        || id.contains("/__tests__/")
        || id.contains("_test.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryIndex;
    use crate::types::GraphEdge;
    use parking_lot::RwLock;
    use std::sync::Arc;

    fn fixture() -> SharedIndex {
        let mut index = InMemoryIndex::new();
        let mut add_file = |path: &str| {
            index.add_node(
                GraphNode::new(ids::file_node_id("p", path), NodeLabel::File, "p")
                    .with_prop("path", path)
                    .with_prop("name", path.rsplit('/').next().unwrap_or(path)),
            );
        };
        add_file("src/db.ts");
        add_file("src/auth.ts");
        add_file("src/api.ts");
        add_file("src/auth.test.ts");

        index.add_node(
            GraphNode::new("p:func:src/auth.ts:login:4", NodeLabel::Function, "p")
                .with_prop("name", "login")
                .with_prop("file_path", "src/auth.ts"),
        );
        index.add_edge(GraphEdge::new(
            "p:file:src/auth.ts",
            "p:func:src/auth.ts:login:4",
            EdgeKind::Contains,
            "p",
        ));
        index.add_edge(GraphEdge::new(
            "p:file:src/auth.ts",
            "p:file:src/db.ts",
            EdgeKind::DependsOn,
            "p",
        ));
        index.add_edge(GraphEdge::new(
            "p:file:src/api.ts",
            "p:file:src/auth.ts",
            EdgeKind::DependsOn,
            "p",
        ));
        index.add_edge(GraphEdge::new(
            "p:file:src/auth.test.ts",
            "p:file:src/auth.ts",
            EdgeKind::DependsOn,
            "p",
        ));
        Arc::new(RwLock::new(index))
    }

    #[test]
    fn test_explain_exact_id() {
        let index = fixture();
        let explanation = explain(&index, "p:func:src/auth.ts:login:4", 1).unwrap();
        assert_eq!(explanation.name, "login");
        assert_eq!(explanation.incoming.len(), 1);
        assert_eq!(explanation.incoming[0].kind, EdgeKind::Contains);
    }

    #[test]
    fn test_explain_normalized_symbol() {
        let index = fixture();
        let explanation = explain(&index, "auth.ts:login:4", 1).unwrap();
        assert_eq!(explanation.id, "p:func:src/auth.ts:login:4");
    }

    #[test]
    fn test_explain_missing_symbol() {
        let index = fixture();
        assert!(matches!(
            explain(&index, "p:func:nope:1", 1),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_impact_transitive_dependents() {
        let index = fixture();
        let report = impact(&index, "p", &["src/db.ts".to_string()]);
        // db itself, auth (depends on db), api and the test (depend on auth)
        assert!(report.impacted_files.contains(&"p:file:src/auth.ts".to_string()));
        assert!(report.impacted_files.contains(&"p:file:src/api.ts".to_string()));
        assert!(
            report
                .affected_tests
                .contains(&"p:file:src/auth.test.ts".to_string())
        );
    }
}
