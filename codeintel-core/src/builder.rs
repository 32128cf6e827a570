//! # Graph Builder
//!
//! Pure translation from [`ParsedFile`] values into idempotent graph
//! mutations. No store access happens here; the orchestrator executes
//! the produced batches.
//!
//! Symbol nodes inherit the file's `content_hash`, so a claim's version
//! stamp changes exactly when the owning file changes.

use crate::store::ids;
use crate::types::{EdgeKind, GraphEdge, GraphNode, NodeLabel, ParsedFile};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Node and edge mutations produced for one file
#[derive(Debug, Default)]
pub struct FileMutations {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Translates parsed files into graph mutations for one project
pub struct GraphBuilder {
    project_id: String,
}

impl GraphBuilder {
    /// Builder scoped to a project
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
        }
    }

    /// Mutations for a single parsed file: FILE node, symbol nodes with
    /// CONTAINS edges, IMPORT nodes with IMPORTS edges
    #[must_use]
    pub fn build_file(&self, parsed: &ParsedFile, now_ms: i64) -> FileMutations {
        let project = self.project_id.as_str();
        let mut out = FileMutations::default();

        let file_id = ids::file_node_id(project, &parsed.path);
        let basename = parsed.path.rsplit('/').next().unwrap_or(&parsed.path);
        let mut file_node = GraphNode::new(&file_id, NodeLabel::File, project)
            .with_prop("path", parsed.path.as_str())
            .with_prop("name", basename)
            .with_prop("language", parsed.language.as_str())
            .with_prop("loc", parsed.loc as i64);
        file_node.valid_from = now_ms;
        file_node.content_hash = Some(parsed.content_hash.clone());
        out.nodes.push(file_node);

        // Class nodes first so methods can attach beneath them
        let mut class_ids: HashMap<&str, String> = HashMap::new();
        for class in &parsed.classes {
            let class_id = ids::class_node_id(project, &parsed.path, &class.name);
            let mut node = GraphNode::new(&class_id, NodeLabel::Class, project)
                .with_prop("name", class.name.as_str())
                .with_prop("start_line", class.start_line as i64)
                .with_prop("end_line", class.end_line as i64)
                .with_prop("file_path", parsed.path.as_str());
            node.valid_from = now_ms;
            node.content_hash = Some(parsed.content_hash.clone());
            node.scip_id = Some(ids::scip_class_id(&parsed.path, &class.name));
            out.nodes.push(node);
            out.edges.push(GraphEdge::new(
                &file_id,
                &class_id,
                EdgeKind::Contains,
                project,
            ));
            class_ids.insert(class.name.as_str(), class_id);
        }

        for function in &parsed.functions {
            let func_id =
                ids::function_node_id(project, &parsed.path, &function.name, function.start_line);
            let mut node = GraphNode::new(&func_id, NodeLabel::Function, project)
                .with_prop("name", function.name.as_str())
                .with_prop("start_line", function.start_line as i64)
                .with_prop("end_line", function.end_line as i64)
                .with_prop("file_path", parsed.path.as_str());
            if let Some(scope) = &function.scope_path {
                node.properties
                    .insert("scope_path".into(), Value::String(scope.clone()));
            }
            node.valid_from = now_ms;
            node.content_hash = Some(parsed.content_hash.clone());
            node.scip_id = Some(ids::scip_function_id(&parsed.path, &function.name));
            out.nodes.push(node);

            // Methods hang off their class, free functions off the file
            let parent = function
                .scope_path
                .as_deref()
                .and_then(|scope| class_ids.get(scope))
                .cloned()
                .unwrap_or_else(|| file_id.clone());
            out.edges
                .push(GraphEdge::new(parent, &func_id, EdgeKind::Contains, project));
        }

        for import in &parsed.imports {
            let import_id = ids::import_node_id(project, &import.source);
            let mut node = GraphNode::new(&import_id, NodeLabel::Import, project)
                .with_prop("source", import.source.as_str())
                .with_prop("name", import.source.as_str());
            node.valid_from = now_ms;
            out.nodes.push(node);
            out.edges.push(
                GraphEdge::new(&file_id, &import_id, EdgeKind::Imports, project)
                    .with_line(import.line),
            );
        }

        out
    }

    /// Second pass over the whole file set: a DEPENDS_ON edge between
    /// FILE nodes whenever an import resolves to another project file
    #[must_use]
    pub fn build_dependencies(&self, parsed_files: &[ParsedFile]) -> Vec<GraphEdge> {
        let known: HashSet<&str> = parsed_files.iter().map(|p| p.path.as_str()).collect();
        self.build_dependencies_against(parsed_files, &known)
    }

    /// Dependency pass where resolution targets may be wider than the
    /// parsed set (incremental builds parse only the changed files)
    #[must_use]
    pub fn build_dependencies_against(
        &self,
        parsed_files: &[ParsedFile],
        known: &HashSet<&str>,
    ) -> Vec<GraphEdge> {
        let project = self.project_id.as_str();
        let mut edges = Vec::new();

        for parsed in parsed_files {
            for import in &parsed.imports {
                if let Some(target) = resolve_import(&parsed.path, &import.source, known)
                    && target != parsed.path
                {
                    edges.push(GraphEdge::new(
                        ids::file_node_id(project, &parsed.path),
                        ids::file_node_id(project, &target),
                        EdgeKind::DependsOn,
                        project,
                    ));
                }
            }
        }

        edges
    }
}

impl GraphEdge {
    fn with_line(mut self, line: usize) -> Self {
        self.properties
            .insert("line".into(), Value::from(line as i64));
        self
    }
}

const RESOLVE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "py", "rs"];

/// Resolve an import source to a known project file path.
///
/// Relative sources resolve against the importing file's directory;
/// dotted (Python) and bare root-anchored sources resolve against the
/// source root. External package names resolve to nothing and are
/// ignored by the caller.
#[must_use]
pub fn resolve_import(from_path: &str, source: &str, known: &HashSet<&str>) -> Option<String> {
    let stem = if source.starts_with("./") || source.starts_with("../") {
        let dir = match from_path.rfind('/') {
            Some(idx) => &from_path[..idx],
            None => "",
        };
        join_normalized(dir, source)?
    } else if source.contains('.') && !source.contains('/') {
        source.replace('.', "/")
    } else {
        source.to_string()
    };

    if known.contains(stem.as_str()) {
        return Some(stem);
    }
    for ext in RESOLVE_EXTENSIONS {
        let with_ext = format!("{stem}.{ext}");
        if known.contains(with_ext.as_str()) {
            return Some(with_ext);
        }
        let index = format!("{stem}/index.{ext}");
        if known.contains(index.as_str()) {
            return Some(index);
        }
    }
    None
}

/// Join a relative source onto a directory, folding `.` and `..`
fn join_normalized(dir: &str, source: &str) -> Option<String> {
    let mut parts: Vec<&str> = dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in source.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassInfo, FunctionInfo, ImportInfo};

    fn sample_parsed() -> ParsedFile {
        ParsedFile {
            path: "src/auth.ts".into(),
            language: "typescript".into(),
            functions: vec![
                FunctionInfo {
                    name: "login".into(),
                    start_line: 4,
                    end_line: 8,
                    scope_path: None,
                },
                FunctionInfo {
                    name: "check".into(),
                    start_line: 12,
                    end_line: 14,
                    scope_path: Some("Session".into()),
                },
            ],
            classes: vec![ClassInfo {
                name: "Session".into(),
                start_line: 10,
                end_line: 15,
            }],
            imports: vec![ImportInfo {
                source: "./db".into(),
                line: 1,
            }],
            content_hash: "deadbeef".into(),
            loc: 15,
        }
    }

    #[test]
    fn test_build_file_nodes_and_edges() {
        let builder = GraphBuilder::new("p");
        let muts = builder.build_file(&sample_parsed(), 1000);

        // FILE + CLASS + 2 FUNCTION + IMPORT
        assert_eq!(muts.nodes.len(), 5);
        let file = &muts.nodes[0];
        assert_eq!(file.id, "p:file:src/auth.ts");
        assert_eq!(file.content_hash.as_deref(), Some("deadbeef"));
        assert_eq!(file.prop_str("name"), Some("auth.ts"));

        // Method attaches beneath its class, not the file
        let method_edge = muts
            .edges
            .iter()
            .find(|e| e.to_id.contains("check"))
            .unwrap();
        assert_eq!(method_edge.from_id, "p:class:src/auth.ts:Session");
        assert_eq!(method_edge.kind, EdgeKind::Contains);
    }

    #[test]
    fn test_symbols_inherit_file_hash() {
        let builder = GraphBuilder::new("p");
        let muts = builder.build_file(&sample_parsed(), 1000);
        for node in muts.nodes.iter().filter(|n| n.label == NodeLabel::Function) {
            assert_eq!(node.content_hash.as_deref(), Some("deadbeef"));
            assert_eq!(node.valid_from, 1000);
        }
    }

    #[test]
    fn test_rebuild_is_idempotent_in_shape() {
        let builder = GraphBuilder::new("p");
        let first = builder.build_file(&sample_parsed(), 1000);
        let second = builder.build_file(&sample_parsed(), 2000);

        let first_ids: Vec<&str> = first.nodes.iter().map(|n| n.id.as_str()).collect();
        let second_ids: Vec<&str> = second.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
        let first_keys: Vec<_> = first.edges.iter().map(GraphEdge::merge_key).collect();
        let second_keys: Vec<_> = second.edges.iter().map(GraphEdge::merge_key).collect();
        assert_eq!(first_keys, second_keys);
    }

    #[test]
    fn test_resolve_relative_import() {
        let known: HashSet<&str> = ["src/auth.ts", "src/db.ts", "src/util/index.ts"]
            .into_iter()
            .collect();
        assert_eq!(
            resolve_import("src/auth.ts", "./db", &known),
            Some("src/db.ts".into())
        );
        assert_eq!(
            resolve_import("src/auth.ts", "./util", &known),
            Some("src/util/index.ts".into())
        );
        assert_eq!(resolve_import("src/auth.ts", "express", &known), None);
    }

    #[test]
    fn test_resolve_dotted_python_import() {
        let known: HashSet<&str> = ["app/db.py", "app/api/routes.py"].into_iter().collect();
        assert_eq!(
            resolve_import("app/main.py", "app.db", &known),
            Some("app/db.py".into())
        );
        assert_eq!(resolve_import("app/main.py", "os", &known), None);
    }

    #[test]
    fn test_depends_on_edges() {
        let builder = GraphBuilder::new("p");
        let mut db = sample_parsed();
        db.path = "src/db.ts".into();
        db.imports.clear();
        let files = vec![sample_parsed(), db];

        let edges = builder.build_dependencies(&files);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].from_id, "p:file:src/auth.ts");
        assert_eq!(edges[0].to_id, "p:file:src/db.ts");
        assert_eq!(edges[0].kind, EdgeKind::DependsOn);
    }
}
