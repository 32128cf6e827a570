//! Common types shared across the code intelligence engines

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Current wall-clock time as epoch milliseconds
#[must_use]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// The triple that scopes every operation in a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContext {
    /// Normalized lowercase project identifier
    pub project_id: String,
    /// Absolute workspace root
    pub workspace_root: PathBuf,
    /// Source directory relative to the workspace root
    pub source_dir: String,
}

impl ProjectContext {
    /// Create a context, deriving the project id from the workspace
    /// directory name when not given. Project ids are normalized to
    /// lowercase.
    pub fn new(
        workspace_root: impl Into<PathBuf>,
        source_dir: Option<String>,
        project_id: Option<String>,
    ) -> Self {
        let workspace_root = workspace_root.into();
        let project_id = project_id
            .or_else(|| {
                workspace_root
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "default".to_string())
            .to_lowercase();
        Self {
            project_id,
            workspace_root,
            source_dir: source_dir.unwrap_or_else(|| "src".to_string()),
        }
    }

    /// Absolute path of the directory scanned during builds
    #[must_use]
    pub fn source_root(&self) -> PathBuf {
        if self.source_dir.is_empty() || self.source_dir == "." {
            self.workspace_root.clone()
        } else {
            self.workspace_root.join(&self.source_dir)
        }
    }
}

/// Semantic node labels in the property graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeLabel {
    File,
    Function,
    Class,
    Import,
    Episode,
    Claim,
    Learning,
    Community,
    Feature,
    Task,
    Section,
    Document,
    Rule,
}

impl NodeLabel {
    /// Labels carrying source-code semantics (always project scoped,
    /// colon-structured ids)
    #[must_use]
    pub fn is_code(self) -> bool {
        matches!(
            self,
            NodeLabel::File | NodeLabel::Function | NodeLabel::Class | NodeLabel::Import
        )
    }
}

impl std::fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeLabel::File => "FILE",
            NodeLabel::Function => "FUNCTION",
            NodeLabel::Class => "CLASS",
            NodeLabel::Import => "IMPORT",
            NodeLabel::Episode => "EPISODE",
            NodeLabel::Claim => "CLAIM",
            NodeLabel::Learning => "LEARNING",
            NodeLabel::Community => "COMMUNITY",
            NodeLabel::Feature => "FEATURE",
            NodeLabel::Task => "TASK",
            NodeLabel::Section => "SECTION",
            NodeLabel::Document => "DOCUMENT",
            NodeLabel::Rule => "RULE",
        };
        f.write_str(s)
    }
}

/// Directed, typed edge kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    Contains,
    Imports,
    Calls,
    Extends,
    Implements,
    Tests,
    Targets,
    Involves,
    NextEpisode,
    AppliesTo,
    BelongsTo,
    DependsOn,
    DocDescribes,
    SectionOf,
    ViolatesRule,
}

/// A labeled node in the property graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Globally unique id (`<project_id>:<kind>:<local>` for code nodes)
    pub id: String,
    /// Semantic label
    pub label: NodeLabel,
    /// Owning project
    pub project_id: String,
    /// Free-form properties
    pub properties: Map<String, Value>,
    /// Last write time, epoch milliseconds
    pub valid_from: i64,
    /// Content hash of the underlying source, when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Structured cross-tool symbol identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scip_id: Option<String>,
}

impl GraphNode {
    /// Create a node with empty properties stamped at the current time
    pub fn new(id: impl Into<String>, label: NodeLabel, project_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label,
            project_id: project_id.into(),
            properties: Map::new(),
            valid_from: now_ms(),
            content_hash: None,
            scip_id: None,
        }
    }

    /// Builder-style property setter
    #[must_use]
    pub fn with_prop(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// String property lookup
    #[must_use]
    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Integer property lookup with explicit narrowing
    #[must_use]
    pub fn prop_i64(&self, key: &str) -> Option<i64> {
        self.properties.get(key).and_then(Value::as_i64)
    }

    /// Display name: `name` property, falling back to the id
    #[must_use]
    pub fn name(&self) -> &str {
        self.prop_str("name").unwrap_or(&self.id)
    }

    /// The version stamp a claim captures: content hash when present,
    /// then a `hash` property, then the write timestamp
    #[must_use]
    pub fn version_sha(&self) -> String {
        if let Some(hash) = &self.content_hash {
            return hash.clone();
        }
        if let Some(hash) = self.prop_str("hash") {
            return hash.to_string();
        }
        self.valid_from.to_string()
    }
}

/// A directed, typed edge between two nodes of the same project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from_id: String,
    pub to_id: String,
    pub kind: EdgeKind,
    pub project_id: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl GraphEdge {
    /// Create an edge with empty properties
    pub fn new(
        from_id: impl Into<String>,
        to_id: impl Into<String>,
        kind: EdgeKind,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: to_id.into(),
            kind,
            project_id: project_id.into(),
            properties: Map::new(),
        }
    }

    /// The MERGE key: at most one edge per `(from, to, kind)` tuple
    #[must_use]
    pub fn merge_key(&self) -> (String, String, EdgeKind) {
        (self.from_id.clone(), self.to_id.clone(), self.kind)
    }
}

/// A function extracted from a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    /// Enclosing scope, e.g. a class name, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_path: Option<String>,
}

/// A class (or equivalent aggregate) extracted from a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// An import statement extracted from a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportInfo {
    /// Import target as written in the source
    pub source: String,
    pub line: usize,
}

/// Neutral parse result produced by any registered parser
///
/// Deterministic function of file bytes and parser version: parsing the
/// same bytes twice must yield identical values, including the hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFile {
    /// Path relative to the source root, `/`-separated
    pub path: String,
    pub language: String,
    pub functions: Vec<FunctionInfo>,
    pub classes: Vec<ClassInfo>,
    pub imports: Vec<ImportInfo>,
    /// SHA-256 of the file bytes, hex encoded
    pub content_hash: String,
    pub loc: usize,
}

impl ParsedFile {
    /// File-only record for unsupported extensions
    pub fn file_only(path: impl Into<String>, language: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            path: path.into(),
            language: language.into(),
            functions: Vec::new(),
            classes: Vec::new(),
            imports: Vec::new(),
            content_hash: crate::store::ids::content_hash(bytes),
            loc: bytes.iter().filter(|b| **b == b'\n').count() + 1,
        }
    }
}

/// Build mode selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Full,
    Incremental,
}

/// Immediate acknowledgement returned by a build request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildAck {
    pub status: BuildAckStatus,
    pub tx_id: Uuid,
}

/// Whether the request was queued or coalesced onto a running build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildAckStatus {
    Queued,
    Busy,
}

/// Outcome of a completed build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildResult {
    pub files_processed: usize,
    pub nodes_created: usize,
    pub edges_created: usize,
    pub duration_ms: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub tx_id: Uuid,
    pub mode: BuildMode,
}

/// Terminal state of a rebuild transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Running,
    Succeeded,
    Failed,
}

/// One record per rebuild; `finished_at` is set on success or failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub tx_id: Uuid,
    pub project_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub mode: BuildMode,
    pub status: TxStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Free-form counters (files, nodes, edges)
    #[serde(default)]
    pub stats: HashMap<String, u64>,
}

impl TransactionRecord {
    /// Open a new running record
    pub fn open(project_id: impl Into<String>, mode: BuildMode) -> Self {
        Self {
            tx_id: Uuid::new_v4(),
            project_id: project_id.into(),
            started_at: Utc::now(),
            finished_at: None,
            mode,
            status: TxStatus::Running,
            error_message: None,
            stats: HashMap::new(),
        }
    }

    /// Close the record, recording success or failure
    pub fn close(&mut self, status: TxStatus, error_message: Option<String>) {
        self.finished_at = Some(Utc::now());
        self.status = status;
        self.error_message = error_message;
    }
}

/// Snapshot of a project's in-memory index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub nodes_by_label: HashMap<String, usize>,
}

impl IndexStats {
    /// Count for one label, zero when absent
    #[must_use]
    pub fn label_count(&self, label: NodeLabel) -> usize {
        self.nodes_by_label
            .get(&label.to_string())
            .copied()
            .unwrap_or(0)
    }
}

/// Output-shaping level controlling result verbosity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputProfile {
    Compact,
    #[default]
    Balanced,
    Debug,
}

/// Normalize a filesystem path into the `/`-separated relative form used
/// in node ids
#[must_use]
pub fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_context_normalization() {
        let ctx = ProjectContext::new("/tmp/MyProject", None, None);
        assert_eq!(ctx.project_id, "myproject");
        assert_eq!(ctx.source_dir, "src");

        let explicit = ProjectContext::new("/tmp/x", Some("lib".into()), Some("Alpha".into()));
        assert_eq!(explicit.project_id, "alpha");
        assert_eq!(explicit.source_root(), PathBuf::from("/tmp/x/lib"));
    }

    #[test]
    fn test_context_equality_is_field_wise() {
        let a = ProjectContext::new("/tmp/a", Some("src".into()), Some("p".into()));
        let b = ProjectContext::new("/tmp/a", Some("src".into()), Some("p".into()));
        let c = ProjectContext::new("/tmp/a", Some("lib".into()), Some("p".into()));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_node_version_sha_precedence() {
        let mut node = GraphNode::new("p:func:x", NodeLabel::Function, "p");
        node.valid_from = 1234;
        assert_eq!(node.version_sha(), "1234");

        node.properties
            .insert("hash".into(), Value::String("h-prop".into()));
        assert_eq!(node.version_sha(), "h-prop");

        node.content_hash = Some("h-content".into());
        assert_eq!(node.version_sha(), "h-content");
    }

    #[test]
    fn test_edge_merge_key() {
        let e1 = GraphEdge::new("a", "b", EdgeKind::Contains, "p");
        let e2 = GraphEdge::new("a", "b", EdgeKind::Contains, "p");
        assert_eq!(e1.merge_key(), e2.merge_key());
    }

    #[test]
    fn test_label_serialization_is_screaming_case() {
        assert_eq!(
            serde_json::to_string(&NodeLabel::Function).unwrap(),
            "\"FUNCTION\""
        );
        assert_eq!(
            serde_json::to_string(&EdgeKind::NextEpisode).unwrap(),
            "\"NEXT_EPISODE\""
        );
        assert_eq!(NodeLabel::Function.to_string(), "FUNCTION");
    }

    #[test]
    fn test_transaction_record_lifecycle() {
        let mut tx = TransactionRecord::open("p", BuildMode::Full);
        assert_eq!(tx.status, TxStatus::Running);
        assert!(tx.finished_at.is_none());

        tx.close(TxStatus::Failed, Some("batch rejected".into()));
        assert_eq!(tx.status, TxStatus::Failed);
        assert!(tx.finished_at.is_some());
        assert_eq!(tx.error_message.as_deref(), Some("batch rejected"));
    }
}
