//! # Architecture Engine
//!
//! Validates the workspace's import graph against configured layer rules
//! and suggests placement for new code. Imports are extracted with the
//! same lightweight syntactic rules the build pipeline uses; this is not
//! a type-aware analysis.

use crate::builder::resolve_import;
use crate::constants::architecture::{LAYERS_FILE, MAX_REPORTED_CYCLES};
use crate::error::{Error, Result};
use crate::parser::ParserRegistry;
use crate::types::{ProjectContext, normalize_rel_path};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

/// One configured layer
#[derive(Debug, Clone, Deserialize)]
pub struct LayerRule {
    pub name: String,
    pub globs: Vec<String>,
    #[serde(default)]
    pub can_import: Vec<String>,
    #[serde(default)]
    pub cannot_import: Vec<String>,
}

/// The `layers.toml` model
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArchitectureConfig {
    /// Globs selecting the source files to scan when none are given
    #[serde(default)]
    pub source_globs: Vec<String>,
    #[serde(default)]
    pub layers: Vec<LayerRule>,
}

impl ArchitectureConfig {
    /// Load `layers.toml` from the workspace root; absent file means an
    /// empty config (everything unassigned, nothing forbidden)
    pub fn load(ctx: &ProjectContext) -> Result<Self> {
        let path = ctx.workspace_root.join(LAYERS_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)?;
        toml::from_str(&text)
            .map_err(|e| Error::InvalidArguments(format!("invalid {LAYERS_FILE}: {e}")))
    }
}

/// One forbidden import
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub from_file: String,
    pub to_file: String,
    pub from_layer: String,
    pub to_layer: String,
    pub rule: String,
}

/// Aggregate counters for a validation run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationStats {
    pub files_scanned: usize,
    pub imports_checked: usize,
    pub violations: usize,
    pub cycles: usize,
}

/// Result of `validate`
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
    /// File cycles as id sequences, first node repeated at the end
    pub cycles: Vec<Vec<String>>,
    pub warnings: Vec<String>,
    pub stats: ValidationStats,
}

/// Placement advice for a new symbol
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub layer: String,
    pub path: String,
    pub reasoning: String,
}

/// Affinity between a code type and layer-name substrings, best first
fn affinity(code_type: &str) -> &'static [&'static str] {
    match code_type {
        "service" | "usecase" | "handler" => &["service", "application", "core", "domain"],
        "component" | "view" | "page" => &["ui", "view", "presentation", "component"],
        "repository" | "model" | "entity" => &["data", "domain", "infrastructure", "persistence"],
        "util" | "helper" => &["shared", "util", "common", "core"],
        _ => &["core", "domain", "shared"],
    }
}

/// Layer validation and placement engine
pub struct ArchitectureEngine {
    config: ArchitectureConfig,
    matchers: Vec<(String, GlobSet)>,
    source_matcher: Option<GlobSet>,
    parsers: Arc<ParserRegistry>,
}

impl ArchitectureEngine {
    /// Engine over a loaded config
    pub fn new(config: ArchitectureConfig, parsers: Arc<ParserRegistry>) -> Result<Self> {
        let mut matchers = Vec::with_capacity(config.layers.len());
        for layer in &config.layers {
            matchers.push((layer.name.clone(), build_globset(&layer.globs)?));
        }
        let source_matcher = if config.source_globs.is_empty() {
            None
        } else {
            Some(build_globset(&config.source_globs)?)
        };
        Ok(Self {
            config,
            matchers,
            source_matcher,
            parsers,
        })
    }

    /// Engine for a workspace, loading `layers.toml` beside it
    pub fn for_workspace(ctx: &ProjectContext, parsers: Arc<ParserRegistry>) -> Result<Self> {
        Self::new(ArchitectureConfig::load(ctx)?, parsers)
    }

    /// Layer a path belongs to, by first matching glob
    #[must_use]
    pub fn layer_of(&self, path: &str) -> Option<&str> {
        self.matchers
            .iter()
            .find(|(_, set)| set.is_match(path))
            .map(|(name, _)| name.as_str())
    }

    /// Validate the given files, or every file matching the configured
    /// source globs when none are given
    pub async fn validate(
        &self,
        ctx: &ProjectContext,
        files: Option<Vec<String>>,
    ) -> Result<ValidationReport> {
        let files = match files {
            Some(files) => files,
            None => self.scan_sources(ctx).await?,
        };
        let known: HashSet<&str> = files.iter().map(String::as_str).collect();

        let mut warnings = Vec::new();
        let mut violations = Vec::new();
        let mut imports_checked = 0usize;
        let mut dep_graph: HashMap<String, Vec<String>> = HashMap::new();

        for file in &files {
            let from_layer = self.layer_of(file);
            if from_layer.is_none() {
                warnings.push(format!("unassigned layer: {file}"));
            }

            let abs = ctx.workspace_root.join(file);
            let Ok(bytes) = std::fs::read(&abs) else {
                warnings.push(format!("unreadable file: {file}"));
                continue;
            };
            let Ok(parsed) = self.parsers.parse_file(&bytes, file) else {
                continue;
            };

            for import in &parsed.imports {
                // External package names resolve to nothing and are skipped
                let Some(target) = resolve_import(file, &import.source, &known) else {
                    continue;
                };
                imports_checked += 1;
                dep_graph
                    .entry(file.clone())
                    .or_default()
                    .push(target.clone());

                let (Some(from_layer), Some(to_layer)) = (from_layer, self.layer_of(&target))
                else {
                    continue;
                };
                if let Some(rule) = self.check_edge(from_layer, to_layer) {
                    violations.push(Violation {
                        from_file: file.clone(),
                        to_file: target,
                        from_layer: from_layer.to_string(),
                        to_layer: to_layer.to_string(),
                        rule,
                    });
                }
            }
        }

        let cycles = find_cycles(&dep_graph, MAX_REPORTED_CYCLES);
        debug!(
            files = files.len(),
            imports = imports_checked,
            violations = violations.len(),
            cycles = cycles.len(),
            "architecture validation complete"
        );

        let stats = ValidationStats {
            files_scanned: files.len(),
            imports_checked,
            violations: violations.len(),
            cycles: cycles.len(),
        };
        Ok(ValidationReport {
            violations,
            cycles,
            warnings,
            stats,
        })
    }

    /// Suggest a layer and file path for a new symbol.
    ///
    /// Only dependencies that name a known layer constrain eligibility;
    /// external package names are ignored, so adding one never changes
    /// the suggestion.
    #[must_use]
    pub fn suggest(&self, code_name: &str, code_type: &str, deps: &[String]) -> Suggestion {
        let layer_names: HashSet<&str> =
            self.config.layers.iter().map(|l| l.name.as_str()).collect();
        let layer_deps: Vec<&str> = deps
            .iter()
            .map(String::as_str)
            .filter(|d| layer_names.contains(d))
            .collect();

        let eligible: Vec<&LayerRule> = self
            .config
            .layers
            .iter()
            .filter(|layer| {
                layer_deps
                    .iter()
                    .all(|dep| self.check_edge(&layer.name, dep).is_none())
            })
            .collect();

        let preferences = affinity(code_type);
        let pick = eligible
            .iter()
            .min_by_key(|layer| {
                preferences
                    .iter()
                    .position(|p| layer.name.to_lowercase().contains(p))
                    .unwrap_or(preferences.len())
            })
            .copied();

        match pick {
            Some(layer) => {
                let filename = suggest_filename(code_name, code_type);
                let dir = glob_prefix(layer.globs.first().map_or("", String::as_str));
                let path = if dir.is_empty() {
                    filename.clone()
                } else {
                    format!("{dir}/{filename}")
                };
                let reasoning = if layer_deps.is_empty() {
                    format!(
                        "{} fits the {} layer by type affinity",
                        code_type, layer.name
                    )
                } else {
                    format!(
                        "{} can import {} and matches the {} affinity for {}",
                        layer.name,
                        layer_deps.join(", "),
                        layer.name,
                        code_type
                    )
                };
                Suggestion {
                    layer: layer.name.clone(),
                    path,
                    reasoning,
                }
            }
            None => Suggestion {
                layer: String::new(),
                path: suggest_filename(code_name, code_type),
                reasoning: "no configured layer can import all the given dependencies".to_string(),
            },
        }
    }

    /// Allowed-import check: `None` when the edge is fine, else the rule
    /// that forbids it
    fn check_edge(&self, from_layer: &str, to_layer: &str) -> Option<String> {
        let rule = self.config.layers.iter().find(|l| l.name == from_layer)?;
        if rule.cannot_import.iter().any(|n| n == to_layer) {
            return Some(format!("{from_layer} cannot_import {to_layer}"));
        }
        if to_layer == from_layer || rule.can_import.iter().any(|n| n == to_layer || n == "*") {
            return None;
        }
        Some(format!("{to_layer} not in {from_layer}.can_import"))
    }

    async fn scan_sources(&self, ctx: &ProjectContext) -> Result<Vec<String>> {
        let Some(matcher) = self.source_matcher.clone() else {
            return Ok(Vec::new());
        };
        let root = ctx.workspace_root.clone();
        let files = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            for entry in WalkDir::new(&root).into_iter().flatten() {
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Ok(rel) = entry.path().strip_prefix(&root) {
                    let rel = normalize_rel_path(rel);
                    if matcher.is_match(&rel) {
                        out.push(rel);
                    }
                }
            }
            out.sort_unstable();
            out
        })
        .await
        .map_err(|e| Error::StoreUnavailable(format!("scan task failed: {e}")))?;
        Ok(files)
    }
}

fn build_globset(globs: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for glob in globs {
        builder.add(
            Glob::new(glob).map_err(|e| Error::InvalidArguments(format!("bad glob {glob}: {e}")))?,
        );
    }
    builder
        .build()
        .map_err(|e| Error::InvalidArguments(format!("glob set: {e}")))
}

/// Directory part of a glob before any wildcard
fn glob_prefix(glob: &str) -> String {
    glob.split('/')
        .take_while(|seg| !seg.contains('*'))
        .collect::<Vec<_>>()
        .join("/")
}

/// File name for a new symbol: snake case, suffixed with the code type
/// unless the name already carries it
fn suggest_filename(code_name: &str, code_type: &str) -> String {
    let snake = to_snake_case(code_name);
    let suffix = to_snake_case(code_type);
    if suffix.is_empty() || snake.ends_with(&suffix) {
        format!("{snake}.ts")
    } else {
        format!("{snake}_{suffix}.ts")
    }
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if c == '-' || c == ' ' {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}

/// DFS cycle detection over the file dependency graph. Cycles are
/// canonicalized (rotated to their smallest node) and deduplicated;
/// at most `max` are returned.
fn find_cycles(graph: &HashMap<String, Vec<String>>, max: usize) -> Vec<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        InProgress,
        Done,
    }

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut stack: Vec<&str> = Vec::new();
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut cycles: Vec<Vec<String>> = Vec::new();

    fn visit<'a>(
        node: &'a str,
        graph: &'a HashMap<String, Vec<String>>,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
        seen: &mut HashSet<Vec<String>>,
        cycles: &mut Vec<Vec<String>>,
        max: usize,
    ) {
        if cycles.len() >= max {
            return;
        }
        match marks.get(node) {
            Some(Mark::Done) => return,
            Some(Mark::InProgress) => {
                if let Some(pos) = stack.iter().position(|n| *n == node) {
                    let cycle: Vec<String> = stack[pos..].iter().map(|s| (*s).to_string()).collect();
                    let canonical = canonicalize_cycle(&cycle);
                    if seen.insert(canonical.clone()) {
                        let mut closed = canonical;
                        if let Some(first) = closed.first().cloned() {
                            closed.push(first);
                        }
                        cycles.push(closed);
                    }
                }
                return;
            }
            None => {}
        }
        marks.insert(node, Mark::InProgress);
        stack.push(node);
        if let Some(targets) = graph.get(node) {
            for target in targets {
                visit(target, graph, marks, stack, seen, cycles, max);
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
    }

    let mut roots: Vec<&str> = graph.keys().map(String::as_str).collect();
    roots.sort_unstable();
    for root in roots {
        visit(root, graph, &mut marks, &mut stack, &mut seen, &mut cycles, max);
    }
    cycles
}

/// Rotate a cycle so its lexicographically smallest node comes first
fn canonicalize_cycle(cycle: &[String]) -> Vec<String> {
    let Some(min_pos) = cycle
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
    else {
        return Vec::new();
    };
    let mut rotated = Vec::with_capacity(cycle.len());
    rotated.extend_from_slice(&cycle[min_pos..]);
    rotated.extend_from_slice(&cycle[..min_pos]);
    rotated
}
