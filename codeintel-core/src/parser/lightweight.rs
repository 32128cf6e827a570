//! Regex-based symbol and import extraction
//!
//! Not a full parser: line-oriented syntactic rules good enough to place
//! functions, classes, and imports on the graph. Symbol spans are
//! approximated by the distance to the next top-level symbol.

use crate::error::{Error, Result};
use crate::parser::Parser;
use crate::store::ids::content_hash;
use crate::types::{ClassInfo, FunctionInfo, ImportInfo, ParsedFile};
use regex::Regex;

/// One language's extraction rules
pub struct LightweightParser {
    language: &'static str,
    extensions: &'static [&'static str],
    function_rules: Vec<Regex>,
    class_rules: Vec<Regex>,
    import_rules: Vec<Regex>,
    /// Whether indentation nests functions under the enclosing class
    indent_scoping: bool,
}

impl LightweightParser {
    /// TypeScript / JavaScript rules
    #[must_use]
    pub fn typescript() -> Self {
        Self {
            language: "typescript",
            extensions: &["ts", "tsx", "js", "jsx", "mjs"],
            function_rules: vec![
                Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s+(\w+)")
                    .expect("static regex"),
                Regex::new(r"^\s*(?:export\s+)?const\s+(\w+)\s*=\s*(?:async\s*)?\(")
                    .expect("static regex"),
            ],
            class_rules: vec![
                Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+(\w+)")
                    .expect("static regex"),
            ],
            import_rules: vec![
                Regex::new(r#"^\s*import\s+.*?\bfrom\s+['"]([^'"]+)['"]"#).expect("static regex"),
                Regex::new(r#"^\s*import\s+['"]([^'"]+)['"]"#).expect("static regex"),
                Regex::new(r#"require\(\s*['"]([^'"]+)['"]\s*\)"#).expect("static regex"),
            ],
            indent_scoping: false,
        }
    }

    /// Python rules
    #[must_use]
    pub fn python() -> Self {
        Self {
            language: "python",
            extensions: &["py"],
            function_rules: vec![
                Regex::new(r"^(\s*)(?:async\s+)?def\s+(\w+)").expect("static regex"),
            ],
            class_rules: vec![Regex::new(r"^\s*class\s+(\w+)").expect("static regex")],
            import_rules: vec![
                Regex::new(r"^\s*from\s+([\w.]+)\s+import\b").expect("static regex"),
                Regex::new(r"^\s*import\s+([\w.]+)").expect("static regex"),
            ],
            indent_scoping: true,
        }
    }

    /// Rust rules
    #[must_use]
    pub fn rust() -> Self {
        Self {
            language: "rust",
            extensions: &["rs"],
            function_rules: vec![
                Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+(\w+)")
                    .expect("static regex"),
            ],
            class_rules: vec![
                Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait)\s+(\w+)")
                    .expect("static regex"),
            ],
            import_rules: vec![Regex::new(r"^\s*(?:pub\s+)?use\s+([\w:]+)").expect("static regex")],
            indent_scoping: false,
        }
    }

    fn match_function(&self, line: &str) -> Option<(String, usize)> {
        for rule in &self.function_rules {
            if let Some(caps) = rule.captures(line) {
                // Python's rule captures leading indentation first
                if caps.len() > 2 {
                    let indent = caps.get(1).map_or(0, |m| m.as_str().len());
                    return Some((caps[2].to_string(), indent));
                }
                return Some((caps[1].to_string(), indent_of(line)));
            }
        }
        None
    }

    fn match_class(&self, line: &str) -> Option<String> {
        self.class_rules
            .iter()
            .find_map(|rule| rule.captures(line).map(|caps| caps[1].to_string()))
    }

    fn match_import(&self, line: &str) -> Option<String> {
        self.import_rules
            .iter()
            .find_map(|rule| rule.captures(line).map(|caps| caps[1].to_string()))
    }
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

impl Parser for LightweightParser {
    fn language(&self) -> &'static str {
        self.language
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        self.extensions
    }

    fn parse(&self, bytes: &[u8], path: &str) -> Result<ParsedFile> {
        let text = std::str::from_utf8(bytes).map_err(|e| Error::ParseFailure {
            path: path.to_string(),
            message: format!("not valid UTF-8: {e}"),
        })?;

        let lines: Vec<&str> = text.lines().collect();
        let mut functions: Vec<FunctionInfo> = Vec::new();
        let mut classes: Vec<ClassInfo> = Vec::new();
        let mut imports: Vec<ImportInfo> = Vec::new();

        // (line index, indent) of the class a def may be nested under
        let mut current_class: Option<(String, usize)> = None;

        for (idx, line) in lines.iter().enumerate() {
            let line_no = idx + 1;

            if let Some(source) = self.match_import(line) {
                imports.push(ImportInfo {
                    source,
                    line: line_no,
                });
                continue;
            }

            if let Some(name) = self.match_class(line) {
                current_class = Some((name.clone(), indent_of(line)));
                classes.push(ClassInfo {
                    name,
                    start_line: line_no,
                    end_line: line_no,
                });
                continue;
            }

            if let Some((name, indent)) = self.match_function(line) {
                let scope_path = if self.indent_scoping {
                    current_class
                        .as_ref()
                        .filter(|(_, class_indent)| indent > *class_indent)
                        .map(|(class_name, _)| class_name.clone())
                } else {
                    None
                };
                functions.push(FunctionInfo {
                    name,
                    start_line: line_no,
                    end_line: line_no,
                    scope_path,
                });
            }
        }

        close_spans(&mut functions, &mut classes, lines.len());

        Ok(ParsedFile {
            path: path.to_string(),
            language: self.language.to_string(),
            functions,
            classes,
            imports,
            content_hash: content_hash(bytes),
            loc: lines.len(),
        })
    }
}

/// Approximate symbol spans: each symbol ends one line before the next
/// symbol starts, the last one at end of file
fn close_spans(functions: &mut [FunctionInfo], classes: &mut [ClassInfo], total_lines: usize) {
    let mut starts: Vec<usize> = functions
        .iter()
        .map(|f| f.start_line)
        .chain(classes.iter().map(|c| c.start_line))
        .collect();
    starts.sort_unstable();

    let end_for = |start: usize| -> usize {
        starts
            .iter()
            .find(|s| **s > start)
            .map_or(total_lines.max(start), |next| next - 1)
    };

    for f in functions.iter_mut() {
        f.end_line = end_for(f.start_line);
    }
    for c in classes.iter_mut() {
        c.end_line = end_for(c.start_line);
    }
}
