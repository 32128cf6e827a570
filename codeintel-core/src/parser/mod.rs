//! # Parser Registry
//!
//! Per-language dispatch producing a neutral [`ParsedFile`]. Parsers are
//! registered at startup; files with no registered parser degrade to a
//! FILE-only record so the build never stalls on an unknown extension.

pub mod lightweight;

use crate::error::Result;
use crate::types::ParsedFile;
use std::collections::HashMap;
use std::sync::Arc;

pub use lightweight::LightweightParser;

/// A language-specific source parser
pub trait Parser: Send + Sync {
    /// Language tag recorded on FILE nodes
    fn language(&self) -> &'static str;

    /// File extensions (without the dot) this parser accepts
    fn supported_extensions(&self) -> &'static [&'static str];

    /// Parse file bytes into the neutral representation.
    ///
    /// Must be a deterministic function of the bytes: the same input
    /// yields the same symbols and the same `content_hash`.
    fn parse(&self, bytes: &[u8], path: &str) -> Result<ParsedFile>;
}

/// Extension-keyed dispatch over the registered parsers
pub struct ParserRegistry {
    by_extension: HashMap<&'static str, Arc<dyn Parser>>,
}

impl ParserRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_extension: HashMap::new(),
        }
    }

    /// Registry with the shipped lightweight parsers
    #[must_use]
    pub fn with_default_parsers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LightweightParser::typescript()));
        registry.register(Arc::new(LightweightParser::python()));
        registry.register(Arc::new(LightweightParser::rust()));
        registry
    }

    /// Register a parser for all of its extensions
    pub fn register(&mut self, parser: Arc<dyn Parser>) {
        for ext in parser.supported_extensions() {
            self.by_extension.insert(ext, Arc::clone(&parser));
        }
    }

    /// Parser for an extension, if any
    #[must_use]
    pub fn for_extension(&self, extension: &str) -> Option<&Arc<dyn Parser>> {
        self.by_extension.get(extension)
    }

    /// Parse a file, degrading to a FILE-only record when no parser is
    /// registered for the extension
    pub fn parse_file(&self, bytes: &[u8], rel_path: &str) -> Result<ParsedFile> {
        let extension = rel_path.rsplit('.').next().unwrap_or_default();
        match self.by_extension.get(extension) {
            Some(parser) => parser.parse(bytes, rel_path),
            None => Ok(ParsedFile::file_only(rel_path, extension, bytes)),
        }
    }

    /// Extensions with a registered parser
    #[must_use]
    pub fn known_extensions(&self) -> Vec<&'static str> {
        let mut exts: Vec<_> = self.by_extension.keys().copied().collect();
        exts.sort_unstable();
        exts
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_default_parsers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_dispatch() {
        let registry = ParserRegistry::with_default_parsers();
        assert!(registry.for_extension("ts").is_some());
        assert!(registry.for_extension("py").is_some());
        assert!(registry.for_extension("rs").is_some());
        assert!(registry.for_extension("zig").is_none());
    }

    #[test]
    fn test_unknown_extension_degrades_to_file_only() {
        let registry = ParserRegistry::with_default_parsers();
        let parsed = registry
            .parse_file(b"whatever content\nsecond line\n", "notes/readme.zig")
            .unwrap();
        assert_eq!(parsed.path, "notes/readme.zig");
        assert!(parsed.functions.is_empty());
        assert!(parsed.classes.is_empty());
        assert!(!parsed.content_hash.is_empty());
    }

    #[test]
    fn test_parse_is_deterministic() {
        let registry = ParserRegistry::with_default_parsers();
        let src = b"export function alpha() {}\n";
        let a = registry.parse_file(src, "src/a.ts").unwrap();
        let b = registry.parse_file(src, "src/a.ts").unwrap();
        assert_eq!(a, b);
    }
}
