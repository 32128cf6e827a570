//! Local BM25 scorer used when the graph store exposes no text search
//!
//! Deterministic: IDF-weighted term frequency with the standard k1/b
//! saturation, ties broken by id.

use crate::constants::retrieval::{BM25_B, BM25_K1, MIN_TOKEN_LEN};
use std::collections::HashMap;

/// Lowercased alphanumeric tokens of a text
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Whether a tokenized query is long enough to score
#[must_use]
pub fn has_scoreable_token(tokens: &[String]) -> bool {
    tokens.iter().any(|t| t.len() >= MIN_TOKEN_LEN)
}

/// One candidate document for lexical scoring
#[derive(Debug, Clone)]
pub struct LexicalDoc {
    pub id: String,
    pub text: String,
}

/// Rank documents against query tokens with BM25
#[must_use]
pub fn rank(query_tokens: &[String], docs: &[LexicalDoc], limit: usize) -> Vec<(String, f32)> {
    if docs.is_empty() || query_tokens.is_empty() {
        return Vec::new();
    }

    let tokenized: Vec<(usize, Vec<String>)> = docs
        .iter()
        .enumerate()
        .map(|(i, d)| (i, tokenize(&d.text)))
        .collect();
    let total_docs = docs.len() as f64;
    let avg_len = tokenized.iter().map(|(_, t)| t.len() as f64).sum::<f64>() / total_docs;

    // Document frequency per query term
    let mut df: HashMap<&str, usize> = HashMap::new();
    for term in query_tokens {
        let count = tokenized
            .iter()
            .filter(|(_, tokens)| tokens.iter().any(|t| t == term))
            .count();
        df.insert(term.as_str(), count);
    }

    let mut scored: Vec<(String, f32)> = Vec::new();
    for (idx, tokens) in &tokenized {
        let doc_len = tokens.len() as f64;
        let mut score = 0.0f64;
        for term in query_tokens {
            let term_df = df.get(term.as_str()).copied().unwrap_or(0);
            if term_df == 0 {
                continue;
            }
            let tf = tokens.iter().filter(|t| *t == term).count() as f64;
            if tf == 0.0 {
                continue;
            }
            let idf = ((total_docs - term_df as f64 + 0.5) / (term_df as f64 + 0.5) + 1.0).ln();
            let denom = tf + BM25_K1 * (1.0 - BM25_B + BM25_B * doc_len / avg_len.max(1.0));
            score += idf * tf * (BM25_K1 + 1.0) / denom;
        }
        if score > 0.0 {
            scored.push((docs[*idx].id.clone(), score as f32));
        }
    }

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, text: &str) -> LexicalDoc {
        LexicalDoc {
            id: id.into(),
            text: text.into(),
        }
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("find the login_handler in src/auth.ts"),
            vec!["find", "the", "login_handler", "in", "src", "auth", "ts"]
        );
    }

    #[test]
    fn test_short_queries_are_not_scoreable() {
        assert!(!has_scoreable_token(&tokenize("a of to")));
        assert!(has_scoreable_token(&tokenize("a login")));
    }

    #[test]
    fn test_rank_prefers_matching_docs() {
        let docs = vec![
            doc("auth", "login logout session handling"),
            doc("db", "database connection pooling"),
            doc("misc", "unrelated helper utilities"),
        ];
        let hits = rank(&tokenize("login session"), &docs, 10);
        assert_eq!(hits[0].0, "auth");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_rank_is_deterministic_on_ties() {
        let docs = vec![doc("b", "login"), doc("a", "login")];
        let hits = rank(&tokenize("login"), &docs, 10);
        // Equal scores fall back to stable id order
        assert_eq!(hits[0].0, "a");
        assert_eq!(hits[1].0, "b");
    }

    #[test]
    fn test_rank_empty_inputs() {
        assert!(rank(&tokenize("login"), &[], 10).is_empty());
        assert!(rank(&[], &[doc("a", "login")], 10).is_empty());
    }
}
