//! Property-based tests over the pure kernels: the id bridge, symbol
//! normalization, fusion ordering, and lexical scoring

use codeintel_core::retrieval::{bm25, rrf};
use codeintel_core::store::ids;
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_fnv_is_deterministic(s in ".{0,128}") {
        prop_assert_eq!(ids::fnv1a_32(&s), ids::fnv1a_32(&s));
    }

    #[test]
    fn prop_content_hash_is_stable_and_hex(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let a = ids::content_hash(&bytes);
        let b = ids::content_hash(&bytes);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.len(), 64);
        prop_assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn prop_symbol_name_with_numeric_tail(
        base in "[a-z]{1,12}\\.ts",
        name in "[a-z_][a-z0-9_]{0,20}",
        line in 0usize..100_000,
    ) {
        let symbol = format!("{base}:{name}:{line}");
        prop_assert_eq!(ids::normalize_symbol_name(&symbol), Some(name.as_str()));
    }

    #[test]
    fn prop_symbol_name_without_numeric_tail(
        base in "[a-z]{1,12}\\.ts",
        name in "[a-z_][a-z_]{0,20}",
    ) {
        let symbol = format!("{base}:{name}");
        prop_assert_eq!(ids::normalize_symbol_name(&symbol), Some(name.as_str()));
    }

    #[test]
    fn prop_colon_free_ids_are_not_symbols(id in "[a-z0-9_.-]{1,32}") {
        prop_assume!(!id.contains(':'));
        prop_assert_eq!(ids::normalize_symbol_name(&id), None);
    }

    #[test]
    fn prop_rrf_scores_are_descending(
        vector in proptest::collection::vec(("[a-f]{1,4}", 0.0f32..1.0), 0..16),
        lexical in proptest::collection::vec(("[a-f]{1,4}", 0.0f32..10.0), 0..16),
    ) {
        let fused = rrf::fuse(&vector_owned(&vector), &vector_owned(&lexical), &[]);
        for pair in fused.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn prop_rrf_includes_every_candidate(
        vector in proptest::collection::vec(("[a-f]{1,4}", 0.0f32..1.0), 0..16),
        graph in proptest::collection::vec(("[g-m]{1,4}", 0.0f64..1.0), 0..16),
    ) {
        let fused = rrf::fuse(&vector_owned(&vector), &[], &graph_owned(&graph));
        for (id, _) in &vector {
            prop_assert!(fused.iter().any(|h| &h.id == id));
        }
        for (id, _) in &graph {
            prop_assert!(fused.iter().any(|h| &h.id == id));
        }
    }

    #[test]
    fn prop_bm25_only_returns_matching_docs(
        docs in proptest::collection::vec(("[a-z]{1,8}", "[a-z ]{0,40}"), 0..12),
        query in "[a-z]{3,8}",
    ) {
        let lexical_docs: Vec<bm25::LexicalDoc> = docs
            .iter()
            .map(|(id, text)| bm25::LexicalDoc { id: id.clone(), text: text.clone() })
            .collect();
        let tokens = bm25::tokenize(&query);
        let hits = bm25::rank(&tokens, &lexical_docs, 100);
        for (id, score) in &hits {
            prop_assert!(*score > 0.0);
            let doc = docs.iter().find(|(d, _)| d == id);
            prop_assert!(doc.is_some());
        }
    }

    #[test]
    fn prop_tokenize_is_lowercase_alnum(text in ".{0,64}") {
        for token in bm25::tokenize(&text) {
            prop_assert!(!token.is_empty());
            prop_assert!(token.chars().all(|c| c.is_alphanumeric() || c == '_'));
            prop_assert_eq!(&token.to_lowercase(), &token);
        }
    }
}

fn vector_owned(items: &[(String, f32)]) -> Vec<(String, f32)> {
    items.to_vec()
}

fn graph_owned(items: &[(String, f64)]) -> Vec<(String, f64)> {
    items.to_vec()
}
