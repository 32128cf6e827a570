//! Global constants for codeintel-core
//!
//! Centralizes the tunables used across the build pipeline, retrieval
//! engine, and coordination layer.

/// Retrieval tuning
pub mod retrieval {
    /// Reciprocal Rank Fusion constant (standard value from the literature)
    pub const RRF_K: f64 = 60.0;

    /// Damping factor for the local Personalized PageRank fallback
    pub const PPR_DAMPING: f64 = 0.85;

    /// Power-iteration budget for the local PPR fallback
    pub const PPR_ITERATIONS: usize = 20;

    /// Number of top fused seeds expanded into the graph neighborhood
    pub const GRAPH_SEED_COUNT: usize = 5;

    /// Hop limit for graph expansion around retrieval seeds
    pub const GRAPH_EXPANSION_HOPS: usize = 2;

    /// BM25 term-frequency saturation parameter
    pub const BM25_K1: f64 = 1.2;

    /// BM25 length-normalization parameter
    pub const BM25_B: f64 = 0.75;

    /// Minimum token length counted toward query validity
    pub const MIN_TOKEN_LEN: usize = 3;
}

/// Index and cache sizing
pub mod index {
    /// Number of per-project in-memory indexes kept resident (LRU)
    pub const MAX_RESIDENT_PROJECTS: usize = 5;

    /// Upper bound on cached embedding vectors per project (fallback search)
    pub const MAX_CACHED_VECTORS: usize = 10_000;
}

/// Embedding configuration
pub mod embedding {
    /// Fixed per-collection vector dimension
    pub const DIMENSION: usize = 384;

    /// Default vector store collection for code symbols
    pub const CODE_COLLECTION: &str = "code_symbols";
}

/// Coordination and episodic memory
pub mod coordination {
    /// Default claim age before `expire_old` closes it (24h)
    pub const DEFAULT_CLAIM_MAX_AGE_MS: i64 = 24 * 60 * 60 * 1000;

    /// Cap on entity links attached to a single episode
    pub const MAX_EPISODE_ENTITIES: usize = 100;

    /// Candidate pool size for episode recall
    pub const RECALL_CANDIDATES: usize = 200;

    /// Recall score weights: lexical, temporal, entity overlap
    pub const RECALL_WEIGHTS: (f64, f64, f64) = (0.5, 0.3, 0.2);

    /// Exponential decay rate per day for the temporal recall component
    pub const TEMPORAL_DECAY_PER_DAY: f64 = 0.05;

    /// Episodes folded into one reflection pass
    pub const REFLECT_WINDOW: usize = 20;

    /// Dominant entities reported per reflection
    pub const REFLECT_TOP_ENTITIES: usize = 5;

    /// Maximum LEARNING nodes emitted per reflection
    pub const REFLECT_MAX_LEARNINGS: usize = 3;

    /// Hard cap on recall result size
    pub const MAX_RECALL_LIMIT: usize = 50;

    /// Episodes shown in an agent status summary
    pub const STATUS_RECENT_EPISODES: usize = 10;
}

/// Build pipeline configuration
pub mod build {
    /// Directory names excluded from source discovery
    pub const DEFAULT_EXCLUDES: &[&str] = &[
        "node_modules",
        "target",
        "dist",
        "build",
        ".git",
        ".codeintel",
        "__pycache__",
        "vendor",
        "coverage",
    ];

    /// Advisory hash manifest location relative to the workspace root
    pub const MANIFEST_PATH: &str = ".codeintel/manifest.json";

    /// Debounce window for watcher-triggered incremental builds
    pub const WATCH_DEBOUNCE_MS: u64 = 500;
}

/// Architecture validation
pub mod architecture {
    /// Maximum unique dependency cycles reported per validation run
    pub const MAX_REPORTED_CYCLES: usize = 10;

    /// Layer rules file name looked up under the workspace root
    pub const LAYERS_FILE: &str = "layers.toml";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_constants() {
        assert!(retrieval::RRF_K > 0.0);
        assert!((0.0..1.0).contains(&retrieval::PPR_DAMPING));
        assert!(retrieval::PPR_ITERATIONS > 0);
    }

    #[test]
    fn test_recall_weights_sum_to_one() {
        let (l, t, e) = coordination::RECALL_WEIGHTS;
        assert!((l + t + e - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_excludes_cover_common_dirs() {
        assert!(build::DEFAULT_EXCLUDES.contains(&"node_modules"));
        assert!(build::DEFAULT_EXCLUDES.contains(&"target"));
    }
}
