/// Result type alias for code intelligence operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the code intelligence server
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Parse failure in {path}: {message}")]
    ParseFailure { path: String, message: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Project scope mismatch: expected {expected}, got {actual}")]
    ProjectScopeMismatch { expected: String, actual: String },

    #[error("Operation timed out")]
    Timeout,

    #[error("Query too short: every token has 2 characters or fewer")]
    QueryTooShort,

    #[error("All retrieval signals failed")]
    RetrievalUnavailable,

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is recoverable (can retry with backoff)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::StoreUnavailable(_) | Error::Timeout | Error::Io(_) => true,
            Error::ParseFailure { .. }
            | Error::NotFound { .. }
            | Error::ProjectScopeMismatch { .. }
            | Error::QueryTooShort
            | Error::RetrievalUnavailable
            | Error::InvalidArguments(_)
            | Error::Unsupported(_)
            | Error::Serialization(_) => false,
        }
    }

    /// Helper for missing graph nodes
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "node",
            id: id.into(),
        }
    }

    /// Helper for missing claims
    pub fn claim_not_found(id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "claim",
            id: id.into(),
        }
    }
}
