//! Mapping from engine errors to JSON-RPC error objects
//!
//! Raw store errors never leak: everything arriving here is already a
//! typed [`codeintel_core::Error`], and the mapping assigns each kind a
//! stable code the client can switch on.

use crate::jsonrpc::JsonRpcError;
use codeintel_core::Error;
use serde_json::json;

/// Stable error codes, offset from the JSON-RPC reserved range
pub mod codes {
    pub const INVALID_ARGUMENTS: i32 = -32602;
    pub const INTERNAL: i32 = -32603;
    pub const NOT_FOUND: i32 = -32001;
    pub const STORE_UNAVAILABLE: i32 = -32002;
    pub const TIMEOUT: i32 = -32003;
    pub const PROJECT_SCOPE_MISMATCH: i32 = -32004;
    pub const RETRIEVAL_UNAVAILABLE: i32 = -32005;
    pub const UNSUPPORTED: i32 = -32006;
    pub const PARSE_FAILURE: i32 = -32007;
    pub const QUERY_TOO_SHORT: i32 = -32008;
}

/// Convert an engine error into its wire representation
#[must_use]
pub fn to_rpc_error(err: &Error) -> JsonRpcError {
    let (code, kind) = match err {
        Error::InvalidArguments(_) => (codes::INVALID_ARGUMENTS, "invalid_arguments"),
        Error::QueryTooShort => (codes::QUERY_TOO_SHORT, "query_too_short"),
        Error::NotFound { .. } => (codes::NOT_FOUND, "not_found"),
        Error::StoreUnavailable(_) => (codes::STORE_UNAVAILABLE, "store_unavailable"),
        Error::Timeout => (codes::TIMEOUT, "timeout"),
        Error::ProjectScopeMismatch { .. } => {
            (codes::PROJECT_SCOPE_MISMATCH, "project_scope_mismatch")
        }
        Error::RetrievalUnavailable => (codes::RETRIEVAL_UNAVAILABLE, "retrieval_unavailable"),
        Error::Unsupported(_) => (codes::UNSUPPORTED, "unsupported"),
        Error::ParseFailure { .. } => (codes::PARSE_FAILURE, "parse_failure"),
        Error::Serialization(_) | Error::Io(_) => (codes::INTERNAL, "internal"),
    };
    JsonRpcError {
        code,
        message: err.to_string(),
        data: Some(json!({ "kind": kind, "recoverable": err.is_recoverable() })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(to_rpc_error(&Error::Timeout).code, codes::TIMEOUT);
        assert_eq!(
            to_rpc_error(&Error::QueryTooShort).code,
            codes::QUERY_TOO_SHORT
        );
        assert_eq!(
            to_rpc_error(&Error::node_not_found("x")).code,
            codes::NOT_FOUND
        );
    }

    #[test]
    fn test_error_data_carries_kind() {
        let err = to_rpc_error(&Error::StoreUnavailable("down".into()));
        assert_eq!(err.data.unwrap()["kind"], "store_unavailable");
    }
}
