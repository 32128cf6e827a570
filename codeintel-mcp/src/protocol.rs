//! MCP protocol handlers
//!
//! Core handshake handlers shared by the library and the server binary:
//! `initialize` (protocol version negotiation), `tools/list`, and
//! `shutdown`. Authentication beyond the session id is out of scope.

use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

/// Supported MCP protocol versions, latest first
pub const SUPPORTED_VERSIONS: &[&str] = &["2025-11-25", "2024-11-05"];

/// MCP initialize response payload
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: Value,
    #[serde(rename = "serverInfo")]
    pub server_info: Value,
}

/// One tool in the listing
#[derive(Debug, Clone, Serialize)]
pub struct McpTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// `tools/list` response
#[derive(Debug, Serialize)]
pub struct ListToolsResult {
    pub tools: Vec<McpTool>,
}

/// Handle an `initialize` request, negotiating the protocol version
pub fn handle_initialize(request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
    // Notifications must not produce a response
    request.id.as_ref()?;

    let requested = request
        .params
        .as_ref()
        .and_then(|params| params.get("protocolVersion").and_then(Value::as_str));

    let protocol_version = match requested {
        Some(version) if SUPPORTED_VERSIONS.contains(&version) => version.to_string(),
        Some(version) => {
            info!(
                requested = version,
                negotiated = SUPPORTED_VERSIONS[0],
                "unsupported protocol version requested"
            );
            SUPPORTED_VERSIONS[0].to_string()
        }
        None => SUPPORTED_VERSIONS[0].to_string(),
    };

    let result = InitializeResult {
        protocol_version,
        capabilities: json!({
            "tools": { "listChanged": false }
        }),
        server_info: json!({
            "name": "codeintel-mcp-server",
            "version": env!("CARGO_PKG_VERSION")
        }),
    };

    let value = serde_json::to_value(result).unwrap_or_else(|_| json!({}));
    Some(JsonRpcResponse::success(request.id.clone(), value))
}

/// Handle a `tools/list` request
pub fn handle_list_tools(request: &JsonRpcRequest, tools: Vec<McpTool>) -> Option<JsonRpcResponse> {
    request.id.as_ref()?;
    let value = serde_json::to_value(ListToolsResult { tools }).unwrap_or_else(|_| json!({}));
    Some(JsonRpcResponse::success(request.id.clone(), value))
}

/// Handle a `shutdown` request
pub fn handle_shutdown(request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
    request.id.as_ref()?;
    info!("shutdown requested");
    Some(JsonRpcResponse::success(request.id.clone(), json!(null)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(params: Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: Some("2.0".to_string()),
            id: Some(json!(1)),
            method: "initialize".into(),
            params: Some(params),
        }
    }

    #[test]
    fn test_initialize_negotiates_supported_version() {
        let resp = handle_initialize(&request(json!({"protocolVersion": "2024-11-05"}))).unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
    }

    #[test]
    fn test_initialize_falls_back_to_latest() {
        let resp = handle_initialize(&request(json!({"protocolVersion": "1999-01-01"}))).unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], SUPPORTED_VERSIONS[0]);
    }

    #[test]
    fn test_initialize_notification_is_silent() {
        let mut req = request(json!({}));
        req.id = None;
        assert!(handle_initialize(&req).is_none());
    }
}
