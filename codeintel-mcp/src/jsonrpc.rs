//! JSON-RPC 2.0 message types and stdio framing
//!
//! Supports both line-delimited JSON and LSP-style `Content-Length`
//! framing on the same stream; responses mirror the framing the request
//! arrived with.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::{self, BufRead, Read, Write};

/// JSON-RPC request structure
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC response structure
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Successful response for a request id
    #[must_use]
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Error response for a request id
    #[must_use]
    pub fn failure(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC error structure
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Read the next message from the stream.
///
/// Returns `(message, used_content_length)` so the writer can mirror the
/// framing, or `None` at EOF. A bare JSON line is a complete message; a
/// header line opens an LSP-style header block whose `Content-Length`
/// sizes the body. Anything else (stray log output, blank lines) is
/// skipped.
pub fn read_next_message<R: BufRead + Read>(reader: &mut R) -> io::Result<Option<(String, bool)>> {
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let line = line.trim();

        if line.starts_with('{') {
            return Ok(Some((line.to_string(), false)));
        }
        if !is_header_line(line) {
            continue;
        }

        let headers = collect_header_block(reader, line)?;
        let Some(length) = headers
            .get("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
        else {
            continue;
        };

        let mut body = vec![0u8; length];
        reader.read_exact(&mut body)?;
        return Ok(Some((String::from_utf8_lossy(&body).into_owned(), true)));
    }
}

/// Whether a line opens an LSP framing header block.
///
/// Only the framing headers count; prose or timestamps with colons in
/// them must not start a block, or they would swallow the next message.
fn is_header_line(line: &str) -> bool {
    let Some((name, _)) = line.split_once(':') else {
        return false;
    };
    matches!(
        name.trim().to_ascii_lowercase().as_str(),
        "content-length" | "content-type"
    )
}

/// Fold the header block that `first` opens into a lowercased-key map,
/// consuming lines up to and including the blank terminator
fn collect_header_block<R: BufRead>(
    reader: &mut R,
    first: &str,
) -> io::Result<HashMap<String, String>> {
    let mut headers = HashMap::new();
    let mut current = first.to_string();
    loop {
        if let Some((name, value)) = current.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
        let mut next = String::new();
        if reader.read_line(&mut next)? == 0 || next.trim().is_empty() {
            return Ok(headers);
        }
        current = next.trim().to_string();
    }
}

/// Write a response body, optionally with `Content-Length` framing
pub fn write_message<W: Write>(writer: &mut W, body: &str, content_length: bool) -> io::Result<()> {
    if content_length {
        let bytes = body.as_bytes();
        write!(writer, "Content-Length: {}\r\n\r\n", bytes.len())?;
        writer.write_all(bytes)?;
        writer.write_all(b"\n")?;
    } else {
        writer.write_all(body.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}
