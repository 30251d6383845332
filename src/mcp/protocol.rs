//! JSON-RPC message shapes shared by the MCP transports

use crate::llm::{flatten_text, ToolContent};
use crate::runtime::ToolCallError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// Largest single message accepted from a server
pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Timeout for the initial handshake (initialize + notifications/initialized).
pub const INIT_TIMEOUT: Duration = Duration::from_secs(30);

const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Error)]
pub enum McpError {
    #[error("failed to spawn server: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("server closed the connection")]
    Closed,
    #[error("invalid message: {0}")]
    Protocol(String),
    #[error("server error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("{method} timed out after {}s", .after.as_secs())]
    Timeout { method: String, after: Duration },
}

/// A tool advertised by `tools/list`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "empty_schema")]
    pub input_schema: Value,
}

pub fn empty_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

#[derive(Debug, Deserialize)]
struct ListToolsResult {
    #[serde(default)]
    tools: Vec<McpTool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallToolResult {
    #[serde(default)]
    content: Vec<ToolContent>,
    #[serde(default)]
    is_error: bool,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

pub fn request(id: u64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

pub fn notification(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
    })
}

pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

/// Id of a response. Notifications and server-initiated requests have none.
pub fn response_id(message: &Value) -> Option<u64> {
    if message.get("method").is_some() {
        return None;
    }
    message.get("id").and_then(Value::as_u64)
}

/// The `result` of a response, or its `error` as [`McpError::Rpc`]
pub fn into_result(mut response: Value) -> Result<Value, McpError> {
    if let Some(error) = response.get("error") {
        let error: RpcError = serde_json::from_value(error.clone())
            .map_err(|e| McpError::Protocol(e.to_string()))?;
        return Err(McpError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    Ok(response.get_mut("result").map_or(Value::Null, Value::take))
}

pub fn parse_tool_list(result: Value) -> Result<Vec<McpTool>, McpError> {
    let list: ListToolsResult =
        serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))?;
    Ok(list.tools)
}

/// `isError` results become [`ToolCallError::Failed`] carrying their text
pub fn parse_call_result(result: Value) -> Result<Vec<ToolContent>, ToolCallError> {
    let result: CallToolResult = serde_json::from_value(result)
        .map_err(|e| ToolCallError::Backend(format!("invalid tools/call result: {e}")))?;
    if result.is_error {
        return Err(ToolCallError::Failed(flatten_text(&result.content)));
    }
    Ok(result.content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_id_ignores_server_requests() {
        assert_eq!(response_id(&json!({"jsonrpc": "2.0", "id": 7, "result": {}})), Some(7));
        assert_eq!(
            response_id(&json!({"jsonrpc": "2.0", "id": 7, "method": "roots/list"})),
            None
        );
        assert_eq!(
            response_id(&json!({"jsonrpc": "2.0", "method": "notifications/message"})),
            None
        );
    }

    #[test]
    fn test_into_result() {
        let ok = into_result(json!({"id": 1, "result": {"tools": []}})).unwrap();
        assert_eq!(ok, json!({"tools": []}));

        let err = into_result(json!({"id": 1, "error": {"code": -32601, "message": "nope"}}))
            .unwrap_err();
        assert!(matches!(err, McpError::Rpc { code: -32601, .. }));
    }

    #[test]
    fn test_call_result_with_sparse_content() {
        let content = parse_call_result(json!({"content": [{"type": "text"}]})).unwrap();
        assert_eq!(flatten_text(&content), "");

        let err = parse_call_result(json!({"isError": true, "content": [{"type": "text", "text": "denied"}]}))
            .unwrap_err();
        assert!(matches!(err, ToolCallError::Failed(ref m) if m == "denied"));
    }
}
