//! MCP over streamable HTTP, for servers configured as `sse_server`.
//!
//! Each JSON-RPC message is POSTed to the server URL. The reply is either a
//! JSON body or an event stream whose `data:` lines carry the response.

use super::protocol::{self, McpError, McpTool, INIT_TIMEOUT, MAX_MESSAGE_BYTES};
use crate::llm::ToolContent;
use crate::runtime::{ToolBackend, ToolCallError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

const SESSION_HEADER: &str = "mcp-session-id";
const ACCEPTED_TYPES: &str = "application/json, text/event-stream";

/// JSON-RPC client for one remote MCP server
pub struct HttpClient {
    name: String,
    url: String,
    client: Client,
    /// Assigned by the server on `initialize`, echoed on every later POST
    session_id: Mutex<Option<String>>,
    next_id: AtomicU64,
    request_timeout: Duration,
}

impl HttpClient {
    /// Connect to `url`, sending `headers` with every request, and complete
    /// the MCP handshake.
    pub async fn connect(
        name: &str,
        url: &str,
        headers: &HashMap<String, String>,
        request_timeout: Duration,
    ) -> Result<Self, McpError> {
        let client = Client::builder()
            .default_headers(header_map(headers)?)
            .build()
            .map_err(|e| McpError::Http(format!("failed to create HTTP client: {e}")))?;

        let remote = Self {
            name: name.to_string(),
            url: url.to_string(),
            client,
            session_id: Mutex::new(None),
            next_id: AtomicU64::new(1),
            request_timeout,
        };
        remote
            .request_within("initialize", protocol::initialize_params(), INIT_TIMEOUT)
            .await?;
        remote
            .post(
                &protocol::notification("notifications/initialized", json!({})),
                INIT_TIMEOUT,
            )
            .await?;
        tracing::debug!(mcp_server = %remote.name, url = %remote.url, "Connected to remote MCP server");
        Ok(remote)
    }

    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        protocol::parse_tool_list(self.request("tools/list", json!({})).await?)
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
        self.request_within(method, params, self.request_timeout)
            .await
    }

    async fn request_within(
        &self,
        method: &str,
        params: Value,
        after: Duration,
    ) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let response = self
            .post(&protocol::request(id, method, params), after)
            .await
            .map_err(|e| with_method(e, method))?;

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));
        let body = read_body(response, after)
            .await
            .map_err(|e| with_method(e, method))?;

        let message = if is_stream {
            stream_reply(&body, id)?
        } else {
            serde_json::from_slice(&body).map_err(|e| McpError::Protocol(e.to_string()))?
        };
        if protocol::response_id(&message) != Some(id) {
            return Err(McpError::Protocol(format!("no reply to request {id}")));
        }
        protocol::into_result(message)
    }

    async fn post(&self, message: &Value, after: Duration) -> Result<Response, McpError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(ACCEPT, ACCEPTED_TYPES)
            .timeout(after)
            .json(message);
        if let Some(session) = self.session().as_deref() {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await.map_err(|e| transport_error(&e, after))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Http(format!("HTTP {status}: {}", body.trim())));
        }

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock().unwrap_or_else(PoisonError::into_inner) =
                Some(session.to_string());
        }
        Ok(response)
    }

    fn session(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, McpError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| McpError::Http(format!("invalid header name `{name}`")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| McpError::Http(format!("invalid value for header `{name}`")))?;
        map.insert(header, value);
    }
    Ok(map)
}

fn transport_error(error: &reqwest::Error, after: Duration) -> McpError {
    if error.is_timeout() {
        McpError::Timeout {
            method: String::new(),
            after,
        }
    } else {
        McpError::Http(error.to_string())
    }
}

fn with_method(error: McpError, method: &str) -> McpError {
    match error {
        McpError::Timeout { after, .. } => McpError::Timeout {
            method: method.to_string(),
            after,
        },
        other => other,
    }
}

/// Read the body chunk by chunk, refusing anything over the message cap
async fn read_body(mut response: Response, after: Duration) -> Result<Vec<u8>, McpError> {
    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| transport_error(&e, after))?
    {
        if body.len() + chunk.len() > MAX_MESSAGE_BYTES {
            return Err(McpError::Protocol(format!(
                "reply exceeds {MAX_MESSAGE_BYTES} bytes"
            )));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Find the response to `id` among the events of a `text/event-stream` body.
/// Other events (notifications, server requests) are skipped.
fn stream_reply(body: &[u8], id: u64) -> Result<Value, McpError> {
    let text = String::from_utf8_lossy(body).replace("\r\n", "\n");
    for event in text.split("\n\n") {
        let data = event
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|line| line.strip_prefix(' ').unwrap_or(line))
            .collect::<Vec<_>>()
            .join("\n");
        if data.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&data) {
            Ok(message) if protocol::response_id(&message) == Some(id) => return Ok(message),
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "Skipping unparseable event"),
        }
    }
    Err(McpError::Protocol(format!(
        "event stream ended without a reply to request {id}"
    )))
}

#[async_trait]
impl ToolBackend for HttpClient {
    async fn call_tool(
        &self,
        tool: &str,
        args: Map<String, Value>,
    ) -> Result<Vec<ToolContent>, ToolCallError> {
        let result = self
            .request("tools/call", json!({"name": tool, "arguments": args}))
            .await
            .map_err(|e| ToolCallError::Backend(e.to_string()))?;
        protocol::parse_call_result(result)
    }
}
