//! Routes model tool calls to the backend that owns them

use super::traits::{ToolBackends, ToolCallError};
use super::ExecuteError;
use crate::llm::ContentBlock;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DELIMITER: &str = "__";

/// Split `<server>__<tool>`. Names with no delimiter, more than one, or an
/// empty half are rejected.
pub fn split_tool_name(name: &str) -> Option<(&str, &str)> {
    let (server, tool) = name.split_once(DELIMITER)?;
    if server.is_empty() || tool.is_empty() || tool.contains(DELIMITER) {
        return None;
    }
    Some((server, tool))
}

pub fn namespaced_tool_name(server: &str, tool: &str) -> String {
    format!("{server}{DELIMITER}{tool}")
}

/// What one tool call contributes to the conversation
#[derive(Debug, Default)]
pub struct Dispatched {
    /// Appended to the model's own turn
    pub tool_use: Option<ContentBlock>,
    /// Fed back to the model on the next turn
    pub tool_result: Option<ContentBlock>,
}

pub struct ToolDispatcher {
    backends: ToolBackends,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(backends: ToolBackends, timeout: Duration) -> Self {
        Self { backends, timeout }
    }

    /// Run one tool call. Resolution problems are logged and absorbed; only
    /// cancellation escapes.
    pub async fn dispatch(
        &self,
        cancel: &CancellationToken,
        id: &str,
        name: &str,
        input: &Value,
    ) -> Result<Dispatched, ExecuteError> {
        let canonical = match serde_json::to_string(input) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "Failed to serialize tool arguments");
                return Ok(Dispatched::default());
            }
        };

        let mut dispatched = Dispatched {
            tool_use: Some(ContentBlock::tool_use(id, name, input.clone())),
            tool_result: None,
        };

        let Some((server, tool)) = split_tool_name(name) else {
            tracing::warn!(tool = %name, "Invalid tool name format");
            return Ok(dispatched);
        };

        let Some(backend) = self.backends.by_server_name(server) else {
            tracing::warn!(tool = %name, server = %server, "Unknown tool server");
            return Ok(dispatched);
        };

        let args: Map<String, Value> = match serde_json::from_str(&canonical) {
            Ok(args) => args,
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "Tool arguments are not an object");
                return Ok(dispatched);
            }
        };

        tracing::info!(server = %server, tool = %tool, "Calling tool");
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ExecuteError::Cancelled),
            res = tokio::time::timeout(self.timeout, backend.call_tool(tool, args)) => {
                res.unwrap_or(Err(ToolCallError::Timeout(self.timeout)))
            }
        };

        match outcome {
            Ok(content) if content.is_empty() => {
                tracing::info!(server = %server, tool = %tool, "Tool returned no content");
            }
            Ok(content) => {
                dispatched.tool_result = Some(ContentBlock::tool_result(id, content));
            }
            Err(e) => {
                tracing::warn!(server = %server, tool = %tool, error = %e, "Tool call failed");
                dispatched.tool_result = Some(ContentBlock::tool_error(
                    id,
                    format!("Error calling tool {tool}: {e}"),
                ));
            }
        }

        Ok(dispatched)
    }
}
