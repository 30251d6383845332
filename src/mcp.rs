//! MCP tool servers
//!
//! Each configured server becomes a [`ToolBackend`] and contributes its tools
//! under `<server>__<tool>` names. Servers are spawned locally and spoken to
//! over stdio, or reached over HTTP when configured as `sse_server`.

mod http;
mod protocol;
mod stdio;

pub use protocol::{McpError, McpTool};

use self::http::HttpClient;
use self::stdio::StdioClient;

use crate::config::McpServerConfig;
use crate::llm::ToolDefinition;
use crate::runtime::{namespaced_tool_name, ToolBackend, ToolBackends};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Namespaced definitions offered to the model for one server's tools
pub fn tool_definitions(server: &str, tools: &[McpTool]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|tool| ToolDefinition {
            name: namespaced_tool_name(server, &tool.name),
            description: tool.description.clone().unwrap_or_default(),
            input_schema: tool.input_schema.clone(),
        })
        .collect()
}

/// Start every configured server. Servers that fail to start or to list
/// their tools are logged and left out.
pub async fn connect_all(
    servers: &BTreeMap<String, McpServerConfig>,
    request_timeout: Duration,
) -> (ToolBackends, Vec<ToolDefinition>) {
    let mut backends = ToolBackends::new();
    let mut definitions = Vec::new();

    for (name, config) in servers {
        let (backend, tools) = match connect(name, config, request_timeout).await {
            Ok(connected) => connected,
            Err(e) => {
                tracing::error!(mcp_server = %name, error = %e, "Failed to start MCP server");
                continue;
            }
        };
        tracing::info!(
            mcp_server = %name,
            remote = config.is_remote(),
            tools = ?tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "MCP server ready"
        );
        definitions.extend(tool_definitions(name, &tools));
        backends.insert(name.clone(), backend);
    }

    (backends, definitions)
}

async fn connect(
    name: &str,
    config: &McpServerConfig,
    request_timeout: Duration,
) -> Result<(Arc<dyn ToolBackend>, Vec<McpTool>), McpError> {
    if config.is_remote() {
        let url = config
            .remote_url()
            .ok_or_else(|| McpError::Protocol("remote server has no URL".to_string()))?;
        let client = HttpClient::connect(name, url, &config.env, request_timeout).await?;
        let tools = client.list_tools().await?;
        return Ok((Arc::new(client), tools));
    }
    let client = StdioClient::spawn(name, config, request_timeout).await?;
    let tools = client.list_tools().await?;
    Ok((Arc::new(client), tools))
}
