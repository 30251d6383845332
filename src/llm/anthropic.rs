//! Anthropic Claude provider implementation

use super::types::{
    ContentBlock, LlmMessage, LlmRequest, LlmResponse, MessageRole, Usage,
};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Anthropic service implementation
pub struct AnthropicService {
    client: Client,
    api_key: String,
    model: String,
    url: String,
}

impl AnthropicService {
    pub fn new(
        api_key: String,
        model: Option<&str>,
        base_url: Option<&str>,
    ) -> Result<Self, LlmError> {
        let base = base_url
            .filter(|b| !b.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model: model
                .filter(|m| !m.is_empty())
                .unwrap_or(DEFAULT_MODEL)
                .to_string(),
            url: format!("{base}/v1/messages"),
        })
    }

    fn translate_request(&self, request: &LlmRequest) -> AnthropicRequest {
        let system = request
            .system
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let tools: Vec<AnthropicTool> = request
            .tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect();

        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(8192),
            system: if system.is_empty() { None } else { Some(system) },
            messages: translate_messages(&request.messages),
            tools: if tools.is_empty() { None } else { Some(tools) },
        }
    }
}

/// Anthropic has no tool role: tool results travel in user turns, and
/// consecutive tool entries are merged into a single user turn.
fn translate_messages(messages: &[LlmMessage]) -> Vec<AnthropicMessage> {
    let mut out: Vec<AnthropicMessage> = Vec::with_capacity(messages.len());
    let mut previous_was_tool = false;

    for msg in messages {
        let blocks: Vec<AnthropicContentBlock> =
            msg.content.iter().map(translate_block).collect();
        if blocks.is_empty() {
            continue;
        }

        let is_tool = msg.role == MessageRole::Tool;
        if is_tool && previous_was_tool {
            if let Some(last) = out.last_mut() {
                last.content.extend(blocks);
                continue;
            }
        }
        previous_was_tool = is_tool;

        let role = match msg.role {
            MessageRole::User | MessageRole::Tool => "user",
            MessageRole::Assistant => "assistant",
        };
        out.push(AnthropicMessage {
            role: role.to_string(),
            content: blocks,
        });
    }

    out
}

fn translate_block(block: &ContentBlock) -> AnthropicContentBlock {
    match block {
        ContentBlock::Text { text } => AnthropicContentBlock::Text { text: text.clone() },
        ContentBlock::ToolUse { id, name, input } => AnthropicContentBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: input.clone(),
        },
        ContentBlock::ToolResult {
            tool_use_id,
            text,
            is_error,
            ..
        } => AnthropicContentBlock::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: text.clone(),
            is_error: *is_error,
        },
    }
}

fn normalize_response(resp: AnthropicResponse) -> LlmResponse {
    let content: Vec<ContentBlock> = resp
        .content
        .into_iter()
        .filter_map(|block| match block {
            AnthropicContentBlock::Text { text } => Some(ContentBlock::Text { text }),
            AnthropicContentBlock::ToolUse { id, name, input } => {
                Some(ContentBlock::ToolUse { id, name, input })
            }
            // Tool results never appear in responses
            AnthropicContentBlock::ToolResult { .. } => None,
        })
        .collect();

    LlmResponse {
        content,
        end_turn: resp.stop_reason.as_deref() == Some("end_turn"),
        usage: Usage {
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
        },
    }
}

/// Map a failed HTTP exchange onto an error kind. The body's `error.type`
/// wins over the status so an `overloaded_error` is recognised however the
/// gateway in front of the API reports it.
pub(crate) fn classify_error(
    status: reqwest::StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> LlmError {
    let error_type = serde_json::from_str::<AnthropicErrorResponse>(body)
        .ok()
        .map(|r| r.error.r#type);

    let err = match (status.as_u16(), error_type.as_deref()) {
        (_, Some("overloaded_error")) | (529, _) => {
            LlmError::overloaded(format!("Overloaded: {body}"))
        }
        (_, Some("rate_limit_error")) | (429, _) => {
            LlmError::rate_limit(format!("Rate limited: {body}"))
        }
        (401 | 403, _) => LlmError::auth(format!("Authentication failed: {body}")),
        (400, _) => LlmError::invalid_request(format!("Invalid request: {body}")),
        (500..=599, _) => LlmError::server_error(format!("Server error: {body}")),
        _ => LlmError::unknown(format!("HTTP {status}: {body}")),
    };

    match retry_after {
        Some(after) => err.with_retry_after(after),
        None => err,
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl LlmService for AnthropicService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let anthropic_request = self.translate_request(request);

        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&anthropic_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(classify_error(status, retry_after, &body));
        }

        let anthropic_response: AnthropicResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        Ok(normalize_response(anthropic_response))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorResponse {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    r#type: String,
}
