//! `OpenAI` Chat Completions provider implementation

use super::types::{ContentBlock, LlmMessage, LlmRequest, LlmResponse, MessageRole, Usage};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

pub struct OpenAIService {
    client: Client,
    api_key: String,
    model: String,
    url: String,
}

impl OpenAIService {
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
            url: format!("{base}/chat/completions"),
        })
    }

    fn translate_request(&self, request: &LlmRequest) -> OpenAIRequest {
        let mut messages = Vec::new();

        if !request.system.is_empty() {
            let system_text = request
                .system
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: Some(system_text),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for msg in &request.messages {
            messages.extend(translate_message(msg));
        }

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| OpenAITool {
                        r#type: "function".to_string(),
                        function: OpenAIFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.input_schema.clone(),
                        },
                    })
                    .collect(),
            )
        };

        OpenAIRequest {
            model: self.model.clone(),
            messages,
            tools,
            max_tokens: request.max_tokens,
        }
    }
}

/// Translate a history entry to `OpenAI` format.
/// Returns a Vec because every tool result is its own "tool" message.
fn translate_message(msg: &LlmMessage) -> Vec<OpenAIMessage> {
    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut messages = Vec::new();

    for block in &msg.content {
        match block {
            ContentBlock::Text { text } => text_parts.push(text.clone()),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(OpenAIToolCall {
                id: id.clone(),
                r#type: "function".to_string(),
                function: OpenAIFunctionCall {
                    name: name.clone(),
                    arguments: serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string()),
                },
            }),
            ContentBlock::ToolResult {
                tool_use_id,
                text,
                is_error,
                ..
            } => messages.push(OpenAIMessage {
                role: "tool".to_string(),
                content: Some(if *is_error {
                    format!("Error: {text}")
                } else {
                    text.clone()
                }),
                tool_calls: None,
                tool_call_id: Some(tool_use_id.clone()),
            }),
        }
    }

    if !text_parts.is_empty() || !tool_calls.is_empty() {
        let role = match msg.role {
            MessageRole::Assistant => "assistant",
            MessageRole::User | MessageRole::Tool => "user",
        };
        messages.insert(
            0,
            OpenAIMessage {
                role: role.to_string(),
                content: if text_parts.is_empty() {
                    None
                } else {
                    Some(text_parts.join("\n"))
                },
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
                tool_call_id: None,
            },
        );
    }

    messages
}

fn normalize_response(resp: OpenAIResponse) -> Result<LlmResponse, LlmError> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::unknown("No choices in response"))?;

    let mut content = Vec::new();

    if let Some(text) = choice.message.content {
        if !text.is_empty() {
            content.push(ContentBlock::Text { text });
        }
    }

    if let Some(tool_calls) = choice.message.tool_calls {
        for tc in tool_calls {
            if tc.function.name.is_empty() {
                continue;
            }
            let input = serde_json::from_str(&tc.function.arguments)
                .unwrap_or_else(|_| serde_json::json!({}));
            content.push(ContentBlock::ToolUse {
                id: tc.id,
                name: tc.function.name,
                input,
            });
        }
    }

    Ok(LlmResponse {
        content,
        end_turn: choice.finish_reason.as_deref() == Some("stop"),
        usage: Usage {
            input_tokens: u64::from(resp.usage.prompt_tokens),
            output_tokens: u64::from(resp.usage.completion_tokens),
        },
    })
}

fn classify_error(status: reqwest::StatusCode, body: &str) -> LlmError {
    let message = serde_json::from_str::<OpenAIErrorResponse>(body)
        .map_or_else(|_| body.to_string(), |r| r.error.message);
    match status.as_u16() {
        401 | 403 => LlmError::auth(format!("Authentication failed: {message}")),
        429 => LlmError::rate_limit(format!("Rate limit exceeded: {message}")),
        503 => LlmError::overloaded(format!("Overloaded: {message}")),
        400 => LlmError::invalid_request(format!("Invalid request: {message}")),
        500..=599 => LlmError::server_error(format!("Server error: {message}")),
        _ => LlmError::unknown(format!("HTTP {status}: {message}")),
    }
}

#[async_trait]
impl LlmService for OpenAIService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let openai_request = self.translate_request(request);

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&openai_request)
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
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }

        let openai_response: OpenAIResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        normalize_response(openai_response)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIToolCall {
    id: String,
    r#type: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: OpenAIUsage,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmErrorKind;
    use serde_json::json;

    #[test]
    fn test_tool_results_become_tool_messages() {
        let msg = LlmMessage::tool(ContentBlock::tool_error("call_1", "boom"));
        let translated = translate_message(&msg);
        assert_eq!(translated.len(), 1);
        assert_eq!(translated[0].role, "tool");
        assert_eq!(translated[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(translated[0].content.as_deref(), Some("Error: boom"));
    }

    #[test]
    fn test_assistant_tool_calls_serialize_arguments() {
        let msg = LlmMessage::assistant(vec![ContentBlock::tool_use(
            "call_1",
            "fetch__get",
            json!({"url": "https://example.com"}),
        )]);
        let translated = translate_message(&msg);
        let calls = translated[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.arguments, r#"{"url":"https://example.com"}"#);
        assert!(translated[0].content.is_none());
    }

    #[test]
    fn test_normalize_skips_unnamed_tool_calls() {
        let resp: OpenAIResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "",
                    "tool_calls": [
                        {"id": "a", "type": "function", "function": {"name": "", "arguments": "{}"}},
                        {"id": "b", "type": "function", "function": {"name": "x__y", "arguments": "not json"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 4}
        }))
        .unwrap();
        let response = normalize_response(resp).unwrap();
        assert_eq!(response.text(), "");
        let uses = response.tool_uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].2, &json!({}));
    }

    #[test]
    fn test_classify_error() {
        let body = r#"{"error":{"message":"slow down"}}"#;
        let err = classify_error(reqwest::StatusCode::TOO_MANY_REQUESTS, body);
        assert_eq!(err.kind, LlmErrorKind::RateLimit);
        assert!(err.message.contains("slow down"));
        assert_eq!(
            classify_error(reqwest::StatusCode::SERVICE_UNAVAILABLE, "x").kind,
            LlmErrorKind::Overloaded
        );
    }
}
