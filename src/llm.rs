//! LLM provider abstraction
//!
//! Provides a common interface for the model providers the bot can talk to.

mod anthropic;
mod error;
mod openai;
mod types;

pub use anthropic::AnthropicService;
pub use error::{LlmError, LlmErrorKind};
pub use openai::OpenAIService;
pub use types::*;

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Common interface for LLM providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a completion request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Which provider API to speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Anthropic,
    #[serde(rename = "openai")]
    OpenAI,
}

/// Build the configured provider, wrapped in [`LoggingService`].
pub fn build_service(
    provider: Provider,
    api_key: String,
    model: Option<&str>,
    base_url: Option<&str>,
) -> Result<Arc<dyn LlmService>, LlmError> {
    let inner: Arc<dyn LlmService> = match provider {
        Provider::Anthropic => Arc::new(AnthropicService::new(api_key, model, base_url)?),
        Provider::OpenAI => Arc::new(OpenAIService::new(api_key, model, base_url)?),
    };
    Ok(Arc::new(LoggingService::new(inner)))
}

/// Logging wrapper for LLM services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    messages = request.messages.len(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    tool_calls = response.tool_uses().len(),
                    "LLM request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    kind = ?e.kind,
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "LLM request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_names() {
        let p: Provider = serde_json::from_str("\"openai\"").unwrap();
        assert_eq!(p, Provider::OpenAI);
        let p: Provider = serde_json::from_str("\"anthropic\"").unwrap();
        assert_eq!(p, Provider::Anthropic);
        assert!(serde_json::from_str::<Provider>("\"google\"").is_err());
    }

    #[test]
    fn test_build_service_uses_model_override() {
        let service = build_service(
            Provider::OpenAI,
            "sk-test".to_string(),
            Some("gpt-4o-mini"),
            None,
        )
        .unwrap();
        assert_eq!(service.model_id(), "gpt-4o-mini");
    }
}
