//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use super::{ExecuteError, MentionRequest};
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService, ToolContent};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Failure talking to the chat platform
#[derive(Debug, Clone, Error)]
pub enum ChatError {
    /// The platform answered but rejected the call (`ok: false`)
    #[error("chat API error: {0}")]
    Api(String),
    #[error("chat transport error: {0}")]
    Transport(String),
    #[error("chat call timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Failure invoking a tool on a backend
#[derive(Debug, Clone, Error)]
pub enum ToolCallError {
    /// The tool ran and reported an error result
    #[error("{0}")]
    Failed(String),
    #[error("backend unavailable: {0}")]
    Backend(String),
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Client for making LLM requests
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete an LLM request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Chat surface the execution reports into
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Post `text` into the thread, returning the new message id
    async fn post(&self, channel: &str, text: &str, thread_ts: &str) -> Result<String, ChatError>;

    /// Replace the text of a message, returning its (possibly new) id
    async fn update(&self, channel: &str, message_id: &str, text: &str)
        -> Result<String, ChatError>;

    async fn delete(&self, channel: &str, message_id: &str) -> Result<(), ChatError>;
}

/// One external tool server
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Call `tool` (the un-namespaced name) with an argument object
    async fn call_tool(
        &self,
        tool: &str,
        args: Map<String, Value>,
    ) -> Result<Vec<ToolContent>, ToolCallError>;
}

/// Runs one accepted mention to completion
#[async_trait]
pub trait MentionExecutor: Send + Sync {
    async fn execute(
        &self,
        cancel: CancellationToken,
        request: MentionRequest,
    ) -> Result<(), ExecuteError>;
}

/// Tool backends by server name
#[derive(Clone, Default)]
pub struct ToolBackends {
    backends: HashMap<String, Arc<dyn ToolBackend>>,
}

impl ToolBackends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, server: impl Into<String>, backend: Arc<dyn ToolBackend>) {
        self.backends.insert(server.into(), backend);
    }

    pub fn by_server_name(&self, server: &str) -> Option<Arc<dyn ToolBackend>> {
        self.backends.get(server).cloned()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for Arc<T> {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        (**self).complete(request).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

#[async_trait]
impl<T: ChatClient + ?Sized> ChatClient for Arc<T> {
    async fn post(&self, channel: &str, text: &str, thread_ts: &str) -> Result<String, ChatError> {
        (**self).post(channel, text, thread_ts).await
    }

    async fn update(
        &self,
        channel: &str,
        message_id: &str,
        text: &str,
    ) -> Result<String, ChatError> {
        (**self).update(channel, message_id, text).await
    }

    async fn delete(&self, channel: &str, message_id: &str) -> Result<(), ChatError> {
        (**self).delete(channel, message_id).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use a configured provider as `LlmClient`
pub struct ServiceLlmClient {
    service: Arc<dyn LlmService>,
}

impl ServiceLlmClient {
    pub fn new(service: Arc<dyn LlmService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl LlmClient for ServiceLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.service.complete(request).await
    }

    fn model_id(&self) -> &str {
        self.service.model_id()
    }
}
