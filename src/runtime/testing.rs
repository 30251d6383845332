//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use super::{ExecuteError, MentionRequest};
use crate::llm::{LlmError, LlmRequest, LlmResponse, ToolContent};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Mock LLM Client
// ============================================================================

/// Mock LLM client that returns queued responses
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    model_id: String,
    delay: Option<Duration>,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmClient {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every call sleeps this long before answering
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a successful response
    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::unknown("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Mock Chat Client
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCall {
    Post {
        channel: String,
        text: String,
        thread_ts: String,
    },
    Update {
        channel: String,
        message_id: String,
        text: String,
    },
    Delete {
        channel: String,
        message_id: String,
    },
}

/// Chat client that records every call and hands out sequential ids
#[derive(Default)]
pub struct MockChatClient {
    calls: Mutex<Vec<ChatCall>>,
    next_id: AtomicUsize,
    fail_posts: bool,
    /// Notified after every post
    pub posted: Arc<Notify>,
}

impl MockChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every post fails with an API error
    #[must_use]
    pub fn failing_posts() -> Self {
        Self {
            fail_posts: true,
            ..Self::default()
        }
    }

    pub fn recorded_calls(&self) -> Vec<ChatCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<String> {
        self.recorded_calls()
            .into_iter()
            .filter_map(|c| match c {
                ChatCall::Post { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<String> {
        self.recorded_calls()
            .into_iter()
            .filter_map(|c| match c {
                ChatCall::Update { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> usize {
        self.recorded_calls()
            .iter()
            .filter(|c| matches!(c, ChatCall::Delete { .. }))
            .count()
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn post(&self, channel: &str, text: &str, thread_ts: &str) -> Result<String, ChatError> {
        self.calls.lock().unwrap().push(ChatCall::Post {
            channel: channel.to_string(),
            text: text.to_string(),
            thread_ts: thread_ts.to_string(),
        });
        self.posted.notify_one();
        if self.fail_posts {
            return Err(ChatError::Api("channel_not_found".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("m{id}"))
    }

    async fn update(
        &self,
        channel: &str,
        message_id: &str,
        text: &str,
    ) -> Result<String, ChatError> {
        self.calls.lock().unwrap().push(ChatCall::Update {
            channel: channel.to_string(),
            message_id: message_id.to_string(),
            text: text.to_string(),
        });
        Ok(message_id.to_string())
    }

    async fn delete(&self, channel: &str, message_id: &str) -> Result<(), ChatError> {
        self.calls.lock().unwrap().push(ChatCall::Delete {
            channel: channel.to_string(),
            message_id: message_id.to_string(),
        });
        Ok(())
    }
}

// ============================================================================
// Mock Tool Backend
// ============================================================================

/// Tool backend with predefined outputs per tool
#[derive(Default)]
pub struct MockToolBackend {
    outputs: HashMap<String, Result<Vec<ToolContent>, ToolCallError>>,
    delay: Option<Duration>,
    /// Record of tool calls
    pub calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl MockToolBackend {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_output(mut self, tool: impl Into<String>, content: Vec<ToolContent>) -> Self {
        self.outputs.insert(tool.into(), Ok(content));
        self
    }

    #[must_use]
    pub fn with_error(mut self, tool: impl Into<String>, error: ToolCallError) -> Self {
        self.outputs.insert(tool.into(), Err(error));
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn recorded_calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolBackend for MockToolBackend {
    async fn call_tool(
        &self,
        tool: &str,
        args: Map<String, Value>,
    ) -> Result<Vec<ToolContent>, ToolCallError> {
        self.calls.lock().unwrap().push((tool.to_string(), args));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outputs.get(tool).cloned().unwrap_or_else(|| Ok(Vec::new()))
    }
}

// ============================================================================
// Recording Executor (for transport testing)
// ============================================================================

/// Executor that records requests and, optionally, runs until cancelled
#[derive(Default)]
pub struct RecordingExecutor {
    requests: Mutex<Vec<MentionRequest>>,
    hold_until_cancelled: bool,
    /// Notified when an execution starts
    pub started: Arc<Notify>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executions block until their session is cancelled
    #[must_use]
    pub fn holding() -> Self {
        Self {
            hold_until_cancelled: true,
            ..Self::default()
        }
    }

    pub fn recorded_requests(&self) -> Vec<MentionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MentionExecutor for RecordingExecutor {
    async fn execute(
        &self,
        cancel: CancellationToken,
        request: MentionRequest,
    ) -> Result<(), ExecuteError> {
        self.requests.lock().unwrap().push(request);
        self.started.notify_one();
        if self.hold_until_cancelled {
            cancel.cancelled().await;
            return Err(ExecuteError::Cancelled);
        }
        Ok(())
    }
}
