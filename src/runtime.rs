//! Runtime for executing mentions
//!
//! One accepted mention becomes one execution: the model is called, the tools
//! it asks for are dispatched, and the results are fed back until it answers
//! without tools.

mod dispatcher;
mod executor;
mod retry;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use dispatcher::{namespaced_tool_name, ToolDispatcher};
pub use executor::{ConversationRuntime, RuntimeConfig};
pub use retry::RetryPolicy;
pub use traits::*;

use crate::llm::LlmError;
use thiserror::Error;

/// Everything an execution needs to know about the mention that started it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionRequest {
    pub user: String,
    pub channel: String,
    /// Thread that status and answers are posted into
    pub thread_ts: String,
    pub prompt: String,
}

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("empty prompt")]
    EmptyPrompt,
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error("model call failed: {0}")]
    Llm(#[from] LlmError),
    #[error("session cancelled")]
    Cancelled,
    #[error("stopped after {0} turns without a final answer")]
    TurnLimit(u32),
}
