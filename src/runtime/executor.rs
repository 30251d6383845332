//! Conversation runtime executor

use super::traits::{ChatClient, ChatError, LlmClient, MentionExecutor};
use super::{ExecuteError, MentionRequest, RetryPolicy, ToolDispatcher};
use crate::llm::{
    ContentBlock, LlmError, LlmMessage, LlmRequest, LlmResponse, SystemContent, ToolDefinition,
};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const THINKING: &str = "⌛ Thinking...";
const FAILURE: &str = "❌ Sorry, I couldn't generate a response. Please try again later.";

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Bound on each chat call
    pub call_timeout: Duration,
    /// Bound on each model attempt
    pub llm_timeout: Duration,
    /// Model turns per execution; 0 disables the bound
    pub max_turns: u32,
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub retry: RetryPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            llm_timeout: Duration::from_secs(120),
            max_turns: 25,
            system_prompt: None,
            max_tokens: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Drives one mention through model turns and tool calls
pub struct ConversationRuntime<L, C>
where
    L: LlmClient,
    C: ChatClient,
{
    llm: L,
    chat: C,
    dispatcher: ToolDispatcher,
    tools: Vec<ToolDefinition>,
    config: RuntimeConfig,
}

impl<L, C> ConversationRuntime<L, C>
where
    L: LlmClient,
    C: ChatClient,
{
    pub fn new(
        llm: L,
        chat: C,
        dispatcher: ToolDispatcher,
        tools: Vec<ToolDefinition>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            llm,
            chat,
            dispatcher,
            tools,
            config,
        }
    }

    /// Run the mention until the model answers without requesting tools.
    ///
    /// An empty prompt is rejected before anything is posted.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        request: &MentionRequest,
    ) -> Result<(), ExecuteError> {
        if request.prompt.trim().is_empty() {
            return Err(ExecuteError::EmptyPrompt);
        }

        tracing::info!(
            model = %self.llm.model_id(),
            channel = %request.channel,
            thread_ts = %request.thread_ts,
            user = %request.user,
            "Starting execution"
        );

        let mut history = vec![LlmMessage::user(request.prompt.clone())];
        let mut turn = 0;
        loop {
            turn += 1;
            if self.config.max_turns > 0 && turn > self.config.max_turns {
                return Err(self.stop_at_turn_limit(cancel, request).await);
            }
            if !self.run_turn(cancel, request, &mut history, turn).await? {
                tracing::info!(channel = %request.channel, turns = turn, "Execution finished");
                return Ok(());
            }
        }
    }

    /// One model call plus the tool calls it requested. Returns whether the
    /// model has tool results to look at.
    async fn run_turn(
        &self,
        cancel: &CancellationToken,
        request: &MentionRequest,
        history: &mut Vec<LlmMessage>,
        turn: u32,
    ) -> Result<bool, ExecuteError> {
        let channel = request.channel.as_str();
        let mut placeholder = self
            .chat_call(cancel, self.chat.post(channel, THINKING, &request.thread_ts))
            .await?;

        let response = match self
            .complete_with_retry(cancel, channel, &mut placeholder, history)
            .await
        {
            Ok(response) => response,
            Err(ExecuteError::Llm(e)) => {
                if let Err(update_err) = self
                    .chat_call(cancel, self.chat.update(channel, &placeholder, FAILURE))
                    .await
                {
                    tracing::warn!(error = %update_err, "Failed to report model failure");
                }
                return Err(ExecuteError::Llm(e));
            }
            Err(e) => return Err(e),
        };

        if !response.usage.is_zero() {
            tracing::info!(
                turn,
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                total_tokens = response.usage.total(),
                "Usage statistics"
            );
        }

        let mut content = Vec::new();
        let text = response.text();
        if text.trim().is_empty() {
            self.chat_call(cancel, self.chat.delete(channel, &placeholder))
                .await?;
        } else {
            self.chat_call(cancel, self.chat.update(channel, &placeholder, &text))
                .await?;
            content.push(ContentBlock::text(text));
        }

        let mut results = Vec::new();
        for (id, name, input) in response.tool_uses() {
            tracing::info!(turn, tool = %name, "Using tool");
            let dispatched = self.dispatcher.dispatch(cancel, id, name, input).await?;
            content.extend(dispatched.tool_use);
            results.extend(dispatched.tool_result);
        }

        history.push(LlmMessage {
            role: response.role(),
            content,
        });

        if results.is_empty() {
            return Ok(false);
        }
        history.extend(results.into_iter().map(LlmMessage::tool));
        Ok(true)
    }

    /// Call the model, retrying transient failures per the retry policy.
    /// Rate-limit waits are announced in the placeholder.
    async fn complete_with_retry(
        &self,
        cancel: &CancellationToken,
        channel: &str,
        placeholder: &mut String,
        history: &[LlmMessage],
    ) -> Result<LlmResponse, ExecuteError> {
        let request = self.build_request(history);
        let mut attempt = 1;
        loop {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ExecuteError::Cancelled),
                res = tokio::time::timeout(self.config.llm_timeout, self.llm.complete(&request)) => {
                    res.unwrap_or_else(|_| Err(LlmError::timeout(self.config.llm_timeout)))
                }
            };

            let error = match result {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            let Some(delay) = self.config.retry.next_delay(attempt, &error) else {
                tracing::error!(attempt, kind = ?error.kind, error = %error, "Model call failed");
                return Err(ExecuteError::Llm(error));
            };

            tracing::warn!(
                attempt,
                kind = ?error.kind,
                delay_secs = delay.as_secs(),
                error = %error,
                "Model call failed, retrying"
            );

            if error.kind.is_rate_limit() {
                let notice = format!(
                    "⌛ Rate limit exceeded. Waiting {}s before retrying...",
                    delay.as_secs()
                );
                match self
                    .chat_call(cancel, self.chat.update(channel, placeholder, &notice))
                    .await
                {
                    Ok(id) => *placeholder = id,
                    Err(ExecuteError::Cancelled) => return Err(ExecuteError::Cancelled),
                    Err(e) => tracing::warn!(error = %e, "Failed to announce rate limit wait"),
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ExecuteError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    fn build_request(&self, history: &[LlmMessage]) -> LlmRequest {
        LlmRequest {
            system: self
                .config
                .system_prompt
                .iter()
                .map(SystemContent::new)
                .collect(),
            messages: history.to_vec(),
            tools: self.tools.clone(),
            max_tokens: self.config.max_tokens,
        }
    }

    async fn stop_at_turn_limit(
        &self,
        cancel: &CancellationToken,
        request: &MentionRequest,
    ) -> ExecuteError {
        let limit = self.config.max_turns;
        tracing::warn!(channel = %request.channel, limit, "Turn limit reached");
        let notice = format!("⚠️ Stopped after {limit} rounds of tool calls without a final answer.");
        if let Err(e) = self
            .chat_call(cancel, self.chat.post(&request.channel, &notice, &request.thread_ts))
            .await
        {
            tracing::warn!(error = %e, "Failed to report turn limit");
        }
        ExecuteError::TurnLimit(limit)
    }

    /// Bound a chat call by the session token and the per-call timeout.
    async fn chat_call<T>(
        &self,
        cancel: &CancellationToken,
        call: impl Future<Output = Result<T, ChatError>>,
    ) -> Result<T, ExecuteError> {
        let timeout = self.config.call_timeout;
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ExecuteError::Cancelled),
            res = tokio::time::timeout(timeout, call) => match res {
                Ok(inner) => inner.map_err(ExecuteError::Chat),
                Err(_) => Err(ExecuteError::Chat(ChatError::Timeout(timeout))),
            },
        }
    }
}

#[async_trait]
impl<L, C> MentionExecutor for ConversationRuntime<L, C>
where
    L: LlmClient,
    C: ChatClient,
{
    async fn execute(
        &self,
        cancel: CancellationToken,
        request: MentionRequest,
    ) -> Result<(), ExecuteError> {
        self.run(&cancel, &request).await
    }
}
