//! Slack Events API webhook
//!
//! Every request passes, in order: signature check, payload parse, user
//! authorization, per-user rate limit, prompt check and session
//! registration. Accepted mentions run on their own task and the webhook
//! answers 202 right away.

use super::{ApiError, AppState, Authorization};
use crate::runtime::{ExecuteError, MentionRequest};
use crate::session::{ConversationKey, SessionGuard};
use crate::slack::{AppMention, EventEnvelope, InnerEvent, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Present on Slack redeliveries; those are exempt from the rate limit
const RETRY_NUM_HEADER: &str = "x-slack-retry-num";

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/slack/events", post(slack_events))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn slack_events(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let now = chrono::Utc::now().timestamp();
    if let Err(e) = state.verifier.verify(
        header(&headers, TIMESTAMP_HEADER),
        header(&headers, SIGNATURE_HEADER),
        &body,
        now,
    ) {
        tracing::warn!(error = %e, "Rejected unsigned request");
        return ApiError::Unauthorized(e.to_string()).into_response();
    }

    let envelope: EventEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed event payload");
            return ApiError::BadRequest(e.to_string()).into_response();
        }
    };

    match envelope {
        EventEnvelope::UrlVerification { challenge } => (StatusCode::OK, challenge).into_response(),
        EventEnvelope::EventCallback {
            event: InnerEvent::AppMention(mention),
        } => {
            let redelivery = headers.contains_key(RETRY_NUM_HEADER);
            match accept_mention(&state, &mention, redelivery).await {
                Ok(status) => status.into_response(),
                Err(err) => {
                    tracing::info!(
                        user = %mention.user,
                        channel = %mention.channel,
                        error = %err,
                        "Mention rejected"
                    );
                    notify_rejection(&state, &mention, &err);
                    err.into_response()
                }
            }
        }
        EventEnvelope::EventCallback { .. } | EventEnvelope::Other => StatusCode::OK.into_response(),
    }
}

async fn accept_mention(
    state: &AppState,
    mention: &AppMention,
    redelivery: bool,
) -> Result<StatusCode, ApiError> {
    let user = match state.users.authorize(&mention.user).await? {
        Authorization::Allowed(user) => user,
        Authorization::Ignored => return Ok(StatusCode::OK),
    };

    if let Some(limiter) = state.limiter.as_ref().filter(|_| !redelivery) {
        if !limiter.allow(&user.id) {
            return Err(ApiError::RateLimited);
        }
    }

    let prompt = mention.prompt();
    if prompt.is_empty() {
        return Err(ApiError::BadRequest("empty prompt".to_string()));
    }

    let key = ConversationKey::new(&mention.channel, &mention.ts, &mention.user);
    let (session, existed) = state.sessions.register_if_absent(key, &state.shutdown);
    if existed {
        return Err(ApiError::Duplicate);
    }

    let request = MentionRequest {
        user: mention.user.clone(),
        channel: mention.channel.clone(),
        thread_ts: mention.reply_thread().to_string(),
        prompt: prompt.to_string(),
    };
    let guard = SessionGuard::new(Arc::clone(&state.sessions), session);
    let active = state.sessions.len();
    let executor = Arc::clone(&state.executor);

    tokio::spawn(async move {
        let conv_key = guard.session().key().to_string();
        tracing::info!(conv_key = %conv_key, user = %user.name, active, "Execution started");
        match executor.execute(guard.session().token(), request).await {
            Ok(()) => tracing::info!(conv_key = %conv_key, "Execution finished"),
            Err(ExecuteError::Cancelled) => {
                tracing::info!(conv_key = %conv_key, "Execution cancelled");
            }
            Err(e) => tracing::error!(conv_key = %conv_key, error = %e, "Execution failed"),
        }
        drop(guard);
    });

    Ok(StatusCode::ACCEPTED)
}

/// Tell the user in-thread why their mention was refused
fn notify_rejection(state: &AppState, mention: &AppMention, err: &ApiError) {
    let Some(text) = err.chat_message(&mention.user) else {
        return;
    };
    let chat = Arc::clone(&state.chat);
    let channel = mention.channel.clone();
    let thread_ts = mention.reply_thread().to_string();
    tokio::spawn(async move {
        if let Err(e) = chat.post(&channel, &text, &thread_ts).await {
            tracing::warn!(channel = %channel, error = %e, "Failed to post rejection notice");
        }
    });
}
