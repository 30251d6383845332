use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Tells Slack not to redeliver the event
pub const NO_RETRY_HEADER: &str = "x-slack-no-retry";

/// Failures at the webhook boundary, before an execution starts
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("user is not on the allow-list")]
    Forbidden,
    #[error("user rate limit exceeded")]
    RateLimited,
    #[error("bad request: {0}")]
    BadRequest(String),
    /// A session for the same mention is already running
    #[error("duplicate event")]
    Duplicate,
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Duplicate => StatusCode::ACCEPTED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text posted into the thread for `user`, or `None` for failures the
    /// user is not told about.
    pub fn chat_message(&self, user: &str) -> Option<String> {
        let text = match self {
            ApiError::Unauthorized(_) => "🫵 Unauthorized",
            ApiError::Forbidden => {
                "⛔ You are not allowed to perform this operation. Please contact the bot administrator."
            }
            ApiError::RateLimited => "🙌 You have reached your rate limit. Please try again later.",
            ApiError::Internal(_) => "⚠️ Occurred unexpected error",
            ApiError::BadRequest(_) | ApiError::Duplicate => return None,
        };
        Some(format!("<@{user}> \n{text}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), [(NO_RETRY_HEADER, "1")]).into_response()
    }
}
