//! HTTP surface: the Slack Events API webhook and a health check

mod auth;
mod errors;
mod handlers;

pub use auth::{Authorization, UserDirectory, UserGate};
pub use errors::ApiError;
pub use handlers::create_router;

use crate::ratelimit::RateLimiter;
use crate::runtime::{ChatClient, MentionExecutor};
use crate::session::SessionRegistry;
use crate::slack::SignatureVerifier;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<SignatureVerifier>,
    pub users: Arc<UserGate>,
    /// `None` when rate limiting is disabled
    pub limiter: Option<Arc<RateLimiter>>,
    pub sessions: Arc<SessionRegistry>,
    pub executor: Arc<dyn MentionExecutor>,
    /// Used for rejection notices; executions bring their own client
    pub chat: Arc<dyn ChatClient>,
    /// Parent of every session token; cancelled on shutdown
    pub shutdown: CancellationToken,
}
