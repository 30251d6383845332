//! Slackbot MCP host
//!
//! Answers Slack app mentions with a tool-augmented LLM agent whose tools
//! come from locally spawned MCP servers.

mod api;
mod config;
mod llm;
mod mcp;
mod ratelimit;
mod runtime;
mod session;
mod slack;

use api::{create_router, AppState, UserGate};
use config::Config;
use ratelimit::RateLimiter;
use runtime::{ConversationRuntime, RuntimeConfig, ServiceLlmClient, ToolDispatcher};
use session::SessionRegistry;
use slack::{SignatureVerifier, SlackClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slackbot_mcp_host=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env()?;
    let call_timeout = config.call_timeout();

    // MCP servers
    let (backends, tools) = mcp::connect_all(&config.mcp_servers, call_timeout).await;
    tracing::info!(servers = backends.len(), tools = tools.len(), "Tools discovered");
    if backends.is_empty() && !config.mcp_servers.is_empty() {
        tracing::warn!("No MCP server started; answering without tools");
    }

    // Model provider
    let service = llm::build_service(
        config.llm_provider_name,
        config.llm_api_key.clone(),
        config.llm_model_name.as_deref(),
        config.llm_base_url.as_deref(),
    )?;
    tracing::info!(model = %service.model_id(), "LLM provider ready");

    let slack = Arc::new(SlackClient::new(config.slack_bot_token.clone(), call_timeout)?);
    let chat: Arc<dyn runtime::ChatClient> = Arc::clone(&slack) as Arc<dyn runtime::ChatClient>;

    let runtime = ConversationRuntime::new(
        ServiceLlmClient::new(service),
        Arc::clone(&chat),
        ToolDispatcher::new(backends, call_timeout),
        tools,
        RuntimeConfig {
            call_timeout,
            llm_timeout: config.llm_timeout(),
            max_turns: config.max_turns,
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_tokens,
            ..RuntimeConfig::default()
        },
    );

    let limiter = config.rate_limit.enable.then(|| {
        tracing::info!(
            limit = config.rate_limit.limit,
            burst = config.rate_limit.burst,
            "Per-user rate limit enabled"
        );
        Arc::new(RateLimiter::new(&config.rate_limit))
    });

    let shutdown = CancellationToken::new();
    let state = AppState {
        verifier: Arc::new(SignatureVerifier::new(config.slack_signing_secret.clone())),
        users: Arc::new(UserGate::new(slack, config.allowed_users.clone())),
        limiter,
        sessions: Arc::new(SessionRegistry::new()),
        executor: Arc::new(runtime),
        chat,
        shutdown: shutdown.clone(),
    };

    let app = create_router(state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Slackbot MCP host listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM and cancels every running session
async fn shutdown_signal(root: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = interrupt => {
            tracing::info!("Received SIGINT - shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM - shutting down");
        }
    }

    root.cancel();
}
