use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;

use crate::background::RunTasks;
use crate::handlers;
use crate::session::{AgentLoop, SessionRegistry};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionRegistry,
    pub agent: AgentLoop,
    pub runs: RunTasks,
    /// Root token; every run's token is a child of it.
    pub shutdown: CancellationToken,
    /// Capacity of each run's event channel.
    pub event_buffer: usize,
    pub keep_alive_interval_seconds: u64,
    pub tool_count: usize,
}

// ============================================================================
// Server Setup
// ============================================================================

pub fn build_app(state: AppState, request_timeout_seconds: u64) -> Router {
    // SSE streaming routes - no request timeout (runs carry their own)
    let streaming_routes = Router::new()
        .route("/chat", post(handlers::chat))
        .with_state(state.clone());

    // Regular API routes - with request timeout
    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/sessions/{session_id}/messages",
            get(handlers::get_messages),
        )
        .with_state(state.clone())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_seconds),
        ));

    let api = Router::new()
        .merge(streaming_routes)
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024)); // 2 MB

    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route("/version", get(handlers::version))
        .with_state(state)
        .nest("/api", api)
        .layer(CorsLayer::permissive())
}
