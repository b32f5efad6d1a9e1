//! Streaming chat handler.

use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tracing::{Instrument, info, info_span};
use ulid::Ulid;

use crate::api::ChatRequest;
use crate::handlers::problem_details;
use crate::server::AppState;
use crate::session::{EventStream, SessionError};

/// POST /api/chat
///
/// Acquires the session, starts the run in a background task and streams its
/// events. Failures before the stream starts are problem responses; once
/// streaming has begun every failure is an `error` event.
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Json(ChatRequest {
        session_id,
        message,
    }) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return problem_details::bad_request(rejection.body_text()).into_response(),
    };

    if session_id.trim().is_empty() {
        return problem_details::bad_request("session_id must not be empty").into_response();
    }

    if state.shutdown.is_cancelled() {
        return problem_details::service_unavailable("server is shutting down").into_response();
    }

    let guard = match state.sessions.acquire(&session_id).await {
        Ok(guard) => guard,
        Err(SessionError::Busy(_)) => {
            info!(session_id = %session_id, policy = ?state.sessions.policy(), "Session busy, rejecting request");
            return problem_details::conflict(format!(
                "session '{session_id}' already has a run in progress"
            ))
            .into_response();
        }
    };

    let run_id = Ulid::new().to_string();
    let cancel = state.shutdown.child_token();
    let (tx, rx) = mpsc::channel(state.event_buffer);

    info!(session_id = %session_id, run_id = %run_id, "Starting run");

    let agent = state.agent.clone();
    let span = info_span!("run", run_id = %run_id, session_id = %session_id);
    let run_cancel = cancel.clone();
    state.runs.spawn(
        async move {
            agent.drive(guard, message, tx, run_cancel).await;
        }
        .instrument(span),
    );

    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(state.keep_alive_interval_seconds))
        .text("keep-alive");

    Sse::new(EventStream::new(rx, cancel, session_id))
        .keep_alive(keep_alive)
        .into_response()
}
