//! Session inspection handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};

use crate::api::{GetMessagesResponse, MessageResponse};
use crate::handlers::problem_details;
use crate::server::AppState;
use crate::session::SessionError;

/// GET /api/sessions/{session_id}/messages
pub async fn get_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.sessions.history(&session_id) {
        Ok(Some(snapshot)) => Json(GetMessagesResponse {
            session_id: snapshot.id,
            created_at: snapshot.created_at.to_rfc3339(),
            messages: snapshot
                .turns
                .into_iter()
                .map(|turn| MessageResponse {
                    role: turn.role.to_string(),
                    content: turn.content,
                    tool: turn.tool,
                })
                .collect(),
        })
        .into_response(),
        Ok(None) => problem_details::not_found(format!("session '{session_id}' not found"))
            .into_response(),
        Err(SessionError::Busy(_)) => {
            problem_details::conflict(format!("session '{session_id}' has a run in progress"))
                .into_response()
        }
    }
}
