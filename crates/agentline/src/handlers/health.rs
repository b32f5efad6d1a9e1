use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::api::ReadyzResponse;
use crate::build_info::BuildInfo;
use crate::server::AppState;

/// GET /api/health
pub async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

pub async fn livez() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<ReadyzResponse>) {
    let (status, label) = if state.shutdown.is_cancelled() {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting_down")
    } else {
        (StatusCode::OK, "ok")
    };
    (
        status,
        Json(ReadyzResponse {
            status: label.to_string(),
            sessions: state.sessions.len(),
            tools: state.tool_count,
        }),
    )
}

pub async fn version() -> Json<BuildInfo> {
    Json(BuildInfo::current())
}
