//! Shared API types used by the HTTP handlers and by clients of the stream.
//!
//! These types define the wire contract. Changes here affect every client.

use serde::{Deserialize, Serialize};

// ============================================================================
// SSE Event Names
// ============================================================================

/// Event type names carried in both the SSE `event:` field and the `type` payload field.
pub mod sse {
    pub const TOKEN: &str = "token";
    pub const TOOL_START: &str = "tool_start";
    pub const TOOL_END: &str = "tool_end";
    pub const ERROR: &str = "error";
    pub const DONE: &str = "done";
}

// ============================================================================
// Chat
// ============================================================================

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

/// JSON payload of one SSE frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    /// Tool name, present on `tool_start` and `tool_end`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

/// Body of `GET /api/sessions/{session_id}/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetMessagesResponse {
    pub session_id: String,
    /// RFC 3339 creation time.
    pub created_at: String,
    pub messages: Vec<MessageResponse>,
}

/// Body of `GET /readyz`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyzResponse {
    pub status: String,
    pub sessions: usize,
    pub tools: usize,
}
