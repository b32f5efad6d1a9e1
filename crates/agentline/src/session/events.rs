//! Events produced by one agent run.

use crate::api::{EventPayload, sse};

/// One event on a run's stream.
///
/// Exactly one terminal event (`Error` or `Done`) ends every stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// Plain generated text.
    Token(String),
    /// A tool marker was recognized and the tool is about to run.
    ToolStart { name: String, body: String },
    /// The tool finished. Failures carry `success: false` and an `Error: ...` result.
    ToolEnd {
        name: String,
        result: String,
        success: bool,
    },
    /// Fatal error. Terminal.
    Error(String),
    /// Normal completion. Terminal.
    Done,
}

impl AgentEvent {
    /// SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::Token(_) => sse::TOKEN,
            AgentEvent::ToolStart { .. } => sse::TOOL_START,
            AgentEvent::ToolEnd { .. } => sse::TOOL_END,
            AgentEvent::Error(_) => sse::ERROR,
            AgentEvent::Done => sse::DONE,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::Error(_) | AgentEvent::Done)
    }

    /// Wire payload for the `data:` field.
    pub fn payload(&self) -> EventPayload {
        let (content, tool) = match self {
            AgentEvent::Token(text) => (text.clone(), None),
            AgentEvent::ToolStart { name, body } => (format!("{name}: {body}"), Some(name.clone())),
            AgentEvent::ToolEnd { name, result, .. } => (result.clone(), Some(name.clone())),
            AgentEvent::Error(message) => (message.clone(), None),
            AgentEvent::Done => (String::new(), None),
        };
        EventPayload {
            kind: self.kind().to_string(),
            content,
            tool,
        }
    }
}
