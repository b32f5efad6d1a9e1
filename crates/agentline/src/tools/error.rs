//! Tool error types.

use thiserror::Error;

/// Failures raised by a tool handler.
///
/// These are observations, not fatal errors: the agent loop reports them in
/// `tool_end` and lets the model react.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The body could not be interpreted.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Path resolves outside the workspace.
    #[error("path escapes workspace: {0}")]
    OutsideWorkspace(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Tool execution failed.
    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("timed out after {0}s")]
    Timeout(u64),

    /// Required configuration (such as an API key) is missing.
    #[error("not configured: {0}")]
    NotConfigured(String),
}
