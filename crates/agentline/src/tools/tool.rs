//! Tool trait for extensible tool execution.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::ToolError;

/// A tool the model can invoke with `<tool name="NAME">BODY</tool>`.
///
/// Each implementation holds its own dependencies (workspace, HTTP client)
/// and interprets the raw body itself.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name used in markers.
    fn name(&self) -> &str;

    /// One-line usage description for the system prompt.
    fn description(&self) -> &str;

    /// Run the tool with the raw marker body.
    async fn execute(&self, body: &str) -> Result<String, ToolError>;
}

/// Type alias for a shared tool reference.
pub type SharedTool = Arc<dyn Tool>;
