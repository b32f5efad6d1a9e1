//! Name-to-handler dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::error::ToolError;
use super::tool::{SharedTool, Tool};

/// Dispatch outcome other than success.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No tool is registered under this name. Fatal to the run.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The handler ran and failed. Reported back to the model.
    #[error(transparent)]
    Failed(#[from] ToolError),
}

/// Registry of tools keyed by name.
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Default, Clone)]
pub struct ToolDispatcher {
    tools: BTreeMap<String, SharedTool>,
}

impl ToolDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single tool. A later tool with the same name replaces the earlier one.
    #[must_use]
    pub fn register(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    #[must_use]
    pub fn register_all(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        for tool in tools {
            self.tools.insert(tool.name().to_string(), tool);
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// `(name, description)` pairs in name order.
    pub fn descriptions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tools
            .iter()
            .map(|(name, tool)| (name.as_str(), tool.description()))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run the named tool with `body`.
    pub async fn dispatch(&self, name: &str, body: &str) -> Result<String, DispatchError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| DispatchError::UnknownTool(name.to_string()))?;

        debug!(tool = %name, body_len = body.len(), "Executing tool");
        let output = tool.execute(body).await?;
        debug!(tool = %name, output_len = output.len(), "Tool completed");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the body back."
        }

        async fn execute(&self, body: &str) -> Result<String, ToolError> {
            Ok(body.to_string())
        }
    }

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "Always fails."
        }

        async fn execute(&self, _body: &str) -> Result<String, ToolError> {
            Err(ToolError::ExecutionFailed("disk on fire".into()))
        }
    }

    fn dispatcher() -> ToolDispatcher {
        ToolDispatcher::new()
            .register(Arc::new(Echo))
            .register(Arc::new(Broken))
    }

    #[tokio::test]
    async fn dispatches_to_registered_tool() {
        let output = dispatcher().dispatch("echo", "hello").await.unwrap();
        assert_eq!(output, "hello");
    }

    #[tokio::test]
    async fn unknown_tool_is_distinguished_from_failure() {
        let err = dispatcher().dispatch("nope", "").await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownTool(ref n) if n == "nope"));
        assert_eq!(err.to_string(), "unknown tool: nope");

        let err = dispatcher().dispatch("broken", "").await.unwrap_err();
        assert!(matches!(err, DispatchError::Failed(_)));
        assert_eq!(err.to_string(), "tool execution failed: disk on fire");
    }

    #[test]
    fn descriptions_are_sorted_by_name() {
        let dispatcher = dispatcher();
        let names: Vec<_> = dispatcher.descriptions().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["broken", "echo"]);
    }
}
