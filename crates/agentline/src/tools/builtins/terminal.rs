//! Shell command tool.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::workspace::Workspace;
use crate::tools::error::ToolError;
use crate::tools::tool::Tool;

/// Runs the body with `sh -c` inside the workspace.
pub struct TerminalTool {
    workspace: Workspace,
    timeout_seconds: u64,
}

impl TerminalTool {
    pub fn new(workspace: Workspace, timeout_seconds: u64) -> Self {
        Self {
            workspace,
            timeout_seconds,
        }
    }
}

#[async_trait]
impl Tool for TerminalTool {
    fn name(&self) -> &str {
        "terminal"
    }

    fn description(&self) -> &str {
        "Run a shell command in the workspace. Body: the command line."
    }

    async fn execute(&self, body: &str) -> Result<String, ToolError> {
        let command = body.trim();
        if command.is_empty() {
            return Err(ToolError::InvalidInput("empty command".to_string()));
        }

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(self.workspace.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(
            Duration::from_secs(self.timeout_seconds),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| ToolError::Timeout(self.timeout_seconds))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            let mut content = stdout.into_owned();
            if !stderr.is_empty() {
                content.push_str("\n--- stderr ---\n");
                content.push_str(&stderr);
            }
            return Ok(content);
        }

        let code = output.status.code().unwrap_or(-1);
        Err(ToolError::ExecutionFailed(format!(
            "exit code {code}\n{stdout}{stderr}"
        )))
    }
}
