//! File tools: `read_file` and `write_file`.

use async_trait::async_trait;

use super::workspace::Workspace;
use crate::tools::error::ToolError;
use crate::tools::tool::Tool;

/// Reads a workspace file. Body is the path.
pub struct ReadFileTool {
    workspace: Workspace,
}

impl ReadFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file from the workspace. Body: the file path."
    }

    async fn execute(&self, body: &str) -> Result<String, ToolError> {
        let path = self.workspace.resolve(body)?;
        Ok(tokio::fs::read_to_string(&path).await?)
    }
}

/// Writes a workspace file. First body line is the path, the rest is content.
pub struct WriteFileTool {
    workspace: Workspace,
}

impl WriteFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write a file in the workspace. Body: the path on the first line, file content on the following lines."
    }

    async fn execute(&self, body: &str) -> Result<String, ToolError> {
        let (raw_path, content) = split_path_and_content(body)?;
        let path = self.workspace.resolve(raw_path)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;

        Ok(format!("File written successfully: {}", raw_path))
    }
}

fn split_path_and_content(body: &str) -> Result<(&str, &str), ToolError> {
    let body = body.trim_start_matches(['\r', '\n']);
    let (path, content) = body.split_once('\n').unwrap_or((body, ""));
    let path = path.trim();
    if path.is_empty() {
        return Err(ToolError::InvalidInput(
            "expected a path on the first line".to_string(),
        ));
    }
    Ok((path, content))
}
