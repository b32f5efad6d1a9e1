//! Built-in tool implementations.

mod file;
mod terminal;
mod web_fetch;
mod web_search;
mod workspace;

use std::sync::Arc;

pub use file::{ReadFileTool, WriteFileTool};
pub use terminal::TerminalTool;
pub use web_fetch::WebFetchTool;
pub use web_search::WebSearchTool;
pub use workspace::Workspace;

use super::tool::SharedTool;
use crate::config::ToolsConfig;

/// Names of all built-in tools.
pub const KNOWN_BUILTIN_TOOLS: &[&str] = &[
    "read_file",
    "write_file",
    "terminal",
    "web_fetch",
    "web_search",
];

/// Build every built-in tool for the configured workspace.
///
/// `web_search` is always registered; without an API key it fails at call
/// time so the model sees why.
pub fn create_builtins(
    config: &ToolsConfig,
    client: reqwest::Client,
) -> Result<Vec<SharedTool>, regex::Error> {
    let workspace = Workspace::new(&config.workspace);

    Ok(vec![
        Arc::new(ReadFileTool::new(workspace.clone())),
        Arc::new(WriteFileTool::new(workspace.clone())),
        Arc::new(TerminalTool::new(
            workspace,
            config.terminal_timeout_seconds,
        )),
        Arc::new(WebFetchTool::new(client.clone())?),
        Arc::new(WebSearchTool::new(client, config.resolved_search_key())),
    ])
}
