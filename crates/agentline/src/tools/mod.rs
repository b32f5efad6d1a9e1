//! Tool execution for the agent loop.
//!
//! Tools are invoked by name with the raw marker body. The dispatcher is
//! built once at startup and shared read-only by every session.

mod builtins;
mod dispatcher;
mod error;
mod tool;

pub use builtins::{
    KNOWN_BUILTIN_TOOLS, ReadFileTool, TerminalTool, WebFetchTool, WebSearchTool, Workspace,
    WriteFileTool, create_builtins,
};
pub use dispatcher::{DispatchError, ToolDispatcher};
pub use error::ToolError;
pub use tool::{SharedTool, Tool};
