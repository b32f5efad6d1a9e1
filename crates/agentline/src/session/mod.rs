//! Sessions and the agent runs that operate on them.

mod agentic_loop;
mod events;
mod marker;
mod registry;
mod stream;
mod types;

pub use agentic_loop::{AgentError, AgentLoop, RunSummary};
pub use events::AgentEvent;
pub use marker::{MarkerScanner, ScanOutput, ToolInvocation};
pub use registry::{DEFAULT_CLEANUP_INTERVAL, SessionError, SessionGuard, SessionRegistry};
pub use stream::{EventStream, to_sse};
pub use types::{Session, SessionSnapshot, Turn, TurnRole};
