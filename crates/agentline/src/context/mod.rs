//! Model context assembly.
//!
//! The system prompt is rendered once at startup from the workspace, its
//! skills, and the registered tools. Each run appends the current long-term
//! memory, and each model call combines that with a window of the session's
//! history.

mod builder;
mod memory;
mod prompt;
mod skills;

pub use builder::{ContextBuilder, render_turn};
pub use memory::{HISTORY_FILE, MEMORY_DIR, MEMORY_FILE, MemoryStore};
pub use prompt::{BOOTSTRAP_FILES, load_bootstrap, render_system_prompt};
pub use skills::{SKILLS_DIR, Skill, load_skills};
