//! HTTP request handlers.

mod chat;
mod health;
pub(crate) mod problem_details;
mod sessions;

pub use chat::chat;
pub use health::{health, livez, readyz, version};
pub use sessions::get_messages;
