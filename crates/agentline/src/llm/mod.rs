//! Streaming chat-completion client for the model endpoint.

mod error;
mod openai;
mod provider;
mod sse;
mod types;

pub use error::LLMError;
pub use openai::OpenAICompatibleProvider;
pub use provider::LLMProvider;
pub use sse::{SseDecoder, SseEvent};
pub use types::{ChatRequest, ChatStream, Message, Role, StreamEvent, Usage};
