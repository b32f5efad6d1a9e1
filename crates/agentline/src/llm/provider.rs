//! LLM provider trait.

use async_trait::async_trait;

use super::error::LLMError;
use super::types::{ChatRequest, ChatStream};

/// A model endpoint that streams completion text.
///
/// The returned stream yields `StreamEvent::Token` increments and ends with
/// `StreamEvent::Done`. Dropping the stream aborts the upstream request.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, LLMError>;
}
