//! LLM error types.

use thiserror::Error;

/// Errors that can occur when calling the model endpoint.
#[derive(Debug, Error)]
pub enum LLMError {
    /// HTTP request failed or the stream broke mid-response.
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// API returned 429. `retry_after` is in seconds when the server sent one.
    #[error("rate limited")]
    RateLimit { retry_after: Option<u64> },

    /// A streamed chunk could not be decoded.
    #[error("malformed stream chunk: {0}")]
    Decode(String),
}
