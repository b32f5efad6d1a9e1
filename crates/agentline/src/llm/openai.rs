//! OpenAI-compatible LLM provider.
//!
//! Works with OpenAI, OpenRouter, Ollama, and other compatible APIs.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::{Client, StatusCode};

use super::error::LLMError;
use super::provider::LLMProvider;
use super::sse::{SseDecoder, SseEvent};
use super::types::{ChatRequest, ChatStream, Message, StreamEvent, Usage};

/// OpenAI-compatible provider.
pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAICompatibleProvider {
    #[must_use]
    pub fn new(client: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, LLMError> {
        let url = format!("{}/chat/completions", self.base_url);

        let stream_request = StreamRequest {
            model: request.model,
            messages: request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        };

        let mut req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");

        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req.json(&stream_request).send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(LLMError::RateLimit { retry_after });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LLMError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let byte_stream = response.bytes_stream();
        Ok(Box::pin(OpenAIStreamAdapter::new(byte_stream)))
    }
}

// ============================================================================
// Streaming Types
// ============================================================================

#[derive(serde::Serialize)]
struct StreamRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    /// Request usage stats in the final chunk.
    stream_options: StreamOptions,
}

#[derive(serde::Serialize)]
struct StreamOptions {
    include_usage: bool,
}

/// Adapter that turns a raw response body into `StreamEvent`s.
struct OpenAIStreamAdapter<S> {
    inner: S,
    decoder: SseDecoder,
    /// Decoded SSE events not yet converted.
    pending: VecDeque<SseEvent>,
    /// Usage from the final chunk.
    usage: Option<Usage>,
    done: bool,
}

impl<S> OpenAIStreamAdapter<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            usage: None,
            done: false,
        }
    }

    fn finish(&mut self) -> Poll<Option<Result<StreamEvent, LLMError>>> {
        self.done = true;
        Poll::Ready(Some(Ok(StreamEvent::Done {
            usage: self.usage.take(),
        })))
    }

    /// Convert one SSE event. `None` means the event carried nothing to emit.
    fn convert(&mut self, event: SseEvent) -> Option<Poll<Option<Result<StreamEvent, LLMError>>>> {
        let data = event.data;
        if data.is_empty() {
            return None;
        }
        if data == "[DONE]" {
            return Some(self.finish());
        }

        match serde_json::from_str::<StreamChunk>(&data) {
            Ok(chunk) => {
                if let Some(usage) = chunk.usage {
                    self.usage = Some(usage);
                }
                let content = chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta.content)
                    .filter(|content| !content.is_empty())?;
                Some(Poll::Ready(Some(Ok(StreamEvent::Token(content)))))
            }
            Err(e) => {
                tracing::debug!(data = %data, error = %e, "failed to parse stream chunk");
                None
            }
        }
    }
}

impl<S> Stream for OpenAIStreamAdapter<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    type Item = Result<StreamEvent, LLMError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        loop {
            while let Some(event) = self.pending.pop_front() {
                if let Some(ready) = self.convert(event) {
                    return ready;
                }
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let events = self.decoder.push(&bytes);
                    self.pending.extend(events);
                }
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(LLMError::Request(e))));
                }
                Poll::Ready(None) => {
                    if let Some(event) = self.decoder.finish()
                        && let Some(ready) = self.convert(event)
                    {
                        return ready;
                    }
                    // Body ended without [DONE]
                    return self.finish();
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// OpenAI SSE stream chunk.
#[derive(serde::Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(serde::Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(serde::Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sse_body(chunks: &[&str]) -> String {
        let mut body = String::new();
        for chunk in chunks {
            body.push_str("data: ");
            body.push_str(chunk);
            body.push_str("\n\n");
        }
        body
    }

    fn request() -> ChatRequest {
        ChatRequest::new("test-model", vec![Message::user("hi")], None, None)
    }

    async fn collect(stream: ChatStream) -> Vec<StreamEvent> {
        stream.map(|e| e.unwrap()).collect().await
    }

    #[tokio::test]
    async fn streams_tokens_then_done_with_usage() {
        let server = MockServer::start().await;
        let body = sse_body(&[
            r#"{"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"{"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"{"choices":[{"delta":{"content":"lo"}}]}"#,
            r#"{"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#,
            "[DONE]",
        ]);
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let provider =
            OpenAICompatibleProvider::new(Client::new(), server.uri(), Some("sk-test".into()));
        let events = collect(provider.chat_stream(request()).await.unwrap()).await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Token("Hel".into()),
                StreamEvent::Token("lo".into()),
                StreamEvent::Done {
                    usage: Some(Usage {
                        prompt_tokens: 3,
                        completion_tokens: 2,
                        total_tokens: 5,
                    })
                },
            ]
        );
    }

    #[tokio::test]
    async fn body_without_done_marker_still_finishes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(sse_body(&[r#"{"choices":[{"delta":{"content":"x"}}]}"#])),
            )
            .mount(&server)
            .await;

        let provider = OpenAICompatibleProvider::new(Client::new(), server.uri(), None);
        let events = collect(provider.chat_stream(request()).await.unwrap()).await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Token("x".into()),
                StreamEvent::Done { usage: None }
            ]
        );
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let provider = OpenAICompatibleProvider::new(Client::new(), server.uri(), None);
        let err = provider.chat_stream(request()).await.err().unwrap();
        assert!(matches!(
            err,
            LLMError::RateLimit {
                retry_after: Some(7)
            }
        ));
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let provider = OpenAICompatibleProvider::new(Client::new(), server.uri(), None);
        let err = provider.chat_stream(request()).await.err().unwrap();
        match err {
            LLMError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        let provider =
            OpenAICompatibleProvider::new(Client::new(), "http://localhost:1/v1/", None);
        assert_eq!(provider.base_url, "http://localhost:1/v1");
    }
}
