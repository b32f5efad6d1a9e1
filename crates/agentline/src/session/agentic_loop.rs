//! ReAct loop over a streamed model response.
//!
//! One run handles one user message:
//! 1. Build the request from the session history
//! 2. Stream the model output through the marker scanner, emitting text as it arrives
//! 3. On a complete tool marker: stop reading, run the tool, append the observation, go to 1
//! 4. On end of stream: done
//!
//! The run owns the session for its whole duration and emits exactly one
//! terminal event, whatever the exit path.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::AgentEvent;
use super::marker::{MarkerScanner, ScanOutput, ToolInvocation};
use super::registry::SessionGuard;
use super::types::{Session, Turn};
use crate::config::AgentConfig;
use crate::context::ContextBuilder;
use crate::llm::{ChatRequest, ChatStream, LLMError, LLMProvider, StreamEvent, Usage};
use crate::tools::{DispatchError, ToolDispatcher};

/// Rate-limited model calls are retried this many times.
const MAX_RETRIES: u32 = 3;

// ============================================================================
// Types
// ============================================================================

/// Fatal run errors. The display string is the client-visible `error` content.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("backend unavailable: {0}")]
    Llm(#[from] LLMError),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("max iterations ({0}) exceeded")]
    MaxIterationsExceeded(u32),

    #[error("run timed out after {0} seconds")]
    Timeout(u64),

    #[error("model stream idle for {0} seconds")]
    IdleTimeout(u64),

    #[error("run cancelled")]
    Cancelled,
}

/// Statistics for a completed run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Model calls made.
    pub iterations: u32,
    pub tool_calls: u32,
    pub usage: Option<Usage>,
}

/// How a model segment ended.
enum Segment {
    Finished(Option<Usage>),
    Tool(ToolInvocation),
}

// ============================================================================
// AgentLoop
// ============================================================================

/// The agent loop and its shared dependencies. Cheap to clone.
#[derive(Clone)]
pub struct AgentLoop {
    provider: Arc<dyn LLMProvider>,
    tools: Arc<ToolDispatcher>,
    context: Arc<ContextBuilder>,
    max_iterations: u32,
    max_marker_bytes: usize,
    llm_idle_timeout: Duration,
    run_timeout: Option<Duration>,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        tools: Arc<ToolDispatcher>,
        context: ContextBuilder,
        config: &AgentConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            context: Arc::new(context),
            max_iterations: config.max_iterations,
            max_marker_bytes: config.max_marker_bytes,
            llm_idle_timeout: config.llm_idle_timeout(),
            run_timeout: config.run_timeout(),
        }
    }

    /// Run one message to completion and deliver the terminal event.
    ///
    /// The session is released before `events` is closed, so a client that
    /// sees its stream end can immediately reuse the session.
    pub async fn drive(
        &self,
        mut guard: SessionGuard,
        message: String,
        events: mpsc::Sender<AgentEvent>,
        cancel: CancellationToken,
    ) {
        let session_id = guard.id().to_string();
        let run_start = guard.len();
        let started = Instant::now();

        let run = self.run(&mut guard, &message, &events, &cancel);
        let result = match self.run_timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .unwrap_or(Err(AgentError::Timeout(limit.as_secs()))),
            None => run.await,
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let terminal = match result {
            Ok(summary) => {
                let usage = summary.usage.unwrap_or_default();
                info!(
                    session_id = %session_id,
                    iterations = summary.iterations,
                    tool_calls = summary.tool_calls,
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    elapsed_ms,
                    "Run completed"
                );
                AgentEvent::Done
            }
            Err(AgentError::Cancelled) => {
                info!(session_id = %session_id, elapsed_ms, "Run cancelled");
                AgentEvent::Error(AgentError::Cancelled.to_string())
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, elapsed_ms, "Run failed");
                AgentEvent::Error(e.to_string())
            }
        };

        if let Some(memory) = self.context.memory() {
            let error = match &terminal {
                AgentEvent::Error(message) => Some(message.as_str()),
                _ => None,
            };
            let turns = guard.turns().get(run_start..).unwrap_or_default();
            if let Err(e) = memory.append_history(&session_id, turns, error).await {
                warn!(session_id = %session_id, error = %e, "Failed to append history log");
            }
        }

        // Receiver may already be gone after a disconnect
        let _ = events.send(terminal).await;
        drop(guard);
        drop(events);
    }

    /// Run the loop, emitting every non-terminal event.
    pub async fn run(
        &self,
        session: &mut Session,
        message: &str,
        events: &mpsc::Sender<AgentEvent>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, AgentError> {
        let run_start = session.len();
        session.push(Turn::user(message));

        let system_prompt = self.context.run_system_prompt().await;
        let mut summary = RunSummary::default();

        loop {
            if summary.iterations >= self.max_iterations {
                return Err(AgentError::MaxIterationsExceeded(self.max_iterations));
            }
            summary.iterations += 1;

            let request = self
                .context
                .request(&system_prompt, session.turns(), run_start);
            debug!(
                session_id = %session.id(),
                iteration = summary.iterations,
                messages = request.messages.len(),
                "Agent loop iteration"
            );

            let mut stream = self.open_stream(&request, cancel).await?;
            let mut generated = String::new();
            let outcome = self
                .stream_segment(&mut stream, &mut generated, events, cancel)
                .await;
            // Dropping the stream aborts the upstream request
            drop(stream);

            if !generated.is_empty() {
                session.push(Turn::assistant(generated));
            }

            let invocation = match outcome? {
                Segment::Finished(usage) => {
                    summary.usage = accumulate_usage(summary.usage, usage);
                    return Ok(summary);
                }
                Segment::Tool(invocation) => invocation,
            };

            summary.tool_calls += 1;
            let (result, success) = self.execute_tool(session.id(), &invocation, events).await?;

            // An in-flight tool is never interrupted by a disconnect; its
            // result is dropped if nobody is listening anymore.
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            session.push(Turn::tool(&invocation.name, &result));
            emit(
                events,
                AgentEvent::ToolEnd {
                    name: invocation.name,
                    result,
                    success,
                },
            )
            .await?;
        }
    }

    /// Open a model stream, retrying on rate limits.
    async fn open_stream(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatStream, AgentError> {
        let mut attempt = 0;
        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                result = tokio::time::timeout(self.llm_idle_timeout, self.provider.chat_stream(request.clone())) => {
                    result.map_err(|_| AgentError::IdleTimeout(self.llm_idle_timeout.as_secs()))?
                }
            };

            match result {
                Ok(stream) => return Ok(stream),
                Err(LLMError::RateLimit { retry_after }) if attempt < MAX_RETRIES => {
                    attempt += 1;
                    let delay = retry_after.unwrap_or(2u64.pow(attempt));
                    warn!(attempt, delay_secs = delay, "Rate limited, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                        _ = tokio::time::sleep(Duration::from_secs(delay)) => {}
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Consume one model response until it ends or a tool marker completes.
    ///
    /// `generated` receives the text that belongs in the assistant turn, even
    /// when this returns an error.
    async fn stream_segment(
        &self,
        stream: &mut ChatStream,
        generated: &mut String,
        events: &mpsc::Sender<AgentEvent>,
        cancel: &CancellationToken,
    ) -> Result<Segment, AgentError> {
        let mut scanner = MarkerScanner::new(self.max_marker_bytes);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // Nobody to emit to; the held text still belongs to the reply
                    if let Some(rest) = scanner.finish() {
                        generated.push_str(&rest);
                    }
                    return Err(AgentError::Cancelled);
                }
                next = tokio::time::timeout(self.llm_idle_timeout, stream.next()) => match next {
                    Ok(next) => next,
                    Err(_) => {
                        let _ = flush(&mut scanner, generated, events).await;
                        return Err(AgentError::IdleTimeout(self.llm_idle_timeout.as_secs()));
                    }
                },
            };

            match next {
                Some(Ok(StreamEvent::Token(text))) => {
                    for output in scanner.push(&text) {
                        match output {
                            ScanOutput::Text(text) => {
                                generated.push_str(&text);
                                emit(events, AgentEvent::Token(text)).await?;
                            }
                            ScanOutput::Tool(invocation) => {
                                generated.push_str(&invocation.raw);
                                return Ok(Segment::Tool(invocation));
                            }
                        }
                    }
                }
                Some(Ok(StreamEvent::Done { usage })) => {
                    flush(&mut scanner, generated, events).await?;
                    return Ok(Segment::Finished(usage));
                }
                Some(Err(e)) => {
                    // A failed flush only means the client is gone; the model error wins
                    let _ = flush(&mut scanner, generated, events).await;
                    return Err(e.into());
                }
                None => {
                    flush(&mut scanner, generated, events).await?;
                    return Ok(Segment::Finished(None));
                }
            }
        }
    }

    async fn execute_tool(
        &self,
        session_id: &str,
        invocation: &ToolInvocation,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<(String, bool), AgentError> {
        emit(
            events,
            AgentEvent::ToolStart {
                name: invocation.name.clone(),
                body: invocation.body.clone(),
            },
        )
        .await?;

        info!(session_id = %session_id, tool = %invocation.name, "Dispatching tool");
        match self.tools.dispatch(&invocation.name, &invocation.body).await {
            Ok(output) => Ok((output, true)),
            Err(DispatchError::UnknownTool(name)) => Err(AgentError::UnknownTool(name)),
            Err(DispatchError::Failed(e)) => {
                warn!(session_id = %session_id, tool = %invocation.name, error = %e, "Tool failed");
                Ok((format!("Error: {e}"), false))
            }
        }
    }
}

/// Send an event. A closed channel means the client is gone.
async fn emit(events: &mpsc::Sender<AgentEvent>, event: AgentEvent) -> Result<(), AgentError> {
    events.send(event).await.map_err(|_| AgentError::Cancelled)
}

/// Release text held by the scanner at end of stream.
async fn flush(
    scanner: &mut MarkerScanner,
    generated: &mut String,
    events: &mpsc::Sender<AgentEvent>,
) -> Result<(), AgentError> {
    if let Some(rest) = scanner.finish() {
        generated.push_str(&rest);
        emit(events, AgentEvent::Token(rest)).await?;
    }
    Ok(())
}

/// Accumulate usage from multiple model calls.
fn accumulate_usage(existing: Option<Usage>, new: Option<Usage>) -> Option<Usage> {
    match (existing, new) {
        (Some(e), Some(n)) => Some(Usage {
            prompt_tokens: e.prompt_tokens + n.prompt_tokens,
            completion_tokens: e.completion_tokens + n.completion_tokens,
            total_tokens: e.total_tokens + n.total_tokens,
        }),
        (Some(e), None) => Some(e),
        (None, Some(n)) => Some(n),
        (None, None) => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
