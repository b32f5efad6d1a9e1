//! Common test utilities.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::Request;
use futures::{Stream, stream};
use tempfile::TempDir;
use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;

use agentline::api::EventPayload;
use agentline::background::RunTasks;
use agentline::config::{AgentConfig, BusyPolicy, ToolsConfig};
use agentline::context::ContextBuilder;
use agentline::llm::{ChatRequest, ChatStream, LLMError, LLMProvider, StreamEvent};
use agentline::server::{self, AppState};
use agentline::session::{AgentLoop, SessionRegistry};
use agentline::tools::{SharedTool, ToolDispatcher, create_builtins};

// ============================================================================
// Scripted Provider
// ============================================================================

/// What one model call does.
pub enum Script {
    /// Stream these increments, then finish.
    Tokens(Vec<&'static str>),
    /// Stream these increments, then never finish.
    Hang(Vec<&'static str>),
    /// Wait at the barrier before streaming.
    AfterBarrier(Arc<Barrier>, Vec<&'static str>),
    /// Fail to open the stream.
    Fail,
}

/// Model client that replays scripts in call order.
///
/// Calls beyond the script reply with "ok".
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
    stream_dropped: Arc<AtomicBool>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        })
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// True once a `Hang` stream has been dropped.
    pub fn stream_dropped(&self) -> bool {
        self.stream_dropped.load(Ordering::SeqCst)
    }
}

fn tokens(parts: Vec<&'static str>) -> Vec<Result<StreamEvent, LLMError>> {
    parts
        .into_iter()
        .map(|p| Ok(StreamEvent::Token(p.to_string())))
        .collect()
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, LLMError> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Tokens(vec!["ok"]));

        match script {
            Script::Tokens(parts) => {
                let mut events = tokens(parts);
                events.push(Ok(StreamEvent::Done { usage: None }));
                Ok(Box::pin(stream::iter(events)))
            }
            Script::Hang(parts) => {
                use futures::StreamExt;
                Ok(Box::pin(DropFlag {
                    inner: Box::pin(stream::iter(tokens(parts)).chain(stream::pending())),
                    dropped: self.stream_dropped.clone(),
                }))
            }
            Script::AfterBarrier(barrier, parts) => {
                barrier.wait().await;
                let mut events = tokens(parts);
                events.push(Ok(StreamEvent::Done { usage: None }));
                Ok(Box::pin(stream::iter(events)))
            }
            Script::Fail => Err(LLMError::Api {
                status: 503,
                message: "upstream down".to_string(),
            }),
        }
    }
}

/// Stream wrapper that records when it is dropped.
struct DropFlag {
    inner: ChatStream,
    dropped: Arc<AtomicBool>,
}

impl Stream for DropFlag {
    type Item = Result<StreamEvent, LLMError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Test App
// ============================================================================

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub provider: Arc<ScriptedProvider>,
    pub workspace: TempDir,
}

/// Build an app around a scripted provider and the built-in tools.
pub fn test_app(scripts: Vec<Script>) -> TestApp {
    test_app_with_policy(scripts, BusyPolicy::Reject)
}

pub fn test_app_with_policy(scripts: Vec<Script>, policy: BusyPolicy) -> TestApp {
    test_app_with_tools(scripts, policy, Vec::new())
}

/// Like `test_app_with_policy`, with extra tools registered next to the built-ins.
pub fn test_app_with_tools(
    scripts: Vec<Script>,
    policy: BusyPolicy,
    extra_tools: Vec<SharedTool>,
) -> TestApp {
    let workspace = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(scripts);

    let tools_config = ToolsConfig {
        workspace: workspace.path().to_path_buf(),
        ..Default::default()
    };
    let tools = Arc::new(
        ToolDispatcher::new()
            .register_all(create_builtins(&tools_config, reqwest::Client::new()).unwrap())
            .register_all(extra_tools),
    );

    let agent_config = AgentConfig {
        llm_idle_timeout_seconds: 5,
        run_timeout_seconds: 10,
        ..Default::default()
    };
    let agent = AgentLoop::new(
        provider.clone(),
        tools.clone(),
        ContextBuilder::new("You are a test agent.", "test-model"),
        &agent_config,
    );

    let state = AppState {
        sessions: SessionRegistry::new(policy, Duration::from_secs(5)),
        agent,
        runs: RunTasks::new(),
        shutdown: CancellationToken::new(),
        event_buffer: agent_config.event_buffer,
        keep_alive_interval_seconds: 15,
        tool_count: tools.len(),
    };

    TestApp {
        router: server::build_app(state.clone(), 30),
        state,
        provider,
        workspace,
    }
}

// ============================================================================
// Requests & SSE Parsing
// ============================================================================

pub fn chat_request(session_id: &str, message: &str) -> Request<Body> {
    let body = serde_json::json!({ "session_id": session_id, "message": message });
    Request::post("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Parse SSE frames from a response body into (event name, payload).
pub fn parse_sse_events(body: &str) -> Vec<(String, EventPayload)> {
    let mut events = Vec::new();
    let mut current_event = String::new();
    let mut current_data = String::new();

    for line in body.lines() {
        if let Some(event_name) = line.strip_prefix("event:") {
            current_event = event_name.trim().to_string();
        } else if let Some(data) = line.strip_prefix("data:") {
            current_data = data.trim().to_string();
        } else if line.is_empty() && !current_event.is_empty() {
            let payload = serde_json::from_str(&current_data).unwrap();
            events.push((std::mem::take(&mut current_event), payload));
            current_data.clear();
        }
    }

    if !current_event.is_empty() {
        let payload = serde_json::from_str(&current_data).unwrap();
        events.push((current_event, payload));
    }

    events
}

/// Concatenated content of every `token` event.
pub fn token_text(events: &[(String, EventPayload)]) -> String {
    events
        .iter()
        .filter(|(name, _)| name == "token")
        .map(|(_, payload)| payload.content.as_str())
        .collect()
}

/// Event names in order.
pub fn event_names(events: &[(String, EventPayload)]) -> Vec<&str> {
    events.iter().map(|(name, _)| name.as_str()).collect()
}

/// Assert the stream ends with exactly one terminal event.
pub fn assert_single_terminal(events: &[(String, EventPayload)]) {
    let terminals: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, (name, _))| name == "done" || name == "error")
        .map(|(i, _)| i)
        .collect();
    assert_eq!(terminals, vec![events.len() - 1], "events: {events:?}");
}
