//! Builds model requests from session history.

use std::borrow::Cow;

use super::memory::MemoryStore;
use crate::llm::{ChatRequest, Message};
use crate::session::{Turn, TurnRole};

/// Renders a session's turns into model requests.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_prompt: String,
    history_window: usize,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    memory: Option<MemoryStore>,
}

impl ContextBuilder {
    pub fn new(system_prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            history_window: 20,
            model: model.into(),
            temperature: None,
            max_tokens: None,
            memory: None,
        }
    }

    /// Number of turns from earlier runs to include.
    #[must_use]
    pub fn with_history_window(mut self, turns: usize) -> Self {
        self.history_window = turns;
        self
    }

    #[must_use]
    pub fn with_sampling(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Inject long-term memory into each run's system prompt.
    #[must_use]
    pub fn with_memory(mut self, memory: MemoryStore) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn memory(&self) -> Option<&MemoryStore> {
        self.memory.as_ref()
    }

    /// System prompt for a new run, with the current long-term memory appended.
    ///
    /// Memory is re-read per run so facts the agent saves are seen next time.
    pub async fn run_system_prompt(&self) -> Cow<'_, str> {
        let Some(memory) = &self.memory else {
            return Cow::Borrowed(&self.system_prompt);
        };
        match memory.read_long_term().await {
            Some(facts) => Cow::Owned(format!(
                "{}\n---\n\n# Memory\n\n## Long-term Memory\n\n{facts}\n",
                self.system_prompt
            )),
            None => Cow::Borrowed(&self.system_prompt),
        }
    }

    /// Messages for the next model call.
    ///
    /// `run_start` is the index of the current run's first turn. Earlier turns
    /// are windowed; turns of the current run are always included.
    pub fn messages(&self, system_prompt: &str, turns: &[Turn], run_start: usize) -> Vec<Message> {
        let run_start = run_start.min(turns.len());
        let (earlier, current) = turns.split_at(run_start);
        let skip = earlier.len().saturating_sub(self.history_window);

        let mut messages = Vec::with_capacity(1 + earlier.len() - skip + current.len());
        messages.push(Message::system(system_prompt));
        messages.extend(earlier[skip..].iter().chain(current).map(render_turn));
        messages
    }

    pub fn request(&self, system_prompt: &str, turns: &[Turn], run_start: usize) -> ChatRequest {
        ChatRequest::new(
            &self.model,
            self.messages(system_prompt, turns, run_start),
            self.temperature,
            self.max_tokens,
        )
    }
}

/// Map one turn to a model message. Tool output is fed back as a user message.
pub fn render_turn(turn: &Turn) -> Message {
    match turn.role {
        TurnRole::User => Message::user(&turn.content),
        TurnRole::Assistant => Message::assistant(&turn.content),
        TurnRole::Tool => Message::user(format!(
            "Tool Output ({}):\n{}\n\nReflect on the result and decide next steps.",
            turn.tool.as_deref().unwrap_or("unknown"),
            turn.content
        )),
    }
}
