use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,

    #[error("invalid config: {0} must be greater than zero")]
    ZeroValue(&'static str),
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// A missing file is not an error: every section falls back to defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Self::parse(&contents)
    }

    /// Parse configuration from YAML text, expanding environment references first.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents, |name| std::env::var(name).ok())?;
        if expanded.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_saphyr::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make every run fail or spin.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("server.keep_alive_interval_seconds", self.server.keep_alive_interval_seconds),
            ("agent.max_iterations", u64::from(self.agent.max_iterations)),
            ("agent.max_marker_bytes", self.agent.max_marker_bytes as u64),
            ("agent.event_buffer", self.agent.event_buffer as u64),
            ("agent.llm_idle_timeout_seconds", self.agent.llm_idle_timeout_seconds),
        ];
        match required.into_iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(ConfigError::ZeroValue(name)),
            None => Ok(()),
        }
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Timeout applied to non-streaming routes.
    pub request_timeout_seconds: u64,
    pub keep_alive_interval_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_seconds: 300,
            keep_alive_interval_seconds: 15,
        }
    }
}

// ============================================================================
// SessionConfig
// ============================================================================

/// What happens when a request arrives for a session that already has a run in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyPolicy {
    /// Fail immediately with `409 Conflict`.
    #[default]
    Reject,
    /// Wait for the running request to finish, up to `acquire_timeout_seconds`.
    Wait,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub on_busy: BusyPolicy,
    pub acquire_timeout_seconds: u64,
    /// Number of turns from earlier requests sent back to the model.
    pub history_window: usize,
    /// Evict sessions idle for longer than this. `0` keeps them for the process lifetime.
    pub idle_ttl_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            on_busy: BusyPolicy::Reject,
            acquire_timeout_seconds: 30,
            history_window: 20,
            idle_ttl_seconds: 0,
        }
    }
}

impl SessionConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }

    pub fn idle_ttl(&self) -> Option<Duration> {
        (self.idle_ttl_seconds > 0).then(|| Duration::from_secs(self.idle_ttl_seconds))
    }
}

// ============================================================================
// AgentConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model calls allowed per request.
    pub max_iterations: u32,
    /// Largest candidate tool marker held back before it is flushed as text.
    pub max_marker_bytes: usize,
    /// Capacity of the channel between the run and the SSE writer.
    pub event_buffer: usize,
    /// Whole-request deadline. `0` disables it.
    pub run_timeout_seconds: u64,
    /// Longest wait for the next model increment.
    pub llm_idle_timeout_seconds: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_marker_bytes: 64 * 1024,
            event_buffer: 64,
            run_timeout_seconds: 300,
            llm_idle_timeout_seconds: 60,
        }
    }
}

impl AgentConfig {
    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout_seconds > 0).then(|| Duration::from_secs(self.run_timeout_seconds))
    }

    pub fn llm_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_idle_timeout_seconds)
    }
}

// ============================================================================
// LlmConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Falls back to `OPENAI_API_KEY` when unset.
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        non_empty(self.api_key.clone()).or_else(|| non_empty(std::env::var("OPENAI_API_KEY").ok()))
    }
}

// ============================================================================
// ToolsConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Directory file and terminal tools are confined to.
    pub workspace: PathBuf,
    pub terminal_timeout_seconds: u64,
    /// Falls back to `BRAVE_API_KEY` when unset.
    pub web_search_api_key: Option<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            terminal_timeout_seconds: 60,
            web_search_api_key: None,
        }
    }
}

impl ToolsConfig {
    pub fn resolved_search_key(&self) -> Option<String> {
        non_empty(self.web_search_api_key.clone())
            .or_else(|| non_empty(std::env::var("BRAVE_API_KEY").ok()))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand `${VAR}`, `${VAR:-default}` and `$$` in `input`.
///
/// A `$` not followed by `{` or `$` is kept literally. Nested references
/// inside defaults are not expanded.
fn expand_env_vars(
    input: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
        } else if let Some(tail) = after.strip_prefix('{') {
            let end = tail.find('}').ok_or(ConfigError::UnclosedVarReference)?;
            let reference = &tail[..end];
            let value = match reference.split_once(":-") {
                Some((name, default)) => lookup(name).unwrap_or_else(|| default.to_string()),
                None => lookup(reference)
                    .ok_or_else(|| ConfigError::MissingEnvVar(reference.to_string()))?,
            };
            out.push_str(&value);
            rest = &tail[end + 1..];
        } else {
            out.push('$');
            rest = after;
        }
    }

    out.push_str(rest);
    Ok(out)
}

// ============================================================================
// Tests
// ============================================================================
