//! Long-term memory kept in the workspace.
//!
//! - `memory/MEMORY.md`: curated facts, written by the agent with `write_file`
//!   and injected into the system prompt of every run
//! - `memory/HISTORY.md`: append-only log of every run, searchable with `terminal`

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::session::{Turn, TurnRole};

pub const MEMORY_DIR: &str = "memory";
pub const MEMORY_FILE: &str = "MEMORY.md";
pub const HISTORY_FILE: &str = "HISTORY.md";

/// Tool output longer than this is cut in the history log.
const MAX_LOGGED_TOOL_OUTPUT: usize = 500;

/// Memory files under one workspace.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    dir: PathBuf,
}

impl MemoryStore {
    pub fn new(workspace: &Path) -> Self {
        Self {
            dir: workspace.join(MEMORY_DIR),
        }
    }

    pub fn memory_path(&self) -> PathBuf {
        self.dir.join(MEMORY_FILE)
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    /// Current long-term memory, or `None` when missing or blank.
    pub async fn read_long_term(&self) -> Option<String> {
        let path = self.memory_path();
        match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => None,
            Ok(content) => Some(content.trim_end().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read long-term memory");
                None
            }
        }
    }

    /// Append one run's turns to the history log.
    ///
    /// `error` is the run's failure message, if it did not complete.
    pub async fn append_history(
        &self,
        session_id: &str,
        turns: &[Turn],
        error: Option<&str>,
    ) -> std::io::Result<()> {
        if turns.is_empty() && error.is_none() {
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.dir).await?;

        let entry = format_entry(session_id, turns, error);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.history_path())
            .await?;
        file.write_all(entry.as_bytes()).await?;
        file.flush().await?;

        debug!(session_id, turns = turns.len(), "Appended run to history log");
        Ok(())
    }
}

fn format_entry(session_id: &str, turns: &[Turn], error: Option<&str>) -> String {
    let mut entry = format!(
        "## [{}] session {session_id}\n\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    for turn in turns {
        let _ = match turn.role {
            TurnRole::User => writeln!(entry, "USER: {}", turn.content),
            TurnRole::Assistant => writeln!(entry, "ASSISTANT: {}", turn.content),
            TurnRole::Tool => writeln!(
                entry,
                "TOOL {}: {}",
                turn.tool.as_deref().unwrap_or("unknown"),
                truncate(&turn.content, MAX_LOGGED_TOOL_OUTPUT)
            ),
        };
    }
    if let Some(error) = error {
        let _ = writeln!(entry, "ERROR: {error}");
    }
    entry.push('\n');
    entry
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &s[..end]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn long_term_memory_is_optional() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path());
        assert_eq!(store.read_long_term().await, None);

        std::fs::create_dir_all(dir.path().join(MEMORY_DIR)).unwrap();
        std::fs::write(store.memory_path(), "  \n").unwrap();
        assert_eq!(store.read_long_term().await, None);

        std::fs::write(store.memory_path(), "- user prefers metric units\n").unwrap();
        assert_eq!(
            store.read_long_term().await.as_deref(),
            Some("- user prefers metric units")
        );
    }

    #[tokio::test]
    async fn history_entries_are_appended() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path());

        store
            .append_history(
                "s1",
                &[
                    Turn::user("list files"),
                    Turn::assistant("<tool name=\"terminal\">ls</tool>"),
                    Turn::tool("terminal", "a.txt"),
                    Turn::assistant("One file."),
                ],
                None,
            )
            .await
            .unwrap();
        store
            .append_history("s2", &[Turn::user("hi")], Some("run cancelled"))
            .await
            .unwrap();

        let log = std::fs::read_to_string(store.history_path()).unwrap();
        let first = log.find("session s1").unwrap();
        let second = log.find("session s2").unwrap();
        assert!(first < second);
        assert!(log.contains("USER: list files\n"));
        assert!(log.contains("TOOL terminal: a.txt\n"));
        assert!(log.contains("ASSISTANT: One file.\n"));
        assert!(log.contains("USER: hi\nERROR: run cancelled\n"));
    }

    #[tokio::test]
    async fn long_tool_output_is_cut() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path());
        let output = "é".repeat(MAX_LOGGED_TOOL_OUTPUT + 10);

        store
            .append_history("s1", &[Turn::tool("read_file", output)], None)
            .await
            .unwrap();

        let log = std::fs::read_to_string(store.history_path()).unwrap();
        let expected = format!("TOOL read_file: {}...\n", "é".repeat(MAX_LOGGED_TOOL_OUTPUT));
        assert!(log.contains(&expected));
    }

    #[tokio::test]
    async fn empty_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path());
        store.append_history("s1", &[], None).await.unwrap();
        assert!(!store.history_path().exists());
    }
}
