//! System prompt rendering.

use std::fmt::Write;
use std::path::Path;

use tracing::{debug, warn};

use super::memory::{HISTORY_FILE, MEMORY_DIR, MEMORY_FILE};
use super::skills::{SKILLS_DIR, Skill};
use crate::tools::ToolDispatcher;

/// Workspace files appended to the system prompt when present.
pub const BOOTSTRAP_FILES: &[&str] = &["AGENTS.md", "SOUL.md", "USER.md", "TOOLS.md", "IDENTITY.md"];

/// Read the bootstrap files that exist in `workspace`, in order.
///
/// Missing files are skipped; unreadable ones are logged and skipped.
pub async fn load_bootstrap(workspace: &Path) -> Vec<(String, String)> {
    let mut files = Vec::new();
    for name in BOOTSTRAP_FILES {
        let path = workspace.join(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                debug!(file = %name, bytes = content.len(), "Loaded bootstrap file");
                files.push((name.to_string(), content));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to read bootstrap file"),
        }
    }
    files
}

/// Render the static part of the system prompt.
///
/// Long-term memory changes between runs and is appended per run by
/// [`ContextBuilder::run_system_prompt`](super::ContextBuilder::run_system_prompt).
pub fn render_system_prompt(
    workspace: &Path,
    tools: &ToolDispatcher,
    bootstrap: &[(String, String)],
    skills: &[Skill],
) -> String {
    let mut prompt = String::from(
        "# Agent\n\n\
         You are an autonomous assistant that reasons step by step and uses tools to act.\n\n",
    );
    let _ = writeln!(prompt, "## Workspace\nYour workspace is at: {}", workspace.display());
    let _ = writeln!(prompt, "- Long-term memory: {MEMORY_DIR}/{MEMORY_FILE}");
    let _ = writeln!(prompt, "- History log: {MEMORY_DIR}/{HISTORY_FILE}");
    let _ = writeln!(prompt, "- Skills: {SKILLS_DIR}/\n");
    let _ = writeln!(
        prompt,
        "When you learn something worth remembering, update {MEMORY_DIR}/{MEMORY_FILE}.\n\
         To recall past conversations, search {MEMORY_DIR}/{HISTORY_FILE}.\n"
    );

    if !tools.is_empty() {
        prompt.push_str("## Tools\n");
        for (name, description) in tools.descriptions() {
            let _ = writeln!(prompt, "- {name}: {description}");
        }
        prompt.push_str(
            "\nTo call a tool, write exactly:\n\
             <tool name=\"TOOL_NAME\">BODY</tool>\n\n\
             Make at most one tool call per reply, then stop and wait. \
             The tool output will be sent back to you before you continue.\n",
        );
    }

    for (name, content) in bootstrap {
        let _ = write!(prompt, "\n---\n\n## {name}\n\n{content}\n");
    }

    let mut always = skills.iter().filter(|s| s.always).peekable();
    if always.peek().is_some() {
        prompt.push_str("\n---\n\n# Active Skills\n");
        for skill in always {
            let _ = write!(prompt, "\n### Skill: {}\n\n{}\n", skill.name, skill.body);
        }
    }

    if !skills.is_empty() {
        prompt.push_str(
            "\n---\n\n# Available Skills\n\n\
             To use a skill, read its SKILL.md file with `read_file`.\n\n",
        );
        for skill in skills {
            let _ = writeln!(
                prompt,
                "- {}: {} ({})",
                skill.name,
                skill.description,
                skill.path.display()
            );
        }
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use std::path::PathBuf;

    use crate::tools::{ReadFileTool, Workspace};

    fn skill(name: &str, always: bool) -> Skill {
        Skill {
            name: name.to_string(),
            description: format!("{name} helper"),
            path: PathBuf::from(format!("skills/{name}/SKILL.md")),
            always,
            body: format!("{name} instructions"),
        }
    }

    #[tokio::test]
    async fn loads_existing_bootstrap_files_in_order() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("USER.md"), "user notes").unwrap();
        std::fs::write(dir.path().join("AGENTS.md"), "agent rules").unwrap();

        let files = load_bootstrap(dir.path()).await;
        let names: Vec<_> = files.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["AGENTS.md", "USER.md"]);
        assert_eq!(files[0].1, "agent rules");
    }

    #[test]
    fn prompt_lists_tools_and_marker_syntax() {
        let tools = ToolDispatcher::new().register(Arc::new(ReadFileTool::new(Workspace::new("/ws"))));
        let prompt = render_system_prompt(
            Path::new("/ws"),
            &tools,
            &[("SOUL.md".to_string(), "be kind".to_string())],
            &[],
        );

        assert!(prompt.contains("Your workspace is at: /ws"));
        assert!(prompt.contains("- read_file: Read a file"));
        assert!(prompt.contains("<tool name=\"TOOL_NAME\">BODY</tool>"));
        assert!(prompt.contains("one tool call per reply"));
        assert!(prompt.contains("## SOUL.md\n\nbe kind"));
        assert!(prompt.contains("- Long-term memory: memory/MEMORY.md"));
        assert!(prompt.contains("- History log: memory/HISTORY.md"));
        assert!(!prompt.contains("# Available Skills"));
    }

    #[test]
    fn prompt_without_tools_omits_marker_section() {
        let prompt = render_system_prompt(Path::new("/ws"), &ToolDispatcher::new(), &[], &[]);
        assert!(!prompt.contains("<tool name="));
    }

    #[test]
    fn always_skills_are_inlined_and_all_are_listed() {
        let prompt = render_system_prompt(
            Path::new("/ws"),
            &ToolDispatcher::new(),
            &[],
            &[skill("alpha", true), skill("beta", false)],
        );

        assert!(prompt.contains("# Active Skills\n\n### Skill: alpha\n\nalpha instructions\n"));
        assert!(!prompt.contains("beta instructions"));
        assert!(prompt.contains("- alpha: alpha helper (skills/alpha/SKILL.md)\n"));
        assert!(prompt.contains("- beta: beta helper (skills/beta/SKILL.md)\n"));
        let active = prompt.find("# Active Skills").unwrap();
        let available = prompt.find("# Available Skills").unwrap();
        assert!(active < available);
    }
}
