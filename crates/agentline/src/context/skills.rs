//! Workspace skills: `skills/<name>/SKILL.md` files with YAML frontmatter.
//!
//! Skills marked `always: true` are inlined into the system prompt. Every
//! skill is listed in a summary so the model can read the rest on demand.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

/// Directory under the workspace that holds skills.
pub const SKILLS_DIR: &str = "skills";

const SKILL_FILE: &str = "SKILL.md";

/// One skill found in the workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct Skill {
    /// Directory name, or the frontmatter `name` when given.
    pub name: String,
    pub description: String,
    /// Workspace-relative path of the SKILL.md file.
    pub path: PathBuf,
    /// Inline the body into every system prompt.
    pub always: bool,
    /// Markdown after the frontmatter.
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
struct SkillFrontmatter {
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    always: bool,
}

/// Scan `workspace/skills/*/SKILL.md`, sorted by name.
///
/// A missing skills directory yields no skills. Unreadable files and bad
/// frontmatter are logged and skipped.
pub async fn load_skills(workspace: &Path) -> Vec<Skill> {
    let dir = workspace.join(SKILLS_DIR);
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!(path = %dir.display(), error = %e, "No skills directory");
            return Vec::new();
        }
    };

    let mut skills = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }
        let dir_name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path().join(SKILL_FILE);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read skill");
                continue;
            }
        };

        match parse_skill(&dir_name, &content) {
            Ok(skill) => skills.push(skill),
            Err(e) => warn!(path = %path.display(), error = %e, "Invalid skill frontmatter"),
        }
    }

    skills.sort_by(|a, b| a.name.cmp(&b.name));
    skills
}

/// Parse one SKILL.md. A file without frontmatter is all body.
fn parse_skill(dir_name: &str, content: &str) -> Result<Skill, serde_saphyr::Error> {
    let (meta, body) = match split_frontmatter(content) {
        Some((yaml, body)) if !yaml.trim().is_empty() => {
            (serde_saphyr::from_str::<SkillFrontmatter>(yaml)?, body)
        }
        Some((_, body)) => (SkillFrontmatter::default(), body),
        None => (SkillFrontmatter::default(), content),
    };

    let name = meta.name.unwrap_or_else(|| dir_name.to_string());
    Ok(Skill {
        description: meta.description.unwrap_or_else(|| name.clone()),
        name,
        path: Path::new(SKILLS_DIR).join(dir_name).join(SKILL_FILE),
        always: meta.always,
        body: body.trim().to_string(),
    })
}

/// Split `---\nYAML\n---\nBODY` into its YAML and body.
fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let rest = content.trim_start().strip_prefix("---")?;
    let rest = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n"))?;

    if let Some(body) = rest.strip_prefix("---") {
        return Some(("", body));
    }
    let end = rest.find("\n---")?;
    let body = &rest[end + 4..];
    Some((&rest[..end], body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_skill(root: &Path, dir: &str, content: &str) {
        let skill_dir = root.join(SKILLS_DIR).join(dir);
        std::fs::create_dir_all(&skill_dir).unwrap();
        std::fs::write(skill_dir.join(SKILL_FILE), content).unwrap();
    }

    #[test]
    fn parses_frontmatter_and_body() {
        let skill = parse_skill(
            "weather",
            "---\nname: weather\ndescription: \"Look up the forecast\"\nalways: true\n---\n\nUse web_search.\n",
        )
        .unwrap();

        assert_eq!(skill.name, "weather");
        assert_eq!(skill.description, "Look up the forecast");
        assert!(skill.always);
        assert_eq!(skill.body, "Use web_search.");
        assert_eq!(skill.path, PathBuf::from("skills/weather/SKILL.md"));
    }

    #[test]
    fn missing_fields_fall_back_to_directory_name() {
        let skill = parse_skill("notes", "---\nalways: false\n---\nbody").unwrap();
        assert_eq!(skill.name, "notes");
        assert_eq!(skill.description, "notes");
        assert!(!skill.always);

        let plain = parse_skill("plain", "# Just markdown\n").unwrap();
        assert_eq!(plain.body, "# Just markdown");
        assert!(!plain.always);
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(parse_skill("bad", "---\nalways: [unclosed\n---\nbody").is_err());
    }

    #[tokio::test]
    async fn loads_skill_directories_sorted() {
        let dir = TempDir::new().unwrap();
        write_skill(dir.path(), "zeta", "---\ndescription: last\n---\nz");
        write_skill(dir.path(), "alpha", "---\ndescription: first\nalways: true\n---\na");
        write_skill(dir.path(), "broken", "---\nalways: [\n---\nx");
        std::fs::create_dir_all(dir.path().join("skills/empty")).unwrap();
        std::fs::write(dir.path().join("skills/README.md"), "not a skill").unwrap();

        let skills = load_skills(dir.path()).await;
        let names: Vec<_> = skills.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert!(skills[0].always);
        assert_eq!(skills[1].description, "last");
    }

    #[tokio::test]
    async fn no_skills_directory() {
        let dir = TempDir::new().unwrap();
        assert!(load_skills(dir.path()).await.is_empty());
    }
}
