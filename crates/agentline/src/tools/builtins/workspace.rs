//! Workspace confinement for file and shell tools.

use std::path::{Component, Path, PathBuf};

use crate::tools::error::ToolError;

/// Root directory the tools may touch.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a model-supplied path against the root.
    ///
    /// Resolution is lexical: `..` may not climb above the root and absolute
    /// paths must already lie inside it.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, ToolError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ToolError::InvalidInput("empty path".to_string()));
        }

        let candidate = Path::new(raw);
        let relative = if candidate.is_absolute() {
            candidate
                .strip_prefix(&self.root)
                .map_err(|_| ToolError::OutsideWorkspace(raw.to_string()))?
        } else {
            candidate
        };

        let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        return Err(ToolError::OutsideWorkspace(raw.to_string()));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(ToolError::OutsideWorkspace(raw.to_string()));
                }
            }
        }

        let mut resolved = self.root.clone();
        resolved.extend(parts);
        Ok(resolved)
    }
}
