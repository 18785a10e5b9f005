//! Work tree: the filesystem context handed to every tool.
//!
//! Resolves model-supplied paths against the project root and enumerates
//! project files, honouring `.gitignore` plus a fixed ignore list.

use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Names skipped during every walk, regardless of `.gitignore`.
pub const DEFAULT_IGNORED: &[&str] = &[".git", ".gemcode", "target", "node_modules"];

/// The project directory the agent works in.
#[derive(Debug, Clone)]
pub struct WorkTree {
    root: PathBuf,
    ignored: Vec<String>,
}

impl WorkTree {
    /// Create a work tree rooted at `root` with the default ignore list.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignored: DEFAULT_IGNORED.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Add extra file or directory names to skip.
    pub fn with_ignored(mut self, names: impl IntoIterator<Item = String>) -> Self {
        for name in names {
            if !self.ignored.contains(&name) {
                self.ignored.push(name);
            }
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a model-supplied path. Absolute paths are used as-is,
    /// relative ones are joined onto the root.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        }
    }

    /// All project files, sorted, as full paths.
    pub fn files(&self) -> Vec<PathBuf> {
        let ignored = self.ignored.clone();
        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(true)
            .require_git(false)
            .filter_entry(move |entry| {
                let name = entry.file_name().to_string_lossy();
                !ignored.iter().any(|i| i == name.as_ref())
            })
            .build();

        let mut files: Vec<PathBuf> = walker
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
            .map(|entry| entry.into_path())
            .collect();

        files.sort();
        files
    }

    /// A short listing of the project for the system prompt.
    pub fn index_summary(&self, limit: usize) -> String {
        let files = self.files();
        let mut summary = format!("Project root: {}\nProject files:\n", self.root.display());
        for path in files.iter().take(limit) {
            summary.push_str(&path.display().to_string());
            summary.push('\n');
        }
        if files.len() > limit {
            summary.push_str(&format!("... and {} more files\n", files.len() - limit));
        }
        summary
    }
}
