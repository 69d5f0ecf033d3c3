//! The notes directory being indexed.
//!
//! A workspace is a root directory plus a `memory/` sub-directory. Documents
//! are the `*.md` files directly inside either one. Callers address files by
//! workspace-relative paths with `/` separators, which are also the paths
//! recorded in the index.

use anyhow::{bail, Context, Result};
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub const MEMORY_DIR: &str = "memory";

/// Files created by [`Workspace::initialize`] when missing.
pub const BOOTSTRAP_FILES: [(&str, &str); 3] = [
    (
        "MEMORY.md",
        "# MEMORY.md - Long-term Memory\n\n\
         ## Preferences\n\n\
         ## Decisions\n\n\
         ## Lessons Learned\n",
    ),
    (
        "USER.md",
        "# USER.md - User Profile\n\n\
         - **Name:**\n\
         - **Timezone:**\n\
         - **Language:**\n\n\
         ## Notes\n",
    ),
    (
        "PROJECT.md",
        "# PROJECT.md - Current Context\n\n\
         ## Overview\n\n\
         ## Goals\n\n\
         ## Constraints\n",
    ),
];

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

    pub fn memory_dir(&self) -> PathBuf {
        self.root.join(MEMORY_DIR)
    }

    pub fn is_initialized(&self) -> bool {
        self.root.is_dir()
            && BOOTSTRAP_FILES
                .iter()
                .all(|(name, _)| self.root.join(name).exists())
    }

    /// Create the directory layout and any missing bootstrap files. Existing
    /// files are never touched. Returns the names of files created.
    pub fn initialize(&self) -> Result<Vec<String>> {
        std::fs::create_dir_all(self.memory_dir()).with_context(|| {
            format!("failed to create workspace at {}", self.root.display())
        })?;
        let mut created = Vec::new();
        for (name, template) in BOOTSTRAP_FILES {
            let path = self.root.join(name);
            if !path.exists() {
                std::fs::write(&path, template)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                created.push(name.to_string());
            }
        }
        if !created.is_empty() {
            tracing::info!(root = %self.root.display(), files = ?created, "workspace initialized");
        }
        Ok(created)
    }

    /// Every document in the workspace, sorted by relative path.
    pub fn list_documents(&self) -> Result<Vec<String>> {
        let mut docs = Vec::new();
        for dir in [self.root.clone(), self.memory_dir()] {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to list {}", dir.display()))
                }
            };
            for entry in entries {
                let path = entry?.path();
                if path.is_file() && self.is_document(&path) {
                    if let Some(rel) = self.relative_path(&path) {
                        docs.push(rel);
                    }
                }
            }
        }
        docs.sort();
        Ok(docs)
    }

    /// True for `*.md` files directly in the root or in `memory/`.
    pub fn is_document(&self, path: &Path) -> bool {
        let is_markdown = path.extension().is_some_and(|ext| ext == "md");
        let in_scope = path
            .parent()
            .is_some_and(|parent| parent == self.root || parent == self.memory_dir());
        is_markdown && in_scope
    }

    /// Workspace-relative `/`-separated form of an absolute path inside the
    /// workspace.
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Option<_>>()?;
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }

    /// Absolute path for a workspace-relative one. Absolute paths and `..`
    /// components are rejected so callers cannot escape the workspace.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let rel = Path::new(relative);
        if relative.trim().is_empty() {
            bail!("path must not be empty");
        }
        for component in rel.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => bail!("path must be relative to the workspace: {relative}"),
            }
        }
        Ok(self.root.join(rel))
    }

    /// Read a file, optionally limited to a 1-based inclusive line range.
    pub async fn read(&self, relative: &str, lines: Option<(usize, usize)>) -> Result<String> {
        let path = self.resolve(relative)?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {relative}"))?;
        Ok(match lines {
            None => content,
            Some((start, end)) => slice_lines(&content, start, end),
        })
    }

    /// Replace a file's contents, creating parent directories.
    pub async fn write(&self, relative: &str, content: &str) -> Result<PathBuf> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("failed to write {relative}"))?;
        Ok(path)
    }

    /// Append to a file, creating it (and parent directories) if needed.
    pub async fn append(&self, relative: &str, content: &str) -> Result<PathBuf> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("failed to open {relative}"))?;
        file.write_all(content.as_bytes())
            .await
            .with_context(|| format!("failed to append to {relative}"))?;
        file.flush().await?;
        Ok(path)
    }

    /// `memory/YYYY-MM-DD.md` for the given day.
    pub fn daily_log_path(date: chrono::NaiveDate) -> String {
        format!("{MEMORY_DIR}/{}.md", date.format("%Y-%m-%d"))
    }
}

/// Lines `start..=end` (1-based, clamped to the document).
pub fn slice_lines(content: &str, start: usize, end: usize) -> String {
    let lines: Vec<&str> = content.split('\n').collect();
    let from = start.max(1) - 1;
    let to = end.min(lines.len());
    if from >= to {
        return String::new();
    }
    lines[from..to].join("\n")
}
