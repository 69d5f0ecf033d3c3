//! Filesystem notifications for a workspace, reduced to per-document events.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::workspace::Workspace;

/// A change to one document, addressed by workspace-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileEvent {
    /// Created or modified.
    Changed(String),
    Deleted(String),
}

impl FileEvent {
    pub fn path(&self) -> &str {
        match self {
            FileEvent::Changed(p) | FileEvent::Deleted(p) => p,
        }
    }
}

/// Keeps the OS watch subscription alive; dropping it unsubscribes.
pub struct WorkspaceWatcher {
    _watcher: RecommendedWatcher,
}

/// Watch the workspace root and `memory/` (non-recursively) and stream
/// document events.
pub fn watch(workspace: &Workspace) -> Result<(WorkspaceWatcher, mpsc::UnboundedReceiver<FileEvent>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let ws = workspace.clone();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            for file_event in classify(&ws, &event) {
                // Receiver gone means the coordinator stopped.
                let _ = tx.send(file_event);
            }
        }
        Err(e) => tracing::warn!(error = %e, "watch error"),
    })
    .context("failed to create file watcher")?;

    for dir in [workspace.root().to_path_buf(), workspace.memory_dir()] {
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", dir.display()))?;
    }
    tracing::info!(root = %workspace.root().display(), "watching workspace");

    Ok((WorkspaceWatcher { _watcher: watcher }, rx))
}

/// Map a raw notification onto document events. Renames surface as a delete
/// of the old name and a change of the new one, decided by whether the path
/// still exists.
pub fn classify(workspace: &Workspace, event: &Event) -> Vec<FileEvent> {
    if matches!(event.kind, EventKind::Access(_) | EventKind::Other) {
        return Vec::new();
    }
    event
        .paths
        .iter()
        .filter(|p| workspace.is_document(p))
        .filter_map(|p| {
            let rel = workspace.relative_path(p)?;
            let gone = matches!(event.kind, EventKind::Remove(_)) || !p.exists();
            Some(if gone {
                FileEvent::Deleted(rel)
            } else {
                FileEvent::Changed(rel)
            })
        })
        .collect()
}
