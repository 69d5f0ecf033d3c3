//! Debounced, per-path scheduling of index syncs.
//!
//! Every path moves through `Idle → PendingDebounce → Syncing → Idle`, or to
//! `Deleted` on removal. A change event (re)starts the path's debounce timer,
//! so a burst of edits produces one sync. A delete cancels the timer and
//! removes the path from the index immediately. Each event gives the path a
//! fresh generation; a task only updates state if its generation is still
//! current. A path that settles back to `Idle` is forgotten; only `Deleted`
//! tombstones stay tracked until the path sees another event.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::indexer::{Indexer, SyncOutcome};
use super::watcher::{self, FileEvent, WorkspaceWatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    Idle,
    PendingDebounce,
    Syncing,
    Deleted,
}

struct PathEntry {
    state: PathState,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl PathEntry {
    fn new() -> Self {
        Self {
            state: PathState::Idle,
            generation: 0,
            timer: None,
        }
    }

    fn is_settled_idle(&self) -> bool {
        self.state == PathState::Idle && self.timer.is_none()
    }
}

struct Subscription {
    _watcher: WorkspaceWatcher,
    event_loop: JoinHandle<()>,
}

struct Inner {
    indexer: Arc<Indexer>,
    debounce: Duration,
    paths: Mutex<HashMap<String, PathEntry>>,
    /// Generations are unique across paths, so a forgotten and re-created
    /// entry never matches a stale task.
    next_generation: AtomicU64,
    subscription: Mutex<Option<Subscription>>,
    in_flight: AtomicUsize,
    syncs_run: AtomicUsize,
    settled: Notify,
    stopped: AtomicBool,
}

/// Cheap to clone; clones share one set of timers.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    pub fn new(indexer: Arc<Indexer>, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                indexer,
                debounce,
                paths: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                subscription: Mutex::new(None),
                in_flight: AtomicUsize::new(0),
                syncs_run: AtomicUsize::new(0),
                settled: Notify::new(),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn indexer(&self) -> &Arc<Indexer> {
        &self.inner.indexer
    }

    /// Current state of `path`; unseen paths are `Idle`.
    pub fn state(&self, path: &str) -> PathState {
        self.inner
            .paths()
            .get(path)
            .map_or(PathState::Idle, |e| e.state)
    }

    /// Paths with live coordinator state: a pending timer, a running sync or
    /// a `Deleted` tombstone.
    pub fn tracked_paths(&self) -> usize {
        self.inner.paths().len()
    }

    /// Number of debounced syncs that have run to completion.
    pub fn syncs_run(&self) -> usize {
        self.inner.syncs_run.load(Ordering::SeqCst)
    }

    pub fn is_watching(&self) -> bool {
        self.inner
            .subscription
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    /// Feed one filesystem event. Deletes are applied before this returns;
    /// changes are scheduled after the debounce interval.
    pub async fn handle_event(&self, event: FileEvent) {
        self.inner.handle_event(event).await
    }

    /// Subscribe to filesystem events for the indexer's workspace.
    pub fn start_watching(&self) -> Result<()> {
        let mut subscription = self
            .inner
            .subscription
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        if subscription.is_some() {
            return Ok(());
        }
        let (watcher, mut events) = watcher::watch(self.inner.indexer.workspace())?;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let event_loop = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                tracing::debug!(path = event.path(), ?event, "file event");
                inner.handle_event(event).await;
            }
        });
        *subscription = Some(Subscription {
            _watcher: watcher,
            event_loop,
        });
        self.inner.stopped.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Wait until no timer is pending and no sync is running.
    pub async fn wait_idle(&self) {
        loop {
            let settled = self.inner.settled.notified();
            if !self.inner.busy() {
                return;
            }
            settled.await;
        }
    }

    /// Release the watch subscription and cancel every pending timer. Syncs
    /// already running are allowed to finish before this returns.
    pub async fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        let subscription = self
            .inner
            .subscription
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(sub) = subscription {
            sub.event_loop.abort();
        }

        let cancelled = {
            let mut paths = self.inner.paths();
            let mut cancelled = 0;
            for entry in paths.values_mut() {
                if let Some(timer) = entry.timer.take() {
                    timer.abort();
                    entry.generation = self.inner.next_generation();
                    entry.state = PathState::Idle;
                    cancelled += 1;
                }
            }
            paths.retain(|_, entry| !entry.is_settled_idle());
            cancelled
        };
        self.inner.settled.notify_waiters();
        self.wait_idle().await;
        tracing::info!(cancelled, "sync coordinator stopped");
    }
}

impl Inner {
    fn paths(&self) -> MutexGuard<'_, HashMap<String, PathEntry>> {
        self.paths.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::SeqCst)
    }

    fn busy(&self) -> bool {
        let paths = self.paths();
        self.in_flight.load(Ordering::SeqCst) > 0 || paths.values().any(|e| e.timer.is_some())
    }

    async fn handle_event(self: &Arc<Self>, event: FileEvent) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        match event {
            FileEvent::Changed(path) => self.schedule(path),
            FileEvent::Deleted(path) => self.delete(path).await,
        }
    }

    fn schedule(self: &Arc<Self>, path: String) {
        let mut paths = self.paths();
        let entry = paths.entry(path.clone()).or_insert_with(PathEntry::new);
        if let Some(timer) = entry.timer.take() {
            timer.abort();
        }
        entry.generation = self.next_generation();
        entry.state = PathState::PendingDebounce;

        let generation = entry.generation;
        let inner = Arc::clone(self);
        entry.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            inner.fire(path, generation).await;
        }));
    }

    async fn fire(&self, path: String, generation: u64) {
        {
            let mut paths = self.paths();
            let Some(entry) = paths.get_mut(&path) else {
                return;
            };
            if entry.generation != generation {
                return;
            }
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            // Detach: from here on a newer event must not abort this sync.
            entry.timer = None;
            entry.state = PathState::Syncing;
        }

        let next = match self.indexer.sync_file(&path).await {
            Ok(SyncOutcome::Removed) => PathState::Deleted,
            Ok(outcome) => {
                tracing::debug!(path = %path, ?outcome, "debounced sync done");
                PathState::Idle
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %format!("{e:#}"), "sync failed");
                PathState::Idle
            }
        };

        {
            let mut paths = self.paths();
            if let Some(entry) = paths.get_mut(&path) {
                if entry.generation == generation {
                    entry.state = next;
                    if entry.is_settled_idle() {
                        paths.remove(&path);
                    }
                }
            }
            self.syncs_run.fetch_add(1, Ordering::SeqCst);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        self.settled.notify_waiters();
    }

    async fn delete(&self, path: String) {
        {
            let mut paths = self.paths();
            let entry = paths.entry(path.clone()).or_insert_with(PathEntry::new);
            if let Some(timer) = entry.timer.take() {
                timer.abort();
            }
            entry.generation = self.next_generation();
            entry.state = PathState::Deleted;
        }
        self.settled.notify_waiters();

        if let Err(e) = self.indexer.remove_file(&path).await {
            tracing::warn!(path = %path, error = %format!("{e:#}"), "failed to remove deleted file");
        }
    }
}
