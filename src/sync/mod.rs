//! Keeping the index consistent with the files on disk.

pub mod coordinator;
pub mod indexer;
pub mod watcher;

pub use coordinator::{PathState, SyncCoordinator};
pub use indexer::{FileError, Indexer, ReindexReport, SyncOutcome};
pub use watcher::FileEvent;
