//! Watcher error types.

use std::path::PathBuf;

/// Errors that can occur while tailing source logs.
#[derive(thiserror::Error, Debug)]
pub enum WatcherError {
    /// Source name cannot be used as a log file name.
    #[error("Invalid source name: {0:?}")]
    InvalidSourceName(String),

    /// The watcher has been stopped and refuses new work.
    #[error("Watcher stopped")]
    Stopped,

    /// Backing directory could not be prepared.
    #[error("Failed to prepare log directory {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Notify watcher error.
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
