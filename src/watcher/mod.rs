//! Watcher module for per-agent JSONL status logs.
//!
//! Tails one append-only log per source and publishes each appended line as
//! a structured event.

mod error;
mod events;
mod log_tail;
mod storage;
mod tailer;

pub use error::WatcherError;
pub use events::{ErrorEvent, EventBus, StatusEvent, DEFAULT_EVENT_CHANNEL_CAPACITY};
pub use log_tail::{LogTailWatcher, DEFAULT_DEBOUNCE};
pub use storage::{LogDirectory, LOG_EXTENSION};
pub use tailer::{decode_lines, SourceTail, TailBatch};
