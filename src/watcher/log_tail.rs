//! Multi-source log tail watcher.
//!
//! Keeps one change watch and one byte offset per named source and turns
//! every line appended to a source's log into a [`StatusEvent`].

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use notify_debouncer_full::{
    new_debouncer,
    notify::{EventKind, RecommendedWatcher, RecursiveMode},
    DebounceEventResult, DebouncedEvent, Debouncer, RecommendedCache,
};
use tokio::sync::broadcast;

use super::error::WatcherError;
use super::events::{ErrorEvent, EventBus, StatusEvent, DEFAULT_EVENT_CHANNEL_CAPACITY};
use super::storage::LogDirectory;
use super::tailer::SourceTail;
use crate::config::TailConfig;

/// Default window in which change notifications are coalesced.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

type SourceDebouncer = Debouncer<RecommendedWatcher, RecommendedCache>;

/// A registered source: its tail and the watch feeding it.
struct Registration {
    generation: u64,
    tail: Arc<Mutex<SourceTail>>,
    _debouncer: SourceDebouncer,
}

/// State shared between the watcher and its notification callbacks.
struct Shared {
    directory: LogDirectory,
    events: EventBus,
    stopped: AtomicBool,
    next_generation: AtomicU64,
    sources: Mutex<HashMap<String, Registration>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Consume whatever was appended to `source` since its stored offset.
    ///
    /// Notifications from a registration that has since been replaced or
    /// removed are ignored. Returns the number of update events emitted.
    fn read_new_lines(&self, source: &str, generation: u64) -> usize {
        if self.is_stopped() {
            return 0;
        }

        // Only the registry lookup holds the registry lock; the read itself
        // holds just this source's tail.
        let tail = {
            let sources = lock(&self.sources);
            match sources.get(source) {
                Some(registration) if registration.generation == generation => {
                    Arc::clone(&registration.tail)
                }
                _ => return 0,
            }
        };

        let mut tail = lock(&tail);
        let batch = match tail.read_new_lines() {
            Ok(batch) => batch,
            Err(e) => {
                tracing::debug!(
                    source,
                    path = %tail.path().display(),
                    error = %e,
                    "Failed to read source log"
                );
                return 0;
            }
        };

        for line in &batch.malformed {
            tracing::debug!(source, line = %line, "Skipping malformed status line");
        }

        let mut emitted = 0;
        for data in batch.records {
            if self.is_stopped() {
                break;
            }
            self.events.emit_update(StatusEvent::new(source, data));
            emitted += 1;
        }

        tracing::trace!(source, offset = tail.offset(), emitted, "Source log consumed");
        emitted
    }
}

/// Does this notification concern the watched log file?
fn touches_log(event: &DebouncedEvent, file_name: &OsString) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any
    ) && event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

/// Tails a set of named, append-only JSONL logs in one directory.
///
/// Each source moves `unregistered -> watching -> unregistered`. Once
/// [`stop`](Self::stop) has been called the watcher refuses new sources and
/// emits nothing further; build a new instance to resume.
pub struct LogTailWatcher {
    shared: Arc<Shared>,
    debounce: Duration,
}

impl LogTailWatcher {
    /// Create a watcher over `directory` with default settings.
    #[must_use]
    pub fn new(directory: LogDirectory) -> Self {
        Self::with_options(directory, DEFAULT_DEBOUNCE, DEFAULT_EVENT_CHANNEL_CAPACITY)
    }

    /// Create a watcher with an explicit debounce window and channel capacity.
    #[must_use]
    pub fn with_options(directory: LogDirectory, debounce: Duration, capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                directory,
                events: EventBus::new(capacity),
                stopped: AtomicBool::new(false),
                next_generation: AtomicU64::new(0),
                sources: Mutex::new(HashMap::new()),
            }),
            debounce,
        }
    }

    /// Create a watcher for the team directory named by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::InvalidSourceName`] if the team name is not a
    /// single path component.
    pub fn from_config(config: &TailConfig) -> Result<Self, WatcherError> {
        let directory = LogDirectory::for_team(&config.log_root, &config.team)?;
        Ok(Self::with_options(
            directory,
            Duration::from_millis(config.debounce_ms),
            config.channel_capacity,
        ))
    }

    /// Get the directory holding the source logs.
    #[must_use]
    pub fn directory(&self) -> &LogDirectory {
        &self.shared.directory
    }

    /// Get the event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    /// Subscribe to update events.
    #[must_use]
    pub fn subscribe_updates(&self) -> broadcast::Receiver<StatusEvent> {
        self.shared.events.subscribe_updates()
    }

    /// Subscribe to error events.
    #[must_use]
    pub fn subscribe_errors(&self) -> broadcast::Receiver<ErrorEvent> {
        self.shared.events.subscribe_errors()
    }

    /// Create the backing directory (and parents) if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::Storage`] if the directory cannot be created.
    /// An existing directory is not an error.
    pub fn ensure_storage_ready(&self) -> Result<(), WatcherError> {
        self.shared.directory.ensure_ready()?;
        tracing::debug!(
            path = %self.shared.directory.path().display(),
            "Log directory ready"
        );
        Ok(())
    }

    /// Start tailing `source`.
    ///
    /// Creates the source's log if it is missing and starts from its current
    /// length, so existing content is not replayed. If the length cannot be
    /// read, tailing starts from offset 0. A previous registration under the
    /// same name is closed and replaced.
    ///
    /// Does nothing once the watcher is stopped. Failures (invalid name,
    /// watch cannot be attached) are logged and published on the error
    /// channel; the source is left unregistered.
    pub fn start_watching(&self, source: &str) {
        if self.shared.is_stopped() {
            tracing::debug!(source, "Watcher stopped, ignoring registration");
            return;
        }

        let path = match self.shared.directory.source_path(source) {
            Ok(path) => path,
            Err(e) => {
                self.report_registration_failure(source, &e);
                return;
            }
        };

        if !path.exists() {
            if let Err(e) = LogDirectory::touch(&path) {
                tracing::debug!(
                    source,
                    path = %path.display(),
                    error = %e,
                    "Could not create source log"
                );
            }
        }

        let tail = Arc::new(Mutex::new(SourceTail::at_end(path.clone())));
        let generation = self.shared.next_generation.fetch_add(1, Ordering::SeqCst);

        let debouncer = match self.attach(source, &path, generation) {
            Ok(debouncer) => debouncer,
            Err(e) => {
                self.report_registration_failure(source, &e);
                return;
            }
        };

        let offset = lock(&tail).offset();
        let registration = Registration {
            generation,
            tail,
            _debouncer: debouncer,
        };

        let replaced = {
            let mut sources = lock(&self.shared.sources);
            if self.shared.is_stopped() {
                tracing::debug!(source, "Watcher stopped during registration");
                return;
            }
            sources.insert(source.to_string(), registration)
        };

        if replaced.is_some() {
            tracing::debug!(source, "Closed previous watch for source");
        }
        tracing::debug!(source, path = %path.display(), offset, "Watch attached");
    }

    /// Stop tailing `source` and forget its offset. No-op if not registered.
    pub fn stop_watching(&self, source: &str) {
        let removed = lock(&self.shared.sources).remove(source);
        if removed.is_some() {
            tracing::debug!(source, "Watch closed");
        }
    }

    /// Stop permanently: close every watch and clear all offsets.
    ///
    /// Later registrations are refused. Calling this again has no effect.
    pub fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let drained: Vec<(String, Registration)> =
            lock(&self.shared.sources).drain().collect();
        tracing::debug!(closed = drained.len(), "Log tail watcher stopped");
    }

    /// Whether [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    /// Whether `source` is currently registered.
    #[must_use]
    pub fn is_watching(&self, source: &str) -> bool {
        lock(&self.shared.sources).contains_key(source)
    }

    /// Names of all registered sources, sorted.
    #[must_use]
    pub fn watched_sources(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.shared.sources).keys().cloned().collect();
        names.sort();
        names
    }

    /// Bytes consumed so far from `source`'s log, if registered.
    #[must_use]
    pub fn offset(&self, source: &str) -> Option<u64> {
        let tail = lock(&self.shared.sources)
            .get(source)
            .map(|registration| Arc::clone(&registration.tail))?;
        let offset = lock(&tail).offset();
        Some(offset)
    }

    /// Attach a debounced watch that re-reads `path` on every change.
    ///
    /// The watch is placed on the containing directory and filtered to the
    /// log's file name, so a log that is removed and recreated is picked up
    /// again.
    fn attach(
        &self,
        source: &str,
        path: &Path,
        generation: u64,
    ) -> Result<SourceDebouncer, WatcherError> {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let name = source.to_string();
        let file_name = path
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| WatcherError::InvalidSourceName(source.to_string()))?;

        let mut debouncer = new_debouncer(
            self.debounce,
            None,
            move |result: DebounceEventResult| {
                let Some(shared) = shared.upgrade() else {
                    return;
                };
                match result {
                    Ok(events) => {
                        if events.iter().any(|event| touches_log(event, &file_name)) {
                            shared.read_new_lines(&name, generation);
                        }
                    }
                    Err(errors) => {
                        if shared.is_stopped() {
                            return;
                        }
                        for error in errors {
                            let error = WatcherError::Notify(error);
                            tracing::warn!(source = %name, error = %error, "Change notification failed");
                            shared
                                .events
                                .emit_error(ErrorEvent::new(Some(&name), error.to_string()));
                        }
                    }
                }
            },
        )?;

        let watch_dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        debouncer.watch(watch_dir, RecursiveMode::NonRecursive)?;

        Ok(debouncer)
    }

    fn report_registration_failure(&self, source: &str, error: &WatcherError) {
        tracing::error!(source, error = %error, "Failed to start watching source");
        self.shared
            .events
            .emit_error(ErrorEvent::new(Some(source), error.to_string()));
    }
}

impl std::fmt::Debug for LogTailWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogTailWatcher")
            .field("directory", &self.shared.directory)
            .field("sources", &self.watched_sources())
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}
