//! Backing directory layout for source logs.
//!
//! One directory per team, holding one `<source>.jsonl` file per agent.

use std::path::{Path, PathBuf};

use super::error::WatcherError;

/// File extension used for source logs.
pub const LOG_EXTENSION: &str = "jsonl";

/// The directory that holds a team's source logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDirectory {
    dir: PathBuf,
}

impl LogDirectory {
    /// Use `dir` directly as the team directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Team directory `<root>/<team>`.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::InvalidSourceName`] if `team` is not a single
    /// path component.
    pub fn for_team(root: &Path, team: &str) -> Result<Self, WatcherError> {
        validate_name(team)?;
        Ok(Self::new(root.join(team)))
    }

    /// Get the team directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Path of the log file for `source`.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::InvalidSourceName`] if the name would escape
    /// the team directory.
    pub fn source_path(&self, source: &str) -> Result<PathBuf, WatcherError> {
        validate_name(source)?;
        Ok(self.dir.join(format!("{source}.{LOG_EXTENSION}")))
    }

    /// Create the team directory and its parents if missing.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::Storage`] if the directory cannot be created.
    pub fn ensure_ready(&self) -> Result<(), WatcherError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| WatcherError::Storage {
            path: self.dir.clone(),
            source,
        })
    }

    /// Create an empty log for `path` if none exists yet.
    pub(crate) fn touch(path: &Path) -> std::io::Result<()> {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(drop)
    }

    /// Source names that already have a log file, sorted.
    ///
    /// Returns an empty list if the directory cannot be read.
    #[must_use]
    pub fn discover_sources(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };

        let mut sources: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| path.extension().is_some_and(|ext| ext == LOG_EXTENSION))
            .filter_map(|path| path.file_stem()?.to_str().map(String::from))
            .filter(|name| validate_name(name).is_ok())
            .collect();
        sources.sort();
        sources
    }
}

/// Names must be a single, ordinary path component.
fn validate_name(name: &str) -> Result<(), WatcherError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        Err(WatcherError::InvalidSourceName(name.to_string()))
    } else {
        Ok(())
    }
}
