//! Configuration file loader.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Tail configuration loaded from TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TailConfig {
    /// Directory holding one subdirectory per team.
    pub log_root: PathBuf,
    /// Team whose source logs are tailed.
    pub team: String,
    /// Window for coalescing change notifications, in milliseconds.
    pub debounce_ms: u64,
    /// Buffered events per channel before slow subscribers start lagging.
    pub channel_capacity: usize,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            log_root: default_log_root(),
            team: "default".to_string(),
            debounce_ms: 100,
            channel_capacity: 256,
        }
    }
}

/// `<data_local_dir>/agent-log-tail/teams`, or `./teams` without a home.
fn default_log_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("agent-log-tail"))
        .unwrap_or_default()
        .join("teams")
}

/// Configuration loader that searches multiple locations.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        // 1. Current directory: .agent-log-tail.toml
        search_paths.push(PathBuf::from(".agent-log-tail.toml"));

        // 2. User config directory: ~/.config/agent-log-tail/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("agent-log-tail").join("config.toml"));
        }

        Self { search_paths }
    }

    /// Create a config loader with a specific config file path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
        }
    }

    /// Load configuration from the first available file, or return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load(&self) -> Result<TailConfig, ConfigError> {
        for path in &self.search_paths {
            if path.exists() {
                tracing::debug!(path = %path.display(), "Loading config file");
                return Self::load_from_path(path);
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(TailConfig::default())
    }

    fn load_from_path(path: &PathBuf) -> Result<TailConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            source: e,
        })
    }

    /// Get the search paths for debugging.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_tail_config() {
        let config = TailConfig::default();
        assert_eq!(config.team, "default");
        assert_eq!(config.debounce_ms, 100);
        assert_eq!(config.channel_capacity, 256);
        assert!(config.log_root.ends_with("teams"));
    }

    #[test]
    fn test_config_loader_default_paths() {
        let loader = ConfigLoader::new();
        assert!(!loader.search_paths().is_empty());
        assert!(loader.search_paths()[0].ends_with(".agent-log-tail.toml"));
    }

    #[test]
    fn test_config_loader_returns_defaults_when_no_file() {
        let loader = ConfigLoader::with_path(PathBuf::from("/nonexistent/path.toml"));
        let config = loader.load().unwrap();
        assert_eq!(config, TailConfig::default());
    }

    #[test]
    fn test_parse_partial_toml_config() {
        let toml_str = r#"
            log_root = "/srv/agents"
            team = "teamA"
        "#;

        let config: TailConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.log_root, PathBuf::from("/srv/agents"));
        assert_eq!(config.team, "teamA");
        assert_eq!(config.debounce_ms, 100);
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "team = \"ops\"\ndebounce_ms = 25\n").unwrap();

        let config = ConfigLoader::with_path(path).load().unwrap();
        assert_eq!(config.team, "ops");
        assert_eq!(config.debounce_ms, 25);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "debounce_ms = \"soon\"\n").unwrap();

        let err = ConfigLoader::with_path(path).load().unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
