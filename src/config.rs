//! Engine configuration and file loader.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::DEFAULT_CHANNEL_BUFFER;

/// Default characters revealed per pacer tick.
const DEFAULT_REVEAL_CHUNK: usize = 4;

/// Default milliseconds between pacer ticks.
const DEFAULT_REVEAL_INTERVAL_MS: u64 = 16;

/// Default separator joining committed fragments within a turn.
const DEFAULT_FRAGMENT_SEPARATOR: &str = "\n\n";

/// Configuration for a chat engine endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the Claude Code binary.
    pub binary: PathBuf,
    /// Working directory for spawned processes.
    pub working_dir: Option<PathBuf>,
    /// Characters revealed per pacer tick.
    pub reveal_chunk: usize,
    /// Milliseconds between pacer ticks.
    pub reveal_interval_ms: u64,
    /// Separator joining committed fragments within a turn.
    pub fragment_separator: String,
    /// Buffer size for event and notification channels.
    pub channel_buffer: usize,
    /// Override for the session store file location.
    pub store_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            working_dir: None,
            reveal_chunk: DEFAULT_REVEAL_CHUNK,
            reveal_interval_ms: DEFAULT_REVEAL_INTERVAL_MS,
            fragment_separator: DEFAULT_FRAGMENT_SEPARATOR.to_string(),
            channel_buffer: DEFAULT_CHANNEL_BUFFER,
            store_path: None,
        }
    }
}

impl EngineConfig {
    /// The pacer tick interval as a [`Duration`].
    #[must_use]
    pub fn reveal_interval(&self) -> Duration {
        Duration::from_millis(self.reveal_interval_ms)
    }
}

/// Prefer the user-local install the CLI puts in `~/.local/bin`,
/// falling back to PATH lookup.
fn default_binary() -> PathBuf {
    if let Some(home) = dirs::home_dir() {
        let local = home.join(".local").join("bin").join("claude");
        if local.exists() {
            return local;
        }
    }
    PathBuf::from("claude")
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

        // 1. Current directory: .claude-chat.toml
        search_paths.push(PathBuf::from(".claude-chat.toml"));

        // 2. User config directory: ~/.config/claude-chat/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("claude-chat").join("config.toml"));
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
    pub fn load(&self) -> Result<EngineConfig, ConfigError> {
        for path in &self.search_paths {
            if path.exists() {
                tracing::debug!(path = %path.display(), "Loading config file");
                return Self::load_from_path(path);
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(EngineConfig::default())
    }

    fn load_from_path(path: &PathBuf) -> Result<EngineConfig, ConfigError> {
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
    /// Reading the config file failed.
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Parsing the config file failed.
    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        /// Config file path.
        path: PathBuf,
        /// Underlying parse error.
        source: toml::de::Error,
    },
}
