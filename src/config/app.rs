//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collector::ping::PingConfig;
use crate::collector::{
    BatchBuffer, DEFAULT_BATCH_CAPACITY, DEFAULT_LOG_DIR, DEFAULT_RETRY_BACKOFF,
    MAX_RETRY_BACKOFF, SessionLog,
};

use super::validation::{ConfigError, expand_env_vars, require_non_empty};

// =============================================================================
// Constants
// =============================================================================

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

/// Default database file location.
pub const DEFAULT_DB_PATH: &str = "data/ping_data.db";

fn default_capacity() -> usize {
    DEFAULT_BATCH_CAPACITY
}

fn default_retry_backoff() -> Duration {
    DEFAULT_RETRY_BACKOFF
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> String {
    DEFAULT_LOG_DIR.to_string()
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Database configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path, or `:memory:`.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DB_PATH.to_string(),
        }
    }
}

// =============================================================================
// Batch Configuration
// =============================================================================

/// Write batching configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Samples buffered before a flush (default: 10).
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Wait before the single retry of a failed flush (default: 500ms, max: 5s).
    #[serde(default = "default_retry_backoff", with = "humantime_serde")]
    pub retry_backoff: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BATCH_CAPACITY,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl BatchConfig {
    /// Build an empty batch buffer with these settings.
    pub fn to_buffer(&self) -> BatchBuffer {
        BatchBuffer::new(self.capacity).with_retry_backoff(self.retry_backoff)
    }
}

// =============================================================================
// Session Log Configuration
// =============================================================================

/// Per-session text log configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLogConfig {
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,

    /// Directory receiving `ping_log_YYYYmmdd_HHMMSS.txt` files.
    #[serde(default = "default_log_dir")]
    pub dir: String,
}

impl Default for SessionLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: DEFAULT_LOG_DIR.to_string(),
        }
    }
}

impl SessionLogConfig {
    pub fn to_session_log(&self) -> SessionLog {
        if self.enabled {
            SessionLog::new(&self.dir)
        } else {
            SessionLog::disabled()
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Probe configuration.
    #[serde(default)]
    pub probe: PingConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Batch configuration.
    #[serde(default)]
    pub batch: BatchConfig,

    /// Session log configuration.
    #[serde(default)]
    pub session_log: SessionLogConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: Self = serde_yaml::from_str(&content)?;
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file does not exist.
    ///
    /// Any other read, parse, or validation failure is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match Self::load(path.as_ref()) {
            Err(ConfigError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    path = %path.as_ref().display(),
                    "Config file not found, using defaults"
                );
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty("probe host", &self.probe.host)?;
        require_non_empty("probe program", &self.probe.program)?;
        require_non_empty("database path", &self.database.path)?;

        if self.batch.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "batch capacity must be positive".to_string(),
            ));
        }

        if self.batch.retry_backoff > MAX_RETRY_BACKOFF {
            return Err(ConfigError::ValidationError(format!(
                "batch retry_backoff must not exceed {}",
                humantime::format_duration(MAX_RETRY_BACKOFF)
            )));
        }

        if self.session_log.enabled {
            require_non_empty("session log dir", &self.session_log.dir)?;
        }

        Ok(())
    }

    fn expand_paths(&mut self) {
        self.database.path = expand_env_vars(&self.database.path);
        self.session_log.dir = expand_env_vars(&self.session_log.dir);
    }
}
