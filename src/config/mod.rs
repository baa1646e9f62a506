//! Configuration module for pinglog.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Probe settings (target host, ping program, argument override)
//! - Database settings (path)
//! - Batch settings (capacity, retry backoff)
//! - Session log settings (enabled, directory)

mod app;
mod validation;

pub use app::{
    AppConfig, BatchConfig, DEFAULT_CONFIG_PATH, DEFAULT_DB_PATH, DatabaseConfig,
    SessionLogConfig,
};
pub use validation::{ConfigError, expand_env_vars, parse_duration};
