//! Configuration validation utilities.

use std::sync::OnceLock;
use std::time::Duration;

use regex::{Captures, Regex};
use thiserror::Error;

/// Errors raised while loading or validating [`AppConfig`](super::AppConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Parse a human-readable duration such as `500ms`, `2s` or `1m30s`.
///
/// # Examples
///
/// ```
/// use pinglog::config::parse_duration;
///
/// assert_eq!(parse_duration("500ms").unwrap().as_millis(), 500);
/// assert_eq!(parse_duration("2s").unwrap().as_secs(), 2);
/// assert!(parse_duration("").is_err());
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    match s.trim() {
        "" => Err("duration string is empty".to_string()),
        s => humantime::parse_duration(s).map_err(|e| format!("invalid duration '{s}': {e}")),
    }
}

/// Reject blank values for a required field.
pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

fn env_ref_regex() -> &'static Regex {
    static ENV_REF_REGEX: OnceLock<Regex> = OnceLock::new();
    ENV_REF_REGEX.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("failed to compile env var regex")
    })
}

/// Expand `${VAR}` and `${VAR:-default}` references in a path value.
///
/// As in a POSIX shell, the default applies when `VAR` is unset or empty.
/// An unset `VAR` without a default expands to nothing.
pub fn expand_env_vars(input: &str) -> String {
    env_ref_regex()
        .replace_all(input, |caps: &Captures| {
            let fallback = caps.get(2).map_or("", |m| m.as_str());
            match std::env::var(&caps[1]) {
                Ok(value) if !value.is_empty() => value,
                _ => fallback.to_string(),
            }
        })
        .into_owned()
}
