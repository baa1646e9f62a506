//! Core collector traits and types.

use chrono::{Local, NaiveDateTime};
use thiserror::Error;

use crate::storage::StorageError;

/// Errors that can occur during collection.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// The probe process could not be started.
    #[error("failed to spawn probe '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading from or signalling the probe failed.
    #[error("probe I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The probe process exited without being asked to.
    #[error("probe exited unexpectedly ({0})")]
    ProbeExited(String),

    /// A flush failed after its retry; the samples are still buffered.
    #[error("flush failed after retry, {unflushed} sample(s) not persisted: {source}")]
    Flush {
        unflushed: usize,
        #[source]
        source: StorageError,
    },
}

/// A lazy, unbounded, non-restartable sequence of raw probe output lines.
///
/// # Contract
///
/// - `next_line` returns `Ok(Some(line))` for each emitted line (without the
///   trailing newline), `Ok(None)` once the source is exhausted, or
///   `Err(CollectorError::ProbeExited)` if the backing process died on its own.
/// - `next_line` must be cancel-safe: dropping its future before completion
///   must not lose an already-buffered line.
/// - `terminate` stops the source and releases every handle it holds. It is
///   idempotent.
#[async_trait::async_trait]
pub trait LineSource: Send {
    /// Await the next raw line.
    async fn next_line(&mut self) -> Result<Option<String>, CollectorError>;

    /// Stop the source.
    async fn terminate(&mut self) -> Result<(), CollectorError>;
}

/// Launches a [`LineSource`].
///
/// The run path launches exactly one source per session. Tests substitute a
/// synthetic prober so no external process is spawned.
pub trait Prober: Send + Sync {
    type Source: LineSource;

    /// Start probing.
    ///
    /// # Errors
    /// Returns `CollectorError::Spawn` if the probe cannot be started.
    fn launch(&self) -> Result<Self::Source, CollectorError>;

    /// Human-readable target description for logs.
    fn target(&self) -> &str;
}

/// Source of local wall-clock time for sample capture.
pub trait Clock: Send + Sync {
    /// Current local date-time.
    fn now(&self) -> NaiveDateTime;
}

/// A clock backed by the system's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_local_now() {
        let before = Local::now().naive_local();
        let now = SystemClock.now();
        let after = Local::now().naive_local();
        assert!(before <= now && now <= after);
    }

    #[test]
    fn test_flush_error_reports_unflushed_count() {
        let err = CollectorError::Flush {
            unflushed: 7,
            source: StorageError::Closed,
        };
        let msg = err.to_string();
        assert!(msg.contains("7 sample(s)"));
        assert!(msg.contains("storage is closed"));
    }
}
