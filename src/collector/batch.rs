//! Batch buffering of samples ahead of the store.
//!
//! Samples accumulate in memory until the batch reaches its capacity (or the
//! session drains), then go to the store as one flush. A flush appends one
//! run of samples per capture date, dropping each run from the batch only
//! once the store acknowledged it, so a retry never writes a sample twice.

use std::time::Duration;

use crate::collector::CollectorError;
use crate::storage::{PartitionStore, Sample, StorageError};

/// Default number of samples per flush.
pub const DEFAULT_BATCH_CAPACITY: usize = 10;

/// Default pause before retrying a failed flush.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Upper bound on the retry pause.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Summary of one successful flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Samples persisted by this flush.
    pub samples: usize,
    /// Number of store appends issued (one per capture date).
    pub appends: usize,
    /// Whether the first attempt failed and the retry succeeded.
    pub retried: bool,
}

/// Bounded in-memory batch of samples awaiting a flush.
#[derive(Debug)]
pub struct BatchBuffer {
    capacity: usize,
    retry_backoff: Duration,
    samples: Vec<Sample>,
    flushes: u64,
    flushed_samples: u64,
}

impl BatchBuffer {
    /// Create a buffer that asks to be flushed once `capacity` samples are held.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            samples: Vec::with_capacity(capacity),
            flushes: 0,
            flushed_samples: 0,
        }
    }

    /// Set the pause before the single flush retry (capped at [`MAX_RETRY_BACKOFF`]).
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff.min(MAX_RETRY_BACKOFF);
        self
    }

    /// Add a sample. Returns `true` when the batch is now full and must be flushed.
    pub fn push(&mut self, sample: Sample) -> bool {
        debug_assert!(self.samples.len() < self.capacity, "batch overfilled");
        self.samples.push(sample);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of flushes that persisted at least one sample.
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    /// Total samples persisted through this buffer.
    pub fn flushed_samples(&self) -> u64 {
        self.flushed_samples
    }

    /// Persist the whole batch.
    ///
    /// Flushing an empty batch is a no-op. On failure the remaining samples
    /// are retried once after the configured backoff.
    ///
    /// # Errors
    /// Returns `CollectorError::Flush` if the retry fails too. The unflushed
    /// samples stay in the buffer.
    pub async fn flush<S>(&mut self, store: &S) -> Result<FlushReport, CollectorError>
    where
        S: PartitionStore + ?Sized,
    {
        if self.samples.is_empty() {
            return Ok(FlushReport::default());
        }

        let total = self.samples.len();
        let mut appends = 0;
        let mut retried = false;

        if let Err(e) = self.append_runs(store, &mut appends).await {
            tracing::warn!(
                error = %e,
                pending = self.samples.len(),
                backoff = ?self.retry_backoff,
                "Flush failed, retrying once"
            );
            tokio::time::sleep(self.retry_backoff).await;
            retried = true;

            if let Err(e) = self.append_runs(store, &mut appends).await {
                tracing::error!(
                    error = %e,
                    unflushed = self.samples.len(),
                    "Flush failed after retry"
                );
                self.record(total - self.samples.len());
                return Err(CollectorError::Flush {
                    unflushed: self.samples.len(),
                    source: e,
                });
            }
        }

        self.record(total);
        tracing::debug!(samples = total, appends, retried, "Batch flushed");
        Ok(FlushReport {
            samples: total,
            appends,
            retried,
        })
    }

    async fn append_runs<S>(&mut self, store: &S, appends: &mut usize) -> Result<(), StorageError>
    where
        S: PartitionStore + ?Sized,
    {
        while let Some(first) = self.samples.first() {
            let key = first.partition_key();
            let run = self
                .samples
                .iter()
                .take_while(|s| s.partition_key() == key)
                .count();
            store.append(key, &self.samples[..run]).await?;
            self.samples.drain(..run);
            *appends += 1;
        }
        Ok(())
    }

    fn record(&mut self, persisted: usize) {
        if persisted > 0 {
            self.flushes += 1;
            self.flushed_samples += persisted as u64;
        }
    }
}

impl Default for BatchBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_CAPACITY)
    }
}
