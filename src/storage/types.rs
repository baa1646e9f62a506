//! Core data types for the storage layer.
//!
//! - [`Sample`]: One classified probe event (capture time plus optional latency)
//! - [`PartitionKey`]: Calendar date identifying one day partition

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Round-trip latency in whole milliseconds.
pub type Milliseconds = u64;

/// Textual date format of a partition key (`DDMMYYYY`).
pub const PARTITION_KEY_FORMAT: &str = "%d%m%Y";

/// Prefix of every partition table name.
pub const PARTITION_TABLE_PREFIX: &str = "ping_";

/// Format used for the capture time of day.
pub const TIME_OF_DAY_FORMAT: &str = "%H:%M:%S";

/// A single classified probe event.
///
/// `latency` is `None` for a timeout and `Some(ms)` for a reply. The capture
/// time is kept at whole-second precision, which is what the partition
/// persists, so a sample read back from storage compares equal to the one
/// that was appended.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use pinglog::Sample;
///
/// let at = NaiveDate::from_ymd_opt(2024, 9, 30)
///     .unwrap()
///     .and_hms_opt(12, 0, 1)
///     .unwrap();
/// let sample = Sample::reply(at, 14);
/// assert!(!sample.is_timeout());
/// assert_eq!(sample.to_string(), "[12:00:01] 14ms");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Local wall-clock time the event was observed.
    pub captured_at: NaiveDateTime,
    /// Round-trip latency, or `None` when the probe timed out.
    pub latency: Option<Milliseconds>,
}

impl Sample {
    /// Create a sample, truncating the capture time to whole seconds.
    pub fn new(captured_at: NaiveDateTime, latency: Option<Milliseconds>) -> Self {
        Self {
            captured_at: captured_at.with_nanosecond(0).unwrap_or(captured_at),
            latency,
        }
    }

    /// Create a successful-reply sample.
    pub fn reply(captured_at: NaiveDateTime, latency: Milliseconds) -> Self {
        Self::new(captured_at, Some(latency))
    }

    /// Create a timeout sample.
    pub fn timeout(captured_at: NaiveDateTime) -> Self {
        Self::new(captured_at, None)
    }

    /// Whether this sample records an unanswered probe.
    pub fn is_timeout(&self) -> bool {
        self.latency.is_none()
    }

    /// Partition this sample belongs to (its capture date).
    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey::new(self.captured_at.date())
    }

    /// Capture time of day.
    pub fn time_of_day(&self) -> NaiveTime {
        self.captured_at.time()
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = self.captured_at.format(TIME_OF_DAY_FORMAT);
        match self.latency {
            Some(ms) => write!(f, "[{time}] {ms}ms"),
            None => write!(f, "[{time}] Request timeout."),
        }
    }
}

/// Error returned when a string is not a valid `DDMMYYYY` partition date.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid partition date '{0}', expected DDMMYYYY")]
pub struct ParsePartitionKeyError(pub String);

/// Calendar date identifying one day partition.
///
/// Keys order chronologically. The textual `DDMMYYYY` form does not sort
/// lexicographically in date order, so never sort keys by their string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey(NaiveDate);

impl PartitionKey {
    /// Create a key for the given date.
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Underlying calendar date.
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Storage table holding this partition (`ping_DDMMYYYY`).
    pub fn table_name(&self) -> String {
        format!("{PARTITION_TABLE_PREFIX}{self}")
    }

    /// Recover a key from a storage table name.
    ///
    /// Returns `None` for tables that are not day partitions.
    pub fn from_table_name(name: &str) -> Option<Self> {
        name.strip_prefix(PARTITION_TABLE_PREFIX)?.parse().ok()
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(PARTITION_KEY_FORMAT))
    }
}

impl FromStr for PartitionKey {
    type Err = ParsePartitionKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParsePartitionKeyError(s.to_string()));
        }
        NaiveDate::parse_from_str(s, PARTITION_KEY_FORMAT)
            .map(Self)
            .map_err(|_| ParsePartitionKeyError(s.to_string()))
    }
}

impl Serialize for PartitionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
