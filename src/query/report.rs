//! Query results and their text rendering.

use std::fmt;

use serde::Serialize;

use crate::storage::{Milliseconds, PartitionKey, Sample, TIME_OF_DAY_FORMAT, TIMEOUT_MARKER};

use super::DateSelector;

// =============================================================================
// Aggregate
// =============================================================================

/// One computed value for a partition. `None` means the partition holds no
/// replies to aggregate over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Min(Option<Milliseconds>),
    Max(Option<Milliseconds>),
    Avg(Option<f64>),
    Timeouts(u64),
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Min(Some(ms)) => write!(f, "Min ping: {ms}ms"),
            Self::Min(None) => f.write_str("Min ping: no data"),
            Self::Max(Some(ms)) => write!(f, "Max ping: {ms}ms"),
            Self::Max(None) => f.write_str("Max ping: no data"),
            Self::Avg(Some(avg)) => write!(f, "Average ping: {avg:.2}ms"),
            Self::Avg(None) => f.write_str("Average ping: no data"),
            Self::Timeouts(count) => write!(f, "Total timeouts: {count}"),
        }
    }
}

// =============================================================================
// Partition Report
// =============================================================================

/// What a query produced for one partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PartitionOutcome {
    /// The partition does not exist.
    Missing,
    /// The requested aggregation kind is not recognised.
    InvalidKind { kind: String },
    Aggregates { values: Vec<Aggregate> },
    /// Every stored row in insertion order.
    Records { samples: Vec<Sample> },
    /// The partition exists but could not be read.
    Unreadable { error: String },
}

/// Result for a single day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionReport {
    pub date: PartitionKey,
    #[serde(flatten)]
    pub outcome: PartitionOutcome,
}

impl PartitionReport {
    pub fn new(date: PartitionKey, outcome: PartitionOutcome) -> Self {
        Self { date, outcome }
    }
}

impl fmt::Display for PartitionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            PartitionOutcome::Missing => f.write_str("No data found for that date."),
            PartitionOutcome::InvalidKind { kind } => write!(f, "Invalid ping option '{kind}'."),
            PartitionOutcome::Unreadable { error } => {
                write!(f, "Failed to read table {}: {error}", self.date.table_name())
            }
            PartitionOutcome::Aggregates { values } => {
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{value}")?;
                }
                Ok(())
            }
            PartitionOutcome::Records { samples } if samples.is_empty() => {
                write!(f, "No data found in table {}.", self.date.table_name())
            }
            PartitionOutcome::Records { samples } => {
                write!(f, "All ping records for {}:", self.date)?;
                for sample in samples {
                    let time = sample.captured_at.format(TIME_OF_DAY_FORMAT);
                    match sample.latency {
                        Some(ms) => write!(f, "\nTimestamp: {time}, Latency: {ms}ms")?,
                        None => write!(f, "\nTimestamp: {time}, Latency: {TIMEOUT_MARKER}")?,
                    }
                }
                Ok(())
            }
        }
    }
}

// =============================================================================
// Query Report
// =============================================================================

/// Full result of one query, one entry per resolved partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryReport {
    pub selector: DateSelector,
    /// Aggregation kind as requested.
    pub kind: String,
    pub partitions: Vec<PartitionReport>,
}

impl QueryReport {
    /// Whether any resolved partition had rows to report on.
    pub fn has_data(&self) -> bool {
        self.partitions
            .iter()
            .any(|p| !matches!(p.outcome, PartitionOutcome::Missing))
    }
}

impl fmt::Display for QueryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.selector == DateSelector::All && self.partitions.is_empty() {
            return f.write_str("No data available in the database.");
        }

        for (i, partition) in self.partitions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            if self.selector == DateSelector::All {
                writeln!(f)?;
                writeln!(f, "Data for date: {}", partition.date)?;
            }
            write!(f, "{partition}")?;
        }
        Ok(())
    }
}
