//! Partition table definitions and the legacy column encoding.
//!
//! Each calendar day lives in its own table named `ping_DDMMYYYY`. The
//! latency column is text for compatibility with databases written by
//! earlier tooling: `"14ms"` for a reply, `"Request timeout"` for a timeout.
//! Nothing outside this module deals in those strings.

use chrono::NaiveTime;

use crate::storage::StorageError;
use crate::storage::types::{Milliseconds, PartitionKey, TIME_OF_DAY_FORMAT};

/// Persisted latency value marking a timeout.
pub const TIMEOUT_MARKER: &str = "Request timeout";

/// Unit suffix of persisted reply latencies.
const LATENCY_SUFFIX: &str = "ms";

/// Lists every table that could be a day partition.
pub const LIST_PARTITION_TABLES_SQL: &str =
    r"SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'ping\_%' ESCAPE '\'";

/// Checks whether a given table exists.
pub const PARTITION_EXISTS_SQL: &str =
    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?";

/// DDL for one day partition.
///
/// Table names come from [`PartitionKey::table_name`], which is always
/// `ping_` followed by eight digits, so interpolation is safe.
pub fn create_partition_sql(key: &PartitionKey) -> String {
    format!(
        r#"CREATE TABLE IF NOT EXISTS "{}" (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT,
    latency   TEXT
)"#,
        key.table_name()
    )
}

pub fn insert_sample_sql(key: &PartitionKey) -> String {
    format!(
        r#"INSERT INTO "{}" (timestamp, latency) VALUES (?, ?)"#,
        key.table_name()
    )
}

pub fn select_all_sql(key: &PartitionKey) -> String {
    format!(
        r#"SELECT timestamp, latency FROM "{}" ORDER BY id"#,
        key.table_name()
    )
}

pub fn select_latencies_sql(key: &PartitionKey) -> String {
    format!(
        r#"SELECT latency FROM "{}" WHERE latency != ? ORDER BY id"#,
        key.table_name()
    )
}

pub fn count_timeouts_sql(key: &PartitionKey) -> String {
    format!(
        r#"SELECT COUNT(*) FROM "{}" WHERE latency = ?"#,
        key.table_name()
    )
}

/// Encode a tagged latency into its persisted text form.
pub fn encode_latency(latency: Option<Milliseconds>) -> String {
    match latency {
        Some(ms) => format!("{ms}{LATENCY_SUFFIX}"),
        None => TIMEOUT_MARKER.to_string(),
    }
}

/// Decode the persisted text form back into a tagged latency.
pub fn decode_latency(raw: &str) -> Result<Option<Milliseconds>, StorageError> {
    let raw = raw.trim();
    if raw == TIMEOUT_MARKER {
        return Ok(None);
    }
    raw.strip_suffix(LATENCY_SUFFIX)
        .unwrap_or(raw)
        .trim()
        .parse::<Milliseconds>()
        .map(Some)
        .map_err(|_| StorageError::InvalidData(format!("unrecognized latency value '{raw}'")))
}

pub fn encode_time(time: NaiveTime) -> String {
    time.format(TIME_OF_DAY_FORMAT).to_string()
}

pub fn decode_time(raw: &str) -> Result<NaiveTime, StorageError> {
    NaiveTime::parse_from_str(raw.trim(), TIME_OF_DAY_FORMAT)
        .map_err(|e| StorageError::InvalidData(format!("unrecognized timestamp '{raw}': {e}")))
}
