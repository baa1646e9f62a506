//! Storage Layer
//!
//! Day-partitioned SQLite persistence for probe samples:
//!
//! - [`PartitionStore`]: Append-only, date-keyed store interface
//! - [`SqliteStore`]: SQLite implementation (one table per calendar day)
//! - [`StorageBuilder`]: Opens the database file or an in-memory database
//! - [`Sample`] / [`PartitionKey`]: Core data types

pub mod db;
mod builder;
mod error;
mod partition_store;
mod schema;
mod types;

pub use builder::{IN_MEMORY_PATH, StorageBuilder};
pub use error::StorageError;
pub use partition_store::{PartitionStore, SqliteStore};
pub use schema::TIMEOUT_MARKER;
pub use types::{
    Milliseconds, PARTITION_KEY_FORMAT, ParsePartitionKeyError, PartitionKey, Sample,
    TIME_OF_DAY_FORMAT,
};
