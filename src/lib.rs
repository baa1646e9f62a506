//! Pinglog - Ping Latency Recorder
//!
//! This crate drives a continuous `ping` against one host, records every
//! reply and timeout into day-partitioned SQLite tables, and answers
//! per-day aggregate queries over the recorded data. It can be used as a
//! library, or run as a standalone binary with the `pinglog` executable.
//!
//! # Architecture
//!
//! - **Collector**: Probe process supervision, line classification, batching,
//!   and the session state machine
//! - **Storage**: Day-partitioned SQLite persistence
//! - **Query**: Min/max/avg/timeout aggregation per recorded day
//! - **Config**: YAML configuration with validation
//!
//! # Example
//!
//! ```rust,no_run
//! use pinglog::{QueryEngine, StorageBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = StorageBuilder::new("data/ping_data.db").build().await?;
//!     let report = QueryEngine::new(&store).query_str("all", "all").await?;
//!     println!("{report}");
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod config;
pub mod query;
pub mod storage;

pub use collector::{SessionController, SessionOutcome, SessionSummary};
pub use config::AppConfig;
pub use query::{AggregationKind, DateSelector, QueryEngine, QueryReport};
pub use storage::{PartitionKey, PartitionStore, Sample, SqliteStore, StorageBuilder};
