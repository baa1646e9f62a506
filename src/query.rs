//! Query Layer
//!
//! Reads recorded partitions back and computes per-day aggregates.
//!
//! # Architecture
//!
//! - [`DateSelector`]: One `DDMMYYYY` day or every recorded day
//! - [`AggregationKind`]: What to compute for each resolved day
//! - [`QueryEngine`]: Resolves partitions and computes each one independently
//! - [`QueryReport`]: Result tree, rendered as text via `Display` or as JSON
//!
//! # Example
//!
//! ```rust,no_run
//! use pinglog::StorageBuilder;
//! use pinglog::query::{DateSelector, QueryEngine};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = StorageBuilder::new("data/ping_data.db").build().await?;
//! let engine = QueryEngine::new(&store);
//! let report = engine.query("all".parse::<DateSelector>()?, "avg").await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

mod engine;
mod report;
mod types;

pub use engine::{QueryEngine, QueryError};
pub use report::{Aggregate, PartitionOutcome, PartitionReport, QueryReport};
pub use types::{AggregationKind, DateSelector};
