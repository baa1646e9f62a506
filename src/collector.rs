//! Collector Layer
//!
//! Streaming probe pipeline: an external `ping` process feeds lines that are
//! classified into samples, buffered, and flushed into the day-partitioned
//! store.
//!
//! # Architecture
//!
//! - [`Prober`] / [`LineSource`]: Pluggable source of raw probe output
//! - [`ping`]: `ping` process supervisor and line classifier
//! - [`BatchBuffer`]: Bounded batch with size-triggered flush and one retry
//! - [`SessionController`]: Run-path state machine with cancellation-driven drain
//!
//! # Example
//!
//! ```rust,no_run
//! use pinglog::collector::ping::{PingConfig, PingProber};
//! use pinglog::collector::{BatchBuffer, SessionController};
//! use pinglog::StorageBuilder;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = StorageBuilder::new("data/ping_data.db").build().await?;
//! let prober = PingProber::new(PingConfig::new("google.com"));
//! let mut session = SessionController::new(prober, store).with_batch(BatchBuffer::new(10));
//! let summary = session.run(CancellationToken::new()).await?;
//! println!("{:?}", summary.outcome);
//! # Ok(())
//! # }
//! ```

mod batch;
pub mod ping;
mod session;
mod session_log;
mod traits;

pub use batch::{
    BatchBuffer, DEFAULT_BATCH_CAPACITY, DEFAULT_RETRY_BACKOFF, FlushReport, MAX_RETRY_BACKOFF,
};
pub use session::{
    SessionController, SessionError, SessionOutcome, SessionState, SessionStats, SessionSummary,
};
pub use session_log::{DEFAULT_LOG_DIR, SessionLog};
pub use traits::{Clock, CollectorError, LineSource, Prober, SystemClock};
