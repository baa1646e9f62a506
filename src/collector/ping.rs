//! Ping probe: external process supervision and output classification.
//!
//! - [`PingProber`] / [`PingProcess`]: continuous `ping` process as a line source
//! - [`classify`]: maps each output line to a [`LineClass`]

mod classifier;
mod process;

pub use classifier::{LineClass, classify};
pub use process::{DEFAULT_HOST, DEFAULT_PROGRAM, PingConfig, PingProber, PingProcess};
