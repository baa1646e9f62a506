//! Classification of raw `ping` output lines.
//!
//! Handles both the Windows format
//! (`Reply from 1.2.3.4: bytes=32 time=14ms TTL=117`, `Request timed out.`)
//! and the Unix format
//! (`64 bytes from 1.2.3.4: icmp_seq=1 ttl=117 time=14.2 ms`,
//! `no answer yet for icmp_seq=3`).

use std::sync::OnceLock;

use regex::Regex;

use crate::storage::Milliseconds;

/// Markers identifying a successful echo reply.
const REPLY_MARKERS: [&str; 2] = ["Reply from", "bytes from"];

/// Markers identifying an unanswered echo request.
const TIMEOUT_MARKERS: [&str; 2] = ["Request timed out", "no answer yet for icmp_seq="];

/// Outcome of classifying one output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    /// Successful round trip with its latency.
    Reply(Milliseconds),
    /// The probe timed out.
    Timeout,
    /// Banner, summary, error or malformed line.
    Ignored,
}

fn latency_regex() -> &'static Regex {
    static LATENCY_REGEX: OnceLock<Regex> = OnceLock::new();
    LATENCY_REGEX.get_or_init(|| {
        Regex::new(r"\btime=(\d+)(?:\.\d+)? ?ms\b").expect("failed to compile latency regex")
    })
}

/// Classify a raw line of probe output.
///
/// Never fails: anything unrecognized, including a reply whose latency token
/// is malformed or out of range, is [`LineClass::Ignored`].
///
/// # Examples
///
/// ```
/// use pinglog::collector::ping::{LineClass, classify};
///
/// assert_eq!(
///     classify("Reply from 142.250.1.1: bytes=32 time=14ms TTL=117"),
///     LineClass::Reply(14)
/// );
/// assert_eq!(classify("Request timed out."), LineClass::Timeout);
/// assert_eq!(classify("Pinging google.com with 32 bytes of data:"), LineClass::Ignored);
/// ```
pub fn classify(line: &str) -> LineClass {
    if REPLY_MARKERS.iter().any(|m| line.contains(m)) {
        return latency_regex()
            .captures(line)
            .and_then(|caps| caps[1].parse::<Milliseconds>().ok())
            .map_or(LineClass::Ignored, LineClass::Reply);
    }

    if TIMEOUT_MARKERS.iter().any(|m| line.contains(m)) {
        return LineClass::Timeout;
    }

    LineClass::Ignored
}
