//! Probing session controller.
//!
//! Wires prober → classifier → batch → store for one run:
//!
//! ```text
//! Idle ──launch──▶ Probing ◀──▶ Flushing
//!   │                 │
//!   │ spawn error     │ cancel / stream end / probe exit / flush error
//!   ▼                 ▼
//! Closed ◀──────── Draining: flush batch → terminate probe → close store
//! ```
//!
//! The await on the next probe line is the only suspension point and is
//! raced against the cancellation token, so an interrupt is observed while
//! waiting for output and never in the middle of a flush.

use std::path::PathBuf;

use strum_macros::Display;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::collector::batch::BatchBuffer;
use crate::collector::ping::{LineClass, classify};
use crate::collector::session_log::SessionLog;
use crate::collector::{Clock, CollectorError, LineSource, Prober, SystemClock};
use crate::storage::{PartitionStore, Sample};

/// Lifecycle state of a [`SessionController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionState {
    Idle,
    Probing,
    Flushing,
    Draining,
    Closed,
}

/// How a session that reached `Probing` ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Cancellation was requested.
    Interrupted,
    /// The line source was exhausted without error.
    StreamEnded,
    /// The probe process died or its output could not be read.
    ProbeExited(String),
    /// Samples could not be persisted.
    FlushFailed(String),
}

impl SessionOutcome {
    /// Whether the session ended without an error condition.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Interrupted | Self::StreamEnded)
    }
}

/// Counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub lines: u64,
    pub ignored: u64,
    pub replies: u64,
    pub timeouts: u64,
    pub flushes: u64,
    pub samples_flushed: u64,
}

/// Result of a completed session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub outcome: SessionOutcome,
    pub stats: SessionStats,
    /// Samples still buffered because the final flush failed.
    pub unflushed: usize,
    /// Session log written at close, if logging was enabled and succeeded.
    pub log_path: Option<PathBuf>,
}

/// Errors that prevent a session from running at all.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `run` was called on a controller that is not idle.
    #[error("session is {0}, expected idle")]
    InvalidState(SessionState),

    /// The probe could not be started.
    #[error("failed to start probe: {0}")]
    Spawn(#[source] CollectorError),
}

/// Owns the prober, the store handle and the batch for one session.
pub struct SessionController<P, S, C = SystemClock> {
    prober: P,
    store: S,
    clock: C,
    batch: BatchBuffer,
    log: SessionLog,
    echo: bool,
    state: SessionState,
    stats: SessionStats,
}

impl<P, S> SessionController<P, S>
where
    P: Prober,
    S: PartitionStore,
{
    /// Create an idle controller using the system clock and a default batch.
    pub fn new(prober: P, store: S) -> Self {
        Self {
            prober,
            store,
            clock: SystemClock,
            batch: BatchBuffer::default(),
            log: SessionLog::disabled(),
            echo: false,
            state: SessionState::Idle,
            stats: SessionStats::default(),
        }
    }
}

impl<P, S, C> SessionController<P, S, C>
where
    P: Prober,
    S: PartitionStore,
    C: Clock,
{
    /// Replace the clock used to timestamp samples.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> SessionController<P, S, C2> {
        SessionController {
            prober: self.prober,
            store: self.store,
            clock,
            batch: self.batch,
            log: self.log,
            echo: self.echo,
            state: self.state,
            stats: self.stats,
        }
    }

    /// Set the batch buffer (capacity and retry backoff).
    pub fn with_batch(mut self, batch: BatchBuffer) -> Self {
        self.batch = batch;
        self
    }

    /// Set the session log.
    pub fn with_session_log(mut self, log: SessionLog) -> Self {
        self.log = log;
        self
    }

    /// Print each accepted sample to stdout as it arrives.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Lines recorded for the session log.
    pub fn displayed_lines(&self) -> &[String] {
        self.log.lines()
    }

    /// Run one probing session until cancellation or the probe ends.
    ///
    /// # Errors
    /// - `SessionError::InvalidState` if the controller is not idle.
    /// - `SessionError::Spawn` if the probe cannot be launched; the store is
    ///   released and the controller is closed without ever probing.
    ///
    /// Every other terminal condition is reported through
    /// [`SessionSummary::outcome`] after the drain completed.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<SessionSummary, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState(self.state));
        }

        let mut source = match self.prober.launch() {
            Ok(source) => source,
            Err(e) => {
                tracing::error!(host = %self.prober.target(), error = %e, "Probe spawn failed");
                self.store.close().await;
                self.transition(SessionState::Closed);
                return Err(SessionError::Spawn(e));
            }
        };

        self.transition(SessionState::Probing);
        tracing::info!(
            host = %self.prober.target(),
            batch_capacity = self.batch.capacity(),
            "Probing started"
        );

        let outcome = self.probe(&mut source, &cancel).await;
        Ok(self.drain(&mut source, outcome).await)
    }

    async fn probe(&mut self, source: &mut P::Source, cancel: &CancellationToken) -> SessionOutcome {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return SessionOutcome::Interrupted,
                line = source.next_line() => line,
            };

            match next {
                Ok(Some(line)) => {
                    if let Err(e) = self.accept(&line).await {
                        return SessionOutcome::FlushFailed(e.to_string());
                    }
                }
                Ok(None) => return SessionOutcome::StreamEnded,
                Err(e) => return SessionOutcome::ProbeExited(e.to_string()),
            }
        }
    }

    async fn accept(&mut self, line: &str) -> Result<(), CollectorError> {
        self.stats.lines += 1;
        let sample = match classify(line) {
            LineClass::Reply(ms) => {
                self.stats.replies += 1;
                Sample::reply(self.clock.now(), ms)
            }
            LineClass::Timeout => {
                self.stats.timeouts += 1;
                Sample::timeout(self.clock.now())
            }
            LineClass::Ignored => {
                self.stats.ignored += 1;
                tracing::trace!(line, "Ignored probe output");
                return Ok(());
            }
        };

        let display = sample.to_string();
        if self.echo {
            println!("{display}");
        }
        self.log.record(display);

        if self.batch.push(sample) {
            self.transition(SessionState::Flushing);
            let result = self.batch.flush(&self.store).await;
            self.transition(SessionState::Probing);
            result?;
        }
        Ok(())
    }

    async fn drain(&mut self, source: &mut P::Source, outcome: SessionOutcome) -> SessionSummary {
        self.transition(SessionState::Draining);
        let mut outcome = outcome;

        if let Err(e) = self.batch.flush(&self.store).await {
            tracing::error!(error = %e, unflushed = self.batch.len(), "Final flush failed");
            if !matches!(outcome, SessionOutcome::FlushFailed(_)) {
                outcome = SessionOutcome::FlushFailed(e.to_string());
            }
        }

        if let Err(e) = source.terminate().await {
            tracing::warn!(error = %e, "Failed to terminate probe");
        }

        self.store.close().await;

        let log_path = match self.log.write(self.clock.now()).await {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to write session log");
                None
            }
        };

        self.stats.flushes = self.batch.flush_count();
        self.stats.samples_flushed = self.batch.flushed_samples();
        self.transition(SessionState::Closed);

        tracing::info!(
            outcome = ?outcome,
            lines = self.stats.lines,
            samples_flushed = self.stats.samples_flushed,
            flushes = self.stats.flushes,
            "Session closed"
        );

        SessionSummary {
            outcome,
            stats: self.stats,
            unflushed: self.batch.len(),
            log_path,
        }
    }

    fn transition(&mut self, next: SessionState) {
        tracing::trace!(from = %self.state, to = %next, "Session state");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use chrono::{NaiveDate, NaiveDateTime};

    use crate::storage::{Milliseconds, PartitionKey, StorageError};

    #[derive(Default)]
    struct RecordingStore {
        appends: Mutex<Vec<(PartitionKey, Vec<Sample>)>>,
        fail_appends: bool,
        closed: AtomicBool,
    }

    #[async_trait::async_trait]
    impl PartitionStore for RecordingStore {
        async fn ensure_partition(&self, _key: PartitionKey) -> Result<(), StorageError> {
            Ok(())
        }

        async fn append(&self, key: PartitionKey, samples: &[Sample]) -> Result<(), StorageError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(StorageError::Closed);
            }
            if self.fail_appends {
                return Err(StorageError::Internal("read-only".to_string()));
            }
            self.appends.lock().unwrap().push((key, samples.to_vec()));
            Ok(())
        }

        async fn list_partitions(&self) -> Result<Vec<PartitionKey>, StorageError> {
            Ok(vec![])
        }

        async fn partition_exists(&self, _key: PartitionKey) -> Result<bool, StorageError> {
            Ok(false)
        }

        async fn read_all(&self, _key: PartitionKey) -> Result<Option<Vec<Sample>>, StorageError> {
            Ok(None)
        }

        async fn read_latencies(
            &self,
            _key: PartitionKey,
        ) -> Result<Option<Vec<Milliseconds>>, StorageError> {
            Ok(None)
        }

        async fn count_timeouts(&self, _key: PartitionKey) -> Result<Option<u64>, StorageError> {
            Ok(None)
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Order in which drain steps observed each other.
    type Events = Arc<Mutex<Vec<&'static str>>>;

    enum End {
        Exhausted,
        Exit,
        Hang,
    }

    struct ScriptedSource {
        lines: VecDeque<String>,
        end: End,
        events: Events,
    }

    #[async_trait::async_trait]
    impl LineSource for ScriptedSource {
        async fn next_line(&mut self) -> Result<Option<String>, CollectorError> {
            if let Some(line) = self.lines.pop_front() {
                return Ok(Some(line));
            }
            match self.end {
                End::Exhausted => Ok(None),
                End::Exit => Err(CollectorError::ProbeExited("exit status: 1".to_string())),
                End::Hang => std::future::pending().await,
            }
        }

        async fn terminate(&mut self) -> Result<(), CollectorError> {
            self.events.lock().unwrap().push("terminate");
            Ok(())
        }
    }

    struct ScriptedProber {
        lines: Mutex<Option<Vec<String>>>,
        end: fn() -> End,
        spawn_fails: bool,
        events: Events,
    }

    impl ScriptedProber {
        fn new(lines: &[&str], end: fn() -> End) -> Self {
            Self {
                lines: Mutex::new(Some(lines.iter().map(|l| l.to_string()).collect())),
                end,
                spawn_fails: false,
                events: Events::default(),
            }
        }
    }

    impl Prober for ScriptedProber {
        type Source = ScriptedSource;

        fn launch(&self) -> Result<ScriptedSource, CollectorError> {
            if self.spawn_fails {
                return Err(CollectorError::Spawn {
                    program: "ping".to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            let lines = self.lines.lock().unwrap().take().unwrap_or_default();
            Ok(ScriptedSource {
                lines: lines.into(),
                end: (self.end)(),
                events: Arc::clone(&self.events),
            })
        }

        fn target(&self) -> &str {
            "scripted"
        }
    }

    struct FixedClock(NaiveDateTime);

    impl Clock for FixedClock {
        fn now(&self) -> NaiveDateTime {
            self.0
        }
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 9, 30)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn reply(ms: u64) -> String {
        format!("Reply from 142.250.1.1: bytes=32 time={ms}ms TTL=117")
    }

    fn controller(
        prober: ScriptedProber,
        store: RecordingStore,
        capacity: usize,
    ) -> SessionController<ScriptedProber, RecordingStore, FixedClock> {
        SessionController::new(prober, store)
            .with_clock(FixedClock(noon()))
            .with_batch(BatchBuffer::new(capacity).with_retry_backoff(std::time::Duration::ZERO))
    }

    #[tokio::test]
    async fn test_classified_sequence_and_drain_flush() {
        let line = reply(14);
        let prober = ScriptedProber::new(
            &[
                "Pinging google.com [142.250.1.1] with 32 bytes of data:",
                &line,
                &line,
                &line,
                "Request timed out.",
            ],
            || End::Exhausted,
        );
        let mut session = controller(prober, RecordingStore::default(), 10);

        let summary = session.run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.outcome, SessionOutcome::StreamEnded);
        assert_eq!(summary.stats.lines, 5);
        assert_eq!(summary.stats.ignored, 1);
        assert_eq!(summary.stats.replies, 3);
        assert_eq!(summary.stats.timeouts, 1);
        assert_eq!(summary.stats.flushes, 1);

        let appends = session.store().appends.lock().unwrap().clone();
        assert_eq!(appends.len(), 1);
        let latencies: Vec<_> = appends[0].1.iter().map(|s| s.latency).collect();
        assert_eq!(latencies, vec![Some(14), Some(14), Some(14), None]);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.store().closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_automatic_flushes_then_drain() {
        let lines: Vec<String> = (0..25).map(reply).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let prober = ScriptedProber::new(&refs, || End::Exhausted);
        let mut session = controller(prober, RecordingStore::default(), 10);

        let summary = session.run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.stats.flushes, 3);
        assert_eq!(summary.stats.samples_flushed, 25);

        let sizes: Vec<usize> = session
            .store()
            .appends
            .lock()
            .unwrap()
            .iter()
            .map(|(_, s)| s.len())
            .collect();
        assert_eq!(sizes, vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn test_cancellation_drains_in_order() {
        let line = reply(20);
        let prober = ScriptedProber::new(&[&line, &line], || End::Hang);
        let events = Arc::clone(&prober.events);
        let mut session = controller(prober, RecordingStore::default(), 10);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let summary = session.run(cancel).await.unwrap();
        assert_eq!(summary.outcome, SessionOutcome::Interrupted);
        assert!(summary.outcome.is_clean());

        // Drain flushed before the probe was terminated and the store closed.
        let appends = session.store().appends.lock().unwrap().clone();
        assert_eq!(appends.len(), 1);
        assert_eq!(appends[0].1.len(), 2);
        assert_eq!(*events.lock().unwrap(), vec!["terminate"]);
        assert!(session.store().closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unexpected_exit_is_reported_after_drain() {
        let line = reply(7);
        let prober = ScriptedProber::new(&[&line], || End::Exit);
        let mut session = controller(prober, RecordingStore::default(), 10);

        let summary = session.run(CancellationToken::new()).await.unwrap();
        assert!(matches!(summary.outcome, SessionOutcome::ProbeExited(_)));
        assert!(!summary.outcome.is_clean());
        assert_eq!(session.store().appends.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_spawn_failure_never_probes() {
        let mut prober = ScriptedProber::new(&[], || End::Exhausted);
        prober.spawn_fails = true;
        let mut session = controller(prober, RecordingStore::default(), 10);

        let err = session.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SessionError::Spawn(_)));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.store().closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_fatal_flush_stops_probing() {
        let lines: Vec<String> = (0..5).map(reply).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let prober = ScriptedProber::new(&refs, || End::Hang);
        let store = RecordingStore {
            fail_appends: true,
            ..Default::default()
        };
        let mut session = controller(prober, store, 2);

        // Would hang forever if a fatal flush did not end the session.
        let summary = session.run(CancellationToken::new()).await.unwrap();
        assert!(matches!(summary.outcome, SessionOutcome::FlushFailed(_)));
        assert_eq!(summary.unflushed, 2);
        assert_eq!(summary.stats.lines, 2);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_closed_session_rejects_run() {
        let prober = ScriptedProber::new(&[], || End::Exhausted);
        let mut session = controller(prober, RecordingStore::default(), 10);

        session.run(CancellationToken::new()).await.unwrap();
        let err = session.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(SessionState::Closed)));
    }

    #[tokio::test]
    async fn test_session_log_written_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let line = reply(14);
        let prober = ScriptedProber::new(&[&line, "Request timed out."], || End::Exhausted);
        let mut session = controller(prober, RecordingStore::default(), 10)
            .with_session_log(SessionLog::new(dir.path()));

        let summary = session.run(CancellationToken::new()).await.unwrap();
        let path = summary.log_path.unwrap();
        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents, "[12:00:00] 14ms\n[12:00:00] Request timeout.\n");
        assert_eq!(session.displayed_lines().len(), 2);
    }

    #[tokio::test]
    async fn test_disabled_log_keeps_no_lines() {
        let lines: Vec<String> = (0..1000).map(reply).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let prober = ScriptedProber::new(&refs, || End::Exhausted);
        let mut session = controller(prober, RecordingStore::default(), 10);

        let summary = session.run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.outcome, SessionOutcome::StreamEnded);
        assert_eq!(summary.stats.replies, 1000);
        assert!(summary.log_path.is_none());
        assert!(session.displayed_lines().is_empty());
    }
}
