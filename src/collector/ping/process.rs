//! External `ping` process supervisor.
//!
//! Runs one continuous `ping` against the configured host and exposes its
//! standard output as a [`LineSource`].

use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};

use crate::collector::{CollectorError, LineSource, Prober};

/// Default probe target.
pub const DEFAULT_HOST: &str = "google.com";

/// Default probe executable.
pub const DEFAULT_PROGRAM: &str = "ping";

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_program() -> String {
    DEFAULT_PROGRAM.to_string()
}

/// Configuration for the external ping probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingConfig {
    /// Target host (hostname or IP address).
    #[serde(default = "default_host")]
    pub host: String,
    /// Executable to run (default: "ping").
    #[serde(default = "default_program")]
    pub program: String,
    /// Full argument list. When unset, a continuous-mode argument list for
    /// the current platform is derived from `host`.
    #[serde(default)]
    pub args: Option<Vec<String>>,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST)
    }
}

impl PingConfig {
    /// Create a new ping probe configuration.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            program: default_program(),
            args: None,
        }
    }

    /// Set the probe executable.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Set an explicit argument list.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Arguments passed to the probe executable.
    pub fn command_args(&self) -> Vec<String> {
        match &self.args {
            Some(args) => args.clone(),
            // Windows pings four times unless told to run until stopped.
            None if cfg!(windows) => vec!["-t".to_string(), self.host.clone()],
            // -O reports requests that got no answer before the next one is sent.
            None => vec!["-O".to_string(), self.host.clone()],
        }
    }
}

/// [`Prober`] that spawns the configured `ping` command.
#[derive(Debug, Clone)]
pub struct PingProber {
    config: PingConfig,
}

impl PingProber {
    pub fn new(config: PingConfig) -> Self {
        Self { config }
    }
}

impl Prober for PingProber {
    type Source = PingProcess;

    fn launch(&self) -> Result<PingProcess, CollectorError> {
        let args = self.config.command_args();
        let mut child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CollectorError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            CollectorError::Io(std::io::Error::other("probe stdout was not captured"))
        })?;

        tracing::info!(
            program = %self.config.program,
            args = ?args,
            pid = child.id(),
            "Probe process started"
        );

        Ok(PingProcess {
            child,
            reader: BufReader::new(stdout),
            buf: Vec::new(),
            finished: false,
        })
    }

    fn target(&self) -> &str {
        &self.config.host
    }
}

/// A running `ping` process.
///
/// The child is spawned with kill-on-drop, so the process never outlives
/// this handle even if [`LineSource::terminate`] is never reached.
pub struct PingProcess {
    child: Child,
    reader: BufReader<ChildStdout>,
    // Partial line carried across cancelled reads.
    buf: Vec<u8>,
    finished: bool,
}

impl std::fmt::Debug for PingProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PingProcess")
            .field("pid", &self.child.id())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl LineSource for PingProcess {
    async fn next_line(&mut self) -> Result<Option<String>, CollectorError> {
        if self.finished {
            return Ok(None);
        }

        // read_until is cancel safe as long as the same buffer is reused.
        let n = self.reader.read_until(b'\n', &mut self.buf).await?;
        if n == 0 && self.buf.is_empty() {
            self.finished = true;
            let status = self.child.wait().await?;
            tracing::warn!(%status, "Probe process exited");
            return Err(CollectorError::ProbeExited(status.to_string()));
        }

        // Console code pages are not always UTF-8.
        let line = String::from_utf8_lossy(&self.buf)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        self.buf.clear();
        Ok(Some(line))
    }

    async fn terminate(&mut self) -> Result<(), CollectorError> {
        self.finished = true;
        match self.child.try_wait()? {
            Some(status) => {
                tracing::debug!(%status, "Probe process already exited");
            }
            None => {
                self.child.start_kill()?;
                let status = self.child.wait().await?;
                tracing::info!(%status, "Probe process terminated");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_config_defaults() {
        let config = PingConfig::default();
        assert_eq!(config.host, "google.com");
        assert_eq!(config.program, "ping");
        assert!(config.args.is_none());

        let args = config.command_args();
        assert_eq!(args.last().map(String::as_str), Some("google.com"));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_ping_config_explicit_args() {
        let config = PingConfig::new("1.1.1.1")
            .with_program("ping6")
            .with_args(["-n", "-O", "1.1.1.1"]);
        assert_eq!(config.program, "ping6");
        assert_eq!(config.command_args(), vec!["-n", "-O", "1.1.1.1"]);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let prober = PingProber::new(
            PingConfig::new("localhost").with_program("pinglog-no-such-binary-xyz"),
        );
        let err = prober.launch().unwrap_err();
        assert!(matches!(err, CollectorError::Spawn { .. }));
        assert!(err.to_string().contains("pinglog-no-such-binary-xyz"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_lines_then_unexpected_exit() {
        let prober = PingProber::new(
            PingConfig::new("unused")
                .with_program("sh")
                .with_args(["-c", "printf 'Reply from x: time=5ms\\r\\nRequest timed out.\\n'"]),
        );
        let mut process = prober.launch().unwrap();

        assert_eq!(
            process.next_line().await.unwrap().as_deref(),
            Some("Reply from x: time=5ms")
        );
        assert_eq!(
            process.next_line().await.unwrap().as_deref(),
            Some("Request timed out.")
        );
        let err = process.next_line().await.unwrap_err();
        assert!(matches!(err, CollectorError::ProbeExited(_)));

        // Exhausted and idempotent afterwards.
        assert!(process.next_line().await.unwrap().is_none());
        process.terminate().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_kills_running_process() {
        let prober = PingProber::new(
            PingConfig::new("unused")
                .with_program("sh")
                .with_args(["-c", "echo started; exec sleep 30"]),
        );
        let mut process = prober.launch().unwrap();
        assert_eq!(process.next_line().await.unwrap().as_deref(), Some("started"));

        process.terminate().await.unwrap();
        assert!(process.child.try_wait().unwrap().is_some());
        process.terminate().await.unwrap();
        assert!(process.next_line().await.unwrap().is_none());
    }
}
