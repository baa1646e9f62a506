//! Plain-text log of the lines shown during a probing session.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

/// Default directory for session logs.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Displayed output lines, written to disk once when the session closes.
#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    dir: Option<PathBuf>,
    lines: Vec<String>,
}

impl SessionLog {
    /// Log into `dir` as `ping_log_YYYYmmdd_HHMMSS.txt`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: Some(dir.as_ref().to_path_buf()),
            lines: Vec::new(),
        }
    }

    /// A log that records and writes nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// Keep `line` for the file written at close. No-op when disabled, so an
    /// unbounded session without logging holds no lines in memory.
    pub fn record(&mut self, line: impl Into<String>) {
        if self.dir.is_some() {
            self.lines.push(line.into());
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// File name used for a session closed at `closed_at`.
    pub fn file_name(closed_at: NaiveDateTime) -> String {
        format!("ping_log_{}.txt", closed_at.format("%Y%m%d_%H%M%S"))
    }

    /// Write all recorded lines. Returns the file written, if logging is enabled.
    pub async fn write(&self, closed_at: NaiveDateTime) -> std::io::Result<Option<PathBuf>> {
        let Some(dir) = &self.dir else {
            return Ok(None);
        };

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(Self::file_name(closed_at));

        let mut contents = String::with_capacity(self.lines.iter().map(|l| l.len() + 1).sum());
        for line in &self.lines {
            contents.push_str(line);
            contents.push('\n');
        }
        tokio::fs::write(&path, contents).await?;

        Ok(Some(path))
    }
}
