// Copyright (c) 2026 Omen Fan Utility Contributors
// Licensed under the MIT License

//! Best-effort diagnostic journal.
//!
//! Plain-text, append-only, one `[YYYY-MM-DD HH:MM:SS] <message>` line per
//! event. Write failures are swallowed: losing a log line must never
//! interrupt fan control.

use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Default diagnostic log location.
pub const DEFAULT_LOG_PATH: &str = "/tmp/omen-fand.log";

#[derive(Debug, Clone)]
pub struct DiagLog {
    path: PathBuf,
    enabled: bool,
}

impl DiagLog {
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            path: path.into(),
            enabled,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped line. Does nothing when logging is disabled;
    /// ignores I/O failures.
    pub fn log(&self, message: &str) {
        if !self.enabled {
            return;
        }
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("[{timestamp}] {message}\n");
        let _ = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
    }

    /// Delete the log file, ignoring failures. Called at startup to drop a
    /// stale journal and again on shutdown.
    pub fn remove(&self) {
        let _ = fs::remove_file(&self.path);
    }
}
