// Copyright (c) 2026 Omen Fan Utility Contributors
// Licensed under the MIT License

//! Process lifecycle: privilege check and the PID marker file.
//!
//! The marker file lets external tooling find (and signal) a running
//! daemon. The daemon itself does not refuse to start if a marker is
//! already present; a single instance is assumed.

use nix::unistd::Uid;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default PID marker file location.
pub const DEFAULT_PID_PATH: &str = "/tmp/omen-fand.PID";

/// EC access needs root. Refuse to run otherwise.
pub fn ensure_root() -> Result<(), String> {
    if Uid::effective().is_root() {
        Ok(())
    } else {
        Err("Root access is required for EC fan control".to_string())
    }
}

/// PID marker file, removed when dropped.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write the current process id to `path`.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        fs::write(&path, std::process::id().to_string())?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Failed to remove PID file {}: {e}", self.path.display());
        }
    }
}
