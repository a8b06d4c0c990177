//! Single-instance lock.
//!
//! Two relay processes polling the same bot token steal each other's updates
//! and double-reply, so startup takes a pid-file lock in the working
//! directory. A lock naming a dead process is stale and gets overwritten;
//! one naming our own pid (pid reuse after a container restart, notably
//! pid 1) is treated as already owned.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Default lock-file path, relative to the working directory.
pub const LOCK_FILE: &str = ".tele-translate.pid";

#[derive(Debug, Error)]
pub enum PidLockError {
    #[error("another instance is already running (pid {0})")]
    AlreadyRunning(i32),

    #[error("failed to write lock file: {0}")]
    Io(#[from] std::io::Error),
}

/// Filesystem marker owned by this process for its lifetime.
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
    pid: u32,
}

impl PidLock {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, PidLockError> {
        let path = path.into();
        let pid = std::process::id();

        if let Ok(raw) = fs::read_to_string(&path) {
            match raw.trim().parse::<i32>() {
                Ok(existing) if existing == pid as i32 => {
                    debug!(pid, "lock file already names this process, taking over");
                }
                Ok(existing) if process_alive(existing) => {
                    return Err(PidLockError::AlreadyRunning(existing));
                }
                _ => {
                    // Stale or corrupt lock file, overwrite it.
                }
            }
        }

        fs::write(&path, pid.to_string())?;
        Ok(Self { path, pid })
    }

    /// Remove the lock file, but only if it still names this process.
    pub fn release(&self) {
        if let Ok(raw) = fs::read_to_string(&self.path)
            && raw.trim().parse::<u32>() == Ok(self.pid)
        {
            let _ = fs::remove_file(&self.path);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        self.release();
    }
}

fn process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // Signal 0 probes for existence without sending anything.
    unsafe { libc::kill(pid, 0) == 0 }
}
