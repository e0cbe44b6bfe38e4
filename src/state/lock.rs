//! Single-instance process lock.
//!
//! Cron has no idea whether the previous invocation finished; the monitor
//! itself enforces mutual exclusion with a non-blocking exclusive lock on a
//! fixed lockfile. Contention is fail-fast: the losing invocation exits with
//! its own code before touching any state.

use crate::errors::MonitorError;
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Held for the lifetime of an invocation. The kernel releases the advisory
/// lock on any process exit, so a crash cannot wedge future runs; `Drop`
/// releases it early on the normal path.
#[derive(Debug)]
pub struct ProcessLock {
    file: File,
    path: PathBuf,
}

impl ProcessLock {
    /// Try to take the instance lock. Returns [`MonitorError::LockHeld`]
    /// (inside the anyhow chain) when another invocation owns it.
    pub fn acquire(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open lockfile: {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            return Err(MonitorError::LockHeld {
                path: path.to_path_buf(),
            }
            .into());
        }

        // Record the owner pid for operators inspecting a stuck lockfile.
        file.set_len(0)
            .with_context(|| format!("Failed to truncate lockfile: {}", path.display()))?;
        write!(file, "{}", std::process::id())
            .with_context(|| format!("Failed to write pid to lockfile: {}", path.display()))?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_writes_pid() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("sentinel.lock");

        let lock = ProcessLock::acquire(&path).unwrap();
        let content = std::fs::read_to_string(lock.path()).unwrap();
        assert_eq!(content, std::process::id().to_string());
    }

    #[test]
    fn second_acquire_fails_while_held() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("sentinel.lock");

        let _held = ProcessLock::acquire(&path).unwrap();
        let err = ProcessLock::acquire(&path).unwrap_err();
        let monitor_err = err.downcast_ref::<MonitorError>().unwrap();
        assert_eq!(monitor_err.exit_code(), crate::errors::EXIT_LOCK_HELD);
    }

    #[test]
    fn lock_is_reacquirable_after_drop() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("sentinel.lock");

        drop(ProcessLock::acquire(&path).unwrap());
        assert!(ProcessLock::acquire(&path).is_ok());
    }
}
