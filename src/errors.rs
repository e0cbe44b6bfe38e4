//! Top-level error taxonomy for db-sentinel.
//!
//! Fatal conditions carry a distinct process exit code so cron wrappers and
//! alerting rules can tell lock contention apart from misconfiguration.
//! Everything else surfaces as a generic error (exit 1) through anyhow.

use std::path::PathBuf;
use thiserror::Error;

/// Exit code for unclassified failures.
pub const EXIT_GENERIC: u8 = 1;
/// Exit code when another invocation already holds the instance lock.
pub const EXIT_LOCK_HELD: u8 = 2;
/// Exit code for configuration/environment errors.
pub const EXIT_CONFIG: u8 = 3;
/// Exit code when the host cannot support the monitor (no /proc, non-unix).
pub const EXIT_UNSUPPORTED: u8 = 4;
/// Exit code when a required external tool is missing.
pub const EXIT_DEPENDENCY: u8 = 5;

/// Fatal error categories that abort an invocation.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("another instance is already running (lockfile: {path})")]
    LockHeld { path: PathBuf },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported host: {0}")]
    UnsupportedHost(String),

    #[error("dependency error: {0}")]
    Dependency(String),
}

impl MonitorError {
    /// Process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self {
            MonitorError::LockHeld { .. } => EXIT_LOCK_HELD,
            MonitorError::Config(_) => EXIT_CONFIG,
            MonitorError::UnsupportedHost(_) => EXIT_UNSUPPORTED,
            MonitorError::Dependency(_) => EXIT_DEPENDENCY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let errors = [
            MonitorError::LockHeld {
                path: PathBuf::from("/tmp/x.lock"),
            },
            MonitorError::Config("bad".into()),
            MonitorError::UnsupportedHost("no /proc".into()),
            MonitorError::Dependency("mysqladmin".into()),
        ];
        let codes: Vec<u8> = errors.iter().map(|e| e.exit_code()).collect();
        assert_eq!(codes, vec![2, 3, 4, 5]);
    }
}
