//! Operator run log and process diagnostics.
//!
//! Two layers, deliberately separate: `tracing` goes to stderr for whoever is
//! watching the cron mail or journal, while [`RunLog`] appends the permanent
//! timestamped history that `db-sentinel status` and operators read after an
//! incident. Run-log appends take an exclusive advisory lock so overlapping
//! writers (the alert sink logs too) cannot interleave partial lines.

use crate::state::locking::locked_append;
use chrono::Local;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Append-only operator log. Cheap to clone; every handle points at the
/// same file and serializes through the advisory lock.
#[derive(Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append a timestamped line. Best-effort: a failing log write must never
    /// take down the monitoring run itself.
    pub fn log(&self, message: &str) {
        let line = format!("[{}] {message}\n", Local::now().format("%Y-%m-%d %H:%M:%S"));
        if let Err(e) = locked_append(&self.path, &line) {
            tracing::warn!("run log append failed: {e:#}");
        }
    }
}

/// Install the stderr diagnostics subscriber.
///
/// Filter comes from `DB_SENTINEL_LOG` (env-filter syntax), defaulting to
/// `warn` so cron output stays quiet on healthy runs. Safe to call more than
/// once; later calls are no-ops.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("DB_SENTINEL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
