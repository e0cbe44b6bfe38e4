//! Persistent state across cron invocations.
//!
//! Everything the monitor remembers between runs lives in one directory:
//!
//! - `monitor.log` — operator run log (see [`crate::logging::RunLog`])
//! - `restart-history.log` — one RFC 3339 timestamp per restart, append-only
//! - `last-restart.json` — marker for the most recent restart action
//! - `last-error.json` — snapshot of the most recent probe failure
//! - `config-hashes.json` — watched-file basename → content digest
//! - `ssh-scan-state.json` — watermark for the auth-log scan window
//!
//! The restart marker is an explicit stored timestamp, not file mtime, so the
//! recovery window survives backup tools and copies that touch metadata.

pub mod lock;
pub mod locking;

pub use lock::ProcessLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Snapshot of the most recent probe failure. Overwritten on each new
/// failure, deleted when a probe succeeds again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastErrorSnapshot {
    pub site: String,
    pub ip: String,
    pub time: DateTime<Utc>,
    pub error: String,
    pub attempts: u32,
}

/// Marker written when a restart action was taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartMarker {
    pub restarted_at: DateTime<Utc>,
}

/// Watermark for the SSH auth-log scan window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshScanState {
    pub last_scanned: DateTime<Utc>,
}

/// Handle to the state directory. Creating it ensures the directory exists.
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create state directory: {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_log_path(&self) -> PathBuf {
        self.root.join("monitor.log")
    }

    fn restart_history_path(&self) -> PathBuf {
        self.root.join("restart-history.log")
    }

    fn restart_marker_path(&self) -> PathBuf {
        self.root.join("last-restart.json")
    }

    fn last_error_path(&self) -> PathBuf {
        self.root.join("last-error.json")
    }

    fn config_hashes_path(&self) -> PathBuf {
        self.root.join("config-hashes.json")
    }

    fn ssh_scan_path(&self) -> PathBuf {
        self.root.join("ssh-scan-state.json")
    }

    // --- restart history ---------------------------------------------------

    /// Append one restart record. Records are never rewritten, only scanned.
    pub fn append_restart_record(&self, at: DateTime<Utc>) -> Result<()> {
        locking::locked_append(&self.restart_history_path(), &format!("{}\n", at.to_rfc3339()))
    }

    /// Load all restart timestamps. Missing file means no restarts yet.
    /// Malformed lines are skipped; a corrupt history must not stop the
    /// rate limiter from seeing the valid records around it.
    pub fn load_restart_times(&self) -> Result<Vec<DateTime<Utc>>> {
        let path = self.restart_history_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = locking::locked_read(&path)?;
        Ok(content
            .lines()
            .filter_map(|line| {
                DateTime::parse_from_rfc3339(line.trim())
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| {
                        tracing::warn!("skipping malformed restart record {line:?}: {e}");
                        e
                    })
                    .ok()
            })
            .collect())
    }

    // --- restart marker ----------------------------------------------------

    pub fn write_restart_marker(&self, at: DateTime<Utc>) -> Result<()> {
        self.write_json(&self.restart_marker_path(), &RestartMarker { restarted_at: at })
    }

    pub fn read_restart_marker(&self) -> Result<Option<RestartMarker>> {
        self.read_json(&self.restart_marker_path())
    }

    pub fn clear_restart_marker(&self) -> Result<()> {
        self.remove(&self.restart_marker_path())
    }

    // --- last-error snapshot -----------------------------------------------

    pub fn write_last_error(&self, snapshot: &LastErrorSnapshot) -> Result<()> {
        self.write_json(&self.last_error_path(), snapshot)
    }

    pub fn read_last_error(&self) -> Result<Option<LastErrorSnapshot>> {
        self.read_json(&self.last_error_path())
    }

    pub fn clear_last_error(&self) -> Result<()> {
        self.remove(&self.last_error_path())
    }

    // --- config hashes -----------------------------------------------------

    /// Missing file means first observation for every watched file.
    pub fn read_config_hashes(&self) -> Result<HashMap<String, String>> {
        Ok(self.read_json(&self.config_hashes_path())?.unwrap_or_default())
    }

    pub fn write_config_hashes(&self, hashes: &HashMap<String, String>) -> Result<()> {
        self.write_json(&self.config_hashes_path(), hashes)
    }

    // --- ssh scan watermark ------------------------------------------------

    pub fn read_ssh_scan(&self) -> Result<Option<SshScanState>> {
        self.read_json(&self.ssh_scan_path())
    }

    pub fn write_ssh_scan(&self, last_scanned: DateTime<Utc>) -> Result<()> {
        self.write_json(&self.ssh_scan_path(), &SshScanState { last_scanned })
    }

    // --- helpers -----------------------------------------------------------

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)
            .with_context(|| format!("Failed to serialize state for {}", path.display()))?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write state file: {}", path.display()))
    }

    fn read_json<T: for<'de> Deserialize<'de>>(&self, path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
        Ok(Some(value))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path)
                .with_context(|| format!("Failed to delete state file: {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn state() -> (tempfile::TempDir, StateDir) {
        let temp = tempfile::tempdir().unwrap();
        let state = StateDir::new(temp.path().join("state")).unwrap();
        (temp, state)
    }

    #[test]
    fn restart_history_roundtrip() {
        let (_temp, state) = state();
        let now = Utc::now();

        state.append_restart_record(now - Duration::seconds(30)).unwrap();
        state.append_restart_record(now).unwrap();

        let times = state.load_restart_times().unwrap();
        assert_eq!(times.len(), 2);
        assert!(times[0] < times[1]);
    }

    #[test]
    fn restart_history_skips_malformed_lines() {
        let (_temp, state) = state();
        state.append_restart_record(Utc::now()).unwrap();
        locking::locked_append(&state.restart_history_path(), "not a timestamp\n").unwrap();
        state.append_restart_record(Utc::now()).unwrap();

        assert_eq!(state.load_restart_times().unwrap().len(), 2);
    }

    #[test]
    fn missing_history_is_empty() {
        let (_temp, state) = state();
        assert!(state.load_restart_times().unwrap().is_empty());
    }

    #[test]
    fn last_error_write_read_clear() {
        let (_temp, state) = state();
        assert!(state.read_last_error().unwrap().is_none());

        let snapshot = LastErrorSnapshot {
            site: "example.com".into(),
            ip: "203.0.113.7".into(),
            time: Utc::now(),
            error: "connection refused".into(),
            attempts: 3,
        };
        state.write_last_error(&snapshot).unwrap();

        let loaded = state.read_last_error().unwrap().unwrap();
        assert_eq!(loaded.site, "example.com");
        assert_eq!(loaded.attempts, 3);

        state.clear_last_error().unwrap();
        assert!(state.read_last_error().unwrap().is_none());
    }

    #[test]
    fn clear_is_idempotent() {
        let (_temp, state) = state();
        state.clear_last_error().unwrap();
        state.clear_restart_marker().unwrap();
    }

    #[test]
    fn config_hashes_default_empty() {
        let (_temp, state) = state();
        assert!(state.read_config_hashes().unwrap().is_empty());

        let mut hashes = HashMap::new();
        hashes.insert("my.cnf".to_string(), "abc123".to_string());
        state.write_config_hashes(&hashes).unwrap();

        assert_eq!(
            state.read_config_hashes().unwrap().get("my.cnf").unwrap(),
            "abc123"
        );
    }

    #[test]
    fn restart_marker_roundtrip() {
        let (_temp, state) = state();
        let at = Utc::now();
        state.write_restart_marker(at).unwrap();
        let marker = state.read_restart_marker().unwrap().unwrap();
        assert_eq!(marker.restarted_at.timestamp(), at.timestamp());

        state.clear_restart_marker().unwrap();
        assert!(state.read_restart_marker().unwrap().is_none());
    }
}
