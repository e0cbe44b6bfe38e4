//! Database liveness probe.
//!
//! Two stages, reported as distinct failure categories: a transport check
//! (can we open a TCP socket to the server at all) and a protocol handshake
//! (does mysqld answer a ping with these credentials). Only the handshake is
//! retried, with exponential backoff rooted at the configured base delay and
//! no jitter.
//!
//! A probe that exhausts its retries is a normal, reportable result — it
//! never aborts the invocation.

use crate::config::DatabaseConfig;
use crate::errors::MonitorError;
use crate::state::{LastErrorSnapshot, StateDir};
use crate::sys::{CommandError, CommandRunner};
use anyhow::Result;
use chrono::Utc;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// Failure category carried in alerts and the last-error snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Socket to host:port could not be opened.
    Transport,
    /// Socket opened but the protocol handshake failed.
    Handshake,
}

/// Outcome of one probe sequence. `attempt_count` is 1-based.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub success: bool,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub failure_kind: Option<FailureKind>,
    pub latency_ms: u64,
}

/// One handshake attempt. `Refused` is retryable; infrastructural problems
/// (mysql client not installed) surface as a fatal `Err` instead.
pub enum HandshakeStatus {
    Ok,
    Refused(String),
}

pub trait Handshake {
    fn connect(&self) -> Result<HandshakeStatus>;
}

/// Delay before attempt N+1: `base * 2^(N-1)` seconds.
pub fn backoff_delay(attempt: u32, base_secs: u64) -> Duration {
    let multiplier = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_secs(base_secs.saturating_mul(multiplier))
}

/// Open and close a socket against the database endpoint, returning the
/// connect latency in milliseconds.
pub fn transport_check(host: &str, port: u16, timeout: Duration) -> Result<u64, String> {
    let started = Instant::now();
    let addrs: Vec<_> = (host, port)
        .to_socket_addrs()
        .map_err(|e| format!("cannot resolve {host}:{port}: {e}"))?
        .collect();
    let addr = addrs
        .first()
        .ok_or_else(|| format!("no addresses for {host}:{port}"))?;
    TcpStream::connect_timeout(addr, timeout)
        .map_err(|e| format!("cannot reach {host}:{port}: {e}"))?;
    Ok(started.elapsed().as_millis() as u64)
}

/// Production handshake: `mysqladmin ping` through the command runner.
pub struct MysqlPing<'a> {
    pub runner: &'a dyn CommandRunner,
    pub db: &'a DatabaseConfig,
}

impl Handshake for MysqlPing<'_> {
    fn connect(&self) -> Result<HandshakeStatus> {
        let port = self.db.port.to_string();
        let password = format!("--password={}", self.db.password);
        let mut args = vec![
            "--connect-timeout=5",
            "-h",
            self.db.host.as_str(),
            "-P",
            port.as_str(),
            "-u",
            self.db.user.as_str(),
        ];
        if !self.db.password.is_empty() {
            args.push(password.as_str());
        }
        args.push("ping");

        match self.runner.run("mysqladmin", &args) {
            Ok(out) if out.success && out.stdout.contains("mysqld is alive") => {
                Ok(HandshakeStatus::Ok)
            }
            Ok(out) => {
                let detail = if out.stderr.trim().is_empty() {
                    out.stdout.trim().to_string()
                } else {
                    out.stderr.trim().to_string()
                };
                Ok(HandshakeStatus::Refused(detail))
            }
            Err(CommandError::Timeout(_, d)) => Ok(HandshakeStatus::Refused(format!(
                "handshake timed out after {d:?}"
            ))),
            Err(CommandError::NotFound(tool)) => {
                Err(MonitorError::Dependency(format!("{tool} is not installed")).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Run the full probe sequence: transport once, then handshake with retries.
///
/// `sleep` is injected so tests can record the backoff schedule instead of
/// waiting it out. With `max_retries` of 1 the handshake runs exactly once
/// and `sleep` is never called.
pub fn run_probe(
    host: &str,
    port: u16,
    handshake: &dyn Handshake,
    max_retries: u32,
    retry_delay_secs: u64,
    connect_timeout: Duration,
    sleep: &mut dyn FnMut(Duration),
) -> Result<ProbeResult> {
    let latency_ms = match transport_check(host, port, connect_timeout) {
        Ok(ms) => ms,
        Err(e) => {
            return Ok(ProbeResult {
                success: false,
                attempt_count: 1,
                last_error: Some(e),
                failure_kind: Some(FailureKind::Transport),
                latency_ms: connect_timeout.as_millis() as u64,
            });
        }
    };

    let max_retries = max_retries.max(1);
    let mut last_error = String::new();
    for attempt in 1..=max_retries {
        match handshake.connect()? {
            HandshakeStatus::Ok => {
                return Ok(ProbeResult {
                    success: true,
                    attempt_count: attempt,
                    last_error: None,
                    failure_kind: None,
                    latency_ms,
                });
            }
            HandshakeStatus::Refused(detail) => {
                tracing::debug!(attempt, "handshake refused: {detail}");
                last_error = detail;
                if attempt < max_retries {
                    sleep(backoff_delay(attempt, retry_delay_secs));
                }
            }
        }
    }

    Ok(ProbeResult {
        success: false,
        attempt_count: max_retries,
        last_error: Some(last_error),
        failure_kind: Some(FailureKind::Handshake),
        latency_ms,
    })
}

/// Keep the last-error snapshot in sync with the probe outcome: a failure
/// overwrites it, a success deletes it.
pub fn record_outcome(
    state: &StateDir,
    site: &str,
    server_ip: &str,
    result: &ProbeResult,
) -> Result<()> {
    if result.success {
        state.clear_last_error()
    } else {
        state.write_last_error(&LastErrorSnapshot {
            site: site.to_string(),
            ip: server_ip.to_string(),
            time: Utc::now(),
            error: result
                .last_error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()),
            attempts: result.attempt_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct ScriptedHandshake {
        // One entry per attempt: Ok(()) or Err(message).
        outcomes: RefCell<Vec<std::result::Result<(), String>>>,
    }

    impl ScriptedHandshake {
        fn new(outcomes: Vec<std::result::Result<(), String>>) -> Self {
            Self {
                outcomes: RefCell::new(outcomes),
            }
        }
    }

    impl Handshake for ScriptedHandshake {
        fn connect(&self) -> Result<HandshakeStatus> {
            match self.outcomes.borrow_mut().remove(0) {
                Ok(()) => Ok(HandshakeStatus::Ok),
                Err(e) => Ok(HandshakeStatus::Refused(e)),
            }
        }
    }

    fn probe_local(
        handshake: &dyn Handshake,
        max_retries: u32,
        sleeps: &mut Vec<Duration>,
    ) -> ProbeResult {
        // Bind a listener so the transport stage always passes.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut sleep = |d: Duration| sleeps.push(d);
        run_probe(
            "127.0.0.1",
            port,
            handshake,
            max_retries,
            5,
            Duration::from_secs(1),
            &mut sleep,
        )
        .unwrap()
    }

    #[test]
    fn backoff_doubles_from_base() {
        assert_eq!(backoff_delay(1, 5), Duration::from_secs(5));
        assert_eq!(backoff_delay(2, 5), Duration::from_secs(10));
        assert_eq!(backoff_delay(3, 5), Duration::from_secs(20));
        assert_eq!(backoff_delay(4, 5), Duration::from_secs(40));
    }

    #[test]
    fn success_on_first_attempt() {
        let handshake = ScriptedHandshake::new(vec![Ok(())]);
        let mut sleeps = Vec::new();
        let result = probe_local(&handshake, 3, &mut sleeps);
        assert!(result.success);
        assert_eq!(result.attempt_count, 1);
        assert!(sleeps.is_empty());
    }

    #[test]
    fn retries_with_exponential_backoff() {
        let handshake = ScriptedHandshake::new(vec![
            Err("refused".into()),
            Err("refused".into()),
            Ok(()),
        ]);
        let mut sleeps = Vec::new();
        let result = probe_local(&handshake, 3, &mut sleeps);
        assert!(result.success);
        assert_eq!(result.attempt_count, 3);
        assert_eq!(
            sleeps,
            vec![Duration::from_secs(5), Duration::from_secs(10)]
        );
    }

    #[test]
    fn exhaustion_reports_final_error_and_no_trailing_sleep() {
        let handshake = ScriptedHandshake::new(vec![
            Err("first".into()),
            Err("second".into()),
            Err("final".into()),
        ]);
        let mut sleeps = Vec::new();
        let result = probe_local(&handshake, 3, &mut sleeps);
        assert!(!result.success);
        assert_eq!(result.attempt_count, 3);
        assert_eq!(result.last_error.as_deref(), Some("final"));
        assert_eq!(result.failure_kind, Some(FailureKind::Handshake));
        // Two sleeps for three attempts: none after the last.
        assert_eq!(sleeps.len(), 2);
    }

    #[test]
    fn single_retry_never_sleeps() {
        let handshake = ScriptedHandshake::new(vec![Err("down".into())]);
        let mut sleeps = Vec::new();
        let result = probe_local(&handshake, 1, &mut sleeps);
        assert!(!result.success);
        assert_eq!(result.attempt_count, 1);
        assert!(sleeps.is_empty());
    }

    #[test]
    fn transport_failure_is_its_own_category() {
        // Grab a port, then close the listener so the connect is refused.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let handshake = ScriptedHandshake::new(vec![]);
        let mut sleep = |_d: Duration| panic!("transport failure must not retry");
        let result = run_probe(
            "127.0.0.1",
            port,
            &handshake,
            3,
            5,
            Duration::from_secs(1),
            &mut sleep,
        )
        .unwrap();
        assert!(!result.success);
        assert_eq!(result.failure_kind, Some(FailureKind::Transport));
        assert_eq!(result.attempt_count, 1);
    }

    #[test]
    fn record_outcome_writes_and_clears_snapshot() {
        let temp = tempfile::tempdir().unwrap();
        let state = StateDir::new(temp.path().join("state")).unwrap();

        let failed = ProbeResult {
            success: false,
            attempt_count: 3,
            last_error: Some("connection refused".into()),
            failure_kind: Some(FailureKind::Handshake),
            latency_ms: 12,
        };
        record_outcome(&state, "example.com", "203.0.113.7", &failed).unwrap();
        let snap = state.read_last_error().unwrap().unwrap();
        assert_eq!(snap.attempts, 3);
        assert_eq!(snap.error, "connection refused");

        let ok = ProbeResult {
            success: true,
            attempt_count: 1,
            last_error: None,
            failure_kind: None,
            latency_ms: 3,
        };
        record_outcome(&state, "example.com", "203.0.113.7", &ok).unwrap();
        assert!(state.read_last_error().unwrap().is_none());
    }
}
