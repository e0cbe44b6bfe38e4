//! External command execution seam.
//!
//! Every host metric this monitor samples comes from an OS tool (`df`,
//! `systemctl`, `smartctl`, `journalctl`, `fail2ban-client`, the mysql
//! client). All of them go through [`CommandRunner`] so checkers can be
//! tested against a scripted runner instead of a real host, and so one
//! timeout policy bounds every external call — a hung tool must not wedge
//! the whole invocation.

use anyhow::{Context, Result};
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use wait_timeout::ChildExt;

/// How long to wait for pipe readers after the child has exited.
const OUTPUT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one external command. `success` reflects the exit status;
/// callers that only care about stdout (e.g. `systemctl is-active`, which
/// exits non-zero for inactive units) read it either way.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command not found: {0}")]
    NotFound(String),

    #[error("command `{0}` timed out after {1:?}")]
    Timeout(String, Duration),

    #[error("command `{0}` failed to run: {1}")]
    Io(String, #[source] std::io::Error),
}

/// The mockable execution seam.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError>;
}

/// Production runner: resolves the tool on PATH, executes it with piped
/// output, and kills it if it exceeds the configured timeout.
pub struct HostRunner {
    timeout: Duration,
}

impl HostRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for HostRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        // Resolve up front so a missing tool is its own error category —
        // checkers fail open on it instead of alerting.
        which::which(program).map_err(|_| CommandError::NotFound(program.to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CommandError::Io(program.to_string(), e))?;

        let status = child
            .wait_timeout(self.timeout)
            .map_err(|e| CommandError::Io(program.to_string(), e))?;

        match status {
            Some(status) => {
                let (stdout, stderr) = collect_output(&mut child);
                Ok(CommandOutput {
                    success: status.success(),
                    stdout,
                    stderr,
                })
            }
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(CommandError::Timeout(program.to_string(), self.timeout))
            }
        }
    }
}

/// Drain both pipes on reader threads so a chatty child can never deadlock
/// against a full pipe buffer.
fn collect_output(child: &mut std::process::Child) -> (String, String) {
    let (stdout_tx, stdout_rx) = mpsc::channel();
    let (stderr_tx, stderr_rx) = mpsc::channel();

    if let Some(mut stdout) = child.stdout.take() {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = stdout.read_to_string(&mut buf);
            let _ = stdout_tx.send(buf);
        });
    } else {
        let _ = stdout_tx.send(String::new());
    }

    if let Some(mut stderr) = child.stderr.take() {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf);
            let _ = stderr_tx.send(buf);
        });
    } else {
        let _ = stderr_tx.send(String::new());
    }

    let stdout = stdout_rx
        .recv_timeout(OUTPUT_COLLECTION_TIMEOUT)
        .unwrap_or_default();
    let stderr = stderr_rx
        .recv_timeout(OUTPUT_COLLECTION_TIMEOUT)
        .unwrap_or_default();
    (stdout, stderr)
}

/// Run a command and return trimmed stdout, or bail with stderr on failure.
/// For callers that expect success and just want the text.
pub fn run_checked(runner: &dyn CommandRunner, program: &str, args: &[&str]) -> Result<String> {
    let output = runner
        .run(program, args)
        .with_context(|| format!("Failed to execute: {program} {}", args.join(" ")))?;
    if !output.success {
        anyhow::bail!("{program} failed: {}", output.stderr.trim());
    }
    Ok(output.stdout.trim().to_string())
}
