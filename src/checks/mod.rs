//! Stateless host and database checks.
//!
//! Every checker samples one metric through the command-runner or a /proc
//! read, compares it against its configured threshold, and emits at most a
//! handful of alerts. Checkers fail open: when sampling breaks (tool not
//! installed, unreadable file, unparseable output) the failure is logged at
//! WARN and the checker is skipped — tooling problems never page anyone.

pub mod confighash;
pub mod connpool;
pub mod cpu;
pub mod disk;
pub mod memory;
pub mod services;
pub mod smart;
pub mod ssh;
pub mod updates;

use crate::config::{Config, SiteConfig};
use crate::logging::RunLog;
use crate::notify::AlertSink;
use crate::state::StateDir;
use crate::sys::CommandRunner;
use anyhow::Result;

/// Everything a checker may touch, passed explicitly.
pub struct CheckContext<'a> {
    pub config: &'a Config,
    pub site: &'a SiteConfig,
    pub state: &'a StateDir,
    pub runner: &'a dyn CommandRunner,
    pub sink: &'a dyn AlertSink,
    pub log: &'a RunLog,
}

/// Run every checker in a fixed order. A failing checker is logged and
/// skipped; it never stops the ones after it.
pub fn run_all(ctx: &CheckContext) {
    guard("disk", disk::run(ctx));
    guard("cpu", cpu::run(ctx));
    guard("memory", memory::run(ctx));
    guard("connpool", connpool::run(ctx));
    guard("ssh", ssh::run(ctx));
    guard("services", services::run(ctx));
    guard("smart", smart::run(ctx));
    guard("confighash", confighash::run(ctx));
    guard("updates", updates::run(ctx));
}

fn guard(name: &str, result: Result<()>) {
    if let Err(e) = result {
        tracing::warn!(check = name, "sampling failed, check skipped: {e:#}");
    }
}
