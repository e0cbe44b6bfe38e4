//! The cron entrypoint: one full monitoring pass.
//!
//! Fixed sequence: instance lock → config → optional auto-update → probe →
//! restart coordination (on failure) or recovery confirmation (on success) →
//! resource checkers → optional debug dump. The sequence itself lives in
//! [`run_sequence`], which takes every external effect as a seam so the
//! whole pass can be driven in tests without a host, a database, or a chat
//! channel.

use crate::checks::{self, CheckContext};
use crate::config::{Config, SiteConfig};
use crate::errors::MonitorError;
use crate::logging::RunLog;
use crate::notify::{Alert, AlertKind, AlertSink, TelegramNotifier};
use crate::probe::{self, FailureKind, MysqlPing};
use crate::restart::{RestartCoordinator, RestartOutcome};
use crate::state::{ProcessLock, StateDir};
use crate::sys::{CommandRunner, HostRunner};
use anyhow::Result;
use chrono::{Local, Utc};
use colored::Colorize;
use std::path::Path;
use std::time::Duration;

use super::self_update;

pub fn execute() -> Result<()> {
    let config = Config::from_env()?;
    ensure_supported_host()?;

    let site = SiteConfig::load(config.site_config_path.as_deref())?;
    let state = StateDir::new(&config.state_dir)?;
    // Everything before this point is read-only; the lock gates all state
    // mutation and all external actions.
    let _lock = ProcessLock::acquire(&config.lockfile)?;

    let log = RunLog::new(state.run_log_path());
    let notifier = TelegramNotifier::new(
        config.telegram_token.clone(),
        config.telegram_chat_id.clone(),
        log.clone(),
    )?;
    let runner = HostRunner::new(Duration::from_secs(config.command_timeout_secs));

    if config.auto_update {
        match self_update::update_if_newer(&config) {
            Ok(Some(version)) => {
                log.log(&format!("Self-update installed version {version}"));
                println!(
                    "{} updated to {version}; next run uses the new binary",
                    "✓".green().bold()
                );
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("self-update check failed: {e:#}"),
        }
    }

    let status = run_sequence(
        &config,
        &site,
        &state,
        &runner,
        &notifier,
        &log,
        &mut std::thread::sleep,
    )?;
    println!("{status}");
    Ok(())
}

/// One monitoring pass against injected seams. Returns the one-line status
/// for stdout.
pub fn run_sequence(
    config: &Config,
    site: &SiteConfig,
    state: &StateDir,
    runner: &dyn CommandRunner,
    sink: &dyn AlertSink,
    log: &RunLog,
    sleep: &mut dyn FnMut(Duration),
) -> Result<String> {
    log.log("Monitor run started");

    let handshake = MysqlPing {
        runner,
        db: &site.database,
    };
    let result = probe::run_probe(
        &site.database.host,
        site.database.port,
        &handshake,
        config.max_retries,
        config.retry_delay_secs,
        Duration::from_secs(config.connect_timeout_secs),
        sleep,
    )?;
    probe::record_outcome(state, &site.site, &site.server_ip, &result)?;

    let coordinator = RestartCoordinator {
        config,
        site: &site.site,
        state,
        runner,
        sink,
        log,
    };
    let now = Utc::now();

    let status = if result.success {
        log.log(&format!(
            "Connection OK (attempt {}, {} ms)",
            result.attempt_count, result.latency_ms
        ));
        coordinator.confirm_recovery(now)?;
        if config.normal_notification {
            sink.send(&Alert::new(
                AlertKind::Info,
                &site.site,
                format!(
                    "database connection normal (attempt {}, {} ms)",
                    result.attempt_count, result.latency_ms
                ),
            ));
        }
        format!(
            "OK: database reachable (attempt {}, {} ms)",
            result.attempt_count, result.latency_ms
        )
    } else {
        let category = match result.failure_kind {
            Some(FailureKind::Transport) => "transport",
            _ => "handshake",
        };
        let error = result.last_error.clone().unwrap_or_default();
        log.log(&format!(
            "ERROR ({category}): {error} after {} attempt(s)",
            result.attempt_count
        ));
        sink.send(&Alert::new(
            AlertKind::Failure,
            &site.site,
            format!(
                "database unreachable ({category}) after {} attempt(s)\n<pre>{}\nServer: {}\nError: {}</pre>",
                result.attempt_count,
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                site.server_ip,
                error
            ),
        ));

        let outcome = match coordinator.on_probe_failure(now) {
            Ok(outcome) => outcome,
            Err(e) => {
                // A failed restart action must not stop the host checks.
                tracing::warn!("restart action failed: {e:#}");
                log.log(&format!("ERROR: restart action failed: {e:#}"));
                RestartOutcome::Skipped("restart action failed")
            }
        };
        let outcome_text = match outcome {
            RestartOutcome::Suppressed => "restart suppressed (rate limit)",
            RestartOutcome::Restarted(_) => "restart triggered",
            RestartOutcome::Skipped(reason) => reason,
        };
        format!(
            "FAIL: database unreachable ({category}) after {} attempt(s); {outcome_text}",
            result.attempt_count
        )
    };

    let ctx = CheckContext {
        config,
        site,
        state,
        runner,
        sink,
        log,
    };
    checks::run_all(&ctx);

    if config.debug {
        println!("{}", host_summary(runner));
    }

    log.log("Monitor run finished");
    Ok(status)
}

/// Load average plus `free -m`, for debug mode.
fn host_summary(runner: &dyn CommandRunner) -> String {
    let load = std::fs::read_to_string("/proc/loadavg")
        .ok()
        .and_then(|s| s.split_whitespace().next().map(str::to_string))
        .unwrap_or_else(|| "n/a".to_string());
    let mem = match runner.run("free", &["-m"]) {
        Ok(out) if out.success => out.stdout,
        _ => "memory info unavailable".to_string(),
    };
    format!("Load: 1m={load} | Mem:\n{mem}")
}

/// The checkers and the probe assume a Linux-style host; refuse early
/// elsewhere instead of failing open on every sample.
fn ensure_supported_host() -> Result<()> {
    if !cfg!(unix) || !Path::new("/proc/loadavg").exists() {
        return Err(
            MonitorError::UnsupportedHost("/proc is unavailable on this host".to_string()).into(),
        );
    }
    Ok(())
}
