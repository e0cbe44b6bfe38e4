//! SSH brute-force detection over the journal.
//!
//! Scans `journalctl -u ssh` for failed password attempts since the
//! persisted watermark, counts them per source IP, and alerts (optionally
//! auto-banning through fail2ban) when any single source reaches the
//! threshold. The watermark always advances to "now" at the end of the
//! check, even when sampling failed, so every journal interval is scanned
//! exactly once and never twice.

use super::CheckContext;
use crate::notify::{Alert, AlertKind};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub fn run(ctx: &CheckContext) -> Result<()> {
    let now = Utc::now();
    let watermark = ctx.state.read_ssh_scan()?;
    let result = match watermark {
        // First observation: establish the watermark, scan nothing.
        None => Ok(()),
        Some(state) => scan_window(ctx, state.last_scanned),
    };
    // Advance the watermark no matter how the scan went.
    ctx.state.write_ssh_scan(now)?;
    result
}

fn scan_window(ctx: &CheckContext, since: DateTime<Utc>) -> Result<()> {
    let since_arg = since.format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let output = ctx
        .runner
        .run(
            "journalctl",
            &["-u", "ssh", "--since", &since_arg, "--no-pager", "-q"],
        )
        .context("journalctl failed")?;
    if !output.success {
        anyhow::bail!("journalctl exited non-zero: {}", output.stderr.trim());
    }

    let threshold = ctx.config.thresholds.login_fail_count;
    let mut offenders: Vec<(String, u32)> = count_failed_logins(&output.stdout)
        .into_iter()
        .filter(|(_, count)| *count >= threshold)
        .collect();
    offenders.sort();

    for (ip, count) in offenders {
        let text = format!("{count} failed SSH logins from {ip} since last scan");
        ctx.log.log(&format!("SSH alert: {text}"));
        ctx.sink
            .send(&Alert::new(AlertKind::Security, &ctx.site.site, text));
        if ctx.config.auto_block_ip {
            block_ip(ctx, &ip);
        }
    }
    Ok(())
}

/// Count `Failed password ... from <ip>` lines per source address.
pub fn count_failed_logins(journal: &str) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for line in journal.lines() {
        let Some(rest) = line.split("Failed password for ").nth(1) else {
            continue;
        };
        let Some((_, tail)) = rest.rsplit_once(" from ") else {
            continue;
        };
        let Some(ip) = tail.split_whitespace().next() else {
            continue;
        };
        *counts.entry(ip.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Ban through fail2ban; best-effort, a missing tool only logs.
fn block_ip(ctx: &CheckContext, ip: &str) {
    match ctx
        .runner
        .run("fail2ban-client", &["set", "sshd", "banip", ip])
    {
        Ok(out) if out.success => {
            ctx.log.log(&format!("Auto-blocked {ip} via fail2ban"));
        }
        Ok(out) => {
            tracing::warn!("fail2ban ban of {ip} failed: {}", out.stderr.trim());
        }
        Err(e) => {
            tracing::warn!("fail2ban unavailable, {ip} not blocked: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOURNAL: &str = "\
Jun 01 10:00:01 host sshd[100]: Failed password for root from 198.51.100.9 port 50514 ssh2
Jun 01 10:00:05 host sshd[101]: Failed password for invalid user admin from 198.51.100.9 port 50520 ssh2
Jun 01 10:00:09 host sshd[102]: Accepted publickey for deploy from 203.0.113.4 port 51000 ssh2
Jun 01 10:00:14 host sshd[103]: Failed password for root from 192.0.2.77 port 42044 ssh2
";

    #[test]
    fn counts_per_source_ip() {
        let counts = count_failed_logins(JOURNAL);
        assert_eq!(counts.get("198.51.100.9"), Some(&2));
        assert_eq!(counts.get("192.0.2.77"), Some(&1));
        assert_eq!(counts.get("203.0.113.4"), None);
    }

    #[test]
    fn empty_journal_counts_nothing() {
        assert!(count_failed_logins("").is_empty());
    }
}
