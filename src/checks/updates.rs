//! Pending package updates check (informational).

use super::CheckContext;
use crate::notify::{Alert, AlertKind};
use anyhow::{Context, Result};

pub fn run(ctx: &CheckContext) -> Result<()> {
    // Simulation mode: reports what would be upgraded without touching
    // anything, and needs no root.
    let output = ctx
        .runner
        .run("apt-get", &["-s", "upgrade"])
        .context("apt-get -s upgrade failed")?;
    if !output.success {
        anyhow::bail!("apt-get exited non-zero: {}", output.stderr.trim());
    }

    let pending = count_pending(&output.stdout);
    if pending > 0 {
        let text = format!("{pending} package update(s) pending");
        ctx.log.log(&format!("Updates: {text}"));
        ctx.sink
            .send(&Alert::new(AlertKind::Info, &ctx.site.site, text));
    }
    Ok(())
}

/// Each `Inst <pkg> ...` line in the simulation output is one pending
/// upgrade.
pub fn count_pending(output: &str) -> usize {
    output.lines().filter(|l| l.starts_with("Inst ")).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_inst_lines() {
        let out = "\
Reading package lists...
Inst mysql-server [8.0.36] (8.0.37 Ubuntu:22.04)
Inst openssl [3.0.2] (3.0.13 Ubuntu:22.04)
Conf mysql-server (8.0.37 Ubuntu:22.04)
";
        assert_eq!(count_pending(out), 2);
    }

    #[test]
    fn clean_system_counts_zero() {
        assert_eq!(count_pending("Reading package lists...\n"), 0);
    }
}
