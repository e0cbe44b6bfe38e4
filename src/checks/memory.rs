//! Memory usage check from /proc/meminfo.

use super::CheckContext;
use crate::notify::{Alert, AlertKind};
use anyhow::{Context, Result};

pub fn run(ctx: &CheckContext) -> Result<()> {
    let content =
        std::fs::read_to_string("/proc/meminfo").context("cannot read /proc/meminfo")?;
    let Some(used) = parse_used_percent(&content) else {
        anyhow::bail!("MemTotal/MemAvailable missing from /proc/meminfo");
    };
    if used > ctx.config.thresholds.mem_percent {
        let text = format!(
            "memory usage at {used}% (threshold {}%)",
            ctx.config.thresholds.mem_percent
        );
        ctx.log.log(&format!("Memory alert: {text}"));
        ctx.sink
            .send(&Alert::new(AlertKind::Resource, &ctx.site.site, text));
    }
    Ok(())
}

/// Used percentage as `(MemTotal - MemAvailable) / MemTotal`, rounded down.
pub fn parse_used_percent(meminfo: &str) -> Option<u8> {
    let field = |name: &str| -> Option<u64> {
        meminfo
            .lines()
            .find(|l| l.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };
    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    if total == 0 || available > total {
        return None;
    }
    Some(((total - available) * 100 / total) as u8)
}
