//! CPU load check against the 1-minute load average.

use super::CheckContext;
use crate::notify::{Alert, AlertKind};
use anyhow::{Context, Result};

pub fn run(ctx: &CheckContext) -> Result<()> {
    let content =
        std::fs::read_to_string("/proc/loadavg").context("cannot read /proc/loadavg")?;
    let Some(load) = parse_load_avg(&content) else {
        anyhow::bail!("unparseable /proc/loadavg: {content:?}");
    };
    if load > ctx.config.thresholds.cpu_load_avg {
        let text = format!(
            "1-minute load average at {load:.2} (threshold {:.2})",
            ctx.config.thresholds.cpu_load_avg
        );
        ctx.log.log(&format!("CPU alert: {text}"));
        ctx.sink
            .send(&Alert::new(AlertKind::Resource, &ctx.site.site, text));
    }
    Ok(())
}

/// First field of /proc/loadavg is the 1-minute average.
pub fn parse_load_avg(content: &str) -> Option<f64> {
    content.split_whitespace().next()?.parse().ok()
}
