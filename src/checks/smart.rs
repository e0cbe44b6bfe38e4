//! SMART health check for the configured block devices.

use super::CheckContext;
use crate::notify::{Alert, AlertKind};
use anyhow::{Context, Result};

pub fn run(ctx: &CheckContext) -> Result<()> {
    for device in &ctx.config.smart_devices {
        let output = ctx
            .runner
            .run("smartctl", &["-H", device])
            .with_context(|| format!("smartctl -H {device} failed"))?;
        match parse_health(&output.stdout) {
            Some(verdict) if verdict == "PASSED" => {}
            Some(verdict) => {
                let text = format!("SMART health on {device}: {verdict}");
                ctx.log.log(&format!("SMART alert: {text}"));
                ctx.sink
                    .send(&Alert::new(AlertKind::Resource, &ctx.site.site, text));
            }
            None => {
                anyhow::bail!("no SMART verdict in smartctl output for {device}");
            }
        }
    }
    Ok(())
}

/// Extract the overall-health verdict from `smartctl -H` output.
pub fn parse_health(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.split_once("test result:"))
        .map(|(_, verdict)| verdict.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passed_verdict() {
        let out = "SMART overall-health self-assessment test result: PASSED\n";
        assert_eq!(parse_health(out).as_deref(), Some("PASSED"));
    }

    #[test]
    fn failing_verdict() {
        let out = "SMART overall-health self-assessment test result: FAILED!\n";
        assert_eq!(parse_health(out).as_deref(), Some("FAILED!"));
    }

    #[test]
    fn missing_verdict_is_none() {
        assert_eq!(parse_health("device lacks SMART capability"), None);
    }
}
