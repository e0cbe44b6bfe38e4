//! Dependency service check: every configured unit must be active.

use super::CheckContext;
use crate::notify::{Alert, AlertKind};
use anyhow::{Context, Result};

pub fn run(ctx: &CheckContext) -> Result<()> {
    for service in &ctx.config.dependencies {
        // `systemctl is-active` exits non-zero for inactive units but still
        // prints the state; the stdout is authoritative either way.
        let output = ctx
            .runner
            .run("systemctl", &["is-active", service])
            .with_context(|| format!("systemctl is-active {service} failed"))?;
        let state = output.stdout.trim();
        if state != "active" {
            let text = format!(
                "service {service} is {}",
                if state.is_empty() { "unknown" } else { state }
            );
            ctx.log.log(&format!("Dependency alert: {text}"));
            ctx.sink
                .send(&Alert::new(AlertKind::Service, &ctx.site.site, text));
        }
    }
    Ok(())
}
