//! MySQL connection-pool saturation check.
//!
//! Compares `Threads_connected` against `max_connections` via the mysql
//! client. Runs only when the probe reached the server this invocation;
//! if the client cannot connect the checker fails open like any other
//! sampling problem.

use super::CheckContext;
use crate::notify::{Alert, AlertKind};
use anyhow::{Context, Result};

pub fn run(ctx: &CheckContext) -> Result<()> {
    let used = query_numeric(ctx, "SHOW GLOBAL STATUS LIKE 'Threads_connected'")?;
    let max = query_numeric(ctx, "SHOW VARIABLES LIKE 'max_connections'")?;
    if max == 0 {
        anyhow::bail!("max_connections reported as 0");
    }

    let percent = used as f64 * 100.0 / max as f64;
    if percent > f64::from(ctx.config.thresholds.conn_pool_percent) {
        let text = format!("MySQL connections {used}/{max} ({percent:.1}%)");
        ctx.log.log(&format!("Connection pool alert: {text}"));
        ctx.sink
            .send(&Alert::new(AlertKind::Resource, &ctx.site.site, text));
    }
    Ok(())
}

fn query_numeric(ctx: &CheckContext, query: &str) -> Result<u64> {
    let db = &ctx.site.database;
    let port = db.port.to_string();
    let password = format!("--password={}", db.password);
    let mut args = vec![
        "-h",
        db.host.as_str(),
        "-P",
        port.as_str(),
        "-u",
        db.user.as_str(),
    ];
    if !db.password.is_empty() {
        args.push(password.as_str());
    }
    args.extend(["-N", "-B", "-e", query]);

    let output = ctx
        .runner
        .run("mysql", &args)
        .with_context(|| format!("mysql query failed: {query}"))?;
    if !output.success {
        anyhow::bail!("mysql exited non-zero: {}", output.stderr.trim());
    }
    parse_tabbed_value(&output.stdout)
        .with_context(|| format!("unparseable mysql output for {query}: {:?}", output.stdout))
}

/// `-N -B` output is `name\tvalue` on one line; return the value.
pub fn parse_tabbed_value(output: &str) -> Result<u64> {
    let line = output.lines().next().unwrap_or_default();
    let value = line.split('\t').nth(1).unwrap_or_default().trim();
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("expected numeric value, got {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_value_pair() {
        assert_eq!(parse_tabbed_value("Threads_connected\t42\n").unwrap(), 42);
        assert_eq!(parse_tabbed_value("max_connections\t151\n").unwrap(), 151);
    }

    #[test]
    fn rejects_missing_value() {
        assert!(parse_tabbed_value("Threads_connected\n").is_err());
        assert!(parse_tabbed_value("").is_err());
    }
}
