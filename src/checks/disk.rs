//! Disk usage check for the watched mount points.

use super::CheckContext;
use crate::notify::{Alert, AlertKind};
use anyhow::{Context, Result};
use regex::Regex;

pub fn run(ctx: &CheckContext) -> Result<()> {
    for path in &ctx.config.disk_paths {
        let path_str = path.display().to_string();
        let output = ctx
            .runner
            .run("df", &["-P", &path_str])
            .with_context(|| format!("df failed for {path_str}"))?;
        if !output.success {
            anyhow::bail!("df exited non-zero for {path_str}: {}", output.stderr.trim());
        }
        let Some(usage) = parse_df_percent(&output.stdout) else {
            anyhow::bail!("unparseable df output for {path_str}");
        };
        if usage > ctx.config.thresholds.disk_percent {
            let text = format!("disk usage on {path_str} at {usage}%");
            ctx.log.log(&format!("Disk alert: {text}"));
            ctx.sink
                .send(&Alert::new(AlertKind::Resource, &ctx.site.site, text));
        }
    }
    Ok(())
}

/// Extract the use% column from POSIX `df -P` output (last data line).
pub fn parse_df_percent(output: &str) -> Option<u8> {
    let re = Regex::new(r"\s(\d+)%\s").ok()?;
    let line = output.lines().last()?;
    re.captures(line)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DF_OUTPUT: &str = "\
Filesystem     1024-blocks      Used Available Capacity Mounted on
/dev/sda1         41152812  37037530   4115282      91% /var/lib/mysql
";

    #[test]
    fn parses_use_percent_column() {
        assert_eq!(parse_df_percent(DF_OUTPUT), Some(91));
    }

    #[test]
    fn garbage_output_is_none() {
        assert_eq!(parse_df_percent("no columns here"), None);
        assert_eq!(parse_df_percent(""), None);
    }
}
