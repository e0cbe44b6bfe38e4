//! Read-only view of the persisted monitor state.
//!
//! Deliberately takes no lock: an operator asking "what happened" during an
//! incident must not be blocked by a running check.

use crate::config::Config;
use crate::restart::count_recent;
use crate::state::StateDir;
use anyhow::Result;
use chrono::Utc;
use colored::Colorize;

pub fn execute() -> Result<()> {
    let config = Config::from_env()?;
    let state = StateDir::new(&config.state_dir)?;
    let now = Utc::now();

    println!("State directory: {}", state.root().display());
    println!();

    match state.read_last_error()? {
        None => println!("{} no stored failure", "✓".green().bold()),
        Some(snapshot) => {
            println!("{} last failure", "✗".red().bold());
            println!("  site:     {}", snapshot.site);
            println!("  server:   {}", snapshot.ip);
            println!("  time:     {}", snapshot.time.to_rfc3339());
            println!("  attempts: {}", snapshot.attempts);
            println!("  error:    {}", snapshot.error);
        }
    }
    println!();

    let times = state.load_restart_times()?;
    let window = config.thresholds.restart_period_secs;
    let recent = count_recent(&times, now, window);
    let line = format!(
        "{recent}/{} restarts in the last {window}s ({} total on record)",
        config.thresholds.max_restarts,
        times.len()
    );
    if recent >= config.thresholds.max_restarts {
        println!("{} {line}", "!".red().bold());
    } else {
        println!("{} {line}", "·".dimmed());
    }
    for time in times.iter().rev().take(5) {
        println!("  {}", time.to_rfc3339().dimmed());
    }

    if let Some(marker) = state.read_restart_marker()? {
        let age = now.signed_duration_since(marker.restarted_at).num_seconds();
        println!();
        println!("{} restart marker present ({age}s old)", "·".dimmed());
    }

    Ok(())
}
