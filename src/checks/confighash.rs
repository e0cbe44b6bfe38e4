//! Config-file integrity check.
//!
//! Hashes every watched file (glob patterns allowed) and compares against
//! the map persisted by the previous run. A file seen for the first time is
//! recorded silently — absence of a prior hash means first observation, not
//! a change. The map is rewritten every run so removed files age out.

use super::CheckContext;
use crate::notify::{Alert, AlertKind};
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub fn run(ctx: &CheckContext) -> Result<()> {
    let previous = ctx.state.read_config_hashes()?;
    let mut current = HashMap::new();

    for path in expand_watched(&ctx.config.watch_configs) {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match hash_file(&path) {
            Ok(digest) => {
                current.insert(name.to_string(), digest);
            }
            Err(e) => {
                // Unreadable watched file: skip it this run, keep checking
                // the rest. Its old hash drops out of the map.
                tracing::warn!("cannot hash {}: {e:#}", path.display());
            }
        }
    }

    for name in changed_files(&previous, &current) {
        let text = format!("configuration file {name} changed since last run");
        ctx.log.log(&format!("Config integrity: {text}"));
        ctx.sink
            .send(&Alert::new(AlertKind::ConfigChange, &ctx.site.site, text));
    }

    ctx.state.write_config_hashes(&current)?;
    Ok(())
}

/// Expand glob patterns to existing files; a literal path that exists passes
/// through even when glob metacharacters make it match nothing.
fn expand_watched(patterns: &[String]) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for pattern in patterns {
        match glob::glob(pattern) {
            Ok(matches) => {
                let mut any = false;
                for entry in matches.flatten() {
                    if entry.is_file() {
                        paths.push(entry);
                        any = true;
                    }
                }
                if !any {
                    let literal = PathBuf::from(pattern);
                    if literal.is_file() {
                        paths.push(literal);
                    }
                }
            }
            Err(e) => tracing::warn!("bad watch pattern {pattern:?}: {e}"),
        }
    }
    paths
}

fn hash_file(path: &Path) -> Result<String> {
    let content = std::fs::read(path)
        .with_context(|| format!("Failed to read watched file: {}", path.display()))?;
    Ok(hex::encode(Sha256::digest(&content)))
}

/// Files present in both maps whose digests differ, sorted for stable
/// alerting order.
pub fn changed_files(
    previous: &HashMap<String, String>,
    current: &HashMap<String, String>,
) -> Vec<String> {
    let mut changed: Vec<String> = current
        .iter()
        .filter(|(name, digest)| previous.get(*name).is_some_and(|old| old != *digest))
        .map(|(name, _)| name.clone())
        .collect();
    changed.sort();
    changed
}
