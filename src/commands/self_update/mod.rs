//! Self-update against the configured release location.
//!
//! The release location serves three artifacts: `version.txt` (a bare
//! semver), the platform binary `db-sentinel-<target>`, and its
//! `db-sentinel-<target>.sha256` checksum. If the remote version is newer
//! the binary is downloaded, checksum-verified, and swapped in atomically;
//! the process then exits so the next cron run executes the new code. The
//! running binary never rewrites its own image in place.

pub(crate) mod client;
pub(crate) mod install;

use crate::config::Config;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use semver::Version;
use sha2::{Digest, Sha256};
use std::env;

use client::{
    create_http_client, download_text_with_limit, download_with_limit, validate_response_status,
};
use install::install_binary;

const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

pub(crate) const MAX_BINARY_SIZE: u64 = 50 * 1024 * 1024;
pub(crate) const MAX_TEXT_SIZE: u64 = 64 * 1024;

/// Explicit `self-update` subcommand: always checks, reports either way.
pub fn execute() -> Result<()> {
    let config = Config::from_env()?;
    println!("{}", "Checking for updates...".blue());

    match update_if_newer(&config)? {
        None => {
            println!(
                "{} You're running the latest version ({})",
                "✓".green().bold(),
                CURRENT_VERSION
            );
        }
        Some(version) => {
            println!(
                "{} Updated {} → {}; next run uses the new binary",
                "✓".green().bold(),
                CURRENT_VERSION.dimmed(),
                version.to_string().green().bold()
            );
        }
    }
    Ok(())
}

/// Periodic auto-update hook for `check`. Returns the installed version when
/// an update happened.
pub fn update_if_newer(config: &Config) -> Result<Option<Version>> {
    let client = create_http_client()?;
    let base = config.update_base_url.trim_end_matches('/');

    let remote = fetch_remote_version(&client, base)?;
    let current = Version::parse(CURRENT_VERSION).context("Failed to parse built-in version")?;
    if remote <= current {
        return Ok(None);
    }

    let target = get_target();
    if target == "unknown" {
        bail!("Unsupported platform for self-update");
    }
    let binary_name = format!("db-sentinel-{target}");

    let response = client
        .get(format!("{base}/{binary_name}"))
        .send()
        .context("Failed to download binary")?;
    validate_response_status(&response, "Binary download failed")?;
    let binary_bytes = download_with_limit(response, MAX_BINARY_SIZE, "Binary download")?;

    let response = client
        .get(format!("{base}/{binary_name}.sha256"))
        .send()
        .context("Failed to download checksum")?;
    validate_response_status(&response, "Checksum download failed")?;
    let checksum_line = download_text_with_limit(response, MAX_TEXT_SIZE, "Checksum download")?;

    // Verify BEFORE anything touches the installed binary.
    verify_checksum(&binary_bytes, &checksum_line)?;

    let current_exe = env::current_exe().context("Failed to get current executable path")?;
    install_binary(&binary_bytes, &current_exe)?;

    Ok(Some(remote))
}

fn fetch_remote_version(client: &reqwest::blocking::Client, base: &str) -> Result<Version> {
    let response = client
        .get(format!("{base}/version.txt"))
        .send()
        .context("Failed to check for updates")?;
    validate_response_status(&response, "Failed to fetch remote version")?;
    let text = download_text_with_limit(response, MAX_TEXT_SIZE, "Version download")?;
    Version::parse(text.trim().trim_start_matches('v'))
        .with_context(|| format!("Unparseable remote version: {:?}", text.trim()))
}

/// Target triple of the running binary.
fn get_target() -> &'static str {
    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    {
        "x86_64-unknown-linux-gnu"
    }
    #[cfg(all(target_os = "linux", target_arch = "aarch64"))]
    {
        "aarch64-unknown-linux-gnu"
    }
    #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
    {
        "x86_64-apple-darwin"
    }
    #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
    {
        "aarch64-apple-darwin"
    }
    #[cfg(not(any(
        all(target_os = "linux", target_arch = "x86_64"),
        all(target_os = "linux", target_arch = "aarch64"),
        all(target_os = "macos", target_arch = "x86_64"),
        all(target_os = "macos", target_arch = "aarch64"),
    )))]
    {
        "unknown"
    }
}

/// Check the downloaded bytes against a `sha256sum`-style line
/// (`<hex digest> <filename>`; only the digest is significant).
fn verify_checksum(bytes: &[u8], checksum_line: &str) -> Result<()> {
    let expected = checksum_line
        .split_whitespace()
        .next()
        .context("Empty checksum file")?
        .to_ascii_lowercase();
    let actual = hex::encode(Sha256::digest(bytes));
    if actual != expected {
        bail!("Checksum mismatch: expected {expected}, computed {actual}");
    }
    Ok(())
}
