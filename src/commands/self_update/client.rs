//! HTTP plumbing for the self-update flow.
//!
//! All downloads are size-limited during streaming, not just via the
//! Content-Length header, so a misbehaving server cannot balloon memory.

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client, Response};
use std::io::Read;
use std::time::Duration;

pub(crate) const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
pub(crate) const HTTP_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Client with bounded connect and total-request timeouts.
pub(crate) fn create_http_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
        .user_agent(concat!("db-sentinel-self-update/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")
}

pub(crate) fn validate_response_status(response: &Response, context: &str) -> Result<()> {
    if !response.status().is_success() {
        let status = response.status();
        bail!(
            "{}: HTTP {} - {}",
            context,
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown error")
        );
    }
    Ok(())
}

/// Stream the body into memory, enforcing `max_size` both via the header and
/// while reading.
pub(crate) fn download_with_limit(
    response: Response,
    max_size: u64,
    context: &str,
) -> Result<Vec<u8>> {
    if let Some(content_length) = response.content_length() {
        if content_length > max_size {
            bail!(
                "{context}: Content-Length {content_length} bytes exceeds maximum allowed size of {max_size} bytes"
            );
        }
    }

    let mut bytes = Vec::new();
    let mut reader = response;
    let mut total_read: u64 = 0;
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader
            .read(&mut buffer)
            .context("Failed to read response body")?;
        if n == 0 {
            break;
        }
        total_read += n as u64;
        if total_read > max_size {
            bail!("{context}: Download size exceeds maximum allowed size of {max_size} bytes");
        }
        bytes.extend_from_slice(&buffer[..n]);
    }

    Ok(bytes)
}

pub(crate) fn download_text_with_limit(
    response: Response,
    max_size: u64,
    context: &str,
) -> Result<String> {
    let bytes = download_with_limit(response, max_size, context)?;
    String::from_utf8(bytes).context("Response contains invalid UTF-8")
}
