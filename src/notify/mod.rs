//! Operator alerting through the Telegram bot API.
//!
//! Alerts are fire-and-forget: a delivery failure is logged to the run log
//! and swallowed, because the monitor must finish its sequence even when the
//! alert channel is down. The sink is a trait so every component that emits
//! alerts can be exercised against an in-memory collector in tests.

use crate::logging::RunLog;
use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

const HTTP_CONNECT_TIMEOUT_SECS: u64 = 5;
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Telegram caps message bodies at 4096 characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;
const TRUNCATION_MARKER: &str = "…[truncated]";

/// Alert categories, each with the fixed emoji operators grep their chat
/// history for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// Probe failure after exhausting retries.
    Failure,
    /// A restart action was taken.
    Restart,
    /// Restart rate limit tripped; a human has to look.
    Escalation,
    /// Service came back after a restart.
    Recovery,
    /// Resource threshold breach (disk, cpu, memory, pool).
    Resource,
    /// Config file changed out of band.
    ConfigChange,
    /// A dependency service is not active.
    Service,
    /// SSH brute-force detection.
    Security,
    /// Informational (normal notification, pending updates).
    Info,
}

impl AlertKind {
    pub fn emoji(&self) -> &'static str {
        match self {
            AlertKind::Failure => "❌",
            AlertKind::Restart => "🔄",
            AlertKind::Escalation => "🚨",
            AlertKind::Recovery => "✅",
            AlertKind::Resource => "⚠️",
            AlertKind::ConfigChange => "🔧",
            AlertKind::Service => "⚙️",
            AlertKind::Security => "🛡️",
            AlertKind::Info => "ℹ️",
        }
    }
}

/// One operator-facing message.
#[derive(Debug, Clone)]
pub struct Alert {
    pub kind: AlertKind,
    pub site: String,
    pub text: String,
}

impl Alert {
    pub fn new(kind: AlertKind, site: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind,
            site: site.into(),
            text: text.into(),
        }
    }

    /// HTML body as sent to the chat: emoji, bold site label, text.
    pub fn format_html(&self) -> String {
        truncate_message(
            &format!("{} <b>{}</b> {}", self.kind.emoji(), self.site, self.text),
            MAX_MESSAGE_CHARS,
        )
    }
}

/// Cap a message at `max_chars` characters, ending with the truncation
/// marker when cut. Counts characters, not bytes, so a multi-byte body is
/// never split mid-character.
pub fn truncate_message(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

/// Delivery seam. Returns whether the alert reached the channel; callers
/// never propagate a failed send.
pub trait AlertSink {
    fn send(&self, alert: &Alert) -> bool;
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

/// Production sink posting `sendMessage` to the bot API.
pub struct TelegramNotifier {
    token: String,
    chat_id: String,
    client: Client,
    log: RunLog,
}

impl TelegramNotifier {
    pub fn new(token: String, chat_id: String, log: RunLog) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("db-sentinel/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client for alerts")?;
        Ok(Self {
            token,
            chat_id,
            client,
            log,
        })
    }

    fn post(&self, text: &str) -> Result<()> {
        if self.token.is_empty() || self.chat_id.is_empty() {
            bail!("telegram token/chat id not configured");
        }
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("chat_id", self.chat_id.as_str()),
                ("text", text),
                ("parse_mode", "HTML"),
            ])
            .send()
            .context("Failed to reach the Telegram API")?;

        let status = response.status();
        let body: ApiResponse = response
            .json()
            .with_context(|| format!("Unparseable Telegram response (HTTP {status})"))?;
        if !body.ok {
            bail!(
                "Telegram rejected the message: {}",
                body.description.unwrap_or_else(|| format!("HTTP {status}"))
            );
        }
        Ok(())
    }
}

impl AlertSink for TelegramNotifier {
    fn send(&self, alert: &Alert) -> bool {
        match self.post(&alert.format_html()) {
            Ok(()) => true,
            Err(e) => {
                self.log.log(&format!("ERROR: alert delivery failed: {e:#}"));
                tracing::warn!("alert delivery failed: {e:#}");
                false
            }
        }
    }
}
