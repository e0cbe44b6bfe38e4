//! Instance configuration: which site this host serves and how to reach its
//! database.
//!
//! Loaded from an optional TOML file, with environment variables taking
//! precedence over the file and built-in defaults filling the rest. An
//! explicitly configured path that does not exist is a hard configuration
//! error; the default path is allowed to be absent.

use crate::errors::MonitorError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

const DEFAULT_SITE_CONFIG: &str = "/etc/db-sentinel/config.toml";
const DEFAULT_DB_PORT: u16 = 3306;

/// Database coordinates for the probe and the connection-pool checker.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

/// Identity of the monitored instance, used in every alert.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub site: String,
    pub server_ip: String,
    pub database: DatabaseConfig,
}

#[derive(Debug, Default, Deserialize)]
struct RawSiteConfig {
    site: Option<String>,
    server_ip: Option<String>,
    #[serde(default)]
    database: RawDatabase,
}

#[derive(Debug, Default, Deserialize)]
struct RawDatabase {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    name: Option<String>,
}

impl SiteConfig {
    /// Resolve the instance configuration.
    ///
    /// Precedence per field: environment variable, then the TOML file, then
    /// the default. `DB_HOST` accepts `host:port` like the upstream tooling.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let raw = match explicit_path {
            Some(path) => {
                if !path.exists() {
                    return Err(MonitorError::Config(format!(
                        "site config not found: {}",
                        path.display()
                    ))
                    .into());
                }
                parse_file(path)?
            }
            None => {
                let default = Path::new(DEFAULT_SITE_CONFIG);
                if default.exists() {
                    parse_file(default)?
                } else {
                    RawSiteConfig::default()
                }
            }
        };

        let (env_host, env_port) = split_host_port(env_var("DB_HOST"));
        let port = match env_var("DB_PORT") {
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| MonitorError::Config(format!("invalid DB_PORT: {p:?}")))?,
            None => env_port
                .or(raw.database.port)
                .unwrap_or(DEFAULT_DB_PORT),
        };

        Ok(Self {
            site: env_var("SITE_NAME")
                .or(raw.site)
                .unwrap_or_else(hostname),
            server_ip: env_var("SERVER_IP")
                .or(raw.server_ip)
                .unwrap_or_else(|| "unknown".to_string()),
            database: DatabaseConfig {
                host: env_host
                    .or(raw.database.host)
                    .unwrap_or_else(|| "localhost".to_string()),
                port,
                user: env_var("DB_USER")
                    .or(raw.database.user)
                    .unwrap_or_else(|| "root".to_string()),
                password: env_var("DB_PASSWORD")
                    .or(raw.database.password)
                    .unwrap_or_default(),
                name: env_var("DB_NAME")
                    .or(raw.database.name)
                    .unwrap_or_default(),
            },
        })
    }
}

fn parse_file(path: &Path) -> Result<RawSiteConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read site config: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse site config: {}", path.display()))
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Split an optional `host:port` value into its parts. A bare host passes
/// through with no port.
fn split_host_port(value: Option<String>) -> (Option<String>, Option<u16>) {
    match value {
        None => (None, None),
        Some(v) => match v.split_once(':') {
            Some((host, port)) => (Some(host.to_string()), port.parse().ok()),
            None => (Some(v), None),
        },
    }
}

fn hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
