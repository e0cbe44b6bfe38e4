//! Runtime configuration resolved from environment variables.
//!
//! Every knob has a default; the environment only overrides. An unparseable
//! value is a configuration error (exit 3), never a silent fallback — a cron
//! job that quietly ignores `DISK_THRESHOLD=9O` would alert on the wrong
//! threshold for months.

pub mod site;

pub use site::{DatabaseConfig, SiteConfig};

use crate::errors::MonitorError;
use anyhow::Result;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 3;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DISK_THRESHOLD: u8 = 90;
pub const DEFAULT_CONN_POOL_THRESHOLD: u8 = 80;
pub const DEFAULT_CPU_THRESHOLD_LOAD_AVG: f64 = 4.0;
pub const DEFAULT_MEM_THRESHOLD_PERCENT: u8 = 90;
pub const DEFAULT_LOGIN_FAIL_THRESHOLD: u32 = 5;
pub const DEFAULT_MAX_RESTARTS: usize = 3;
pub const DEFAULT_RESTART_PERIOD_SECS: i64 = 600;
pub const DEFAULT_RECOVERY_WINDOW_SECS: i64 = 300;

/// Numeric and boolean limits the checkers compare against. Loaded once at
/// startup, immutable for the rest of the run.
#[derive(Debug, Clone)]
pub struct Thresholds {
    pub disk_percent: u8,
    pub conn_pool_percent: u8,
    pub cpu_load_avg: f64,
    pub mem_percent: u8,
    pub login_fail_count: u32,
    pub max_restarts: usize,
    pub restart_period_secs: i64,
    pub recovery_window_secs: i64,
}

/// Per-run configuration snapshot. Constructed once in the command layer and
/// passed down explicitly; nothing in the crate reads the environment after
/// this point.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub lockfile: PathBuf,
    pub site_config_path: Option<PathBuf>,

    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,

    pub auto_restart: bool,
    pub auto_block_ip: bool,
    pub auto_update: bool,
    pub normal_notification: bool,
    pub debug: bool,

    pub telegram_token: String,
    pub telegram_chat_id: String,

    pub mysql_service: String,
    pub dependencies: Vec<String>,
    pub disk_paths: Vec<PathBuf>,
    pub smart_devices: Vec<String>,
    pub watch_configs: Vec<String>,
    pub update_base_url: String,

    pub thresholds: Thresholds,
}

impl Config {
    /// Build the per-run snapshot from the environment.
    pub fn from_env() -> Result<Self> {
        let state_dir = match std::env::var_os("DB_SENTINEL_STATE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_state_dir(),
        };

        Ok(Self {
            state_dir,
            lockfile: env_var("DB_SENTINEL_LOCKFILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/tmp/db-sentinel.lock")),
            site_config_path: env_var("SITE_CONFIG").map(PathBuf::from),

            max_retries: env_parsed("DB_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            retry_delay_secs: env_parsed("DB_RETRY_DELAY", DEFAULT_RETRY_DELAY_SECS)?,
            connect_timeout_secs: env_parsed("DB_CONNECT_TIMEOUT", DEFAULT_CONNECT_TIMEOUT_SECS)?,
            command_timeout_secs: env_parsed("COMMAND_TIMEOUT", DEFAULT_COMMAND_TIMEOUT_SECS)?,

            auto_restart: env_bool("AUTO_RESTART", true)?,
            auto_block_ip: env_bool("AUTO_BLOCK_IP", false)?,
            auto_update: env_bool("AUTO_UPDATE", false)?,
            normal_notification: env_bool("NORMAL_NOTIFICATION", false)?,
            debug: env_bool("DEBUG_MODE", false)?,

            telegram_token: env_var("TELEGRAM_TOKEN").unwrap_or_default(),
            telegram_chat_id: env_var("TELEGRAM_CHAT_ID").unwrap_or_default(),

            mysql_service: env_var("MYSQL_SERVICE").unwrap_or_else(|| "mysql".to_string()),
            dependencies: env_list("DEPENDENCIES", &["cron"]),
            disk_paths: env_list("DISK_PATHS", &["/var/lib/mysql"])
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            smart_devices: env_list("SMART_DEVICES", &[]),
            watch_configs: env_list("WATCH_CONFIGS", &["/etc/mysql/my.cnf"]),
            update_base_url: env_var("UPDATE_BASE_URL").unwrap_or_else(|| {
                "https://github.com/db-sentinel/db-sentinel/releases/latest/download".to_string()
            }),

            thresholds: Thresholds {
                disk_percent: env_parsed("DISK_THRESHOLD", DEFAULT_DISK_THRESHOLD)?,
                conn_pool_percent: env_parsed("CONN_POOL_THRESHOLD", DEFAULT_CONN_POOL_THRESHOLD)?,
                cpu_load_avg: env_parsed("CPU_THRESHOLD_LOADAVG", DEFAULT_CPU_THRESHOLD_LOAD_AVG)?,
                mem_percent: env_parsed("MEM_THRESHOLD_PERCENT", DEFAULT_MEM_THRESHOLD_PERCENT)?,
                login_fail_count: env_parsed("LOGIN_FAIL_THRESHOLD", DEFAULT_LOGIN_FAIL_THRESHOLD)?,
                max_restarts: env_parsed("MAX_RESTARTS", DEFAULT_MAX_RESTARTS)?,
                restart_period_secs: env_parsed("RESTART_PERIOD", DEFAULT_RESTART_PERIOD_SECS)?,
                recovery_window_secs: env_parsed(
                    "RECOVERY_WINDOW",
                    DEFAULT_RECOVERY_WINDOW_SECS,
                )?,
            },
        })
    }
}

/// Default state directory: the per-user state dir, falling back to
/// `/var/lib/db-sentinel` for environments without one.
fn default_state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|d| d.join("db-sentinel"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/db-sentinel"))
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env_var(key) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|_| {
            MonitorError::Config(format!("invalid value for {key}: {raw:?}")).into()
        }),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env_var(key) {
        None => Ok(default),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(MonitorError::Config(format!("invalid boolean for {key}: {raw:?}")).into()),
        },
    }
}

/// Comma-separated list with surrounding whitespace stripped; empty entries
/// dropped.
fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match env_var(key) {
        None => default.iter().map(|s| s.to_string()).collect(),
        Some(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "DB_MAX_RETRIES",
            "DB_RETRY_DELAY",
            "AUTO_RESTART",
            "DISK_THRESHOLD",
            "DEPENDENCIES",
            "TELEGRAM_TOKEN",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn defaults_match_documented_values() {
        clear_env();
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.retry_delay_secs, 5);
        assert!(cfg.auto_restart);
        assert!(!cfg.auto_block_ip);
        assert_eq!(cfg.thresholds.disk_percent, 90);
        assert_eq!(cfg.thresholds.conn_pool_percent, 80);
        assert_eq!(cfg.thresholds.max_restarts, 3);
        assert_eq!(cfg.thresholds.restart_period_secs, 600);
        assert_eq!(cfg.dependencies, vec!["cron".to_string()]);
    }

    #[test]
    #[serial]
    fn env_overrides_apply() {
        clear_env();
        std::env::set_var("DB_MAX_RETRIES", "5");
        std::env::set_var("AUTO_RESTART", "false");
        std::env::set_var("DEPENDENCIES", "cron, php-fpm ,nginx");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.max_retries, 5);
        assert!(!cfg.auto_restart);
        assert_eq!(cfg.dependencies, vec!["cron", "php-fpm", "nginx"]);
        clear_env();
    }

    #[test]
    #[serial]
    fn invalid_numeric_is_config_error() {
        clear_env();
        std::env::set_var("DISK_THRESHOLD", "ninety");
        let err = Config::from_env().unwrap_err();
        let monitor_err = err.downcast_ref::<MonitorError>().unwrap();
        assert_eq!(monitor_err.exit_code(), crate::errors::EXIT_CONFIG);
        clear_env();
    }

    #[test]
    #[serial]
    fn invalid_boolean_is_config_error() {
        clear_env();
        std::env::set_var("AUTO_RESTART", "maybe");
        assert!(Config::from_env().is_err());
        clear_env();
    }
}
