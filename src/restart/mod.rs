//! Rate-limited automatic restart of the monitored service.
//!
//! The coordinator is the only component allowed to take a restart action.
//! It derives its decision from the persisted restart history: at most
//! `max_restarts` restarts inside the trailing `restart_period` window,
//! after which restarts are suppressed and an escalation alert fires
//! instead.
//!
//! The restart command's output is treated as an opaque string — it is
//! logged and reported but never parsed for success. Actual recovery is
//! confirmed by the next invocation's probe, which is the single success
//! criterion this crate commits to.

use crate::config::Config;
use crate::logging::RunLog;
use crate::notify::{Alert, AlertKind, AlertSink};
use crate::state::StateDir;
use crate::sys::CommandRunner;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};

/// What the coordinator did about a probe failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    /// Rate limit tripped; escalation alert sent, no restart.
    Suppressed,
    /// Restart command executed; carries its raw output.
    Restarted(String),
    /// Not attempted at all.
    Skipped(&'static str),
}

/// Count restart records inside the trailing window (`now - t < period`).
pub fn count_recent(times: &[DateTime<Utc>], now: DateTime<Utc>, period_secs: i64) -> usize {
    times
        .iter()
        .filter(|t| {
            let age = now.signed_duration_since(**t);
            age >= Duration::zero() && age < Duration::seconds(period_secs)
        })
        .count()
}

pub struct RestartCoordinator<'a> {
    pub config: &'a Config,
    pub site: &'a str,
    pub state: &'a StateDir,
    pub runner: &'a dyn CommandRunner,
    pub sink: &'a dyn AlertSink,
    pub log: &'a RunLog,
}

impl RestartCoordinator<'_> {
    /// Decide and act on a probe failure.
    pub fn on_probe_failure(&self, now: DateTime<Utc>) -> Result<RestartOutcome> {
        if !self.config.auto_restart {
            return Ok(RestartOutcome::Skipped("disabled"));
        }

        let times = self.state.load_restart_times()?;
        let recent = count_recent(&times, now, self.config.thresholds.restart_period_secs);
        if recent >= self.config.thresholds.max_restarts {
            let text = format!(
                "{} restarts of {} within {}s — automatic restart suppressed, manual intervention required",
                recent, self.config.mysql_service, self.config.thresholds.restart_period_secs
            );
            self.log.log(&format!("Restart suppressed: {text}"));
            self.sink
                .send(&Alert::new(AlertKind::Escalation, self.site, text));
            return Ok(RestartOutcome::Suppressed);
        }

        let output = self.restart_service()?;
        self.state.append_restart_record(now)?;
        self.state.write_restart_marker(now)?;
        self.log.log(&format!("Restart: {output}"));
        self.sink.send(&Alert::new(
            AlertKind::Restart,
            self.site,
            format!(
                "{} restarted.\n<pre>{}</pre>",
                self.config.mysql_service, output
            ),
        ));
        Ok(RestartOutcome::Restarted(output))
    }

    /// On a successful probe: if a restart happened recently enough, report
    /// the recovery and clear the marker. Returns whether an alert fired.
    pub fn confirm_recovery(&self, now: DateTime<Utc>) -> Result<bool> {
        let Some(marker) = self.state.read_restart_marker()? else {
            return Ok(false);
        };
        let age = now.signed_duration_since(marker.restarted_at);
        if age > Duration::seconds(self.config.thresholds.recovery_window_secs) {
            return Ok(false);
        }
        self.log.log(&format!(
            "Recovery: {} healthy again {}s after restart",
            self.config.mysql_service,
            age.num_seconds()
        ));
        self.sink.send(&Alert::new(
            AlertKind::Recovery,
            self.site,
            format!("{} recovered after restart", self.config.mysql_service),
        ));
        self.state.clear_restart_marker()?;
        Ok(true)
    }

    fn restart_service(&self) -> Result<String> {
        let output = self
            .runner
            .run("systemctl", &["restart", &self.config.mysql_service])
            .with_context(|| format!("Failed to restart {}", self.config.mysql_service))?;
        let text = [output.stdout.trim(), output.stderr.trim()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            Ok("restart command dispatched".to_string())
        } else {
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::{CommandError, CommandOutput};
    use std::cell::RefCell;

    struct MemorySink {
        sent: RefCell<Vec<Alert>>,
    }

    impl MemorySink {
        fn new() -> Self {
            Self {
                sent: RefCell::new(Vec::new()),
            }
        }
        fn kinds(&self) -> Vec<AlertKind> {
            self.sent.borrow().iter().map(|a| a.kind).collect()
        }
    }

    impl AlertSink for MemorySink {
        fn send(&self, alert: &Alert) -> bool {
            self.sent.borrow_mut().push(alert.clone());
            true
        }
    }

    struct OkRunner;

    impl CommandRunner for OkRunner {
        fn run(&self, _program: &str, _args: &[&str]) -> Result<CommandOutput, CommandError> {
            Ok(CommandOutput {
                success: true,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    struct Fixture {
        _temp: tempfile::TempDir,
        config: Config,
        state: StateDir,
        log: RunLog,
    }

    fn fixture() -> Fixture {
        let temp = tempfile::tempdir().unwrap();
        let state = StateDir::new(temp.path().join("state")).unwrap();
        let log = RunLog::new(state.run_log_path());
        let config = test_config(temp.path());
        Fixture {
            _temp: temp,
            config,
            state,
            log,
        }
    }

    fn test_config(root: &std::path::Path) -> Config {
        use crate::config::Thresholds;
        Config {
            state_dir: root.join("state"),
            lockfile: root.join("lock"),
            site_config_path: None,
            max_retries: 3,
            retry_delay_secs: 5,
            connect_timeout_secs: 3,
            command_timeout_secs: 10,
            auto_restart: true,
            auto_block_ip: false,
            auto_update: false,
            normal_notification: false,
            debug: false,
            telegram_token: String::new(),
            telegram_chat_id: String::new(),
            mysql_service: "mysql".into(),
            dependencies: vec!["cron".into()],
            disk_paths: vec!["/var/lib/mysql".into()],
            smart_devices: vec![],
            watch_configs: vec![],
            update_base_url: String::new(),
            thresholds: Thresholds {
                disk_percent: 90,
                conn_pool_percent: 80,
                cpu_load_avg: 4.0,
                mem_percent: 90,
                login_fail_count: 5,
                max_restarts: 3,
                restart_period_secs: 600,
                recovery_window_secs: 300,
            },
        }
    }

    fn coordinator<'a>(
        f: &'a Fixture,
        sink: &'a MemorySink,
        runner: &'a OkRunner,
    ) -> RestartCoordinator<'a> {
        RestartCoordinator {
            config: &f.config,
            site: "example.com",
            state: &f.state,
            runner,
            sink,
            log: &f.log,
        }
    }

    #[test]
    fn count_recent_uses_strict_window() {
        let now = Utc::now();
        let times = vec![
            now - Duration::seconds(599),
            now - Duration::seconds(600),
            now - Duration::seconds(601),
        ];
        // Exactly period-old records fall outside: age < period is required.
        assert_eq!(count_recent(&times, now, 600), 1);
    }

    #[test]
    fn disabled_short_circuits_without_reading_history() {
        let mut f = fixture();
        f.config.auto_restart = false;
        let sink = MemorySink::new();
        let runner = OkRunner;
        let outcome = coordinator(&f, &sink, &runner)
            .on_probe_failure(Utc::now())
            .unwrap();
        assert_eq!(outcome, RestartOutcome::Skipped("disabled"));
        assert!(sink.kinds().is_empty());
    }

    #[test]
    fn fourth_restart_within_window_is_suppressed() {
        let f = fixture();
        let now = Utc::now();
        for age in [500, 300, 100] {
            f.state
                .append_restart_record(now - Duration::seconds(age))
                .unwrap();
        }
        let sink = MemorySink::new();
        let runner = OkRunner;
        let outcome = coordinator(&f, &sink, &runner).on_probe_failure(now).unwrap();
        assert_eq!(outcome, RestartOutcome::Suppressed);
        assert_eq!(sink.kinds(), vec![AlertKind::Escalation]);
        // No new record appended while suppressed.
        assert_eq!(f.state.load_restart_times().unwrap().len(), 3);
    }

    #[test]
    fn fourth_restart_after_window_elapses_proceeds() {
        let f = fixture();
        let now = Utc::now();
        // Oldest record has aged out of the 600s window.
        for age in [650, 300, 100] {
            f.state
                .append_restart_record(now - Duration::seconds(age))
                .unwrap();
        }
        let sink = MemorySink::new();
        let runner = OkRunner;
        let outcome = coordinator(&f, &sink, &runner).on_probe_failure(now).unwrap();
        assert!(matches!(outcome, RestartOutcome::Restarted(_)));
        assert_eq!(sink.kinds(), vec![AlertKind::Restart]);
        assert_eq!(f.state.load_restart_times().unwrap().len(), 4);
        assert!(f.state.read_restart_marker().unwrap().is_some());
    }

    #[test]
    fn empty_command_output_gets_placeholder() {
        let f = fixture();
        let sink = MemorySink::new();
        let runner = OkRunner;
        let outcome = coordinator(&f, &sink, &runner)
            .on_probe_failure(Utc::now())
            .unwrap();
        assert_eq!(
            outcome,
            RestartOutcome::Restarted("restart command dispatched".into())
        );
    }

    #[test]
    fn recovery_inside_window_alerts_and_clears() {
        let f = fixture();
        let now = Utc::now();
        f.state
            .write_restart_marker(now - Duration::seconds(290))
            .unwrap();
        let sink = MemorySink::new();
        let runner = OkRunner;
        let fired = coordinator(&f, &sink, &runner).confirm_recovery(now).unwrap();
        assert!(fired);
        assert_eq!(sink.kinds(), vec![AlertKind::Recovery]);
        assert!(f.state.read_restart_marker().unwrap().is_none());
    }

    #[test]
    fn recovery_outside_window_stays_silent() {
        let f = fixture();
        let now = Utc::now();
        f.state
            .write_restart_marker(now - Duration::seconds(310))
            .unwrap();
        let sink = MemorySink::new();
        let runner = OkRunner;
        let fired = coordinator(&f, &sink, &runner).confirm_recovery(now).unwrap();
        assert!(!fired);
        assert!(sink.kinds().is_empty());
    }

    #[test]
    fn recovery_without_marker_is_a_no_op() {
        let f = fixture();
        let sink = MemorySink::new();
        let runner = OkRunner;
        assert!(!coordinator(&f, &sink, &runner)
            .confirm_recovery(Utc::now())
            .unwrap());
    }
}
