//! Alarm notification command.
//!
//! The configured template runs through `sh -c` with `%p` replaced by the
//! trade price and `%a` by the alarm. Substituted values are single-quoted so
//! an alarm such as `> 10000.00000000` is never read as a redirect.

use std::process::Stdio;
use std::time::Duration;
use tape_analytics::Alarm;
use tape_telemetry::Metrics;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Runs the alarm command, at most once per cooldown.
#[derive(Debug)]
pub struct AlarmNotifier {
    template: String,
    cooldown: Duration,
    last_run: Option<Instant>,
}

impl AlarmNotifier {
    pub fn new(template: impl Into<String>, cooldown: Duration) -> Self {
        Self {
            template: template.into(),
            cooldown,
            last_run: None,
        }
    }

    /// Command line for one notification.
    pub fn render(&self, price: f64, alarm: &Alarm) -> String {
        self.template
            .replace("%p", &quote(&price.to_string()))
            .replace("%a", &quote(&alarm.to_string()))
    }

    /// Spawn the command unless the previous run is within the cooldown.
    ///
    /// The handle resolves to whether the command exited successfully.
    pub fn notify(&mut self, price: f64, alarm: &Alarm) -> Option<JoinHandle<bool>> {
        let now = Instant::now();
        if let Some(last) = self.last_run {
            if now.duration_since(last) < self.cooldown {
                Metrics::alarm_command("throttled");
                debug!(alarm = %alarm, "Alarm command throttled");
                return None;
            }
        }
        self.last_run = Some(now);

        let line = self.render(price, alarm);
        info!(command = %line, "Running alarm command");

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&line)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        Some(tokio::spawn(async move {
            match command.output().await {
                Ok(output) if output.status.success() => {
                    Metrics::alarm_command("ok");
                    true
                }
                Ok(output) => {
                    Metrics::alarm_command("failed");
                    warn!(
                        status = %output.status,
                        stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                        "Alarm command failed"
                    );
                    false
                }
                Err(e) => {
                    Metrics::alarm_command("spawn_error");
                    warn!(error = %e, command = %line, "Alarm command could not start");
                    false
                }
            }
        }))
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
