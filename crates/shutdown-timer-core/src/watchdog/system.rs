//! Watchdog backed by systemd's `shutdown` and util-linux `rtcwake`.
//!
//! Commands run through a privilege prefix (`pkexec` by default). The
//! scheduled shutdown is read back from the file systemd-logind keeps
//! while one is pending, and the wake alarm from the RTC's sysfs node.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::process::Command;

use super::{ReportedSchedule, Watchdog, WatchdogStatus};
use crate::error::WatchdogError;
use crate::schedule::ScheduleMode;

const SCHEDULED_FILE: &str = "/run/systemd/shutdown/scheduled";
const WAKEALARM_FILE: &str = "/sys/class/rtc/rtc0/wakealarm";

#[derive(Debug)]
pub struct SystemWatchdog {
    helper: Vec<String>,
    scheduled_file: PathBuf,
    wakealarm_file: PathBuf,
    active: AtomicBool,
}

impl SystemWatchdog {
    pub fn new(helper: Vec<String>) -> Self {
        Self {
            helper,
            scheduled_file: PathBuf::from(SCHEDULED_FILE),
            wakealarm_file: PathBuf::from(WAKEALARM_FILE),
            active: AtomicBool::new(false),
        }
    }

    /// Reads state from other locations (tests, non-default RTC).
    pub fn with_state_files(
        mut self,
        scheduled_file: impl Into<PathBuf>,
        wakealarm_file: impl Into<PathBuf>,
    ) -> Self {
        self.scheduled_file = scheduled_file.into();
        self.wakealarm_file = wakealarm_file.into();
        self
    }

    async fn privileged(&self, program: &str, args: &[String]) -> Result<(), WatchdogError> {
        let mut argv: Vec<String> = self.helper.clone();
        argv.push(program.to_string());
        argv.extend(args.iter().cloned());
        let (bin, rest) = argv
            .split_first()
            .ok_or_else(|| WatchdogError::Parse("empty helper command".into()))?;

        tracing::debug!(command = ?argv, "running privileged helper");
        let output = Command::new(bin)
            .args(rest)
            .output()
            .await
            .map_err(|source| {
                self.active.store(false, Ordering::SeqCst);
                WatchdogError::Spawn {
                    program: bin.clone(),
                    source,
                }
            })?;

        if !output.status.success() {
            self.active.store(false, Ordering::SeqCst);
            return Err(WatchdogError::CommandFailed {
                program: program.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Watchdog for SystemWatchdog {
    async fn schedule_action(&self, minutes: i64, reboot: bool) -> Result<(), WatchdogError> {
        let mut args = Vec::new();
        if reboot {
            args.push("-r".to_string());
        }
        args.push(format!("+{}", minutes.max(0)));
        self.privileged("shutdown", &args).await
    }

    async fn cancel_scheduled_action(&self) -> Result<(), WatchdogError> {
        self.privileged("shutdown", &["-c".to_string()]).await
    }

    async fn schedule_wake(&self, minutes: i64) -> Result<(), WatchdogError> {
        let args = [
            "-m".to_string(),
            "no".to_string(),
            "-s".to_string(),
            (minutes.max(0) * 60).to_string(),
        ];
        self.privileged("rtcwake", &args).await
    }

    async fn cancel_wake(&self) -> Result<(), WatchdogError> {
        self.privileged("rtcwake", &["-m".to_string(), "disable".to_string()])
            .await
    }

    async fn poll(&self) -> Result<WatchdogStatus, WatchdogError> {
        let schedule = match read_optional(&self.scheduled_file).await? {
            Some(content) => parse_scheduled_file(&content)?,
            None => ReportedSchedule::none(ScheduleMode::Poweroff),
        };
        let wake = match read_optional(&self.wakealarm_file).await? {
            Some(content) => parse_wakealarm(&content)?,
            None => ReportedSchedule::none(ScheduleMode::Wake),
        };
        Ok(WatchdogStatus {
            schedule,
            wake,
            active: self.is_session_active(),
        })
    }

    fn is_session_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn end_session(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>, WatchdogError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Parses systemd's pending-shutdown file (`USEC=` and `MODE=` lines).
pub fn parse_scheduled_file(content: &str) -> Result<ReportedSchedule, WatchdogError> {
    let mut usec: Option<i64> = None;
    let mut mode = ScheduleMode::Poweroff;
    for line in content.lines() {
        if let Some(value) = line.strip_prefix("USEC=") {
            let parsed = value
                .trim()
                .parse::<i64>()
                .map_err(|e| WatchdogError::Parse(format!("USEC={value}: {e}")))?;
            usec = Some(parsed);
        } else if let Some(value) = line.strip_prefix("MODE=") {
            mode = ScheduleMode::from(value.trim());
        }
    }
    Ok(match usec {
        Some(usec) => ReportedSchedule {
            mode,
            deadline: usec / 1_000_000,
        },
        None => ReportedSchedule::none(mode),
    })
}

/// Parses the RTC wake alarm (epoch seconds, empty when disarmed).
pub fn parse_wakealarm(content: &str) -> Result<ReportedSchedule, WatchdogError> {
    let value = content.trim();
    if value.is_empty() {
        return Ok(ReportedSchedule::none(ScheduleMode::Wake));
    }
    let deadline = value
        .parse::<i64>()
        .map_err(|e| WatchdogError::Parse(format!("wakealarm {value}: {e}")))?;
    Ok(ReportedSchedule {
        mode: ScheduleMode::Wake,
        deadline,
    })
}
