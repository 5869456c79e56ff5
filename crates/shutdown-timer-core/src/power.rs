//! Power action execution.
//!
//! Executes the due action through systemd, or only logs it in dry-run
//! mode.

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::ScheduleError;
use crate::schedule::ScheduleMode;

#[async_trait]
pub trait PowerAction: Send + Sync {
    async fn execute(&self, mode: &ScheduleMode) -> Result<(), ScheduleError>;

    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Runs `systemctl poweroff|reboot|suspend`.
#[derive(Debug, Clone)]
pub struct SystemPower {
    /// Log only; the host keeps running.
    dry_run: bool,
}

impl SystemPower {
    pub fn new() -> Self {
        Self { dry_run: false }
    }

    /// Logs the due action instead of calling systemctl.
    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }
}

impl Default for SystemPower {
    fn default() -> Self {
        Self::new()
    }
}

/// systemctl verb for a mode. Unknown modes power off, as their label says.
pub fn systemctl_verb(mode: &ScheduleMode) -> &'static str {
    match mode {
        ScheduleMode::Reboot => "reboot",
        ScheduleMode::Suspend => "suspend",
        _ => "poweroff",
    }
}

#[async_trait]
impl PowerAction for SystemPower {
    fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    async fn execute(&self, mode: &ScheduleMode) -> Result<(), ScheduleError> {
        let verb = systemctl_verb(mode);
        if self.dry_run {
            tracing::info!(mode = %mode, verb, "dry run: skipping power action");
            return Ok(());
        }

        tracing::info!(mode = %mode, verb, "executing power action");
        let output = Command::new("systemctl")
            .arg(verb)
            .output()
            .await
            .map_err(|e| ScheduleError::PowerActionFailed {
                mode: mode.clone(),
                message: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(ScheduleError::PowerActionFailed {
                mode: mode.clone(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
