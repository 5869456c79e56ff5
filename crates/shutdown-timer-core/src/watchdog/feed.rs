//! Poll loop over the watchdog's own schedule.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use super::{ReportSink, Watchdog, WatchdogReport};
use crate::error::{ProtectionOp, ScheduleError};
use crate::observer::TaskGuard;

/// Reports the watchdog's schedule, wake alarm and session flag every
/// `period`, plus an `ActiveChanged` whenever the session flag flips.
/// The first failed poll of a streak is reported as `Failed`.
///
/// The loop runs until [`stop`](WatchdogFeed::stop) or drop.
pub struct WatchdogFeed {
    task: TaskGuard,
}

impl WatchdogFeed {
    pub fn spawn(watchdog: Arc<dyn Watchdog>, period: Duration, sink: ReportSink) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_active: Option<bool> = None;
            let mut failing = false;
            loop {
                interval.tick().await;
                match watchdog.poll().await {
                    Ok(status) => {
                        if failing {
                            tracing::info!("watchdog poll recovered");
                            failing = false;
                        }
                        let active = status.active;
                        sink(WatchdogReport::Status(status));
                        if last_active != Some(active) {
                            last_active = Some(active);
                            sink(WatchdogReport::ActiveChanged(active));
                        }
                    }
                    // Reported once per failure streak; the next success clears it.
                    Err(e) if !failing => {
                        tracing::warn!(error = %e, "watchdog poll failed");
                        failing = true;
                        sink(WatchdogReport::Failed(ScheduleError::RootModeProtectionFailed {
                            operation: ProtectionOp::Poll,
                            cause: e,
                        }));
                    }
                    Err(e) => tracing::trace!(error = %e, "watchdog poll still failing"),
                }
            }
        });
        Self {
            task: TaskGuard::new("watchdog-feed", handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    pub fn stop(&mut self) {
        self.task.stop();
    }
}
