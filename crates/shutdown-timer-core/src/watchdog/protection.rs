//! Start/stop policy for root-mode protection.
//!
//! Insures that shutdown is executed even if the local countdown dies, by
//! scheduling the same action in the privileged watchdog one minute later
//! than the local deadline. Suspend is not insured.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{Watchdog, WatchdogStatus};
use crate::clock::Clock;
use crate::error::{ProtectionOp, ScheduleError, WatchdogError};
use crate::schedule::{ScheduleInfo, ScheduleMode};

/// Extra minutes the watchdog waits past the local deadline, so the local
/// timer always gets the first chance to act.
pub const PROTECTION_BUFFER_MINUTES: i64 = 1;

/// Whether a call reached the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionStep {
    Applied,
    Skipped,
}

pub struct ProtectionManager {
    watchdog: Arc<dyn Watchdog>,
    clock: Arc<dyn Clock>,
    enabled: AtomicBool,
}

impl ProtectionManager {
    pub fn new(watchdog: Arc<dyn Watchdog>, clock: Arc<dyn Clock>, enabled: bool) -> Self {
        Self {
            watchdog,
            clock,
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn watchdog(&self) -> &Arc<dyn Watchdog> {
        &self.watchdog
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_session_active(&self) -> bool {
        self.watchdog.is_session_active()
    }

    pub fn end_session(&self) {
        self.watchdog.end_session();
    }

    /// Mirrors a scheduled poweroff/reboot into the watchdog.
    pub async fn maybe_start(&self, info: &ScheduleInfo) -> Result<ProtectionStep, ScheduleError> {
        if !info.scheduled() || !self.is_enabled() {
            return Ok(ProtectionStep::Skipped);
        }
        let minutes = info.minutes(self.clock.now()) + PROTECTION_BUFFER_MINUTES;
        let reboot = match info.mode() {
            ScheduleMode::Poweroff => false,
            ScheduleMode::Reboot => true,
            other => {
                tracing::debug!(mode = %other, "no root mode protection started");
                return Ok(ProtectionStep::Skipped);
            }
        };
        tracing::debug!(label = %info.label(self.clock.now()), minutes, "start root mode protection");
        self.watchdog
            .schedule_action(minutes, reboot)
            .await
            .map_err(|cause| failed(ProtectionOp::Enable, cause))?;
        Ok(ProtectionStep::Applied)
    }

    /// Cancels the watchdog's action when `force` is set or `info` is no
    /// longer scheduled.
    pub async fn maybe_stop(
        &self,
        info: &ScheduleInfo,
        force: bool,
    ) -> Result<ProtectionStep, ScheduleError> {
        if !(force || !info.scheduled()) || !self.is_enabled() {
            return Ok(ProtectionStep::Skipped);
        }
        match info.mode() {
            ScheduleMode::Poweroff | ScheduleMode::Reboot => {
                tracing::debug!(mode = %info.mode(), "stop root mode protection");
                self.watchdog
                    .cancel_scheduled_action()
                    .await
                    .map_err(|cause| failed(ProtectionOp::Disable, cause))?;
                Ok(ProtectionStep::Applied)
            }
            other => {
                tracing::debug!(mode = %other, "no root mode protection stopped");
                Ok(ProtectionStep::Skipped)
            }
        }
    }

    /// Wake calls are not gated by the protection toggle.
    pub async fn wake(&self, minutes: i64) -> Result<(), ScheduleError> {
        self.watchdog
            .schedule_wake(minutes)
            .await
            .map_err(|cause| failed(ProtectionOp::Wake, cause))
    }

    pub async fn cancel_wake(&self) -> Result<(), ScheduleError> {
        self.watchdog
            .cancel_wake()
            .await
            .map_err(|cause| failed(ProtectionOp::CancelWake, cause))
    }

    pub async fn status(&self) -> Result<WatchdogStatus, ScheduleError> {
        self.watchdog
            .poll()
            .await
            .map_err(|cause| failed(ProtectionOp::Poll, cause))
    }
}

fn failed(operation: ProtectionOp, cause: WatchdogError) -> ScheduleError {
    ScheduleError::RootModeProtectionFailed { operation, cause }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::schedule::Origin;
    use crate::watchdog::ReportedSchedule;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const NOW: i64 = 1_700_000_000;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl Recorder {
        fn record(&self, call: String) -> Result<(), WatchdogError> {
            self.calls.lock().unwrap().push(call);
            if self.fail {
                Err(WatchdogError::CommandFailed {
                    program: "pkexec".into(),
                    code: Some(126),
                    stderr: "Not authorized".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Watchdog for Recorder {
        async fn schedule_action(&self, minutes: i64, reboot: bool) -> Result<(), WatchdogError> {
            self.record(format!("schedule_action({minutes}, {reboot})"))
        }
        async fn cancel_scheduled_action(&self) -> Result<(), WatchdogError> {
            self.record("cancel_scheduled_action".into())
        }
        async fn schedule_wake(&self, minutes: i64) -> Result<(), WatchdogError> {
            self.record(format!("schedule_wake({minutes})"))
        }
        async fn cancel_wake(&self) -> Result<(), WatchdogError> {
            self.record("cancel_wake".into())
        }
        async fn poll(&self) -> Result<WatchdogStatus, WatchdogError> {
            Ok(WatchdogStatus {
                schedule: ReportedSchedule::none(ScheduleMode::Poweroff),
                wake: ReportedSchedule::none(ScheduleMode::Wake),
                active: false,
            })
        }
        fn is_session_active(&self) -> bool {
            false
        }
    }

    fn manager(enabled: bool, fail: bool) -> (ProtectionManager, Arc<Recorder>) {
        let recorder = Arc::new(Recorder {
            fail,
            ..Default::default()
        });
        let manager = ProtectionManager::new(
            recorder.clone(),
            Arc::new(ManualClock::new(NOW)),
            enabled,
        );
        (manager, recorder)
    }

    fn calls(recorder: &Recorder) -> Vec<String> {
        recorder.calls.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn poweroff_is_buffered_by_one_minute() {
        let (manager, recorder) = manager(true, false);
        let info = ScheduleInfo::local(ScheduleMode::Poweroff, NOW + 600);
        assert_eq!(manager.maybe_start(&info).await.unwrap(), ProtectionStep::Applied);
        assert_eq!(calls(&recorder), vec!["schedule_action(11, false)"]);
    }

    #[tokio::test]
    async fn reboot_is_protected_as_reboot() {
        let (manager, recorder) = manager(true, false);
        let info = ScheduleInfo::local(ScheduleMode::Reboot, NOW + 125);
        manager.maybe_start(&info).await.unwrap();
        assert_eq!(calls(&recorder), vec!["schedule_action(3, true)"]);
    }

    #[tokio::test]
    async fn suspend_is_not_insured() {
        let (manager, recorder) = manager(true, false);
        let info = ScheduleInfo::local(ScheduleMode::Suspend, NOW + 600);
        assert_eq!(manager.maybe_start(&info).await.unwrap(), ProtectionStep::Skipped);
        assert!(calls(&recorder).is_empty());
    }

    #[tokio::test]
    async fn disabled_manager_never_calls_watchdog() {
        let (manager, recorder) = manager(false, false);
        let info = ScheduleInfo::local(ScheduleMode::Poweroff, NOW + 600);
        manager.maybe_start(&info).await.unwrap();
        manager.maybe_stop(&info, true).await.unwrap();
        assert!(calls(&recorder).is_empty());
    }

    #[tokio::test]
    async fn stop_needs_force_while_still_scheduled() {
        let (manager, recorder) = manager(true, false);
        let scheduled = ScheduleInfo::local(ScheduleMode::Poweroff, NOW + 600);
        assert_eq!(
            manager.maybe_stop(&scheduled, false).await.unwrap(),
            ProtectionStep::Skipped
        );
        manager.maybe_stop(&scheduled, true).await.unwrap();
        manager
            .maybe_stop(&ScheduleInfo::unscheduled(Origin::Local), false)
            .await
            .unwrap();
        assert_eq!(
            calls(&recorder),
            vec!["cancel_scheduled_action", "cancel_scheduled_action"]
        );
    }

    #[tokio::test]
    async fn watchdog_failure_is_wrapped() {
        let (manager, _) = manager(true, true);
        let info = ScheduleInfo::local(ScheduleMode::Poweroff, NOW + 600);
        let err = manager.maybe_start(&info).await.unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::RootModeProtectionFailed {
                operation: ProtectionOp::Enable,
                ..
            }
        ));
    }
}
