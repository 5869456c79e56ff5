//! Root-mode protection: the privileged watchdog that mirrors the local
//! schedule, and the loops that talk to it.
//!
//! - [`Watchdog`]: the privileged helper contract
//! - [`SystemWatchdog`]: `shutdown`/`rtcwake` through a privilege prefix
//! - [`ProtectionManager`]: start/stop policy on top of a watchdog
//! - [`ProtectionWorker`]: runs protection jobs strictly in order
//! - [`WatchdogFeed`]: polls the watchdog's own schedule

mod feed;
mod protection;
mod system;
mod worker;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{ScheduleError, WatchdogError};
use crate::schedule::{ScheduleMode, UNSCHEDULED};

pub use feed::WatchdogFeed;
pub use protection::{ProtectionManager, ProtectionStep, PROTECTION_BUFFER_MINUTES};
pub use system::{parse_scheduled_file, parse_wakealarm, SystemWatchdog};
pub use worker::{ProtectionJob, ProtectionWorker};

/// Privileged helper contract.
///
/// Implementations own their transport and security model. Every call may
/// fail; callers treat failures as non-fatal.
#[async_trait]
pub trait Watchdog: Send + Sync {
    /// Arms a deferred power action `minutes` from now.
    async fn schedule_action(&self, minutes: i64, reboot: bool) -> Result<(), WatchdogError>;

    async fn cancel_scheduled_action(&self) -> Result<(), WatchdogError>;

    /// Arms a wake timer `minutes` from now.
    async fn schedule_wake(&self, minutes: i64) -> Result<(), WatchdogError>;

    async fn cancel_wake(&self) -> Result<(), WatchdogError>;

    /// The watchdog's own view, which other tools may change at any time.
    async fn poll(&self) -> Result<WatchdogStatus, WatchdogError>;

    /// Whether a privileged session currently exists.
    fn is_session_active(&self) -> bool;

    /// Drops the privileged session, if the implementation keeps one.
    fn end_session(&self) {}
}

/// A schedule as the watchdog reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedSchedule {
    pub mode: ScheduleMode,
    pub deadline: i64,
}

impl ReportedSchedule {
    pub fn none(mode: ScheduleMode) -> Self {
        Self {
            mode,
            deadline: UNSCHEDULED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchdogStatus {
    pub schedule: ReportedSchedule,
    pub wake: ReportedSchedule,
    pub active: bool,
}

/// Everything the watchdog side reports back to the controller.
#[derive(Debug)]
pub enum WatchdogReport {
    Status(WatchdogStatus),
    ActiveChanged(bool),
    Failed(ScheduleError),
}

pub type ReportSink = Arc<dyn Fn(WatchdogReport) + Send + Sync>;
