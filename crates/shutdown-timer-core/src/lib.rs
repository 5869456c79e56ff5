//! # Shutdown Timer Core Library
//!
//! This library provides the scheduling and fail-safe logic for Shutdown
//! Timer: a deferred poweroff, reboot or suspend for the local host, with a
//! live countdown, an optional confirmation check command, and root-mode
//! protection that mirrors the schedule onto a privileged watchdog.
//!
//! ## Architecture
//!
//! - **Countdown**: a generation-tagged state machine that fires at most once
//!   per arm; ticks come from a tokio interval
//! - **Confirmation**: one cancellable out-of-process check at a time
//! - **Watchdog**: privileged `shutdown`/`rtcwake` calls, run strictly in
//!   order off the control loop, plus a poll feed of the watchdog's own state
//! - **Controller**: the single context object that owns all of the above
//!   and serializes every state change through one message loop
//!
//! ## Key Components
//!
//! - [`ScheduleInfo`]: immutable schedule value
//! - [`CountdownTimer`]: local countdown
//! - [`ConfirmationCoordinator`]: check command lifecycle
//! - [`ProtectionManager`]: root-mode protection policy
//! - [`arbitrate`]: merged display view
//! - [`Controller`]: use cases and lifecycle
//! - [`ConfigStore`]: TOML configuration

pub mod arbiter;
pub mod clock;
pub mod confirm;
pub mod controller;
pub mod error;
pub mod events;
pub mod observer;
pub mod power;
pub mod schedule;
pub mod storage;
pub mod timer;
pub mod watchdog;

pub use arbiter::{arbitrate, ArbiterInput, ScheduleView};
pub use clock::{Clock, ManualClock, SystemClock};
pub use confirm::{CheckOutcome, CheckRunner, ConfirmationCoordinator, ShellCheckRunner};
pub use controller::{ControlMessage, ControlSender, Controller, ControllerParts, Inbox, UserIntent};
pub use error::{ConfigError, CoreError, ScheduleError, WatchdogError};
pub use events::Event;
pub use observer::{Observers, Subscription, TaskGuard};
pub use power::{PowerAction, SystemPower};
pub use schedule::{Origin, ScheduleInfo, ScheduleMode, UNSCHEDULED};
pub use storage::{Config, ConfigReload, ConfigStore};
pub use timer::{CountdownTimer, TickOutcome};
pub use watchdog::{ProtectionManager, SystemWatchdog, Watchdog, WatchdogStatus};
