//! Shared fakes for controller integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use shutdown_timer_core::error::{ScheduleError, WatchdogError};
use shutdown_timer_core::watchdog::{ReportedSchedule, WatchdogStatus};
use shutdown_timer_core::{
    CheckOutcome, CheckRunner, Clock, Config, ConfigStore, ControlMessage, Controller,
    ControllerParts, Event, Inbox, ManualClock, PowerAction, ScheduleMode, Subscription,
    UserIntent, Watchdog,
};

pub const NOW: i64 = 1_700_000_000;
pub const CHECK: &str = "check-cmd";

/// Records every privileged call. The session becomes active on the first
/// successful call.
#[derive(Default)]
pub struct RecordingWatchdog {
    pub calls: Mutex<Vec<String>>,
    pub fail: AtomicBool,
    active: AtomicBool,
}

impl RecordingWatchdog {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<(), WatchdogError> {
        self.calls.lock().unwrap().push(call);
        if self.fail.load(Ordering::SeqCst) {
            self.active.store(false, Ordering::SeqCst);
            return Err(WatchdogError::CommandFailed {
                program: "pkexec".into(),
                code: Some(126),
                stderr: "Not authorized".into(),
            });
        }
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Watchdog for RecordingWatchdog {
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
            active: self.is_session_active(),
        })
    }
    fn is_session_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
    fn end_session(&self) {
        self.calls.lock().unwrap().push("end_session".into());
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Exits with `code` right away, or waits for cancellation when `code` is
/// `None`.
pub struct CannedRunner {
    pub code: Option<i32>,
    pub runs: AtomicUsize,
}

impl CannedRunner {
    pub fn exits(code: i32) -> Self {
        Self {
            code: Some(code),
            runs: AtomicUsize::new(0),
        }
    }

    pub fn blocks() -> Self {
        Self {
            code: None,
            runs: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CheckRunner for CannedRunner {
    async fn run(&self, _command: &str, cancel: CancellationToken) -> CheckOutcome {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match self.code {
            Some(0) => CheckOutcome::Confirmed,
            Some(code) => CheckOutcome::Failed { code: Some(code) },
            None => {
                cancel.cancelled().await;
                CheckOutcome::Canceled
            }
        }
    }
}

#[derive(Default)]
pub struct RecordingPower {
    pub executed: Mutex<Vec<ScheduleMode>>,
    pub fail: AtomicBool,
}

impl RecordingPower {
    pub fn executed(&self) -> Vec<ScheduleMode> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl PowerAction for RecordingPower {
    async fn execute(&self, mode: &ScheduleMode) -> Result<(), ScheduleError> {
        self.executed.lock().unwrap().push(mode.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ScheduleError::PowerActionFailed {
                mode: mode.clone(),
                message: "Access denied".into(),
            });
        }
        Ok(())
    }
}

/// A controller wired to fakes, with every emitted event recorded.
pub struct Harness {
    pub controller: Controller,
    pub inbox: Inbox,
    pub clock: Arc<ManualClock>,
    pub watchdog: Arc<RecordingWatchdog>,
    pub runner: Arc<CannedRunner>,
    pub power: Arc<RecordingPower>,
    pub events: Arc<Mutex<Vec<Event>>>,
    _subscription: Subscription,
}

/// Defaults plus the given check command (empty for none).
pub fn config_with_check(command: &str) -> Config {
    let mut config = Config::default();
    config.check.command = command.to_string();
    config.check.enabled = !command.is_empty();
    config
}

impl Harness {
    pub fn new(config: Config, runner: CannedRunner) -> Self {
        Self::with_store(ConfigStore::memory(config), runner)
    }

    pub fn with_store(store: ConfigStore, runner: CannedRunner) -> Self {
        let clock = Arc::new(ManualClock::new(NOW));
        let watchdog = Arc::new(RecordingWatchdog::default());
        let runner = Arc::new(runner);
        let power = Arc::new(RecordingPower::default());
        let (controller, inbox) = Controller::new(ControllerParts {
            clock: clock.clone(),
            store,
            watchdog: watchdog.clone(),
            runner: runner.clone(),
            power: power.clone(),
        });

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let subscription = controller.subscribe(move |event: &Event| {
            sink.lock().unwrap().push(event.clone());
        });

        Self {
            controller,
            inbox,
            clock,
            watchdog,
            runner,
            power,
            events,
            _subscription: subscription,
        }
    }

    pub async fn intent(&mut self, intent: UserIntent) {
        self.controller.handle(ControlMessage::Intent(intent)).await;
    }

    /// Moves the clock to the local deadline and delivers one live tick.
    pub async fn reach_deadline(&mut self) {
        let deadline = self.controller.local().deadline();
        self.clock.set(deadline);
        self.tick().await;
    }

    pub async fn tick(&mut self) {
        let generation = self.controller.tick_generation();
        self.controller.handle(ControlMessage::Tick(generation)).await;
    }

    /// Pumps the inbox until the outstanding check has resolved.
    pub async fn settle_check(&mut self) {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(5), self.inbox.recv())
                .await
                .expect("check did not finish")
                .expect("inbox closed");
            let done = matches!(message, ControlMessage::CheckFinished(_));
            self.controller.handle(message).await;
            if done {
                return;
            }
        }
    }

    /// Runs every queued privileged call and handles what it reported.
    pub async fn settle_protection(&mut self) {
        self.controller.flush_protection().await;
        while let Ok(message) = self.inbox.try_recv() {
            self.controller.handle(message).await;
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Notice { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }
}
