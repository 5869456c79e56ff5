//! The controller: one context object that owns every component.
//!
//! All state is mutated from [`Controller::handle`], which processes one
//! [`ControlMessage`] at a time. Background work (countdown ticks, check
//! commands, privileged calls, watchdog polls, config file changes) never
//! touches state directly; it posts a message to the inbox instead.
//!
//! ## Use cases
//!
//! | intent | flow |
//! | --- | --- |
//! | start | set deadline, arm, notice, protect, auto-wake |
//! | stop | clear deadline, cancel check, unprotect, cancel auto-wake |
//! | start mode | as start, with the new mode applied before protecting |
//! | set mode | unprotect old, adopt mode, rearm, protect new |
//! | root mode | protect or unprotect, then end the privileged session |
//! | wake | schedule or cancel the wake alarm |
//!
//! When the countdown fires, the confirmation check (if any) runs first.
//! The local deadline is cleared in every outcome.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::arbiter::{self, ArbiterInput, ScheduleView};
use crate::clock::{Clock, SystemClock};
use crate::confirm::{CheckOutcome, CheckRunner, ConfirmationCoordinator, ShellCheckRunner};
use crate::error::{exit_code_text, ConfigError, ScheduleError};
use crate::events::Event;
use crate::observer::{Observers, Subscription};
use crate::power::{PowerAction, SystemPower};
use crate::schedule::{Origin, ScheduleInfo, ScheduleMode, UNSCHEDULED};
use crate::storage::{Config, ConfigReload, ConfigStore, ConfigWatcher};
use crate::timer::{CountdownTimer, TickOutcome};
use crate::watchdog::{
    ProtectionJob, ProtectionManager, ProtectionWorker, ReportSink, SystemWatchdog, Watchdog,
    WatchdogFeed, WatchdogReport,
};

/// What the display layer (or the daemon's stdin) can ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIntent {
    Start,
    Stop,
    /// Start with the given mode.
    StartMode(ScheduleMode),
    SetMode(ScheduleMode),
    /// `wake` or `no-wake`.
    Wake(ScheduleMode),
    SetRootMode(bool),
    /// Re-publish the current view.
    Status,
}

#[derive(Debug)]
pub enum ControlMessage {
    Intent(UserIntent),
    /// Countdown tick tagged with its generation.
    Tick(u64),
    CheckFinished(CheckOutcome),
    Watchdog(WatchdogReport),
    ConfigReloaded(ConfigReload),
    /// Ends [`Controller::run`].
    Shutdown,
}

pub type ControlSender = mpsc::UnboundedSender<ControlMessage>;
pub type Inbox = mpsc::UnboundedReceiver<ControlMessage>;

/// Collaborators the controller is built from.
pub struct ControllerParts {
    pub clock: Arc<dyn Clock>,
    pub store: ConfigStore,
    pub watchdog: Arc<dyn Watchdog>,
    pub runner: Arc<dyn CheckRunner>,
    pub power: Arc<dyn PowerAction>,
}

impl ControllerParts {
    /// Production wiring: system clock, `sh -c` checks, the Linux watchdog
    /// behind the configured privilege helper, and systemd power actions.
    pub fn system(store: ConfigStore) -> Self {
        let helper = store.config().root_mode.helper.clone();
        let power = if store.config().power.dry_run {
            SystemPower::dry_run()
        } else {
            SystemPower::new()
        };
        Self {
            clock: Arc::new(SystemClock),
            store,
            watchdog: Arc::new(SystemWatchdog::new(helper)),
            runner: Arc::new(ShellCheckRunner::new()),
            power: Arc::new(power),
        }
    }
}

pub struct Controller {
    clock: Arc<dyn Clock>,
    store: ConfigStore,
    timer: CountdownTimer,
    confirm: ConfirmationCoordinator,
    protection: Arc<ProtectionManager>,
    worker: ProtectionWorker,
    feed: Option<WatchdogFeed>,
    watcher: Option<ConfigWatcher>,
    power: Arc<dyn PowerAction>,
    events: Observers<Event>,
    external: ScheduleInfo,
    external_wake: ScheduleInfo,
    root_active: bool,
    /// Schedule whose check is outstanding.
    fired: Option<ScheduleInfo>,
    /// Deadline of the last countdown that fired.
    last_fired: Option<i64>,
    last_view: Option<(ScheduleView, String)>,
    tx: ControlSender,
}

fn report_sink(tx: ControlSender) -> ReportSink {
    Arc::new(move |report: WatchdogReport| {
        let _ = tx.send(ControlMessage::Watchdog(report));
    })
}

impl Controller {
    /// Builds the controller and its inbox. Must be called inside a tokio
    /// runtime. A schedule persisted by an earlier run is resumed.
    pub fn new(parts: ControllerParts) -> (Self, Inbox) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let config = parts.store.config().clone();

        let tick_tx = tx.clone();
        let timer = CountdownTimer::new(
            Duration::from_secs(config.daemon.tick_secs),
            Arc::new(move |generation: u64| {
                let _ = tick_tx.send(ControlMessage::Tick(generation));
            }),
        );
        let protection = Arc::new(ProtectionManager::new(
            Arc::clone(&parts.watchdog),
            Arc::clone(&parts.clock),
            config.root_mode.enabled,
        ));
        let worker = ProtectionWorker::spawn(Arc::clone(&protection), report_sink(tx.clone()));

        let mut controller = Self {
            clock: parts.clock,
            store: parts.store,
            timer,
            confirm: ConfirmationCoordinator::new(parts.runner),
            protection,
            worker,
            feed: None,
            watcher: None,
            power: parts.power,
            events: Observers::new(),
            external: ScheduleInfo::unscheduled(Origin::External),
            external_wake: ScheduleInfo::new(ScheduleMode::Wake, UNSCHEDULED, Origin::External),
            root_active: false,
            fired: None,
            last_fired: None,
            last_view: None,
            tx,
        };

        let local = config.local_schedule();
        if local.scheduled() {
            tracing::info!(label = %local.label(controller.clock.now()), "resuming persisted schedule");
            controller.timer.adjust_to(&local);
        }
        (controller, inbox)
    }

    /// Starts the watchdog feed and, for file-backed stores, the config
    /// watcher. Idempotent.
    pub fn start_background(&mut self) {
        let daemon = self.store.config().daemon.clone();
        if self.feed.is_none() {
            self.feed = Some(WatchdogFeed::spawn(
                Arc::clone(self.protection.watchdog()),
                Duration::from_secs(daemon.poll_secs),
                report_sink(self.tx.clone()),
            ));
        }
        if self.watcher.is_none() {
            if let Some(path) = self.store.path() {
                let tx = self.tx.clone();
                self.watcher = Some(ConfigWatcher::spawn(
                    path.to_path_buf(),
                    Duration::from_secs(daemon.config_watch_secs),
                    Arc::new(move |reload: ConfigReload| {
                        let _ = tx.send(ControlMessage::ConfigReloaded(reload));
                    }),
                ));
            }
        }
    }

    pub fn sender(&self) -> ControlSender {
        self.tx.clone()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.events.subscribe(callback)
    }

    /// Processes messages until [`ControlMessage::Shutdown`], then tears down.
    pub async fn run(mut self, mut inbox: Inbox) {
        self.start_background();
        self.publish_view(true);
        while let Some(message) = inbox.recv().await {
            if matches!(message, ControlMessage::Shutdown) {
                break;
            }
            self.handle(message).await;
        }
        self.teardown().await;
    }

    /// Stops background work in reverse construction order and waits for
    /// queued privileged calls to finish.
    pub async fn teardown(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        if let Some(mut feed) = self.feed.take() {
            feed.stop();
        }
        self.worker.flush().await;
        self.worker.stop();
        if self.confirm.cancel() {
            tracing::info!("canceled outstanding check on teardown");
        }
        self.timer.stop();
        tracing::debug!("controller stopped");
    }

    /// Waits until every queued privileged call has run.
    pub async fn flush_protection(&self) {
        self.worker.flush().await;
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn config(&self) -> &Config {
        self.store.config()
    }

    /// See [`ConfigStore::written_at`].
    pub fn config_written_at(&self) -> Option<SystemTime> {
        self.store.written_at()
    }

    pub fn local(&self) -> ScheduleInfo {
        self.store.config().local_schedule()
    }

    pub fn external(&self) -> &ScheduleInfo {
        &self.external
    }

    pub fn external_wake(&self) -> &ScheduleInfo {
        &self.external_wake
    }

    pub fn is_confirmation_pending(&self) -> bool {
        self.confirm.is_pending()
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_armed()
    }

    pub fn root_active(&self) -> bool {
        self.root_active
    }

    /// Generation of the live countdown ticker.
    pub fn tick_generation(&self) -> u64 {
        self.timer.generation()
    }

    pub fn view(&self) -> ScheduleView {
        let local = self.local();
        arbiter::arbitrate(&ArbiterInput {
            local: &local,
            external: &self.external,
            external_wake: &self.external_wake,
            confirmation_pending: self.confirm.is_pending(),
            now: self.clock.now(),
        })
    }

    pub fn toggle_label(&self) -> String {
        arbiter::toggle_label(self.store.config().shutdown_minutes(), self.root_active)
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    pub async fn handle(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Intent(intent) => self.on_intent(intent),
            ControlMessage::Tick(generation) => self.on_tick(generation).await,
            ControlMessage::CheckFinished(outcome) => self.on_check_finished(outcome).await,
            ControlMessage::Watchdog(report) => self.on_watchdog(report),
            ControlMessage::ConfigReloaded(reload) => self.on_config_reloaded(reload),
            ControlMessage::Shutdown => {}
        }
    }

    fn on_intent(&mut self, intent: UserIntent) {
        tracing::debug!(?intent, "user intent");
        match intent {
            UserIntent::Start => self.start(),
            UserIntent::Stop => self.stop(),
            UserIntent::StartMode(mode) => self.start_mode(mode),
            UserIntent::SetMode(mode) => self.set_mode(mode),
            UserIntent::Wake(mode) => self.wake(mode),
            UserIntent::SetRootMode(enabled) => self.set_root_mode(enabled),
            UserIntent::Status => self.publish_view(true),
        }
    }

    async fn on_tick(&mut self, generation: u64) {
        match self.timer.on_tick(generation, self.clock.now()) {
            TickOutcome::Stale => {}
            TickOutcome::Remaining(_) => self.publish_view(false),
            TickOutcome::Fire(info) => {
                self.last_fired = Some(info.deadline());
                self.fire(info).await
            }
        }
    }

    // ── Use cases ────────────────────────────────────────────────────

    fn start(&mut self) {
        let deadline = self.clock.now() + self.store.config().shutdown_minutes() * 60;
        self.start_at(deadline);
    }

    fn start_at(&mut self, deadline: i64) {
        self.start_with(deadline, None);
    }

    /// Arms `deadline`, switching to `mode` first when given. Protection
    /// only ever sees the final schedule.
    fn start_with(&mut self, deadline: i64, mode: Option<ScheduleMode>) {
        if self.refuse_while_pending("start") {
            return;
        }
        let now = self.clock.now();
        let old = self.local();
        let info = match mode {
            Some(mode) => old.with_mode(mode).with_deadline(deadline),
            None => old.with_deadline(deadline),
        };
        if old.mode() != info.mode() {
            tracing::info!(from = %old.mode(), to = %info.mode(), "schedule mode changed");
            if old.scheduled() {
                self.worker.submit(ProtectionJob::Stop {
                    info: old,
                    force: true,
                });
            }
        }
        self.set_local(&info);

        let minutes = info.minutes(now);
        let mut text = format!("System will shutdown in {minutes} minutes");
        if let Some(command) = self.store.config().check_command() {
            text.push('\n');
            text.push_str(command);
        }
        self.notice(text);
        self.emit(Event::ScheduleStarted {
            mode: info.mode().clone(),
            deadline,
            minutes,
            at: self.at(),
        });

        self.worker.submit(ProtectionJob::Start(info));
        if self.store.config().wake.auto_wake {
            let minutes = self.store.config().wake_minutes();
            self.worker.submit(ProtectionJob::Wake { minutes });
        }
        self.worker.submit(ProtectionJob::Refresh);
        self.publish_view(false);
    }

    fn stop(&mut self) {
        let cleared = self.local().with_deadline(UNSCHEDULED);
        self.set_local(&cleared);

        if self.confirm.cancel() {
            self.notice("Confirmation canceled".to_string());
        } else {
            self.notice("Shutdown Timer stopped".to_string());
        }
        self.emit(Event::ScheduleStopped { at: self.at() });

        self.worker.submit(ProtectionJob::Stop {
            info: cleared,
            force: false,
        });
        if self.store.config().wake.auto_wake {
            self.worker.submit(ProtectionJob::CancelWake);
        }
        self.worker.submit(ProtectionJob::Refresh);
        self.publish_view(false);
    }

    fn start_mode(&mut self, mode: ScheduleMode) {
        if matches!(mode, ScheduleMode::Wake | ScheduleMode::NoWake) {
            tracing::warn!(mode = %mode, "not a power action mode");
            return;
        }
        let deadline = self.clock.now() + self.store.config().shutdown_minutes() * 60;
        self.start_with(deadline, Some(mode));
    }

    fn set_mode(&mut self, mode: ScheduleMode) {
        if matches!(mode, ScheduleMode::Wake | ScheduleMode::NoWake) {
            tracing::warn!(mode = %mode, "not a power action mode");
            return;
        }
        if self.refuse_while_pending("mode change") {
            return;
        }
        let old = self.local();
        if old.mode() == &mode {
            return;
        }
        tracing::info!(from = %old.mode(), to = %mode, "schedule mode changed");

        if old.scheduled() {
            self.worker.submit(ProtectionJob::Stop {
                info: old.clone(),
                force: true,
            });
        }
        let new = old.with_mode(mode);
        self.set_local(&new);
        self.worker.submit(ProtectionJob::Start(new));
        self.worker.submit(ProtectionJob::Refresh);
        self.publish_view(false);
    }

    fn set_root_mode(&mut self, enabled: bool) {
        if self.store.config().root_mode.enabled == enabled {
            return;
        }
        tracing::info!(enabled, "root mode protection toggled");
        if let Err(e) = self.store.update(|c| c.root_mode.enabled = enabled) {
            self.persist_failed(e);
        }

        let local = self.local();
        if enabled {
            self.worker.submit(ProtectionJob::SetEnabled(true));
            self.worker.submit(ProtectionJob::Start(local));
        } else {
            if local.scheduled() {
                self.worker.submit(ProtectionJob::Stop {
                    info: local,
                    force: true,
                });
            }
            self.worker.submit(ProtectionJob::SetEnabled(false));
            self.worker.submit(ProtectionJob::EndSession);
        }
        self.worker.submit(ProtectionJob::Refresh);
    }

    fn wake(&mut self, mode: ScheduleMode) {
        match mode {
            ScheduleMode::Wake => {
                let minutes = self.store.config().wake_minutes();
                self.worker.submit(ProtectionJob::Wake { minutes });
            }
            ScheduleMode::NoWake => self.worker.submit(ProtectionJob::CancelWake),
            other => {
                self.fault(ScheduleError::UnknownWakeMode(other.to_string()));
                return;
            }
        }
        self.worker.submit(ProtectionJob::Refresh);
    }

    // ── Firing ───────────────────────────────────────────────────────

    async fn fire(&mut self, info: ScheduleInfo) {
        let Some(command) = self.store.config().check_command().map(str::to_string) else {
            self.execute(info).await;
            return;
        };

        // The watchdog must not act while the user is still being asked.
        if self.store.config().root_mode.cancel_on_check {
            self.worker.submit(ProtectionJob::Stop {
                info: info.clone(),
                force: true,
            });
        }

        let tx = self.tx.clone();
        let launched = self.confirm.launch(&command, move |outcome| {
            let _ = tx.send(ControlMessage::CheckFinished(outcome));
        });
        match launched {
            Ok(()) => {
                self.fired = Some(info);
                self.notice(format!("Waiting for confirmation\n{command}"));
                self.emit(Event::CheckStarted {
                    command,
                    at: self.at(),
                });
                self.publish_view(false);
            }
            Err(e) => self.fault(e),
        }
    }

    async fn on_check_finished(&mut self, outcome: CheckOutcome) {
        tracing::info!(?outcome, "check command finished");
        self.emit(Event::CheckFinished {
            outcome: outcome.clone(),
            at: self.at(),
        });
        let command = self.confirm.pending_command().unwrap_or_default().to_string();
        let info = self.fired.take().unwrap_or_else(|| self.local());
        match self.confirm.finish(outcome) {
            Ok(()) => self.execute(info).await,
            Err(err) => self.abort(info, &command, err),
        }
    }

    async fn execute(&mut self, info: ScheduleInfo) {
        let cleared = self.local().with_deadline(UNSCHEDULED);
        self.set_local(&cleared);

        let mode = info.mode().clone();
        match self.power.execute(&mode).await {
            Ok(()) => {
                self.emit(Event::ActionExecuted {
                    mode,
                    dry_run: self.power.is_dry_run(),
                    at: self.at(),
                });
                self.worker.submit(ProtectionJob::Stop { info, force: true });
            }
            // Protection stays armed as the fallback.
            Err(e) => {
                tracing::error!(error = %e, "power action failed");
                self.notice(format!("Shutdown aborted\n{e}"));
                self.emit(Event::ActionAborted {
                    mode,
                    reason: e.to_string(),
                    at: self.at(),
                });
            }
        }
        self.worker.submit(ProtectionJob::Refresh);
        self.publish_view(false);
    }

    fn abort(&mut self, info: ScheduleInfo, command: &str, err: ScheduleError) {
        tracing::warn!(error = %err, mode = %info.mode(), "power action aborted");
        match &err {
            ScheduleError::ConfirmationFailed { code } => self.notice(format!(
                "Shutdown aborted\n{command} (Code: {})",
                exit_code_text(*code)
            )),
            // The stop that canceled it already said so.
            ScheduleError::ConfirmationCanceled => {}
            other => self.notice(other.to_string()),
        }
        self.emit(Event::ActionAborted {
            mode: info.mode().clone(),
            reason: err.to_string(),
            at: self.at(),
        });

        let cleared = self.local().with_deadline(UNSCHEDULED);
        self.set_local(&cleared);
        self.worker.submit(ProtectionJob::Stop { info, force: true });
        if self.store.config().wake.auto_wake {
            self.worker.submit(ProtectionJob::CancelWake);
        }
        self.worker.submit(ProtectionJob::Refresh);
        self.publish_view(false);
    }

    // ── Feedback from background work ────────────────────────────────

    fn on_watchdog(&mut self, report: WatchdogReport) {
        match report {
            WatchdogReport::Status(status) => {
                self.external =
                    ScheduleInfo::external(status.schedule.mode, status.schedule.deadline);
                self.external_wake = ScheduleInfo::external(status.wake.mode, status.wake.deadline);
                self.set_root_active(status.active);
            }
            WatchdogReport::ActiveChanged(active) => self.set_root_active(active),
            WatchdogReport::Failed(err) => self.fault(err),
        }
        self.publish_view(false);
    }

    fn on_config_reloaded(&mut self, reload: ConfigReload) {
        // Our own writes, or a read that raced one of them.
        if reload.is_stale(self.store.written_at()) {
            tracing::debug!("ignoring config reload older than the last write");
            return;
        }
        let new = reload.config;
        let old = self.store.config().clone();
        if new == old {
            return;
        }
        tracing::info!("configuration changed on disk");

        // Schedule and root mode go through their use cases below.
        let mut adopted = new.clone();
        adopted.schedule = old.schedule.clone();
        adopted.root_mode.enabled = old.root_mode.enabled;
        self.store.replace(adopted);

        let was = old.local_schedule();
        let is = new.local_schedule();
        let mode_changed = is.mode() != was.mode();
        if is.scheduled() && is.deadline() != was.deadline() {
            if self.is_spent(is.deadline()) {
                tracing::warn!(
                    deadline = is.deadline(),
                    "ignoring expired deadline from config file"
                );
                // Put the file back in line with the running schedule.
                let current = self.local();
                self.set_local(&current);
                if mode_changed {
                    self.set_mode(is.mode().clone());
                }
            } else {
                let mode = mode_changed.then(|| is.mode().clone());
                self.start_with(is.deadline(), mode);
            }
        } else {
            if mode_changed {
                self.set_mode(is.mode().clone());
            }
            if was.scheduled() && !is.scheduled() {
                self.stop();
            }
        }
        if new.root_mode.enabled != old.root_mode.enabled {
            self.set_root_mode(new.root_mode.enabled);
        }
        self.publish_view(false);
    }

    // ── Helpers ──────────────────────────────────────────────────────

    /// Every local schedule change goes through here: persist, then rearm.
    fn set_local(&mut self, info: &ScheduleInfo) {
        let result = self.store.update(|c| {
            c.schedule.deadline = info.deadline();
            c.schedule.mode = info.mode().clone();
        });
        if let Err(e) = result {
            self.persist_failed(e);
        }
        self.timer.adjust_to(info);
    }

    /// A deadline that already passed, or that already fired, must not be
    /// armed again from outside.
    fn is_spent(&self, deadline: i64) -> bool {
        deadline <= self.clock.now() || self.last_fired == Some(deadline)
    }

    fn refuse_while_pending(&mut self, what: &str) -> bool {
        let Some(command) = self.confirm.pending_command().map(str::to_string) else {
            return false;
        };
        tracing::warn!(what, command = %command, "refused while waiting for confirmation");
        self.notice(format!("Waiting for confirmation\n{command}"));
        true
    }

    fn set_root_active(&mut self, active: bool) {
        if self.root_active == active {
            return;
        }
        self.root_active = active;
        tracing::debug!(active, "privileged session changed");
        self.emit(Event::RootActiveChanged {
            active,
            at: self.at(),
        });
    }

    fn persist_failed(&mut self, err: ConfigError) {
        tracing::warn!(error = %err, "failed to persist configuration");
        self.emit(Event::Fault {
            message: err.to_string(),
            at: self.at(),
        });
    }

    /// Logs `err` and shows it. Never fatal.
    fn fault(&mut self, err: ScheduleError) {
        let text = match &err {
            ScheduleError::RootModeProtectionFailed { cause, .. } => {
                format!("Root mode protection failed!\n{cause}")
            }
            other => other.to_string(),
        };
        match &err {
            ScheduleError::DuplicateCheck => tracing::error!(error = %err, "fault"),
            _ => tracing::warn!(error = %err, "fault"),
        }
        self.notice(text);
        self.emit(Event::Fault {
            message: err.to_string(),
            at: self.at(),
        });
    }

    fn notice(&mut self, text: String) {
        tracing::info!(notice = %text, "notice");
        if self.store.config().display.show_notices {
            self.emit(Event::Notice {
                text,
                at: self.at(),
            });
        }
    }

    /// Emits `ViewChanged` when the view or toggle label differs from the
    /// last one published, or always when `force` is set.
    fn publish_view(&mut self, force: bool) {
        let current = (self.view(), self.toggle_label());
        if !force && self.last_view.as_ref() == Some(&current) {
            return;
        }
        self.emit(Event::view_changed(&current.0, current.1.clone(), self.at()));
        self.last_view = Some(current);
    }

    fn emit(&self, event: Event) {
        self.events.notify(&event);
    }

    fn at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.clock.now(), 0).unwrap_or_default()
    }
}
