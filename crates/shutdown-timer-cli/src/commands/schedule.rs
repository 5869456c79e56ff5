use chrono::Utc;
use serde::Serialize;
use shutdown_timer_core::arbiter::{toggle_label, wake_label};
use shutdown_timer_core::watchdog::ReportedSchedule;
use shutdown_timer_core::{
    arbitrate, ArbiterInput, ConfigError, ConfigStore, ScheduleInfo, ScheduleMode, ScheduleView,
    SystemWatchdog, Watchdog, WatchdogStatus,
};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

fn power_mode(raw: &str) -> Result<ScheduleMode, ConfigError> {
    let mode = ScheduleMode::from(raw.trim().to_lowercase());
    if ScheduleMode::POWER_MODES.contains(&mode) {
        Ok(mode)
    } else {
        Err(ConfigError::InvalidValue {
            key: "schedule.mode".into(),
            message: format!("'{raw}' is not one of poweroff, reboot, suspend"),
        })
    }
}

pub fn start(minutes: Option<u32>, mode: Option<String>) -> CmdResult {
    let mut store = ConfigStore::open()?;
    let mode = mode.as_deref().map(power_mode).transpose()?;
    let minutes = minutes
        .map(i64::from)
        .unwrap_or_else(|| store.config().shutdown_minutes());
    let now = Utc::now().timestamp();

    store.update(|config| {
        config.schedule.deadline = now + minutes * 60;
        if let Some(mode) = mode {
            config.schedule.mode = mode;
        }
    })?;

    println!("{}", store.config().local_schedule().label(now));
    Ok(())
}

pub fn stop() -> CmdResult {
    let mut store = ConfigStore::open()?;
    store.update(|config| config.schedule.deadline = shutdown_timer_core::UNSCHEDULED)?;
    println!("Shutdown Timer stopped");
    Ok(())
}

pub fn set_mode(raw: &str) -> CmdResult {
    let mode = power_mode(raw)?;
    let mut store = ConfigStore::open()?;
    store.update(|config| config.schedule.mode = mode.clone())?;
    println!("mode: {}", mode.menu_label());
    Ok(())
}

#[derive(Serialize)]
struct StatusReport {
    view: ScheduleView,
    local: ScheduleInfo,
    external: ScheduleInfo,
    wake: ScheduleInfo,
    toggle_label: String,
    wake_label: String,
    root_mode: bool,
    check_command: Option<String>,
    shown_modes: Vec<ScheduleMode>,
}

fn poll_watchdog(helper: Vec<String>) -> WatchdogStatus {
    let unscheduled = || WatchdogStatus {
        schedule: ReportedSchedule::none(ScheduleMode::Poweroff),
        wake: ReportedSchedule::none(ScheduleMode::Wake),
        active: false,
    };
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::warn!(error = %e, "could not start runtime for watchdog poll");
            return unscheduled();
        }
    };
    let watchdog = SystemWatchdog::new(helper);
    match rt.block_on(watchdog.poll()) {
        Ok(status) => status,
        Err(e) => {
            tracing::warn!(error = %e, "watchdog poll failed");
            unscheduled()
        }
    }
}

pub fn status(json: bool) -> CmdResult {
    let store = ConfigStore::open()?;
    let config = store.config();
    let now = Utc::now().timestamp();

    let polled = poll_watchdog(config.root_mode.helper.clone());
    let local = config.local_schedule();
    let external = ScheduleInfo::external(polled.schedule.mode, polled.schedule.deadline);
    let wake = ScheduleInfo::external(polled.wake.mode, polled.wake.deadline);

    let view = arbitrate(&ArbiterInput {
        local: &local,
        external: &external,
        external_wake: &wake,
        confirmation_pending: false,
        now,
    });
    let toggle = toggle_label(config.shutdown_minutes(), polled.active);

    if json {
        let report = StatusReport {
            view,
            local,
            external,
            wake,
            toggle_label: toggle,
            wake_label: wake_label(config.wake_minutes()),
            root_mode: config.root_mode.enabled,
            check_command: config.check_command().map(str::to_string),
            shown_modes: config.shown_modes(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", view.text());
        println!("toggle: {toggle}");
    }
    Ok(())
}
