use serde::{Deserialize, Serialize};

use super::ScheduleMode;

/// Deadline sentinel for "nothing scheduled".
pub const UNSCHEDULED: i64 = -1;

/// Who owns a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Timed by this process's countdown.
    #[default]
    Local,
    /// Reported by the privileged watchdog or another agent.
    External,
}

/// Field overrides for [`ScheduleInfo::copy`]. `None` keeps the old value.
#[derive(Debug, Clone, Default)]
pub struct ScheduleOverrides {
    pub mode: Option<ScheduleMode>,
    pub deadline: Option<i64>,
    pub origin: Option<Origin>,
}

/// Immutable description of one schedule.
///
/// Derived values (`seconds_left`, `minutes`, `label`) are computed from
/// the caller's `now` on every read and never cached. A negative
/// `seconds_left` means the deadline passed but nothing acted on it yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleInfo {
    mode: ScheduleMode,
    deadline: i64,
    origin: Origin,
}

impl ScheduleInfo {
    pub fn new(mode: ScheduleMode, deadline: i64, origin: Origin) -> Self {
        Self {
            mode,
            deadline,
            origin,
        }
    }

    pub fn local(mode: ScheduleMode, deadline: i64) -> Self {
        Self::new(mode, deadline, Origin::Local)
    }

    pub fn external(mode: ScheduleMode, deadline: i64) -> Self {
        Self::new(mode, deadline, Origin::External)
    }

    pub fn unscheduled(origin: Origin) -> Self {
        Self::new(ScheduleMode::default(), UNSCHEDULED, origin)
    }

    /// New instance with the named fields replaced.
    pub fn copy(&self, overrides: ScheduleOverrides) -> Self {
        Self {
            mode: overrides.mode.unwrap_or_else(|| self.mode.clone()),
            deadline: overrides.deadline.unwrap_or(self.deadline),
            origin: overrides.origin.unwrap_or(self.origin),
        }
    }

    pub fn with_deadline(&self, deadline: i64) -> Self {
        self.copy(ScheduleOverrides {
            deadline: Some(deadline),
            ..Default::default()
        })
    }

    pub fn with_mode(&self, mode: ScheduleMode) -> Self {
        self.copy(ScheduleOverrides {
            mode: Some(mode),
            ..Default::default()
        })
    }

    // ── Fields ───────────────────────────────────────────────────────

    pub fn mode(&self) -> &ScheduleMode {
        &self.mode
    }

    pub fn deadline(&self) -> i64 {
        self.deadline
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn is_external(&self) -> bool {
        self.origin == Origin::External
    }

    // ── Derived ──────────────────────────────────────────────────────

    /// Negative deadlines other than the sentinel are treated as
    /// unscheduled too, so a hand-edited store can never fire instantly.
    pub fn scheduled(&self) -> bool {
        self.deadline > UNSCHEDULED
    }

    pub fn seconds_left(&self, now: i64) -> i64 {
        self.deadline - now
    }

    pub fn minutes(&self, now: i64) -> i64 {
        self.seconds_left(now).div_euclid(60)
    }

    pub fn mode_text(&self) -> &'static str {
        self.mode.display_text()
    }

    pub fn label(&self, now: i64) -> String {
        if !self.scheduled() {
            return "Shutdown Timer".to_string();
        }
        let mut label = format!(
            "{} until {}",
            duration_string(self.seconds_left(now)),
            self.mode_text()
        );
        if self.is_external() {
            label.push_str(" (sys)");
        }
        label
    }

    /// Soonest deadline wins; unscheduled is always least urgent.
    pub fn is_more_urgent_than(&self, other: &ScheduleInfo) -> bool {
        self.scheduled() && (!other.scheduled() || self.deadline < other.deadline)
    }
}

/// Coarse remaining-time text: hours from three hours up, seconds below a
/// minute, minutes otherwise.
pub fn duration_string(seconds: i64) -> String {
    let minutes = seconds.div_euclid(60);
    let hours = minutes.div_euclid(60);
    if hours >= 3 {
        return format!("{hours} hours");
    }
    if minutes == 0 {
        return format!("{seconds} seconds");
    }
    format!("{minutes} minutes")
}
