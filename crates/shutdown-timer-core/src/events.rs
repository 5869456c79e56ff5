use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::arbiter::ScheduleView;
use crate::confirm::CheckOutcome;
use crate::schedule::ScheduleMode;

/// Every state change in the controller produces an Event.
/// The display layer and the daemon's JSON output subscribe to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    ScheduleStarted {
        mode: ScheduleMode,
        deadline: i64,
        minutes: i64,
        at: DateTime<Utc>,
    },
    ScheduleStopped {
        at: DateTime<Utc>,
    },
    /// The merged view changed (countdown text, winner or wake line).
    ViewChanged {
        headline: String,
        wake_line: Option<String>,
        toggle_label: String,
        confirmation_pending: bool,
        at: DateTime<Utc>,
    },
    /// Transient user-facing text.
    Notice {
        text: String,
        at: DateTime<Utc>,
    },
    CheckStarted {
        command: String,
        at: DateTime<Utc>,
    },
    CheckFinished {
        outcome: CheckOutcome,
        at: DateTime<Utc>,
    },
    ActionExecuted {
        mode: ScheduleMode,
        dry_run: bool,
        at: DateTime<Utc>,
    },
    /// The due action was not carried out.
    ActionAborted {
        mode: ScheduleMode,
        reason: String,
        at: DateTime<Utc>,
    },
    /// The privileged helper session started or ended.
    RootActiveChanged {
        active: bool,
        at: DateTime<Utc>,
    },
    /// An error reported to the user and logged; the controller keeps running.
    Fault {
        message: String,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn view_changed(view: &ScheduleView, toggle_label: String, at: DateTime<Utc>) -> Self {
        Event::ViewChanged {
            headline: view.headline.clone(),
            wake_line: view.wake_line.clone(),
            toggle_label,
            confirmation_pending: view.confirmation_pending,
            at,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::ScheduleStarted { at, .. }
            | Event::ScheduleStopped { at }
            | Event::ViewChanged { at, .. }
            | Event::Notice { at, .. }
            | Event::CheckStarted { at, .. }
            | Event::CheckFinished { at, .. }
            | Event::ActionExecuted { at, .. }
            | Event::ActionAborted { at, .. }
            | Event::RootActiveChanged { at, .. }
            | Event::Fault { at, .. } => *at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let json = serde_json::to_value(Event::ScheduleStarted {
            mode: ScheduleMode::Reboot,
            deadline: 1_700_000_600,
            minutes: 10,
            at,
        })
        .unwrap();
        assert_eq!(json["type"], "ScheduleStarted");
        assert_eq!(json["mode"], "reboot");

        let json = serde_json::to_value(Event::CheckFinished {
            outcome: CheckOutcome::Failed { code: Some(3) },
            at,
        })
        .unwrap();
        assert_eq!(json["outcome"]["kind"], "failed");
        assert_eq!(json["outcome"]["code"], 3);
    }
}
