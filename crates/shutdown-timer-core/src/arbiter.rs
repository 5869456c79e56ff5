//! Merges local and external schedule state into one displayable view.

use serde::Serialize;

use crate::schedule::ScheduleInfo;

pub const WAITING_FOR_CONFIRMATION: &str = "Waiting for confirmation";

/// Inputs the arbiter decides over.
#[derive(Debug, Clone)]
pub struct ArbiterInput<'a> {
    pub local: &'a ScheduleInfo,
    pub external: &'a ScheduleInfo,
    pub external_wake: &'a ScheduleInfo,
    pub confirmation_pending: bool,
    pub now: i64,
}

/// Immutable snapshot the display layer reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleView {
    /// First line: countdown or the waiting-for-confirmation state.
    pub headline: String,
    /// Authoritative power-action schedule; `None` while confirmation is pending.
    pub authoritative: Option<ScheduleInfo>,
    /// Secondary line for an active wake schedule.
    pub wake_line: Option<String>,
    pub confirmation_pending: bool,
}

impl ScheduleView {
    pub fn text(&self) -> String {
        match &self.wake_line {
            Some(wake) => format!("{}\n{}", self.headline, wake),
            None => self.headline.clone(),
        }
    }
}

/// Label of the start/stop toggle.
pub fn toggle_label(shutdown_minutes: i64, root_active: bool) -> String {
    let mut label = format!("{shutdown_minutes} min");
    if root_active {
        label.push_str(" (root)");
    }
    label
}

/// Label of the wake menu item, e.g. "Wake after 8 hours 24 minutes".
pub fn wake_label(wake_minutes: i64) -> String {
    let hours = wake_minutes.div_euclid(60);
    let hours = if hours != 0 {
        format!("{hours} hours ")
    } else {
        String::new()
    };
    format!("Wake after {hours}{} minutes", wake_minutes.rem_euclid(60))
}

/// Picks the schedule to show. The external schedule only wins when it is
/// strictly more urgent, so ties go to the local one.
pub fn arbitrate(input: &ArbiterInput<'_>) -> ScheduleView {
    let wake_line = input
        .external_wake
        .scheduled()
        .then(|| input.external_wake.label(input.now));

    if input.confirmation_pending {
        return ScheduleView {
            headline: WAITING_FOR_CONFIRMATION.to_string(),
            authoritative: None,
            wake_line,
            confirmation_pending: true,
        };
    }

    let winner = if input.external.is_more_urgent_than(input.local) {
        input.external
    } else {
        input.local
    };
    ScheduleView {
        headline: winner.label(input.now),
        authoritative: Some(winner.clone()),
        wake_line,
        confirmation_pending: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{Origin, ScheduleMode};

    const NOW: i64 = 1_700_000_000;

    fn input<'a>(
        local: &'a ScheduleInfo,
        external: &'a ScheduleInfo,
        wake: &'a ScheduleInfo,
        pending: bool,
    ) -> ArbiterInput<'a> {
        ArbiterInput {
            local,
            external,
            external_wake: wake,
            confirmation_pending: pending,
            now: NOW,
        }
    }

    #[test]
    fn more_urgent_schedule_wins_both_ways() {
        let no_wake = ScheduleInfo::unscheduled(Origin::Local);
        let local = ScheduleInfo::local(ScheduleMode::Poweroff, NOW + 120);
        let external = ScheduleInfo::external(ScheduleMode::Poweroff, NOW + 60);

        let view = arbitrate(&input(&local, &external, &no_wake, false));
        assert_eq!(view.authoritative.as_ref(), Some(&external));
        assert_eq!(view.headline, "1 minutes until shutdown (sys)");

        let local = local.with_deadline(NOW + 60);
        let external = external.with_deadline(NOW + 120);
        let view = arbitrate(&input(&local, &external, &no_wake, false));
        assert_eq!(view.authoritative.as_ref(), Some(&local));
        assert_eq!(view.headline, "1 minutes until shutdown");
    }

    #[test]
    fn toggle_and_wake_labels() {
        assert_eq!(toggle_label(126, false), "126 min");
        assert_eq!(toggle_label(126, true), "126 min (root)");
        assert_eq!(wake_label(504), "Wake after 8 hours 24 minutes");
        assert_eq!(wake_label(45), "Wake after 45 minutes");
    }

    #[test]
    fn nothing_scheduled_shows_title() {
        let none = ScheduleInfo::unscheduled(Origin::Local);
        let ext = ScheduleInfo::unscheduled(Origin::External);
        let view = arbitrate(&input(&none, &ext, &none, false));
        assert_eq!(view.text(), "Shutdown Timer");
    }

    #[test]
    fn pending_confirmation_supersedes_countdown_but_keeps_wake() {
        let local = ScheduleInfo::local(ScheduleMode::Poweroff, NOW - 1);
        let ext = ScheduleInfo::unscheduled(Origin::External);
        let wake = ScheduleInfo::local(ScheduleMode::Wake, NOW + 4 * 3600);
        let view = arbitrate(&input(&local, &ext, &wake, true));
        assert!(view.authoritative.is_none());
        assert_eq!(view.text(), "Waiting for confirmation\n4 hours until wakeup");
    }
}
