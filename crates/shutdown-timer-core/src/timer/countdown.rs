//! Countdown timer for the local schedule.
//!
//! The timer is a small state machine; time comes from the caller.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> (adjust_to scheduled) -> Armed -> (deadline reached) -> Fire -> Idle
//!                                  Armed -> (adjust_to unscheduled | stop) -> Idle
//! ```
//!
//! Every arm bumps a generation counter. Ticks are tagged with the
//! generation of the ticker that produced them, and ticks from any other
//! generation are ignored. That is what keeps firing at-most-once when a
//! late tick arrives after the timer already fired or was rearmed.

use std::time::Duration;

use serde::Serialize;

use super::ticker::{TickSink, Ticker};
use crate::schedule::ScheduleInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CountdownState {
    Idle,
    Armed,
}

/// Result of feeding one tick into the timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Tick from a replaced or disarmed source.
    Stale,
    /// Still counting; carries the seconds left.
    Remaining(i64),
    /// Deadline reached. Emitted once per arm; the timer is Idle afterwards.
    Fire(ScheduleInfo),
}

struct Armed {
    info: ScheduleInfo,
    generation: u64,
    _ticker: Option<Ticker>,
}

pub struct CountdownTimer {
    period: Duration,
    sink: Option<TickSink>,
    armed: Option<Armed>,
    generation: u64,
}

impl CountdownTimer {
    /// Timer that spawns its own tick source on every arm.
    pub fn new(period: Duration, sink: TickSink) -> Self {
        Self {
            period,
            sink: Some(sink),
            armed: None,
            generation: 0,
        }
    }

    /// Timer without a tick source. The caller drives [`on_tick`] itself.
    ///
    /// [`on_tick`]: CountdownTimer::on_tick
    pub fn manual() -> Self {
        Self {
            period: Duration::from_secs(1),
            sink: None,
            armed: None,
            generation: 0,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> CountdownState {
        if self.armed.is_some() {
            CountdownState::Armed
        } else {
            CountdownState::Idle
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Generation of the active tick source; stale once disarmed.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn info(&self) -> Option<&ScheduleInfo> {
        self.armed.as_ref().map(|a| &a.info)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Rearms for a scheduled `info`, disarms otherwise. Rearming always
    /// replaces the previous tick source.
    pub fn adjust_to(&mut self, info: &ScheduleInfo) {
        self.disarm();
        if !info.scheduled() {
            return;
        }
        self.generation += 1;
        let ticker = self
            .sink
            .as_ref()
            .map(|sink| Ticker::spawn(self.period, self.generation, sink.clone()));
        tracing::debug!(
            generation = self.generation,
            deadline = info.deadline(),
            mode = %info.mode(),
            "countdown armed"
        );
        self.armed = Some(Armed {
            info: info.clone(),
            generation: self.generation,
            _ticker: ticker,
        });
    }

    /// Feed one tick. Ticks are expected to be processed serially.
    pub fn on_tick(&mut self, generation: u64, now: i64) -> TickOutcome {
        let Some(armed) = self.armed.as_ref() else {
            return TickOutcome::Stale;
        };
        if armed.generation != generation {
            return TickOutcome::Stale;
        }

        let seconds_left = armed.info.seconds_left(now);
        if seconds_left > 0 {
            return TickOutcome::Remaining(seconds_left);
        }

        // Disarm before handing the info out so a queued tick finds Idle.
        let fired = self.armed.take().map(|a| a.info);
        match fired {
            Some(info) => {
                tracing::info!(mode = %info.mode(), seconds_left, "countdown reached deadline");
                TickOutcome::Fire(info)
            }
            None => TickOutcome::Stale,
        }
    }

    /// Unconditionally disarms and releases the tick source.
    pub fn stop(&mut self) {
        self.disarm();
    }

    fn disarm(&mut self) {
        if let Some(armed) = self.armed.take() {
            tracing::debug!(generation = armed.generation, "countdown disarmed");
        }
    }
}

impl std::fmt::Debug for CountdownTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountdownTimer")
            .field("state", &self.state())
            .field("generation", &self.generation)
            .field("info", &self.info())
            .finish()
    }
}
