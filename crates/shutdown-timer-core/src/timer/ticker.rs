//! Periodic tick source.
//!
//! A [`Ticker`] owns one tokio interval task that calls its sink with the
//! generation number it was spawned with. Dropping the ticker aborts the
//! task, so replacing a ticker can never leave two sources running.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::observer::TaskGuard;

/// Receives `generation` on every tick.
pub type TickSink = Arc<dyn Fn(u64) + Send + Sync>;

#[derive(Debug)]
pub struct Ticker {
    _task: TaskGuard,
}

impl Ticker {
    /// Spawns the interval task. Must be called inside a tokio runtime.
    pub fn spawn(period: Duration, generation: u64, sink: TickSink) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(
                tokio::time::Instant::now() + period,
                period,
            );
            // A stalled loop gets one catch-up tick, not a burst.
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                sink(generation);
            }
        });
        Self {
            _task: TaskGuard::new("countdown-ticker", handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test(start_paused = true)]
    async fn ticks_carry_generation_until_dropped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let ticker = Ticker::spawn(
            Duration::from_secs(1),
            7,
            Arc::new(move |g| sink_seen.lock().unwrap().push(g)),
        );

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(*seen.lock().unwrap(), vec![7, 7, 7]);

        drop(ticker);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(seen.lock().unwrap().len(), 3);
    }
}
