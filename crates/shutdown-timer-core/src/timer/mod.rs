mod countdown;
mod ticker;

pub use countdown::{CountdownState, CountdownTimer, TickOutcome};
pub use ticker::{TickSink, Ticker};
