//! Schedule values: what power action happens, when, and who owns it.

mod info;
mod mode;

pub use info::{duration_string, Origin, ScheduleInfo, ScheduleOverrides, UNSCHEDULED};
pub use mode::ScheduleMode;
