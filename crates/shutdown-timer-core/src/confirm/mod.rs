//! Confirmation check: an optional external command whose exit status
//! decides whether a due power action proceeds.

mod cancel;
mod coordinator;
mod runner;

pub use cancel::{CancelHandle, HandleState};
pub use coordinator::ConfirmationCoordinator;
pub use runner::{CheckOutcome, CheckRunner, ShellCheckRunner};
