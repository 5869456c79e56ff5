use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleState {
    Active,
    Cancelled,
    Consumed,
}

/// Cancellation handle for one outstanding check.
///
/// Moves Active -> Cancelled at most once and ends Consumed when the check
/// resolves. The runner only ever sees a clone of the inner token.
#[derive(Debug)]
pub struct CancelHandle {
    token: CancellationToken,
    state: HandleState,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            state: HandleState::Active,
        }
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    /// Token to hand to the running check.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Returns false unless the handle was still active.
    pub fn cancel(&mut self) -> bool {
        if self.state != HandleState::Active {
            return false;
        }
        self.state = HandleState::Cancelled;
        self.token.cancel();
        true
    }

    /// Marks the handle consumed and reports whether it had been cancelled.
    pub fn consume(&mut self) -> bool {
        let was_cancelled = self.state == HandleState::Cancelled;
        self.state = HandleState::Consumed;
        was_cancelled
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}
