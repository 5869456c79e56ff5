use std::sync::Arc;

use super::cancel::CancelHandle;
use super::runner::{CheckOutcome, CheckRunner};
use crate::error::ScheduleError;

/// Owns the single outstanding check and its cancellation handle.
///
/// At most one check is in flight. [`launch`] spawns the runner and calls
/// `on_done` from the spawned task; the owner is expected to marshal that
/// back onto its control loop and call [`finish`] there.
///
/// [`launch`]: ConfirmationCoordinator::launch
/// [`finish`]: ConfirmationCoordinator::finish
pub struct ConfirmationCoordinator {
    runner: Arc<dyn CheckRunner>,
    pending: Option<Pending>,
}

struct Pending {
    command: String,
    handle: CancelHandle,
}

impl ConfirmationCoordinator {
    pub fn new(runner: Arc<dyn CheckRunner>) -> Self {
        Self {
            runner,
            pending: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_command(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.command.as_str())
    }

    /// Starts `command`. Fails with [`ScheduleError::DuplicateCheck`] and
    /// spawns nothing if a check is already outstanding.
    pub fn launch<F>(&mut self, command: &str, on_done: F) -> Result<(), ScheduleError>
    where
        F: FnOnce(CheckOutcome) + Send + 'static,
    {
        if let Some(pending) = &self.pending {
            tracing::error!(
                outstanding = %pending.command,
                requested = command,
                "attempted to start a second check command"
            );
            return Err(ScheduleError::DuplicateCheck);
        }

        let handle = CancelHandle::new();
        let token = handle.token();
        self.pending = Some(Pending {
            command: command.to_string(),
            handle,
        });

        let runner = Arc::clone(&self.runner);
        let command = command.to_string();
        tracing::info!(command = %command, "waiting for confirmation");
        tokio::spawn(async move {
            let outcome = runner.run(&command, token).await;
            on_done(outcome);
        });
        Ok(())
    }

    /// Cancels the outstanding check. Returns false when none is pending.
    pub fn cancel(&mut self) -> bool {
        match self.pending.as_mut() {
            Some(pending) => pending.handle.cancel(),
            None => false,
        }
    }

    /// Resolves the outstanding check and clears it.
    ///
    /// A check the user cancelled resolves as canceled even if the command
    /// managed to exit before noticing the token.
    pub fn finish(&mut self, outcome: CheckOutcome) -> Result<(), ScheduleError> {
        let cancelled = match self.pending.take() {
            Some(mut pending) => pending.handle.consume(),
            None => {
                tracing::warn!(?outcome, "check finished with nothing pending");
                false
            }
        };

        if cancelled {
            return Err(ScheduleError::ConfirmationCanceled);
        }
        match outcome {
            CheckOutcome::Confirmed => Ok(()),
            CheckOutcome::Failed { code } => Err(ScheduleError::ConfirmationFailed { code }),
            CheckOutcome::Canceled => Err(ScheduleError::ConfirmationCanceled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;
    use tokio_util::sync::CancellationToken;

    /// Waits for cancellation, or returns the canned code right away.
    struct CannedRunner {
        calls: AtomicUsize,
        code: Option<i32>,
    }

    #[async_trait]
    impl CheckRunner for CannedRunner {
        async fn run(&self, _command: &str, cancel: CancellationToken) -> CheckOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.code {
                Some(0) => CheckOutcome::Confirmed,
                Some(code) => CheckOutcome::Failed { code: Some(code) },
                None => {
                    cancel.cancelled().await;
                    CheckOutcome::Canceled
                }
            }
        }
    }

    fn coordinator(code: Option<i32>) -> (ConfirmationCoordinator, Arc<CannedRunner>) {
        let runner = Arc::new(CannedRunner {
            calls: AtomicUsize::new(0),
            code,
        });
        (ConfirmationCoordinator::new(runner.clone()), runner)
    }

    async fn launch_and_wait(c: &mut ConfirmationCoordinator) -> CheckOutcome {
        let (tx, rx) = oneshot::channel();
        c.launch("check", move |o| {
            let _ = tx.send(o);
        })
        .unwrap();
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn confirmed_check_clears_pending() {
        let (mut c, _) = coordinator(Some(0));
        let outcome = launch_and_wait(&mut c).await;
        assert!(c.is_pending());
        assert!(c.finish(outcome).is_ok());
        assert!(!c.is_pending());
    }

    #[tokio::test]
    async fn failed_check_carries_exit_code() {
        let (mut c, _) = coordinator(Some(3));
        let outcome = launch_and_wait(&mut c).await;
        assert!(matches!(
            c.finish(outcome),
            Err(ScheduleError::ConfirmationFailed { code: Some(3) })
        ));
    }

    #[tokio::test]
    async fn second_launch_is_a_fault_and_spawns_nothing() {
        let (mut c, runner) = coordinator(None);
        c.launch("first", |_| {}).unwrap();
        let second = c.launch("second", |_| {});
        assert!(matches!(second, Err(ScheduleError::DuplicateCheck)));
        assert_eq!(c.pending_command(), Some("first"));

        tokio::task::yield_now().await;
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_resolves_as_canceled() {
        let (mut c, _) = coordinator(None);
        let (tx, rx) = oneshot::channel();
        c.launch("check", move |o| {
            let _ = tx.send(o);
        })
        .unwrap();

        assert!(c.cancel());
        let outcome = rx.await.unwrap();
        assert!(matches!(
            c.finish(outcome),
            Err(ScheduleError::ConfirmationCanceled)
        ));
        assert!(!c.cancel());
    }

    #[test]
    fn cancel_wins_over_late_failure() {
        let (mut c, _) = coordinator(Some(3));
        c.pending = Some(Pending {
            command: "check".into(),
            handle: CancelHandle::new(),
        });
        assert!(c.cancel());
        assert!(matches!(
            c.finish(CheckOutcome::Failed { code: Some(143) }),
            Err(ScheduleError::ConfirmationCanceled)
        ));
    }
}
