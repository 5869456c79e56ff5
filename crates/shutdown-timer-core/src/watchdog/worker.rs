//! Ordered execution of protection jobs.
//!
//! Privileged calls can block for a long time (a polkit prompt waits for
//! the user), so the control loop never awaits them directly. It queues
//! jobs here instead; one task runs them in submission order and reports
//! failures and fresh watchdog state back through the sink.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::{ProtectionManager, ReportSink, WatchdogReport};
use crate::observer::TaskGuard;
use crate::schedule::ScheduleInfo;

#[derive(Debug)]
pub enum ProtectionJob {
    Start(ScheduleInfo),
    Stop { info: ScheduleInfo, force: bool },
    Wake { minutes: i64 },
    CancelWake,
    SetEnabled(bool),
    EndSession,
    /// Poll the watchdog and report its status.
    Refresh,
    /// Completes once every job queued before it has run.
    Barrier(oneshot::Sender<()>),
}

pub struct ProtectionWorker {
    tx: mpsc::UnboundedSender<ProtectionJob>,
    task: TaskGuard,
}

impl ProtectionWorker {
    pub fn spawn(manager: Arc<ProtectionManager>, sink: ReportSink) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ProtectionJob>();
        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                run_job(&manager, &sink, job).await;
            }
        });
        Self {
            tx,
            task: TaskGuard::new("protection-worker", handle),
        }
    }

    pub fn submit(&self, job: ProtectionJob) {
        if let Err(e) = self.tx.send(job) {
            tracing::warn!(job = ?e.0, "protection worker is gone; job dropped");
        }
    }

    /// Waits until every job submitted so far has finished.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.submit(ProtectionJob::Barrier(tx));
        let _ = rx.await;
    }

    pub fn stop(&mut self) {
        self.task.stop();
    }
}

async fn run_job(manager: &ProtectionManager, sink: &ReportSink, job: ProtectionJob) {
    let was_active = manager.is_session_active();
    let result = match job {
        ProtectionJob::Start(info) => manager.maybe_start(&info).await.map(drop),
        ProtectionJob::Stop { info, force } => manager.maybe_stop(&info, force).await.map(drop),
        ProtectionJob::Wake { minutes } => manager.wake(minutes).await,
        ProtectionJob::CancelWake => manager.cancel_wake().await,
        ProtectionJob::SetEnabled(enabled) => {
            manager.set_enabled(enabled);
            Ok(())
        }
        ProtectionJob::EndSession => {
            manager.end_session();
            Ok(())
        }
        ProtectionJob::Refresh => match manager.status().await {
            Ok(status) => {
                sink(WatchdogReport::Status(status));
                Ok(())
            }
            Err(e) => Err(e),
        },
        ProtectionJob::Barrier(done) => {
            let _ = done.send(());
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::warn!(error = %e, "root mode protection failed");
        sink(WatchdogReport::Failed(e));
    }

    let is_active = manager.is_session_active();
    if is_active != was_active {
        sink(WatchdogReport::ActiveChanged(is_active));
    }
}
