use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Verdict of one check run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckOutcome {
    /// Exited zero.
    Confirmed,
    /// Exited non-zero. `code` is `None` when the command could not be
    /// spawned or was killed by a signal.
    Failed { code: Option<i32> },
    /// The token was cancelled before the command exited.
    Canceled,
}

/// Runs a check command out of process.
///
/// There is no timeout: a check runs until it exits or `cancel` fires.
#[async_trait]
pub trait CheckRunner: Send + Sync {
    async fn run(&self, command: &str, cancel: CancellationToken) -> CheckOutcome;
}

/// Runs the command through `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellCheckRunner {
    shell: String,
}

impl ShellCheckRunner {
    pub fn new() -> Self {
        Self { shell: "sh".into() }
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellCheckRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckRunner for ShellCheckRunner {
    async fn run(&self, command: &str, cancel: CancellationToken) -> CheckOutcome {
        let spawned = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(command, error = %e, "failed to spawn check command");
                return CheckOutcome::Failed { code: None };
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(command, error = %e, "failed to kill canceled check command");
                }
                tracing::debug!(command, "check command canceled");
                CheckOutcome::Canceled
            }
            status = child.wait() => match status {
                Ok(status) if status.success() => {
                    tracing::debug!(command, "check command confirmed");
                    CheckOutcome::Confirmed
                }
                Ok(status) => {
                    tracing::debug!(command, code = ?status.code(), "check command refused");
                    CheckOutcome::Failed { code: status.code() }
                }
                Err(e) => {
                    tracing::error!(command, error = %e, "failed to wait for check command");
                    CheckOutcome::Failed { code: None }
                }
            },
        }
    }
}
