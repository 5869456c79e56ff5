//! Change notification for the configuration file.
//!
//! Polls the file's modification time and hands every successfully parsed
//! new version to the sink, stamped with the modification time it was read
//! at. Diffing against the running state is left to the receiver.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::MissedTickBehavior;

use super::Config;
use crate::observer::TaskGuard;

/// One parsed version of the configuration file.
#[derive(Debug, Clone)]
pub struct ConfigReload {
    pub config: Config,
    /// Modification time the file had when it was read. `None` when the
    /// config did not come from a file.
    pub modified: Option<SystemTime>,
}

impl ConfigReload {
    /// Whether this version predates (or is) the store's own last write.
    pub fn is_stale(&self, written_at: Option<SystemTime>) -> bool {
        matches!((self.modified, written_at), (Some(m), Some(w)) if m <= w)
    }
}

impl From<Config> for ConfigReload {
    fn from(config: Config) -> Self {
        Self {
            config,
            modified: None,
        }
    }
}

pub type ConfigSink = Arc<dyn Fn(ConfigReload) + Send + Sync>;

pub struct ConfigWatcher {
    task: TaskGuard,
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

impl ConfigWatcher {
    pub fn spawn(path: PathBuf, period: Duration, sink: ConfigSink) -> Self {
        let handle = tokio::spawn(async move {
            let mut last = modified(&path).await;
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let current = modified(&path).await;
                if current.is_none() || current == last {
                    continue;
                }
                last = current;

                let content = match tokio::fs::read_to_string(&path).await {
                    Ok(content) => content,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "config reload failed");
                        continue;
                    }
                };
                match Config::from_toml_str(&content) {
                    Ok(config) => {
                        tracing::debug!(path = %path.display(), "config file changed");
                        sink(ConfigReload {
                            config,
                            modified: current,
                        });
                    }
                    // Keep running on the last good config until the next edit.
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config")
                    }
                }
            }
        });
        Self {
            task: TaskGuard::new("config-watcher", handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    pub fn stop(&mut self) {
        self.task.stop();
    }
}
