mod config;
mod watch;

pub use config::{
    CheckConfig, Config, ConfigStore, DaemonConfig, DisplayConfig, PowerConfig, RootModeConfig,
    ScheduleConfig, SliderConfig, WakeConfig,
};
pub use watch::{ConfigReload, ConfigSink, ConfigWatcher};

use std::path::PathBuf;

/// Environment variable that overrides the configuration directory.
pub const CONFIG_DIR_ENV: &str = "SHUTDOWN_TIMER_CONFIG_DIR";

/// Returns `~/.config/shutdown-timer/`, or `$SHUTDOWN_TIMER_CONFIG_DIR` when set.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let dir = match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("shutdown-timer"),
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
