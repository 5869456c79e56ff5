//! Core error types for shutdown-timer-core.
//!
//! This module defines the error hierarchy using thiserror. Schedule
//! errors are the user-facing failure kinds of the countdown pipeline;
//! watchdog and config errors are the causes they wrap.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::schedule::ScheduleMode;

/// Core error type for shutdown-timer-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Scheduling, confirmation and protection errors
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Privileged helper operations, named for logs and notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionOp {
    Enable,
    Disable,
    Wake,
    CancelWake,
    Poll,
}

impl fmt::Display for ProtectionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtectionOp::Enable => "EnableRootModeProtection",
            ProtectionOp::Disable => "DisableRootModeProtection",
            ProtectionOp::Wake => "ScheduleWake",
            ProtectionOp::CancelWake => "CancelWake",
            ProtectionOp::Poll => "PollWatchdog",
        };
        f.write_str(name)
    }
}

/// Failure kinds of the schedule pipeline.
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// The user stopped the schedule while a check was outstanding.
    #[error("Confirmation canceled")]
    ConfirmationCanceled,

    /// The check command exited non-zero (or died without an exit code).
    #[error("Shutdown aborted: check command exited with code {}", exit_code_text(*.code))]
    ConfirmationFailed { code: Option<i32> },

    /// A privileged helper call failed. Never fatal.
    #[error("Root mode protection failed ({operation}): {cause}")]
    RootModeProtectionFailed {
        operation: ProtectionOp,
        #[source]
        cause: WatchdogError,
    },

    /// A second check was launched while one was outstanding.
    #[error("Confirmation canceled: attempted to start a second check command")]
    DuplicateCheck,

    #[error("Unknown wake mode: {0}")]
    UnknownWakeMode(String),

    #[error("Failed to {mode} the system: {message}")]
    PowerActionFailed { mode: ScheduleMode, message: String },
}

/// Renders an optional exit code the way notices show it.
pub fn exit_code_text(code: Option<i32>) -> String {
    code.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string())
}

/// Errors raised by the privileged watchdog helper.
#[derive(Error, Debug)]
pub enum WatchdogError {
    /// Could not start the helper process at all.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The helper ran but reported failure.
    #[error("{program} exited with code {}: {stderr}", exit_code_text(*.code))]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("watchdog IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed watchdog state: {0}")]
    Parse(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
