//! TOML-based application configuration.
//!
//! Stores user preferences and the persisted local schedule:
//! - Local deadline and mode
//! - Shutdown and wake slider positions
//! - Root-mode protection and the privilege helper
//! - Confirmation check command
//! - Display toggles and daemon loop periods
//!
//! Configuration is stored at `~/.config/shutdown-timer/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::data_dir;
use crate::error::ConfigError;
use crate::schedule::{ScheduleInfo, ScheduleMode, UNSCHEDULED};

/// Persisted local schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Epoch seconds; -1 when nothing is scheduled.
    #[serde(default = "default_deadline")]
    pub deadline: i64,
    #[serde(default)]
    pub mode: ScheduleMode,
}

/// Slider position (percent) and the minutes it maps to at 100%.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliderConfig {
    #[serde(default = "default_shutdown_slider")]
    pub slider: u32,
    #[serde(default = "default_shutdown_max")]
    pub max_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeConfig {
    #[serde(default)]
    pub auto_wake: bool,
    #[serde(default = "default_wake_slider")]
    pub slider: u32,
    #[serde(default = "default_wake_max")]
    pub max_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootModeConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Tear protection down before the check command runs.
    #[serde(default = "default_true")]
    pub cancel_on_check: bool,
    /// Privilege prefix for helper commands.
    #[serde(default = "default_helper")]
    pub helper: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConfig {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_true")]
    pub show_notices: bool,
    #[serde(default = "default_true")]
    pub show_wake_items: bool,
    #[serde(default)]
    pub show_textboxes: bool,
    /// Comma-separated power modes offered in the mode picker.
    #[serde(default = "default_shown_modes")]
    pub shown_modes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
    #[serde(default = "default_config_watch_secs")]
    pub config_watch_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerConfig {
    /// Log the power action instead of running it.
    #[serde(default)]
    pub dry_run: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/shutdown-timer/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub shutdown: SliderConfig,
    #[serde(default)]
    pub wake: WakeConfig,
    #[serde(default)]
    pub root_mode: RootModeConfig,
    #[serde(default)]
    pub check: CheckConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub power: PowerConfig,
}

// Default functions
fn default_deadline() -> i64 {
    UNSCHEDULED
}
fn default_shutdown_slider() -> u32 {
    70
}
fn default_shutdown_max() -> u32 {
    180
}
fn default_wake_slider() -> u32 {
    35
}
fn default_wake_max() -> u32 {
    1440
}
fn default_true() -> bool {
    true
}
fn default_helper() -> Vec<String> {
    vec!["pkexec".to_string()]
}
fn default_shown_modes() -> String {
    "suspend,poweroff,reboot".into()
}
fn default_tick_secs() -> u64 {
    1
}
fn default_poll_secs() -> u64 {
    5
}
fn default_config_watch_secs() -> u64 {
    2
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            deadline: default_deadline(),
            mode: ScheduleMode::default(),
        }
    }
}

impl Default for SliderConfig {
    fn default() -> Self {
        Self {
            slider: default_shutdown_slider(),
            max_minutes: default_shutdown_max(),
        }
    }
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            auto_wake: false,
            slider: default_wake_slider(),
            max_minutes: default_wake_max(),
        }
    }
}

impl Default for RootModeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cancel_on_check: true,
            helper: default_helper(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_notices: true,
            show_wake_items: true,
            show_textboxes: false,
            shown_modes: default_shown_modes(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            poll_secs: default_poll_secs(),
            config_watch_secs: default_config_watch_secs(),
        }
    }
}

/// floor(slider / 100 * max)
fn slider_minutes(slider: u32, max_minutes: u32) -> i64 {
    i64::from(slider) * i64::from(max_minutes) / 100
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as integer")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn flatten(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
        match value {
            serde_json::Value::Object(map) => {
                for (k, v) in map {
                    let key = if prefix.is_empty() {
                        k.clone()
                    } else {
                        format!("{prefix}.{k}")
                    };
                    Self::flatten(&key, v, out);
                }
            }
            serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
            other => out.push((prefix.to_string(), other.to_string())),
        }
    }

    /// Parse a TOML document, filling missing keys with defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let cfg: Config =
            toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// Rejects values the scheduler cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| {
            Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            })
        };
        if self.shutdown.slider > 100 {
            return invalid("shutdown.slider", "must be between 0 and 100");
        }
        if self.wake.slider > 100 {
            return invalid("wake.slider", "must be between 0 and 100");
        }
        if self.daemon.tick_secs == 0 {
            return invalid("daemon.tick_secs", "must be at least 1");
        }
        if self.daemon.poll_secs == 0 {
            return invalid("daemon.poll_secs", "must be at least 1");
        }
        if self.daemon.config_watch_secs == 0 {
            return invalid("daemon.config_watch_secs", "must be at least 1");
        }
        if self.root_mode.helper.iter().any(|arg| arg.is_empty()) {
            return invalid("root_mode.helper", "arguments must not be empty");
        }
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without persisting it.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed
    /// or fails validation. `self` is unchanged on error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Every leaf key with its value, sorted by key.
    pub fn list(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            Self::flatten("", &json, &mut out);
        }
        out.sort();
        out
    }

    // ── Derived values ───────────────────────────────────────────────

    /// Local schedule as stored.
    pub fn local_schedule(&self) -> ScheduleInfo {
        ScheduleInfo::local(self.schedule.mode.clone(), self.schedule.deadline)
    }

    pub fn shutdown_minutes(&self) -> i64 {
        slider_minutes(self.shutdown.slider, self.shutdown.max_minutes)
    }

    pub fn wake_minutes(&self) -> i64 {
        slider_minutes(self.wake.slider, self.wake.max_minutes)
    }

    /// The check command, when enabled and non-empty.
    pub fn check_command(&self) -> Option<&str> {
        let command = self.check.command.trim();
        (self.check.enabled && !command.is_empty()).then_some(command)
    }

    /// Power modes offered in the picker. Unknown entries are dropped.
    pub fn shown_modes(&self) -> Vec<ScheduleMode> {
        self.display
            .shown_modes
            .split(',')
            .map(|raw| ScheduleMode::from(raw.trim().to_lowercase()))
            .filter(|mode| ScheduleMode::POWER_MODES.contains(mode))
            .collect()
    }
}

/// A [`Config`] bound to the file it persists to.
///
/// [`ConfigStore::memory`] keeps everything in memory, which is what the
/// tests use.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    config: Config,
    /// File mtime as this store last read or wrote it.
    written_at: Option<SystemTime>,
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl ConfigStore {
    /// Open the default location, see [`data_dir`].
    pub fn open() -> Result<Self, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("config.toml"),
            message: e.to_string(),
        })?;
        Self::at(dir.join("config.toml"))
    }

    /// Load from `path`, writing the defaults there if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed,
    /// or if the default config cannot be written.
    pub fn at(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = match std::fs::read_to_string(&path) {
            Ok(content) => Config::from_toml_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.clone(),
                message: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut store = Self {
                    path: Some(path.clone()),
                    config: Config::default(),
                    written_at: None,
                };
                store.save()?;
                tracing::info!(path = %path.display(), "wrote default configuration");
                return Ok(store);
            }
            Err(e) => {
                return Err(ConfigError::LoadFailed {
                    path,
                    message: e.to_string(),
                })
            }
        };
        Ok(Self {
            written_at: file_mtime(&path),
            path: Some(path),
            config,
        })
    }

    pub fn memory(config: Config) -> Self {
        Self {
            path: None,
            config,
            written_at: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Modification time of the file's last version this store produced or
    /// loaded. A reload stamped at or before it is not news. `None` for
    /// in-memory stores.
    pub fn written_at(&self) -> Option<SystemTime> {
        self.written_at
    }

    /// Persist to disk. A no-op for in-memory stores.
    pub fn save(&mut self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.clone(),
            message,
        };
        let content = self.config.to_toml_string()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        self.written_at = file_mtime(path);
        Ok(())
    }

    /// Apply `change` and persist the result.
    pub fn update<F>(&mut self, change: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut Config),
    {
        change(&mut self.config);
        self.save()
    }

    /// Adopt a config read elsewhere, without writing it back.
    pub fn replace(&mut self, config: Config) {
        self.config = config;
    }

    /// Set by dot-path key and persist.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.config.set(key, value)?;
        self.save()
    }

    /// Restore defaults and persist.
    pub fn reset(&mut self) -> Result<(), ConfigError> {
        self.config = Config::default();
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = cfg.to_toml_string().unwrap();
        let parsed = Config::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_default_values() {
        let cfg = Config::default();
        assert_eq!(cfg.schedule.deadline, -1);
        assert_eq!(cfg.schedule.mode, ScheduleMode::Poweroff);
        assert_eq!(cfg.shutdown.slider, 70);
        assert_eq!(cfg.shutdown.max_minutes, 180);
        assert!(!cfg.wake.auto_wake);
        assert!(!cfg.root_mode.enabled);
        assert!(cfg.root_mode.cancel_on_check);
        assert_eq!(cfg.root_mode.helper, vec!["pkexec"]);
        assert_eq!(cfg.daemon.tick_secs, 1);
        assert!(!cfg.power.dry_run);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg = Config::from_toml_str("[schedule]\ndeadline = 1700000600\n").unwrap();
        assert_eq!(cfg.schedule.deadline, 1_700_000_600);
        assert_eq!(cfg.schedule.mode, ScheduleMode::Poweroff);
        assert_eq!(cfg.shutdown.slider, 70);
    }

    #[test]
    fn unknown_mode_survives_roundtrip() {
        let cfg = Config::from_toml_str("[schedule]\nmode = \"hibernate\"\n").unwrap();
        assert_eq!(cfg.schedule.mode, ScheduleMode::from("hibernate"));
        let again = Config::from_toml_str(&cfg.to_toml_string().unwrap()).unwrap();
        assert_eq!(again.get("schedule.mode").as_deref(), Some("hibernate"));
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("root_mode.enabled").as_deref(), Some("false"));
        assert_eq!(cfg.get("shutdown.slider").as_deref(), Some("70"));
        assert_eq!(cfg.get("schedule.mode").as_deref(), Some("poweroff"));
        assert!(cfg.get("shutdown.missing_key").is_none());
        assert!(cfg.get("").is_none());
    }

    #[test]
    fn set_updates_typed_values() {
        let mut cfg = Config::default();
        cfg.set("root_mode.enabled", "true").unwrap();
        cfg.set("schedule.deadline", "-1").unwrap();
        cfg.set("shutdown.slider", "50").unwrap();
        cfg.set("check.command", "ping -c1 example.org").unwrap();
        cfg.set("root_mode.helper", r#"["sudo","-n"]"#).unwrap();
        assert!(cfg.root_mode.enabled);
        assert_eq!(cfg.shutdown.slider, 50);
        assert_eq!(cfg.check.command, "ping -c1 example.org");
        assert_eq!(cfg.root_mode.helper, vec!["sudo", "-n"]);
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("shutdown.nonexistent_key", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn set_rejects_invalid_type_and_range() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("root_mode.enabled", "not_a_bool"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            cfg.set("shutdown.slider", "101"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(cfg.set("shutdown.slider", "-5").is_err());
        assert_eq!(cfg.shutdown.slider, 70);
    }

    #[test]
    fn slider_minutes_are_floored() {
        let mut cfg = Config::default();
        assert_eq!(cfg.shutdown_minutes(), 126);
        assert_eq!(cfg.wake_minutes(), 504);
        cfg.shutdown.slider = 1;
        cfg.shutdown.max_minutes = 150;
        assert_eq!(cfg.shutdown_minutes(), 1);
        cfg.shutdown.slider = 0;
        assert_eq!(cfg.shutdown_minutes(), 0);
    }

    #[test]
    fn check_command_requires_enabled_and_text() {
        let mut cfg = Config::default();
        cfg.check.command = "true".into();
        assert_eq!(cfg.check_command(), None);
        cfg.check.enabled = true;
        assert_eq!(cfg.check_command(), Some("true"));
        cfg.check.command = "   ".into();
        assert_eq!(cfg.check_command(), None);
    }

    #[test]
    fn shown_modes_drops_unknown_entries() {
        let mut cfg = Config::default();
        cfg.display.shown_modes = " Reboot, hibernate ,suspend,wake".into();
        assert_eq!(
            cfg.shown_modes(),
            vec![ScheduleMode::Reboot, ScheduleMode::Suspend]
        );
    }

    #[test]
    fn list_is_sorted_and_complete() {
        let list = Config::default().list();
        let keys: Vec<&str> = list.iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        assert!(keys.contains(&"schedule.deadline"));
        assert!(keys.contains(&"power.dry_run"));
    }

    #[test]
    fn store_writes_defaults_and_persists_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut store = ConfigStore::at(&path).unwrap();
        assert!(path.exists());

        store.set("wake.auto_wake", "true").unwrap();
        store
            .update(|c| c.schedule.deadline = 1_700_000_600)
            .unwrap();

        let reopened = ConfigStore::at(&path).unwrap();
        assert!(reopened.config().wake.auto_wake);
        assert_eq!(reopened.config().schedule.deadline, 1_700_000_600);

        let mut reopened = reopened;
        reopened.reset().unwrap();
        assert_eq!(ConfigStore::at(&path).unwrap().config(), &Config::default());
    }

    #[test]
    fn store_remembers_its_own_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut store = ConfigStore::at(&path).unwrap();
        let loaded = store.written_at();
        assert!(loaded.is_some());

        store.update(|c| c.schedule.deadline = 1_700_000_600).unwrap();
        let written = store.written_at().unwrap();
        assert!(written >= loaded.unwrap());
        assert_eq!(
            Some(written),
            std::fs::metadata(&path).unwrap().modified().ok()
        );
        assert_eq!(ConfigStore::memory(Config::default()).written_at(), None);
    }

    #[test]
    fn store_rejects_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[shutdown\nslider = ").unwrap();
        assert!(matches!(
            ConfigStore::at(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
    }
}
