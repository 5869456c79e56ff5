use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Power action (or wake action) a schedule performs.
///
/// Unrecognized strings are kept verbatim in [`ScheduleMode::Other`] so a
/// value written by a newer tool survives a load/save cycle. Only the
/// display text substitutes "shutdown" for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScheduleMode {
    Poweroff,
    Reboot,
    Suspend,
    Wake,
    NoWake,
    Other(String),
}

impl ScheduleMode {
    /// Modes a user can pick for the local power-action schedule.
    pub const POWER_MODES: [ScheduleMode; 3] =
        [ScheduleMode::Suspend, ScheduleMode::Poweroff, ScheduleMode::Reboot];

    pub fn as_str(&self) -> &str {
        match self {
            ScheduleMode::Poweroff => "poweroff",
            ScheduleMode::Reboot => "reboot",
            ScheduleMode::Suspend => "suspend",
            ScheduleMode::Wake => "wake",
            ScheduleMode::NoWake => "no-wake",
            ScheduleMode::Other(raw) => raw,
        }
    }

    /// Human text used in labels.
    pub fn display_text(&self) -> &'static str {
        match self {
            ScheduleMode::Suspend => "suspend",
            ScheduleMode::Reboot => "reboot",
            ScheduleMode::Wake => "wakeup",
            _ => "shutdown",
        }
    }

    /// Menu label for the mode picker.
    pub fn menu_label(&self) -> &'static str {
        match self {
            ScheduleMode::Suspend => "Suspend",
            ScheduleMode::Reboot => "Restart",
            ScheduleMode::Wake => "Wake after",
            ScheduleMode::NoWake => "No Wake",
            _ => "Power Off",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ScheduleMode::Other(_))
    }
}

impl Default for ScheduleMode {
    fn default() -> Self {
        ScheduleMode::Poweroff
    }
}

impl From<&str> for ScheduleMode {
    fn from(raw: &str) -> Self {
        match raw {
            "poweroff" => ScheduleMode::Poweroff,
            "reboot" => ScheduleMode::Reboot,
            "suspend" => ScheduleMode::Suspend,
            "wake" => ScheduleMode::Wake,
            "no-wake" => ScheduleMode::NoWake,
            other => ScheduleMode::Other(other.to_string()),
        }
    }
}

impl From<String> for ScheduleMode {
    fn from(raw: String) -> Self {
        match ScheduleMode::from(raw.as_str()) {
            ScheduleMode::Other(_) => ScheduleMode::Other(raw),
            known => known,
        }
    }
}

impl From<ScheduleMode> for String {
    fn from(mode: ScheduleMode) -> Self {
        match mode {
            ScheduleMode::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for ScheduleMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ScheduleMode::from(s))
    }
}

impl fmt::Display for ScheduleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_modes_parse() {
        assert_eq!(ScheduleMode::from("reboot"), ScheduleMode::Reboot);
        assert_eq!(ScheduleMode::from("no-wake"), ScheduleMode::NoWake);
        assert_eq!("suspend".parse::<ScheduleMode>().unwrap(), ScheduleMode::Suspend);
    }

    #[test]
    fn unknown_mode_is_preserved_but_shown_as_shutdown() {
        let mode = ScheduleMode::from("hibernate");
        assert_eq!(mode.as_str(), "hibernate");
        assert_eq!(mode.display_text(), "shutdown");
        assert!(!mode.is_known());
    }

    #[test]
    fn serde_uses_plain_strings() {
        let json = serde_json::to_string(&ScheduleMode::NoWake).unwrap();
        assert_eq!(json, "\"no-wake\"");
        let back: ScheduleMode = serde_json::from_str("\"hybrid-sleep\"").unwrap();
        assert_eq!(back, ScheduleMode::Other("hybrid-sleep".into()));
    }
}
