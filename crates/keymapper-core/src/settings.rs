// Keymapper Settings Module
// User defaults for trigger timings and action repetition

use std::path::{Path, PathBuf};

const DEFAULT_LONG_PRESS_DELAY: u32 = 500;
const DEFAULT_DOUBLE_PRESS_DELAY: u32 = 300;
const DEFAULT_SEQUENCE_TRIGGER_TIMEOUT: u32 = 2000;
const DEFAULT_VIBRATE_DURATION: u32 = 200;
const DEFAULT_REPEAT_DELAY: u32 = 400;
const DEFAULT_REPEAT_RATE: u32 = 50;
const DEFAULT_HOLD_DOWN_DURATION: u32 = 1000;

/// Default timings used when a trigger or action leaves its own value unset
///
/// These settings are loaded from a TOML file
/// (default: ~/.config/keymapper/settings.toml). Every value is in
/// milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    long_press_delay: u32,
    double_press_delay: u32,
    sequence_trigger_timeout: u32,
    vibrate_duration: u32,
    repeat_delay: u32,
    repeat_rate: u32,
    hold_down_duration: u32,

    /// Path to the settings file (for reload)
    source_path: Option<PathBuf>,
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("Invalid setting value: {0}")]
    InvalidValue(String),
}

/// TOML representation for deserializing settings
#[derive(Debug, Clone, serde::Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SettingsToml {
    #[serde(default)]
    trigger: Option<TriggerSettings>,

    #[serde(default)]
    action: Option<ActionSettings>,
}

#[derive(Debug, Clone, serde::Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TriggerSettings {
    #[serde(default)]
    long_press_delay: Option<u32>,
    #[serde(default)]
    double_press_delay: Option<u32>,
    #[serde(default)]
    sequence_trigger_timeout: Option<u32>,
    #[serde(default)]
    vibrate_duration: Option<u32>,
}

#[derive(Debug, Clone, serde::Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ActionSettings {
    #[serde(default)]
    repeat_delay: Option<u32>,
    #[serde(default)]
    repeat_rate: Option<u32>,
    #[serde(default)]
    hold_down_duration: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    /// Create settings with the built-in defaults
    pub fn new() -> Self {
        Self {
            long_press_delay: DEFAULT_LONG_PRESS_DELAY,
            double_press_delay: DEFAULT_DOUBLE_PRESS_DELAY,
            sequence_trigger_timeout: DEFAULT_SEQUENCE_TRIGGER_TIMEOUT,
            vibrate_duration: DEFAULT_VIBRATE_DURATION,
            repeat_delay: DEFAULT_REPEAT_DELAY,
            repeat_rate: DEFAULT_REPEAT_RATE,
            hold_down_duration: DEFAULT_HOLD_DOWN_DURATION,
            source_path: None,
        }
    }

    /// Load settings from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(&path)?;
        let mut settings = Self::from_toml(&content)?;
        settings.source_path = Some(path.as_ref().to_path_buf());
        Ok(settings)
    }

    /// Load settings from TOML string
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let toml_settings: SettingsToml =
            toml::from_str(content).map_err(|e| SettingsError::TomlParse(e.to_string()))?;

        let mut settings = Self::new();

        if let Some(trigger) = toml_settings.trigger {
            if let Some(value) = trigger.long_press_delay {
                settings.long_press_delay = non_zero("trigger.long_press_delay", value)?;
            }
            if let Some(value) = trigger.double_press_delay {
                settings.double_press_delay = non_zero("trigger.double_press_delay", value)?;
            }
            if let Some(value) = trigger.sequence_trigger_timeout {
                settings.sequence_trigger_timeout =
                    non_zero("trigger.sequence_trigger_timeout", value)?;
            }
            if let Some(value) = trigger.vibrate_duration {
                settings.vibrate_duration = non_zero("trigger.vibrate_duration", value)?;
            }
        }

        if let Some(action) = toml_settings.action {
            if let Some(value) = action.repeat_delay {
                settings.repeat_delay = value;
            }
            if let Some(value) = action.repeat_rate {
                settings.repeat_rate = non_zero("action.repeat_rate", value)?;
            }
            if let Some(value) = action.hold_down_duration {
                settings.hold_down_duration = non_zero("action.hold_down_duration", value)?;
            }
        }

        Ok(settings)
    }

    /// Get the default settings path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("keymapper").join("settings.toml"))
    }

    /// Load from default location (~/.config/keymapper/settings.toml)
    pub fn load_default() -> Result<Self, SettingsError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::from_file(path);
            }
        }
        // Return default settings if file doesn't exist
        Ok(Self::new())
    }

    /// Reload settings from the original file
    pub fn reload(&mut self) -> Result<(), SettingsError> {
        if let Some(ref path) = self.source_path {
            let new_settings = Self::from_file(path)?;
            *self = new_settings;
            Ok(())
        } else {
            Err(SettingsError::InvalidValue("No source path set".to_string()))
        }
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// How long a key must stay down to count as a long press
    pub fn long_press_delay(&self) -> u32 {
        self.long_press_delay
    }

    /// Window in which a second press turns a short press into a double press
    pub fn double_press_delay(&self) -> u32 {
        self.double_press_delay
    }

    /// Time allowed between consecutive keys of a sequence trigger
    pub fn sequence_trigger_timeout(&self) -> u32 {
        self.sequence_trigger_timeout
    }

    pub fn vibrate_duration(&self) -> u32 {
        self.vibrate_duration
    }

    /// Delay before an action starts repeating
    pub fn repeat_delay(&self) -> u32 {
        self.repeat_delay
    }

    /// Interval between repeats
    pub fn repeat_rate(&self) -> u32 {
        self.repeat_rate
    }

    /// How long a repeating held-down action stays down per repeat
    pub fn hold_down_duration(&self) -> u32 {
        self.hold_down_duration
    }

    pub fn set_long_press_delay(&mut self, delay: u32) {
        self.long_press_delay = delay;
    }

    pub fn set_double_press_delay(&mut self, delay: u32) {
        self.double_press_delay = delay;
    }

    pub fn set_sequence_trigger_timeout(&mut self, timeout: u32) {
        self.sequence_trigger_timeout = timeout;
    }

    pub fn set_repeat_delay(&mut self, delay: u32) {
        self.repeat_delay = delay;
    }

    pub fn set_repeat_rate(&mut self, rate: u32) {
        self.repeat_rate = rate;
    }
}

fn non_zero(name: &str, value: u32) -> Result<u32, SettingsError> {
    if value == 0 {
        return Err(SettingsError::InvalidValue(format!(
            "{} must be greater than zero",
            name
        )));
    }
    Ok(value)
}

/// Create default settings content for a new installation
pub fn default_settings_content() -> &'static str {
    r#"# Keymapper Settings
# Default timings used when a key map does not set its own.
# Place this file at: ~/.config/keymapper/settings.toml
# All values are in milliseconds.

[trigger]
long_press_delay = 500
double_press_delay = 300
sequence_trigger_timeout = 2000
vibrate_duration = 200

[action]
repeat_delay = 400
repeat_rate = 50
hold_down_duration = 1000
"#
}
