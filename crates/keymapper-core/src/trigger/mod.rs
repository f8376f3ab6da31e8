// Keymapper Trigger Model
// Click types, trigger modes and the Trigger value

pub mod key;

use std::fmt;

use crate::keycode::can_detect_when_screen_off;
use crate::settings::Settings;

pub use key::{
    new_uid, AssistantKind, AssistantTriggerKey, EvdevDeviceInfo, EvdevTriggerKey,
    FingerprintGesture, FingerprintTriggerKey, FloatingButtonKey, KeyEventTriggerKey, TriggerKey,
    TriggerKeyDevice,
};

/// How a key must be pressed to count as activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum ClickType {
    #[default]
    ShortPress = 0,
    LongPress = 1,
    DoublePress = 2,
    /// Not yet classified
    Undetermined = 3,
}

impl ClickType {
    /// Create ClickType from i32 value
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(ClickType::ShortPress),
            1 => Some(ClickType::LongPress),
            2 => Some(ClickType::DoublePress),
            3 => Some(ClickType::Undetermined),
            _ => None,
        }
    }

    /// Convert ClickType to its i32 representation
    pub fn to_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ClickType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClickType::ShortPress => write!(f, "SHORT_PRESS"),
            ClickType::LongPress => write!(f, "LONG_PRESS"),
            ClickType::DoublePress => write!(f, "DOUBLE_PRESS"),
            ClickType::Undetermined => write!(f, "UNDETERMINED"),
        }
    }
}

/// How the keys of a trigger combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TriggerMode {
    /// Every key held at once, all with the same click type
    Parallel(ClickType),
    /// Keys pressed one after another in order
    Sequence,
    /// Zero or one key
    #[default]
    Undefined,
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerMode::Parallel(click_type) => write!(f, "PARALLEL({})", click_type),
            TriggerMode::Sequence => write!(f, "SEQUENCE"),
            TriggerMode::Undefined => write!(f, "UNDEFINED"),
        }
    }
}

/// An ordered combination of keys plus the options that control detection.
///
/// Fields are only writable through the builder functions in
/// [`crate::builder::trigger`], which keep the key set consistent with the
/// mode after every edit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Trigger {
    pub(crate) keys: Vec<TriggerKey>,
    pub(crate) mode: TriggerMode,
    pub(crate) vibrate: bool,
    pub(crate) long_press_double_vibration: bool,
    pub(crate) screen_off_trigger: bool,
    pub(crate) long_press_delay: Option<u32>,
    pub(crate) double_press_delay: Option<u32>,
    pub(crate) vibrate_duration: Option<u32>,
    pub(crate) sequence_trigger_timeout: Option<u32>,
    pub(crate) trigger_from_other_apps: bool,
    pub(crate) show_toast: bool,
}

impl Trigger {
    /// Create an empty trigger
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> &[TriggerKey] {
        &self.keys
    }

    pub fn mode(&self) -> TriggerMode {
        self.mode
    }

    pub fn key(&self, uid: &str) -> Option<&TriggerKey> {
        self.keys.iter().find(|key| key.uid() == uid)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn vibrate(&self) -> bool {
        self.vibrate
    }

    pub fn long_press_double_vibration(&self) -> bool {
        self.long_press_double_vibration
    }

    pub fn screen_off_trigger(&self) -> bool {
        self.screen_off_trigger
    }

    pub fn long_press_delay(&self) -> Option<u32> {
        self.long_press_delay
    }

    pub fn double_press_delay(&self) -> Option<u32> {
        self.double_press_delay
    }

    pub fn vibrate_duration(&self) -> Option<u32> {
        self.vibrate_duration
    }

    pub fn sequence_trigger_timeout(&self) -> Option<u32> {
        self.sequence_trigger_timeout
    }

    pub fn trigger_from_other_apps(&self) -> bool {
        self.trigger_from_other_apps
    }

    pub fn show_toast(&self) -> bool {
        self.show_toast
    }

    pub fn contains_assistant_key(&self) -> bool {
        self.keys.iter().any(TriggerKey::is_assistant)
    }

    pub fn contains_dpad_key(&self) -> bool {
        self.keys.iter().any(|key| match key {
            TriggerKey::KeyEvent(key) => crate::keycode::is_dpad_key(key.key_code),
            TriggerKey::Evdev(key) => crate::keycode::is_dpad_key(key.key_code),
            TriggerKey::Assistant(_)
            | TriggerKey::FloatingButton(_)
            | TriggerKey::FingerprintGesture(_) => false,
        })
    }

    pub fn is_changing_vibration_duration_allowed(&self) -> bool {
        self.vibrate || self.long_press_double_vibration
    }

    pub fn is_changing_long_press_delay_allowed(&self) -> bool {
        self.keys
            .iter()
            .any(|key| key.click_type() == ClickType::LongPress)
    }

    pub fn is_changing_double_press_delay_allowed(&self) -> bool {
        self.keys
            .iter()
            .any(|key| key.click_type() == ClickType::DoublePress)
    }

    pub fn is_changing_sequence_trigger_timeout_allowed(&self) -> bool {
        self.keys.len() > 1 && self.mode == TriggerMode::Sequence
    }

    /// A second vibration when the long press threshold is crossed only
    /// makes sense when the first key is long pressed.
    pub fn is_long_press_double_vibration_allowed(&self) -> bool {
        let single_or_parallel =
            self.keys.len() == 1 || matches!(self.mode, TriggerMode::Parallel(_));

        single_or_parallel
            && self
                .keys
                .first()
                .map(|key| key.click_type() == ClickType::LongPress)
                .unwrap_or(false)
    }

    /// Every key must be a key event that is still delivered with the
    /// display off.
    pub fn is_detecting_when_screen_off_allowed(&self) -> bool {
        !self.keys.is_empty()
            && self.keys.iter().all(|key| match key {
                TriggerKey::KeyEvent(key) => can_detect_when_screen_off(key.key_code),
                TriggerKey::Evdev(_)
                | TriggerKey::Assistant(_)
                | TriggerKey::FloatingButton(_)
                | TriggerKey::FingerprintGesture(_) => false,
            })
    }

    /// Whether the trigger keeps detecting while the screen is off.
    pub fn detects_when_screen_off(&self) -> bool {
        self.screen_off_trigger && self.is_detecting_when_screen_off_allowed()
    }

    pub fn effective_long_press_double_vibration(&self) -> bool {
        self.long_press_double_vibration && self.is_long_press_double_vibration_allowed()
    }

    /// Long press threshold in ms, falling back to the user default.
    pub fn long_press_delay_or(&self, settings: &Settings) -> u32 {
        self.long_press_delay
            .filter(|_| self.is_changing_long_press_delay_allowed())
            .unwrap_or(settings.long_press_delay())
    }

    pub fn double_press_delay_or(&self, settings: &Settings) -> u32 {
        self.double_press_delay
            .filter(|_| self.is_changing_double_press_delay_allowed())
            .unwrap_or(settings.double_press_delay())
    }

    pub fn sequence_trigger_timeout_or(&self, settings: &Settings) -> u32 {
        self.sequence_trigger_timeout
            .filter(|_| self.is_changing_sequence_trigger_timeout_allowed())
            .unwrap_or(settings.sequence_trigger_timeout())
    }

    pub fn vibrate_duration_or(&self, settings: &Settings) -> u32 {
        self.vibrate_duration
            .filter(|_| self.is_changing_vibration_duration_allowed())
            .unwrap_or(settings.vibrate_duration())
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let separator = match self.mode {
            TriggerMode::Sequence => " => ",
            _ => " + ",
        };

        let names: Vec<String> = self
            .keys
            .iter()
            .map(|key| match key {
                TriggerKey::KeyEvent(key) => crate::keycode::key_name(key.key_code),
                TriggerKey::Evdev(key) => {
                    format!("{} ({})", crate::keycode::key_name(key.key_code), key.device.name)
                }
                TriggerKey::Assistant(key) => format!("assistant:{}", key.kind),
                TriggerKey::FloatingButton(key) => format!("button:{}", key.button_uid),
                TriggerKey::FingerprintGesture(key) => format!("fingerprint:{}", key.gesture),
            })
            .collect();

        write!(f, "[{}] {}", self.mode, names.join(separator))
    }
}
