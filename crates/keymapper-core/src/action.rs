// Keymapper Actions
// Action payloads and the per-action execution options of a key map

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::keycode;

/// Which half of an input event an action performer should emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum InputEventType {
    Down = 0,
    Up = 1,
    DownUp = 2,
}

impl InputEventType {
    /// Create InputEventType from i32 value
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(InputEventType::Down),
            1 => Some(InputEventType::Up),
            2 => Some(InputEventType::DownUp),
            _ => None,
        }
    }

    /// Convert InputEventType to its i32 representation
    pub fn to_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for InputEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputEventType::Down => write!(f, "DOWN"),
            InputEventType::Up => write!(f, "UP"),
            InputEventType::DownUp => write!(f, "DOWN_UP"),
        }
    }
}

/// What an action does when performed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionData {
    /// Inject a key event
    InputKeyEvent {
        key_code: i32,
        #[serde(default)]
        meta_state: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device_descriptor: Option<String>,
    },
    Text {
        text: String,
    },
    Tap {
        x: i32,
        y: i32,
    },
    OpenApp {
        package_name: String,
    },
    OpenUrl {
        url: String,
    },
    VolumeUp,
    VolumeDown,
    VolumeMute,
    ToggleFlashlight,
    AnswerCall,
    EndCall,
}

impl ActionData {
    pub fn key_event(key_code: i32) -> Self {
        ActionData::InputKeyEvent {
            key_code,
            meta_state: 0,
            device_descriptor: None,
        }
    }

    /// Key code of a key event action.
    pub fn key_code(&self) -> Option<i32> {
        match self {
            ActionData::InputKeyEvent { key_code, .. } => Some(*key_code),
            _ => None,
        }
    }

    /// Modifier key events are held rather than repeated.
    pub fn is_modifier_key_event(&self) -> bool {
        self.key_code().map(keycode::is_modifier_key).unwrap_or(false)
    }
}

impl fmt::Display for ActionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionData::InputKeyEvent { key_code, .. } => {
                write!(f, "key event {}", keycode::key_name(*key_code))
            }
            ActionData::Text { text } => write!(f, "text {:?}", text),
            ActionData::Tap { x, y } => write!(f, "tap ({}, {})", x, y),
            ActionData::OpenApp { package_name } => write!(f, "open app {}", package_name),
            ActionData::OpenUrl { url } => write!(f, "open url {}", url),
            ActionData::VolumeUp => write!(f, "volume up"),
            ActionData::VolumeDown => write!(f, "volume down"),
            ActionData::VolumeMute => write!(f, "volume mute"),
            ActionData::ToggleFlashlight => write!(f, "toggle flashlight"),
            ActionData::AnswerCall => write!(f, "answer call"),
            ActionData::EndCall => write!(f, "end call"),
        }
    }
}

/// When a repeating action stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum RepeatMode {
    #[default]
    TriggerReleased = 0,
    LimitReached = 1,
    TriggerPressedAgain = 2,
}

impl RepeatMode {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(RepeatMode::TriggerReleased),
            1 => Some(RepeatMode::LimitReached),
            2 => Some(RepeatMode::TriggerPressedAgain),
            _ => None,
        }
    }

    pub fn to_i32(self) -> i32 {
        self as i32
    }
}

/// When a held-down action is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum HoldDownMode {
    #[default]
    TriggerReleased = 0,
    TriggerPressedAgain = 1,
}

impl HoldDownMode {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(HoldDownMode::TriggerReleased),
            1 => Some(HoldDownMode::TriggerPressedAgain),
            _ => None,
        }
    }

    pub fn to_i32(self) -> i32 {
        self as i32
    }
}

/// An action attached to a key map together with its execution options.
///
/// `None` timings fall back to [`crate::settings::Settings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMapAction {
    pub uid: String,
    pub data: ActionData,
    pub repeat: bool,
    pub hold_down: bool,
    pub repeat_mode: RepeatMode,
    pub hold_down_mode: HoldDownMode,
    pub repeat_rate: Option<u32>,
    pub repeat_delay: Option<u32>,
    pub repeat_limit: Option<u32>,
    pub hold_down_duration: Option<u32>,
    pub multiplier: Option<u32>,
    pub delay_before_next_action: Option<u32>,
}

impl KeyMapAction {
    pub fn new(data: ActionData) -> Self {
        Self {
            uid: crate::trigger::new_uid(),
            data,
            repeat: false,
            hold_down: false,
            repeat_mode: RepeatMode::default(),
            hold_down_mode: HoldDownMode::default(),
            repeat_rate: None,
            repeat_delay: None,
            repeat_limit: None,
            hold_down_duration: None,
            multiplier: None,
            delay_before_next_action: None,
        }
    }

    pub fn stop_hold_down_when_trigger_pressed_again(&self) -> bool {
        self.hold_down && self.hold_down_mode == HoldDownMode::TriggerPressedAgain
    }

    /// Number of times the payload is performed per invocation.
    pub fn times(&self) -> u32 {
        self.multiplier.unwrap_or(1).max(1)
    }

    /// Repeat limit in force. An action that stops when the limit is
    /// reached repeats once unless a limit is set.
    pub fn effective_repeat_limit(&self) -> Option<u32> {
        match (self.repeat_limit, self.repeat_mode) {
            (Some(limit), _) => Some(limit),
            (None, RepeatMode::LimitReached) => Some(1),
            (None, _) => None,
        }
    }
}
