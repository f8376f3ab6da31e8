// Keymapper Input Layer - Engine Input Events
// Key down/up events and virtual events consumed by the detection engine

use super::InputDeviceInfo;
use crate::trigger::{AssistantKind, FingerprintGesture};

/// Direction of a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum KeyEventAction {
    Up = 0,
    Down = 1,
}

impl KeyEventAction {
    /// Map an evdev EV_KEY value. Autorepeat (2) has no meaning for
    /// click classification and maps to `None`.
    pub fn from_evdev_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(KeyEventAction::Up),
            1 => Some(KeyEventAction::Down),
            _ => None,
        }
    }
}

/// A key event as delivered by the input source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawKeyEvent {
    /// Platform key code, `KEYCODE_UNKNOWN` when it could not be resolved
    pub key_code: i32,
    pub scan_code: Option<i32>,
    pub device: Option<InputDeviceInfo>,
    pub action: KeyEventAction,
    /// Event time in milliseconds on a monotonic clock
    pub time_ms: u64,
}

impl RawKeyEvent {
    pub fn down(key_code: i32, device: Option<InputDeviceInfo>, time_ms: u64) -> Self {
        Self {
            key_code,
            scan_code: None,
            device,
            action: KeyEventAction::Down,
            time_ms,
        }
    }

    pub fn up(key_code: i32, device: Option<InputDeviceInfo>, time_ms: u64) -> Self {
        Self {
            action: KeyEventAction::Up,
            ..Self::down(key_code, device, time_ms)
        }
    }

    pub fn with_scan_code(mut self, scan_code: i32) -> Self {
        self.scan_code = Some(scan_code);
        self
    }
}

/// Everything the detection engine reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Key(RawKeyEvent),
    Assistant {
        kind: AssistantKind,
        time_ms: u64,
    },
    FloatingButton {
        button_uid: String,
        action: KeyEventAction,
        time_ms: u64,
    },
    FingerprintGesture {
        gesture: FingerprintGesture,
        time_ms: u64,
    },
    ScreenOff,
    ScreenOn,
    /// An input source disappeared; in-flight detection from it is void
    DeviceRemoved {
        descriptor: String,
    },
}

impl InputEvent {
    pub fn time_ms(&self) -> Option<u64> {
        match self {
            InputEvent::Key(event) => Some(event.time_ms),
            InputEvent::Assistant { time_ms, .. }
            | InputEvent::FloatingButton { time_ms, .. }
            | InputEvent::FingerprintGesture { time_ms, .. } => Some(*time_ms),
            InputEvent::ScreenOff | InputEvent::ScreenOn | InputEvent::DeviceRemoved { .. } => {
                None
            }
        }
    }
}
