// Keymapper Trigger Keys
// The closed set of input sources a trigger can be built from

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use super::ClickType;
use crate::input::InputDeviceInfo;

/// Generate a fresh unique id for a trigger key, action or key map.
pub fn new_uid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Which assistant invocation an assistant trigger key responds to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AssistantKind {
    /// The voice assistant (e.g. a headset button long press)
    Voice,
    /// The device assistant (e.g. a long press of the home button)
    Device,
    /// Either of the above
    Any,
}

impl AssistantKind {
    /// Whether an invocation of `kind` satisfies a key configured with `self`.
    pub fn accepts(self, kind: AssistantKind) -> bool {
        self == AssistantKind::Any || self == kind
    }
}

/// Swipe directions reported by a fingerprint sensor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FingerprintGesture {
    SwipeDown,
    SwipeUp,
    SwipeLeft,
    SwipeRight,
}

/// Device a key event trigger key must come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TriggerKeyDevice {
    /// Built-in buttons (volume, power, ...)
    Internal,
    /// Any device
    #[default]
    Any,
    /// A specific external device, identified by its descriptor
    External { descriptor: String, name: String },
}

impl TriggerKeyDevice {
    /// Whether an event from `device` satisfies this device reference.
    ///
    /// Events without device identity only satisfy `Any`.
    pub fn matches(&self, device: Option<&InputDeviceInfo>) -> bool {
        match (self, device) {
            (TriggerKeyDevice::Any, _) => true,
            (TriggerKeyDevice::Internal, Some(info)) => !info.is_external,
            (TriggerKeyDevice::External { descriptor, .. }, Some(info)) => {
                info.is_external && info.descriptor == *descriptor
            }
            (_, None) => false,
        }
    }

    /// Two references describe the same physical source.
    pub fn is_same_device(&self, other: &TriggerKeyDevice) -> bool {
        match (self, other) {
            (
                TriggerKeyDevice::External { descriptor: a, .. },
                TriggerKeyDevice::External { descriptor: b, .. },
            ) => a == b,
            _ => self == other,
        }
    }
}

/// Identity of an evdev input device as stored in an evdev trigger key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvdevDeviceInfo {
    pub name: String,
    pub bus: u16,
    pub vendor: u16,
    pub product: u16,
}

impl EvdevDeviceInfo {
    pub fn new(name: impl Into<String>, bus: u16, vendor: u16, product: u16) -> Self {
        Self {
            name: name.into(),
            bus,
            vendor,
            product,
        }
    }

    /// Whether a live device is the one this key was recorded from.
    pub fn matches(&self, device: &InputDeviceInfo) -> bool {
        self.name == device.name
            && self.bus == device.bus
            && self.vendor == device.vendor
            && self.product == device.product
    }
}

impl From<&InputDeviceInfo> for EvdevDeviceInfo {
    fn from(info: &InputDeviceInfo) -> Self {
        Self::new(info.name.clone(), info.bus, info.vendor, info.product)
    }
}

/// A key detected through the platform key event API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEventTriggerKey {
    pub uid: String,
    pub key_code: i32,
    pub scan_code: Option<i32>,
    pub device: TriggerKeyDevice,
    pub click_type: ClickType,
    pub consume_event: bool,
    pub requires_ime: bool,
    pub detect_with_scan_code: bool,
}

/// A key read directly from an evdev device node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvdevTriggerKey {
    pub uid: String,
    pub key_code: i32,
    pub scan_code: i32,
    pub device: EvdevDeviceInfo,
    pub click_type: ClickType,
    pub consume_event: bool,
    pub detect_with_scan_code: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantTriggerKey {
    pub uid: String,
    pub kind: AssistantKind,
    pub click_type: ClickType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloatingButtonKey {
    pub uid: String,
    pub button_uid: String,
    pub click_type: ClickType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintTriggerKey {
    pub uid: String,
    pub gesture: FingerprintGesture,
    pub click_type: ClickType,
}

/// One input source participating in a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerKey {
    KeyEvent(KeyEventTriggerKey),
    Evdev(EvdevTriggerKey),
    Assistant(AssistantTriggerKey),
    FloatingButton(FloatingButtonKey),
    FingerprintGesture(FingerprintTriggerKey),
}

/// Slot used to decide whether two keys can be pressed at the same time.
///
/// Keys sharing a slot cannot coexist in a parallel trigger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ParallelSlot {
    /// Assistant and fingerprint inputs have no down/up so only one fits
    Gesture,
    KeyEvent(i32, TriggerKeyDevice),
    Evdev(i32, EvdevDeviceInfo),
    FloatingButton(String),
}

impl TriggerKey {
    pub fn uid(&self) -> &str {
        match self {
            TriggerKey::KeyEvent(key) => &key.uid,
            TriggerKey::Evdev(key) => &key.uid,
            TriggerKey::Assistant(key) => &key.uid,
            TriggerKey::FloatingButton(key) => &key.uid,
            TriggerKey::FingerprintGesture(key) => &key.uid,
        }
    }

    pub fn click_type(&self) -> ClickType {
        match self {
            TriggerKey::KeyEvent(key) => key.click_type,
            TriggerKey::Evdev(key) => key.click_type,
            TriggerKey::Assistant(key) => key.click_type,
            TriggerKey::FloatingButton(key) => key.click_type,
            TriggerKey::FingerprintGesture(key) => key.click_type,
        }
    }

    pub(crate) fn with_click_type(mut self, click_type: ClickType) -> Self {
        match &mut self {
            TriggerKey::KeyEvent(key) => key.click_type = click_type,
            TriggerKey::Evdev(key) => key.click_type = click_type,
            TriggerKey::Assistant(key) => key.click_type = click_type,
            TriggerKey::FloatingButton(key) => key.click_type = click_type,
            TriggerKey::FingerprintGesture(key) => key.click_type = click_type,
        }
        self
    }

    /// Long press needs separately timed down and up events.
    pub fn allows_long_press(&self) -> bool {
        match self {
            TriggerKey::KeyEvent(_) | TriggerKey::Evdev(_) => true,
            TriggerKey::Assistant(_)
            | TriggerKey::FloatingButton(_)
            | TriggerKey::FingerprintGesture(_) => false,
        }
    }

    pub fn allows_double_press(&self) -> bool {
        match self {
            TriggerKey::KeyEvent(_) | TriggerKey::Evdev(_) => true,
            TriggerKey::Assistant(_)
            | TriggerKey::FloatingButton(_)
            | TriggerKey::FingerprintGesture(_) => false,
        }
    }

    pub fn allows_click_type(&self, click_type: ClickType) -> bool {
        match click_type {
            ClickType::ShortPress => true,
            ClickType::LongPress => self.allows_long_press(),
            ClickType::DoublePress => self.allows_double_press(),
            ClickType::Undetermined => false,
        }
    }

    /// Whether the matched input event is withheld from other consumers.
    pub fn consume_event(&self) -> bool {
        match self {
            TriggerKey::KeyEvent(key) => key.consume_event,
            TriggerKey::Evdev(key) => key.consume_event,
            TriggerKey::Assistant(_)
            | TriggerKey::FloatingButton(_)
            | TriggerKey::FingerprintGesture(_) => true,
        }
    }

    pub fn is_evdev(&self) -> bool {
        matches!(self, TriggerKey::Evdev(_))
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, TriggerKey::Assistant(_))
    }

    /// Key code of key-event and evdev keys.
    pub fn key_code(&self) -> Option<i32> {
        match self {
            TriggerKey::KeyEvent(key) => Some(key.key_code),
            TriggerKey::Evdev(key) => Some(key.key_code),
            TriggerKey::Assistant(_)
            | TriggerKey::FloatingButton(_)
            | TriggerKey::FingerprintGesture(_) => None,
        }
    }

    pub(crate) fn parallel_slot(&self) -> ParallelSlot {
        match self {
            TriggerKey::Assistant(_) | TriggerKey::FingerprintGesture(_) => ParallelSlot::Gesture,
            TriggerKey::KeyEvent(key) => ParallelSlot::KeyEvent(key.key_code, key.device.clone()),
            TriggerKey::Evdev(key) => ParallelSlot::Evdev(key.key_code, key.device.clone()),
            TriggerKey::FloatingButton(key) => ParallelSlot::FloatingButton(key.button_uid.clone()),
        }
    }

    /// Whether `other` is the same physical input as `self`.
    ///
    /// Two such keys in one trigger can only be told apart in sequence.
    pub fn is_same_input(&self, other: &TriggerKey) -> bool {
        match (self, other) {
            (TriggerKey::KeyEvent(a), TriggerKey::KeyEvent(b)) => {
                a.key_code == b.key_code && a.device.is_same_device(&b.device)
            }
            (TriggerKey::Evdev(a), TriggerKey::Evdev(b)) => {
                a.key_code == b.key_code && a.device == b.device
            }
            (TriggerKey::Assistant(a), TriggerKey::Assistant(b)) => a.kind == b.kind,
            (TriggerKey::FloatingButton(a), TriggerKey::FloatingButton(b)) => {
                a.button_uid == b.button_uid
            }
            (TriggerKey::FingerprintGesture(_), TriggerKey::FingerprintGesture(_)) => true,
            _ => false,
        }
    }
}
