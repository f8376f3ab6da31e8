// Keymapper Input Layer - Device Identity
// Device identity of event sources and capability analysis

use std::collections::HashSet;

/// Identity of the device an input event came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputDeviceInfo {
    /// Stable identifier (physical path for evdev devices)
    pub descriptor: String,
    pub name: String,
    /// Whether the device is removable rather than built in
    pub is_external: bool,
    pub bus: u16,
    pub vendor: u16,
    pub product: u16,
}

impl InputDeviceInfo {
    pub fn new(descriptor: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            name: name.into(),
            is_external: false,
            bus: 0,
            vendor: 0,
            product: 0,
        }
    }

    pub fn external(mut self) -> Self {
        self.is_external = true;
        self
    }

    pub fn with_ids(mut self, bus: u16, vendor: u16, product: u16) -> Self {
        self.bus = bus;
        self.vendor = vendor;
        self.product = product;
        self
    }
}

// Bus types from linux/input.h
const BUS_USB: u16 = 0x03;
const BUS_BLUETOOTH: u16 = 0x05;

/// Whether a bus type belongs to a removable device.
pub fn is_external_bus(bus: u16) -> bool {
    bus == BUS_USB || bus == BUS_BLUETOOTH
}

/// Device capabilities extracted from evdev device.capabilities()
#[derive(Debug, Clone)]
pub struct DeviceCapabilities {
    /// Whether the device supports EV_KEY events
    pub has_ev_key: bool,
    /// List of supported key codes (EV_KEY capability codes)
    pub supported_keys: Vec<u16>,
}

impl DeviceCapabilities {
    /// Create a new DeviceCapabilities struct
    pub fn new(has_ev_key: bool, supported_keys: Vec<u16>) -> Self {
        Self {
            has_ev_key,
            supported_keys,
        }
    }

    /// Check if a specific key code is supported
    pub fn supports_key(&self, key_code: u16) -> bool {
        self.supported_keys.contains(&key_code)
    }

    /// Create a HashSet from supported keys for O(1) lookups
    pub fn key_set(&self) -> HashSet<u16> {
        self.supported_keys.iter().copied().collect()
    }
}

// Keys outside the keyboard block that are common trigger sources:
// MUTE, VOLUMEDOWN, VOLUMEUP, POWER, PLAYPAUSE, CAMERA, HEADSETHOOK
const BUTTON_CODES: &[u16] = &[113, 114, 115, 116, 164, 212, 226];

// BTN_MISC..BTN_GEAR_UP covers mice, joysticks and gamepads
const BTN_RANGE: std::ops::RangeInclusive<u16> = 0x100..=0x151;

/// Determine if a device can produce events a trigger key could match.
///
/// Keyboards, media/volume button devices and gamepads qualify. Devices
/// without EV_KEY (touchpads reporting only ABS, sensors) do not.
pub fn is_trigger_source(capabilities: &DeviceCapabilities) -> bool {
    if !capabilities.has_ev_key {
        return false;
    }

    let key_set = capabilities.key_set();

    // Any key in the keyboard block (ESC..KP.) counts
    let has_keyboard_keys = (1u16..=83).any(|code| key_set.contains(&code));
    let has_buttons = BUTTON_CODES.iter().any(|code| key_set.contains(code));
    let has_gamepad = key_set.iter().any(|code| BTN_RANGE.contains(code));

    has_keyboard_keys || has_buttons || has_gamepad
}

/// Check if a device is a virtual device based on its name.
///
/// Virtual devices are created by keymapper itself and should be
/// filtered out to prevent feedback loops.
pub fn is_virtual_device(name: &str, prefix: &str) -> bool {
    name.contains(prefix)
}
