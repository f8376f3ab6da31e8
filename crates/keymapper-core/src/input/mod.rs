// Keymapper Input Layer
// Device identity, device filtering and engine input events

mod device;
mod event;
mod filter;

pub use device::{
    is_external_bus, is_trigger_source, is_virtual_device, DeviceCapabilities, InputDeviceInfo,
};
pub use event::{InputEvent, KeyEventAction, RawKeyEvent};
pub use filter::matches_device_filter;
