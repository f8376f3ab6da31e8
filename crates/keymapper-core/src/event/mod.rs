// Keymapper Event Handling
// evdev input source feeding the detection engine

pub mod r#loop;

pub use r#loop::{
    translate_event, translate_key_event, DeviceInfo, EventLoop, EventLoopError,
    EventLoopResult, PolledEvent, AUTOREPEAT_VALUE, VIRTUAL_DEVICE_PREFIX,
};
