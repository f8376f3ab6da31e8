// Keymapper evdev Event Loop
// Polls input devices and turns EV_KEY events into engine input events

use std::os::unix::io::AsRawFd;
use std::time::Instant;

use evdev::{Device, EventType};
use log::{debug, info, warn};

use crate::input::{
    is_external_bus, is_trigger_source, is_virtual_device, matches_device_filter,
    DeviceCapabilities, InputDeviceInfo, InputEvent, KeyEventAction, RawKeyEvent,
};
use crate::keycode::{from_linux_code, KEYCODE_UNKNOWN};

/// Name prefix of the uinput device keymapper writes actions to
pub const VIRTUAL_DEVICE_PREFIX: &str = "Keymapper (virtual)";

/// Result type for event loop operations
pub type EventLoopResult<T> = Result<T, EventLoopError>;

/// Errors that can occur in event loop
#[derive(Debug, thiserror::Error)]
pub enum EventLoopError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// evdev EV_KEY value the kernel uses for autorepeat
pub const AUTOREPEAT_VALUE: i32 = 2;

/// Something read from the input devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolledEvent {
    /// Event for the detection engine
    Input(InputEvent),
    /// Autorepeat of a held key. The engine never sees these; the host
    /// passes them on for keys it forwarded.
    Repeat { code: u16, descriptor: String },
}

/// Device information for listing devices
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: usize,
    pub path: Option<String>,
    pub identity: InputDeviceInfo,
    /// Whether autodetection would pick this device
    pub is_trigger_source: bool,
}

/// Turn one EV_KEY event into an engine key event.
///
/// Autorepeat events are dropped. Codes without a key code mapping are
/// reported as `KEYCODE_UNKNOWN` and keep their scan code.
pub fn translate_key_event(
    code: u16,
    value: i32,
    device: &InputDeviceInfo,
    time_ms: u64,
) -> Option<InputEvent> {
    let action = KeyEventAction::from_evdev_value(value)?;

    Some(InputEvent::Key(RawKeyEvent {
        key_code: from_linux_code(code).unwrap_or(KEYCODE_UNKNOWN),
        scan_code: Some(i32::from(code)),
        device: Some(device.clone()),
        action,
        time_ms,
    }))
}

/// Sort one EV_KEY event into an engine event or an autorepeat.
pub fn translate_event(
    code: u16,
    value: i32,
    device: &InputDeviceInfo,
    time_ms: u64,
) -> Option<PolledEvent> {
    if value == AUTOREPEAT_VALUE {
        return Some(PolledEvent::Repeat {
            code,
            descriptor: device.descriptor.clone(),
        });
    }
    translate_key_event(code, value, device, time_ms).map(PolledEvent::Input)
}

fn device_identity(device: &Device, path: &str) -> InputDeviceInfo {
    let input_id = device.input_id();
    let bus = input_id.bus_type().0;
    let name = device.name().unwrap_or("Unknown");
    let descriptor = device.physical_path().unwrap_or(path);

    let identity =
        InputDeviceInfo::new(descriptor, name).with_ids(bus, input_id.vendor(), input_id.product());
    if is_external_bus(bus) {
        identity.external()
    } else {
        identity
    }
}

fn device_capabilities(device: &Device) -> DeviceCapabilities {
    let has_ev_key = device.supported_events().contains(EventType::KEY);
    let supported_keys = device
        .supported_keys()
        .map(|keys| keys.iter().map(|key| key.code()).collect())
        .unwrap_or_default();
    DeviceCapabilities::new(has_ev_key, supported_keys)
}

struct OpenDevice {
    device: Device,
    identity: InputDeviceInfo,
}

/// evdev event loop over every device that can produce trigger input
///
/// Grabbed devices are released on drop so a crash never leaves keys stuck.
pub struct EventLoop {
    devices: Vec<OpenDevice>,
    poll_fds: Vec<libc::pollfd>,
    grabbed: bool,
    started: Instant,
}

impl EventLoop {
    /// Open the devices matching `filter_names` (all trigger sources when
    /// empty), optionally grabbing them.
    pub fn new(filter_names: &[String], grab: bool) -> EventLoopResult<Self> {
        let mut devices = Self::find_devices(filter_names)?;

        if grab {
            for open in &mut devices {
                // A previous instance may have crashed while holding the grab
                let _ = open.device.ungrab();
                open.device.grab()?;
            }
        }

        for open in &devices {
            info!(
                "Listening on {} ({})",
                open.identity.name, open.identity.descriptor
            );
        }

        let poll_fds = Self::create_poll_fds(&devices);
        Ok(Self {
            devices,
            poll_fds,
            grabbed: grab,
            started: Instant::now(),
        })
    }

    fn create_poll_fds(devices: &[OpenDevice]) -> Vec<libc::pollfd> {
        devices
            .iter()
            .map(|open| libc::pollfd {
                fd: open.device.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            })
            .collect()
    }

    /// List every input device with its identity
    pub fn list_devices() -> EventLoopResult<Vec<DeviceInfo>> {
        let devices: Vec<DeviceInfo> = evdev::enumerate()
            .enumerate()
            .map(|(index, (path, device))| {
                let path_str = path.to_str().unwrap_or_default().to_string();
                DeviceInfo {
                    index,
                    identity: device_identity(&device, &path_str),
                    is_trigger_source: is_trigger_source(&device_capabilities(&device)),
                    path: Some(path_str),
                }
            })
            .collect();

        if devices.is_empty() {
            return Err(EventLoopError::DeviceNotFound(
                "No input devices found".to_string(),
            ));
        }

        Ok(devices)
    }

    fn find_devices(filter_names: &[String]) -> EventLoopResult<Vec<OpenDevice>> {
        let mut devices = Vec::new();

        for (path, device) in evdev::enumerate() {
            let device_name = device.name().unwrap_or("Unknown");
            let device_path = path.to_str().unwrap_or_default();
            let trigger_source = is_trigger_source(&device_capabilities(&device));
            let is_virtual = is_virtual_device(device_name, VIRTUAL_DEVICE_PREFIX);

            if matches_device_filter(
                device_name,
                device_path,
                filter_names,
                trigger_source,
                is_virtual,
            ) {
                let identity = device_identity(&device, device_path);
                devices.push(OpenDevice { device, identity });
            }
        }

        if devices.is_empty() {
            return Err(EventLoopError::DeviceNotFound(
                "No trigger devices found".to_string(),
            ));
        }

        Ok(devices)
    }

    /// Milliseconds since the loop started, on a monotonic clock
    pub fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Wait up to `timeout_ms` (-1 = forever) and return the events read.
    ///
    /// A device that went away is dropped and reported as
    /// `InputEvent::DeviceRemoved`. EINTR counts as a timeout.
    pub fn poll(&mut self, timeout_ms: i32) -> EventLoopResult<Vec<PolledEvent>> {
        let mut events = Vec::new();

        let poll_result = unsafe {
            libc::poll(
                self.poll_fds.as_mut_ptr(),
                self.poll_fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };

        if poll_result < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(events);
            }
            return Err(EventLoopError::Io(err));
        }

        if poll_result == 0 {
            return Ok(events);
        }

        let time_ms = self.now_ms();
        let mut removed = Vec::new();

        for (index, open) in self.devices.iter_mut().enumerate() {
            let revents = self.poll_fds[index].revents;
            if revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
                removed.push(index);
                continue;
            }
            if revents & libc::POLLIN == 0 {
                continue;
            }

            match open.device.fetch_events() {
                Ok(device_events) => {
                    for event in device_events {
                        if event.event_type() != EventType::KEY {
                            continue;
                        }
                        if let Some(polled) = translate_event(
                            event.code(),
                            event.value(),
                            &open.identity,
                            time_ms,
                        ) {
                            events.push(polled);
                        }
                    }
                }
                Err(err) if err.raw_os_error() == Some(libc::ENODEV) => removed.push(index),
                Err(err) => warn!("Failed to read from {}: {}", open.identity.name, err),
            }
        }

        if !removed.is_empty() {
            for index in removed.into_iter().rev() {
                let open = self.devices.remove(index);
                debug!("Device removed: {}", open.identity.name);
                events.push(PolledEvent::Input(InputEvent::DeviceRemoved {
                    descriptor: open.identity.descriptor,
                }));
            }
            self.poll_fds = Self::create_poll_fds(&self.devices);
        }

        Ok(events)
    }

    /// Release grabbed devices (called on shutdown)
    pub fn ungrab_all(&mut self) {
        if self.grabbed {
            for open in &mut self.devices {
                let _ = open.device.ungrab();
            }
            self.grabbed = false;
        }
    }

    pub fn devices(&self) -> impl Iterator<Item = &InputDeviceInfo> {
        self.devices.iter().map(|open| &open.identity)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.ungrab_all();
    }
}
