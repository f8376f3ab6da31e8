// Keymapper Daemon
// Detects key map triggers on evdev devices and performs their actions

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType};
use log::{debug, error, info, warn};

use keymapper_core::event::{EventLoop, PolledEvent, AUTOREPEAT_VALUE, VIRTUAL_DEVICE_PREFIX};
use keymapper_core::keycode::{
    to_linux_code, KEYCODE_VOLUME_DOWN, KEYCODE_VOLUME_MUTE, KEYCODE_VOLUME_UP,
};
use keymapper_core::{
    ActionData, ActionDispatchers, ActionOutcome, ActionPerformer, Detection, DetectionEngine,
    InputEvent, InputEventType, KeyEventAction, KeyMapRepository, PerformError, RawKeyEvent,
    Settings,
};

/// Upper bound for one poll so signals are noticed promptly
const MAX_POLL_MS: u64 = 100;

/// Key map trigger daemon
#[derive(Parser, Debug)]
#[command(name = "keymapper")]
#[command(version)]
#[command(about = "Detects key map triggers and performs their actions", long_about = None)]
struct Args {
    /// Key map file (default: ~/.config/keymapper/keymaps.toml)
    #[arg(short, long, value_name = "FILE")]
    keymaps: Option<PathBuf>,

    /// Settings file (default: ~/.config/keymapper/settings.toml)
    #[arg(short, long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Only listen on these devices, by name or path (can be used multiple times)
    #[arg(short, long, value_name = "DEVICE")]
    devices: Vec<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Validate key maps and settings, then exit
    #[arg(long)]
    check_config: bool,

    /// List available input devices
    #[arg(long)]
    list_devices: bool,
}

/// Performs key event actions through a uinput device. Other actions are
/// only logged.
struct UinputPerformer {
    device: VirtualDevice,
}

impl UinputPerformer {
    fn new() -> std::io::Result<Self> {
        let mut keys = AttributeSet::new();
        for code in 0..0x2ffu16 {
            keys.insert(evdev::Key::new(code));
        }

        let device = VirtualDeviceBuilder::new()?
            .name(&format!("{} Keyboard", VIRTUAL_DEVICE_PREFIX))
            .with_keys(&keys)?
            .build()?;

        Ok(Self { device })
    }

    fn emit_key(&mut self, code: u16, value: i32) -> std::io::Result<()> {
        self.device
            .emit(&[evdev::InputEvent::new(EventType::KEY, code, value)])
    }

    fn emit(&mut self, code: u16, event_type: InputEventType) -> std::io::Result<()> {
        match event_type {
            InputEventType::Down => self.emit_key(code, 1),
            InputEventType::Up => self.emit_key(code, 0),
            InputEventType::DownUp => {
                self.emit_key(code, 1)?;
                self.emit_key(code, 0)
            }
        }
    }

    /// Pass an unconsumed key event through to the system.
    fn forward(&mut self, code: u16, action: KeyEventAction) -> std::io::Result<()> {
        let value = match action {
            KeyEventAction::Down => 1,
            KeyEventAction::Up => 0,
        };
        self.emit_key(code, value)
    }

    fn repeat(&mut self, code: u16) -> std::io::Result<()> {
        self.emit_key(code, AUTOREPEAT_VALUE)
    }
}

/// Keys passed through to the virtual device and still held, per source
/// device. Only their autorepeats are passed on.
#[derive(Debug, Default)]
struct ForwardedKeys {
    held: HashSet<(String, u16)>,
}

impl ForwardedKeys {
    fn record(&mut self, descriptor: &str, code: u16, action: KeyEventAction) {
        match action {
            KeyEventAction::Down => {
                self.held.insert((descriptor.to_string(), code));
            }
            KeyEventAction::Up => {
                self.held.remove(&(descriptor.to_string(), code));
            }
        }
    }

    fn is_held(&self, descriptor: &str, code: u16) -> bool {
        self.held.contains(&(descriptor.to_string(), code))
    }

    /// Stop tracking a removed device. Returns the codes it still held.
    fn forget_device(&mut self, descriptor: &str) -> Vec<u16> {
        let mut codes = Vec::new();
        self.held.retain(|(held_on, code)| {
            if held_on == descriptor {
                codes.push(*code);
                false
            } else {
                true
            }
        });
        codes.sort_unstable();
        codes
    }
}

fn forward_key(key: &RawKeyEvent, performer: &mut UinputPerformer, forwarded: &mut ForwardedKeys) {
    let Some(code) = key.scan_code.and_then(|scan_code| u16::try_from(scan_code).ok()) else {
        return;
    };
    let descriptor = key
        .device
        .as_ref()
        .map(|device| device.descriptor.as_str())
        .unwrap_or_default();

    forwarded.record(descriptor, code, key.action);
    if let Err(e) = performer.forward(code, key.action) {
        warn!("Failed to forward key event: {}", e);
    }
}

impl ActionPerformer for UinputPerformer {
    fn perform(
        &mut self,
        data: &ActionData,
        event_type: InputEventType,
    ) -> Result<(), PerformError> {
        let key_code = match data {
            ActionData::InputKeyEvent { key_code, .. } => *key_code,
            ActionData::VolumeUp => KEYCODE_VOLUME_UP,
            ActionData::VolumeDown => KEYCODE_VOLUME_DOWN,
            ActionData::VolumeMute => KEYCODE_VOLUME_MUTE,
            other => return Err(PerformError::Unsupported(other.to_string())),
        };

        let code = to_linux_code(key_code)
            .ok_or_else(|| PerformError::Unsupported(format!("{} has no input code", data)))?;
        self.emit(code, event_type)?;
        Ok(())
    }
}

fn log_outcomes(outcomes: &[ActionOutcome]) {
    for outcome in outcomes {
        match &outcome.result {
            Ok(()) => debug!(
                "Performed {} {} of key map {}",
                outcome.action_uid, outcome.event_type, outcome.keymap_uid
            ),
            Err(PerformError::Unsupported(what)) => {
                info!("Key map {} fired {} (not executable here)", outcome.keymap_uid, what)
            }
            Err(err) => warn!("Action {} failed: {}", outcome.action_uid, err),
        }
    }
}

fn log_detections(detections: &[Detection]) {
    for detection in detections {
        match detection {
            Detection::Fired(fire) => {
                info!("Triggered {} ({})", fire.keymap_uid, fire.click_type)
            }
            Detection::Released { keymap_uid } => debug!("Released {}", keymap_uid),
            Detection::Cancelled { keymap_uid } => debug!("Cancelled {}", keymap_uid),
        }
    }
}

/// Main application state
struct Application {
    args: Args,
    settings: Settings,
    repository: Arc<KeyMapRepository>,
    running: Arc<AtomicBool>,
    reload_requested: Arc<AtomicBool>,
}

impl Application {
    fn new(args: Args) -> Result<Self> {
        let settings = match &args.settings {
            Some(path) => Settings::from_file(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => Settings::load_default().context("Failed to load default settings")?,
        };

        let keymaps_path = args
            .keymaps
            .clone()
            .or_else(KeyMapRepository::default_path)
            .context("No key map file given and no config directory found")?;
        let repository = KeyMapRepository::open(&keymaps_path)
            .with_context(|| format!("Failed to load key maps from {}", keymaps_path.display()))?;

        Ok(Self {
            args,
            settings,
            repository: Arc::new(repository),
            running: Arc::new(AtomicBool::new(true)),
            reload_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    fn validate(&self) -> Result<()> {
        let keymaps = self.repository.all();
        let listening = self.repository.enabled().len();
        println!(
            "Configuration is valid: {} key maps ({} enabled with trigger and actions)",
            keymaps.len(),
            listening
        );
        Ok(())
    }

    fn list_devices() -> Result<()> {
        let devices = EventLoop::list_devices().context("Error finding input devices")?;
        println!("Found {} input device(s):", devices.len());
        for device in &devices {
            let marker = if device.is_trigger_source { "*" } else { " " };
            println!(
                " {} {}: {} ({}){}",
                marker,
                device.index,
                device.identity.name,
                device.path.as_deref().unwrap_or("?"),
                if device.identity.is_external { " external" } else { "" }
            );
        }
        Ok(())
    }

    fn install_signal_handlers(&self) -> Result<()> {
        use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals =
            Signals::new([SIGINT, SIGTERM, SIGHUP]).context("Failed to install signal handlers")?;
        let running = self.running.clone();
        let reload_requested = self.reload_requested.clone();

        std::thread::spawn(move || {
            for signal in &mut signals {
                match signal {
                    SIGHUP => {
                        info!("Received SIGHUP, reloading key maps");
                        reload_requested.store(true, Ordering::SeqCst);
                    }
                    _ => {
                        info!("Received signal, shutting down gracefully...");
                        running.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    fn reload(
        &mut self,
        engine: &mut DetectionEngine,
        dispatchers: &mut ActionDispatchers,
        performer: &mut UinputPerformer,
        now_ms: u64,
    ) {
        if let Err(e) = self.repository.reload() {
            error!("Keeping previous key maps: {}", e);
            return;
        }
        if self.settings.source_path().is_some() {
            if let Err(e) = self.settings.reload() {
                warn!("Keeping previous settings: {}", e);
            }
        }

        let keymaps = self.repository.all();
        engine.set_settings(self.settings.clone());
        let cancelled = engine.reload(&keymaps);
        log_outcomes(&dispatchers.handle(&cancelled, now_ms, performer));
        log_outcomes(&dispatchers.reload(&keymaps, &self.settings, performer));
    }

    fn run(&mut self) -> Result<()> {
        self.install_signal_handlers()?;

        let keymaps = self.repository.all();
        let mut engine = DetectionEngine::with_keymaps(self.settings.clone(), &keymaps);
        let mut performer = UinputPerformer::new().context("Failed to create uinput device")?;
        let mut dispatchers = ActionDispatchers::new();
        dispatchers.reload(&keymaps, &self.settings, &mut performer);

        let mut event_loop =
            EventLoop::new(&self.args.devices, true).context("Failed to open input devices")?;
        info!(
            "keymapper is running on {} device(s) with {} key maps",
            event_loop.device_count(),
            keymaps.len()
        );

        let result = self.run_main_loop(
            &mut event_loop,
            &mut engine,
            &mut dispatchers,
            &mut performer,
        );

        log_outcomes(&dispatchers.reset_all(&mut performer));
        event_loop.ungrab_all();
        result
    }

    fn run_main_loop(
        &mut self,
        event_loop: &mut EventLoop,
        engine: &mut DetectionEngine,
        dispatchers: &mut ActionDispatchers,
        performer: &mut UinputPerformer,
    ) -> Result<()> {
        let mut forwarded = ForwardedKeys::default();

        while self.running.load(Ordering::SeqCst) {
            if self.reload_requested.swap(false, Ordering::SeqCst) {
                let now_ms = event_loop.now_ms();
                self.reload(engine, dispatchers, performer, now_ms);
            }

            let now_ms = event_loop.now_ms();
            let timeout = [engine.next_deadline(), dispatchers.next_deadline()]
                .into_iter()
                .flatten()
                .min()
                .map(|deadline| deadline.saturating_sub(now_ms).min(MAX_POLL_MS))
                .unwrap_or(MAX_POLL_MS);

            let events = event_loop.poll(timeout as i32)?;

            for polled in &events {
                let event = match polled {
                    PolledEvent::Input(event) => event,
                    PolledEvent::Repeat { code, descriptor } => {
                        if forwarded.is_held(descriptor, *code) {
                            if let Err(e) = performer.repeat(*code) {
                                warn!("Failed to forward key repeat: {}", e);
                            }
                        }
                        continue;
                    }
                };

                let now_ms = event.time_ms().unwrap_or_else(|| event_loop.now_ms());
                let output = engine.handle_event(event);
                log_detections(&output.detections);
                log_outcomes(&dispatchers.handle(&output.detections, now_ms, performer));

                match event {
                    InputEvent::Key(key) if !output.consume => {
                        forward_key(key, performer, &mut forwarded)
                    }
                    InputEvent::DeviceRemoved { descriptor } => {
                        for code in forwarded.forget_device(descriptor) {
                            if let Err(e) = performer.forward(code, KeyEventAction::Up) {
                                warn!("Failed to release forwarded key: {}", e);
                            }
                        }
                    }
                    _ => {}
                }
            }

            let now_ms = event_loop.now_ms();
            let detections = engine.tick(now_ms);
            log_detections(&detections);
            log_outcomes(&dispatchers.handle(&detections, now_ms, performer));
            log_outcomes(&dispatchers.tick(now_ms, performer));
        }

        Ok(())
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    // Listing devices needs no configuration
    if args.list_devices {
        return Application::list_devices();
    }

    let mut app = Application::new(args)?;

    if app.args.check_config {
        return app.validate();
    }

    app.run()
}
