// Keymapper Runtime Matcher
// Per key map state machine deciding when a trigger fires

mod engine;

pub use engine::{DetectionEngine, EngineOutput};

use log::{debug, trace};
use smallvec::SmallVec;

use crate::classifier::{
    Classified, ClassifierConfig, KeyEventClassifier, PressId, PressKind,
};
use crate::constraint::{ConstraintSnapshot, ConstraintState};
use crate::input::{KeyEventAction, RawKeyEvent};
use crate::keycode::KEYCODE_UNKNOWN;
use crate::keymap::KeyMap;
use crate::settings::Settings;
use crate::trigger::{
    AssistantKind, ClickType, EvdevDeviceInfo, FingerprintGesture, Trigger, TriggerKey,
    TriggerMode,
};

/// A key map's trigger was matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fire {
    pub keymap_uid: String,
    pub click_type: ClickType,
}

/// What a matcher reports to the action side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Fired(Fire),
    /// A fired trigger is no longer held
    Released { keymap_uid: String },
    /// In-flight detection was abandoned; held and repeating actions stop
    Cancelled { keymap_uid: String },
}

impl Detection {
    pub fn keymap_uid(&self) -> &str {
        match self {
            Detection::Fired(fire) => &fire.keymap_uid,
            Detection::Released { keymap_uid } | Detection::Cancelled { keymap_uid } => keymap_uid,
        }
    }
}

/// Evdev device identity bound to the concrete device that matched it
/// earlier in a sequence.
pub type DeviceBindings = SmallVec<[(EvdevDeviceInfo, String); 2]>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MatchState {
    #[default]
    NotStarted,
    PartiallyMatched {
        next_index: usize,
        bindings: DeviceBindings,
    },
    Fired,
    Cancelled,
}

/// Timing and overlap options for one matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatcherOptions {
    pub long_press_delay: u64,
    pub double_press_delay: u64,
    pub sequence_timeout: u64,
    /// Wait for the double press window before finalising short presses
    pub detect_double_press: bool,
    /// Fire a short press on release instead of on down. Set when another
    /// key map long or double presses the same input, so a long press does
    /// not also fire this one.
    pub short_press_on_release: bool,
}

impl MatcherOptions {
    /// Options from the trigger's own timings, falling back to `settings`.
    pub fn from_trigger(trigger: &Trigger, settings: &Settings) -> Self {
        let detect_double_press = trigger
            .keys()
            .iter()
            .any(|key| key.click_type() == ClickType::DoublePress);

        Self {
            long_press_delay: u64::from(trigger.long_press_delay_or(settings)),
            double_press_delay: u64::from(trigger.double_press_delay_or(settings)),
            sequence_timeout: u64::from(trigger.sequence_trigger_timeout_or(settings)),
            detect_double_press,
            short_press_on_release: false,
        }
    }
}

/// An input a trigger key can be compared against.
#[derive(Debug, Clone, Copy)]
enum Signal<'a> {
    Press(&'a PressId),
    Assistant(AssistantKind),
    Fingerprint(FingerprintGesture),
}

fn code_matches(
    detect_with_scan_code: bool,
    key_code: i32,
    scan_code: Option<i32>,
    event_key_code: i32,
    event_scan_code: Option<i32>,
) -> bool {
    if detect_with_scan_code || key_code == KEYCODE_UNKNOWN {
        scan_code.is_some() && scan_code == event_scan_code
    } else {
        key_code == event_key_code
    }
}

/// Whether `key` is the input behind `signal`, ignoring click type.
fn key_matches(key: &TriggerKey, signal: Signal<'_>) -> bool {
    match (key, signal) {
        (
            TriggerKey::KeyEvent(key),
            Signal::Press(PressId::Key {
                key_code,
                scan_code,
                device,
            }),
        ) => {
            code_matches(
                key.detect_with_scan_code,
                key.key_code,
                key.scan_code,
                *key_code,
                *scan_code,
            ) && key.device.matches(device.as_ref())
        }
        (
            TriggerKey::Evdev(key),
            Signal::Press(PressId::Key {
                key_code,
                scan_code,
                device,
            }),
        ) => {
            code_matches(
                key.detect_with_scan_code,
                key.key_code,
                Some(key.scan_code),
                *key_code,
                *scan_code,
            ) && device
                .as_ref()
                .map(|device| key.device.matches(device))
                .unwrap_or(false)
        }
        (TriggerKey::FloatingButton(key), Signal::Press(PressId::FloatingButton(button_uid))) => {
            key.button_uid == *button_uid
        }
        (TriggerKey::Assistant(key), Signal::Assistant(kind)) => {
            key.kind.accepts(kind) || kind == AssistantKind::Any
        }
        (TriggerKey::FingerprintGesture(key), Signal::Fingerprint(gesture)) => {
            key.gesture == gesture
        }
        (TriggerKey::KeyEvent(_), _)
        | (TriggerKey::Evdev(_), _)
        | (TriggerKey::FloatingButton(_), _)
        | (TriggerKey::Assistant(_), _)
        | (TriggerKey::FingerprintGesture(_), _) => false,
    }
}

/// Detection state for one key map.
///
/// Owns its own classifier so timing thresholds are per trigger, and never
/// shares state with other matchers.
#[derive(Debug)]
pub struct TriggerMatcher {
    keymap_uid: String,
    trigger: Trigger,
    constraint_state: ConstraintState,
    enabled: bool,
    options: MatcherOptions,
    classifier: KeyEventClassifier,
    state: MatchState,
    /// Parallel mode: which keys are currently active
    active: SmallVec<[bool; 4]>,
    /// Sequence mode: when the first key matched
    sequence_started_ms: Option<u64>,
}

impl TriggerMatcher {
    pub fn new(keymap: &KeyMap, options: MatcherOptions) -> Self {
        let classifier = KeyEventClassifier::new(ClassifierConfig {
            long_press_delay: options.long_press_delay,
            double_press_delay: options.double_press_delay,
            detect_double_press: options.detect_double_press,
        });

        Self {
            keymap_uid: keymap.uid().to_string(),
            trigger: keymap.trigger().clone(),
            constraint_state: keymap.constraint_state().clone(),
            enabled: keymap.is_enabled(),
            options,
            classifier,
            state: MatchState::NotStarted,
            active: SmallVec::from_elem(false, keymap.trigger().keys().len()),
            sequence_started_ms: None,
        }
    }

    pub fn keymap_uid(&self) -> &str {
        &self.keymap_uid
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn options(&self) -> MatcherOptions {
        self.options
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool, out: &mut Vec<Detection>) {
        if self.enabled && !enabled {
            self.cancel(out);
        }
        self.enabled = enabled;
    }

    /// A press or partial match is under way, or the trigger is held.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self.state,
            MatchState::PartiallyMatched { .. } | MatchState::Fired
        ) || !self.classifier.is_idle()
    }

    pub fn detects_when_screen_off(&self) -> bool {
        self.trigger.detects_when_screen_off()
    }

    pub fn constraints_satisfied(&self, snapshot: &ConstraintSnapshot) -> bool {
        self.constraint_state.is_satisfied(snapshot)
    }

    pub fn next_deadline(&self) -> Option<u64> {
        let in_sequence = self.trigger.mode() == TriggerMode::Sequence
            && matches!(self.state, MatchState::PartiallyMatched { .. });
        let sequence_deadline = self
            .sequence_started_ms
            .filter(|_| in_sequence)
            .map(|started| started.saturating_add(self.options.sequence_timeout));

        match (self.classifier.next_deadline(), sequence_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn leave_cancelled(&mut self) {
        if self.state == MatchState::Cancelled {
            self.state = MatchState::NotStarted;
        }
    }

    fn has_key_for(&self, signal: Signal<'_>) -> bool {
        self.trigger.keys().iter().any(|key| key_matches(key, signal))
    }

    fn consumes(&self, signal: Signal<'_>) -> bool {
        self.trigger
            .keys()
            .iter()
            .any(|key| key_matches(key, signal) && key.consume_event())
    }

    /// Feed a key event. Returns whether the event should be consumed.
    pub fn handle_key(&mut self, event: &RawKeyEvent, out: &mut Vec<Detection>) -> bool {
        let id = PressId::Key {
            key_code: event.key_code,
            scan_code: event.scan_code,
            device: event.device.clone(),
        };
        self.handle_press(&id, event.action, event.time_ms, out)
    }

    pub fn handle_floating_button(
        &mut self,
        button_uid: &str,
        action: KeyEventAction,
        time_ms: u64,
        out: &mut Vec<Detection>,
    ) -> bool {
        let id = PressId::FloatingButton(button_uid.to_string());
        self.handle_press(&id, action, time_ms, out)
    }

    fn handle_press(
        &mut self,
        id: &PressId,
        action: KeyEventAction,
        time_ms: u64,
        out: &mut Vec<Detection>,
    ) -> bool {
        self.leave_cancelled();
        self.tick(time_ms, out);

        let signal = Signal::Press(id);
        if !self.has_key_for(signal) {
            return false;
        }

        let classified = match action {
            KeyEventAction::Down => self.classifier.press(id, time_ms),
            KeyEventAction::Up => self.classifier.release(id, time_ms),
        };
        for event in &classified {
            self.on_classified(event, out);
        }

        self.consumes(signal)
    }

    pub fn handle_assistant(
        &mut self,
        kind: AssistantKind,
        time_ms: u64,
        out: &mut Vec<Detection>,
    ) -> bool {
        self.handle_gesture(Signal::Assistant(kind), time_ms, out)
    }

    pub fn handle_fingerprint(
        &mut self,
        gesture: FingerprintGesture,
        time_ms: u64,
        out: &mut Vec<Detection>,
    ) -> bool {
        self.handle_gesture(Signal::Fingerprint(gesture), time_ms, out)
    }

    /// Assistant and fingerprint inputs are momentary short presses.
    fn handle_gesture(
        &mut self,
        signal: Signal<'_>,
        time_ms: u64,
        out: &mut Vec<Detection>,
    ) -> bool {
        self.leave_cancelled();
        self.tick(time_ms, out);

        if !self.has_key_for(signal) {
            return false;
        }

        match self.trigger.mode() {
            TriggerMode::Sequence => {
                self.on_sequence_click(signal, ClickType::ShortPress, time_ms, out)
            }
            TriggerMode::Parallel(_) | TriggerMode::Undefined => {
                self.on_parallel_gesture(signal, out)
            }
        }

        self.consumes(signal)
    }

    /// Advance timers to `now_ms`.
    pub fn tick(&mut self, now_ms: u64, out: &mut Vec<Detection>) {
        for event in self.classifier.tick(now_ms) {
            self.on_classified(&event, out);
        }
        self.expire_sequence(now_ms);
    }

    /// Abandon in-flight detection.
    pub fn cancel(&mut self, out: &mut Vec<Detection>) {
        self.classifier.reset();
        self.active.iter_mut().for_each(|active| *active = false);
        self.sequence_started_ms = None;

        if self.state != MatchState::NotStarted {
            debug!("Cancelled detection of key map {}", self.keymap_uid);
        }
        self.state = MatchState::Cancelled;
        out.push(Detection::Cancelled {
            keymap_uid: self.keymap_uid.clone(),
        });
    }

    /// Drop presses from a device that went away.
    pub fn forget_device(&mut self, descriptor: &str) {
        self.classifier.forget_device(descriptor);
    }

    fn on_classified(&mut self, event: &Classified, out: &mut Vec<Detection>) {
        trace!("{}: {:?} {:?}", self.keymap_uid, event.id, event.kind);

        match self.trigger.mode() {
            TriggerMode::Sequence => {
                if let PressKind::Click(click_type) = event.kind {
                    let signal = Signal::Press(&event.id);
                    self.on_sequence_click(signal, click_type, event.time_ms, out);
                }
            }
            TriggerMode::Parallel(click_type) => self.on_parallel(event, click_type, out),
            TriggerMode::Undefined => {
                if let Some(click_type) = self.trigger.keys().first().map(TriggerKey::click_type) {
                    self.on_parallel(event, click_type, out);
                }
            }
        }
    }

    // ==================== Parallel ====================

    fn on_parallel(&mut self, event: &Classified, required: ClickType, out: &mut Vec<Detection>) {
        let short_press_on_down =
            required == ClickType::ShortPress && !self.options.short_press_on_release;

        let activates = match event.kind {
            PressKind::Down => short_press_on_down,
            PressKind::Click(click_type) => click_type == required && !short_press_on_down,
            PressKind::Up => {
                self.on_parallel_release(&event.id, out);
                return;
            }
        };

        if !activates || self.state == MatchState::Fired {
            return;
        }

        let signal = Signal::Press(&event.id);
        let Some(index) = self
            .trigger
            .keys()
            .iter()
            .enumerate()
            .position(|(index, key)| !self.active[index] && key_matches(key, signal))
        else {
            return;
        };
        self.active[index] = true;

        if self.active.iter().all(|active| *active) {
            self.fire(required, out);
            // A press classified after its release has nothing left to hold
            if !self.classifier.is_down(&event.id) {
                self.release(out);
            }
        } else {
            let next_index = self.active.iter().filter(|active| **active).count();
            debug!(
                "Key map {} partially matched ({}/{})",
                self.keymap_uid,
                next_index,
                self.active.len()
            );
            self.state = MatchState::PartiallyMatched {
                next_index,
                bindings: DeviceBindings::new(),
            };
        }
    }

    fn on_parallel_release(&mut self, id: &PressId, out: &mut Vec<Detection>) {
        let signal = Signal::Press(id);
        let released = self
            .trigger
            .keys()
            .iter()
            .enumerate()
            .any(|(index, key)| self.active[index] && key_matches(key, signal));

        if !released {
            return;
        }

        if self.state == MatchState::Fired {
            self.release(out);
        } else {
            self.active.iter_mut().for_each(|active| *active = false);
            self.state = MatchState::NotStarted;
        }
    }

    fn on_parallel_gesture(&mut self, signal: Signal<'_>, out: &mut Vec<Detection>) {
        if self.state == MatchState::Fired {
            return;
        }

        let keys = self.trigger.keys();
        let Some(index) = keys.iter().position(|key| key_matches(key, signal)) else {
            return;
        };

        // Momentary: only completes a trigger whose other keys are held
        let others_active = self
            .active
            .iter()
            .enumerate()
            .all(|(other, active)| other == index || *active);

        if others_active {
            self.active[index] = true;
            self.fire(ClickType::ShortPress, out);
            self.release(out);
        }
    }

    // ==================== Sequence ====================

    fn sequence_key_matches(
        &self,
        index: usize,
        signal: Signal<'_>,
        click_type: ClickType,
        bindings: &DeviceBindings,
    ) -> bool {
        let Some(key) = self.trigger.keys().get(index) else {
            return false;
        };

        if key.click_type() != click_type || !key_matches(key, signal) {
            return false;
        }

        match (key, signal) {
            (TriggerKey::Evdev(key), Signal::Press(id)) => {
                let descriptor = id.device().map(|device| device.descriptor.as_str());
                bindings
                    .iter()
                    .find(|(info, _)| *info == key.device)
                    .map(|(_, bound)| Some(bound.as_str()) == descriptor)
                    .unwrap_or(true)
            }
            _ => true,
        }
    }

    fn on_sequence_click(
        &mut self,
        signal: Signal<'_>,
        click_type: ClickType,
        time_ms: u64,
        out: &mut Vec<Detection>,
    ) {
        self.expire_sequence(time_ms);

        let (next_index, bindings) = match &self.state {
            MatchState::PartiallyMatched {
                next_index,
                bindings,
            } => (*next_index, bindings.clone()),
            _ => (0, DeviceBindings::new()),
        };

        if self.sequence_key_matches(next_index, signal, click_type, &bindings) {
            self.advance_sequence(next_index, signal, bindings, time_ms, out);
            return;
        }

        if next_index > 0 {
            debug!(
                "Sequence of key map {} aborted at key {}",
                self.keymap_uid, next_index
            );
            self.state = MatchState::NotStarted;
            self.sequence_started_ms = None;

            // The aborting press may itself start a new attempt
            let empty = DeviceBindings::new();
            if self.sequence_key_matches(0, signal, click_type, &empty) {
                self.advance_sequence(0, signal, empty, time_ms, out);
            }
        }
    }

    fn advance_sequence(
        &mut self,
        index: usize,
        signal: Signal<'_>,
        mut bindings: DeviceBindings,
        time_ms: u64,
        out: &mut Vec<Detection>,
    ) {
        if let (Some(TriggerKey::Evdev(key)), Signal::Press(id)) =
            (self.trigger.keys().get(index), signal)
        {
            if let Some(device) = id.device() {
                if !bindings.iter().any(|(info, _)| *info == key.device) {
                    bindings.push((key.device.clone(), device.descriptor.clone()));
                }
            }
        }

        if index == 0 {
            self.sequence_started_ms = Some(time_ms);
        }

        if index + 1 >= self.trigger.keys().len() {
            self.sequence_started_ms = None;
            self.fire(ClickType::ShortPress, out);
            self.release(out);
        } else {
            self.state = MatchState::PartiallyMatched {
                next_index: index + 1,
                bindings,
            };
        }
    }

    fn expire_sequence(&mut self, now_ms: u64) {
        let Some(started) = self.sequence_started_ms else {
            return;
        };

        if now_ms.saturating_sub(started) >= self.options.sequence_timeout {
            debug!("Sequence of key map {} timed out", self.keymap_uid);
            self.sequence_started_ms = None;
            if matches!(self.state, MatchState::PartiallyMatched { .. }) {
                self.state = MatchState::NotStarted;
            }
        }
    }

    // ==================== Output ====================

    fn fire(&mut self, click_type: ClickType, out: &mut Vec<Detection>) {
        debug!("Key map {} fired ({})", self.keymap_uid, click_type);
        self.state = MatchState::Fired;
        out.push(Detection::Fired(Fire {
            keymap_uid: self.keymap_uid.clone(),
            click_type,
        }));
    }

    fn release(&mut self, out: &mut Vec<Detection>) {
        self.active.iter_mut().for_each(|active| *active = false);
        self.state = MatchState::NotStarted;
        out.push(Detection::Released {
            keymap_uid: self.keymap_uid.clone(),
        });
    }
}
