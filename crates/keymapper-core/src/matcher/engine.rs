// Keymapper Detection Engine
// Feeds every input event to the matcher of every key map

use indexmap::IndexMap;
use log::{debug, info, warn};

use super::{Detection, MatcherOptions, TriggerMatcher};
use crate::constraint::ConstraintSnapshot;
use crate::input::InputEvent;
use crate::keycode::KEYCODE_UNKNOWN;
use crate::keymap::KeyMap;
use crate::settings::Settings;
use crate::trigger::{ClickType, TriggerKey, TriggerMode};

/// Result of feeding one event to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    /// In key map list order
    pub detections: Vec<Detection>,
    /// Whether the event should be withheld from other consumers
    pub consume: bool,
}

/// All matchers, kept in the stored order of their key maps so that
/// simultaneous fires are reported in that order.
#[derive(Debug)]
pub struct DetectionEngine {
    settings: Settings,
    matchers: IndexMap<String, TriggerMatcher>,
    snapshot: ConstraintSnapshot,
}

impl DetectionEngine {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            matchers: IndexMap::new(),
            snapshot: ConstraintSnapshot::default(),
        }
    }

    pub fn with_keymaps(settings: Settings, keymaps: &[KeyMap]) -> Self {
        let mut engine = Self::new(settings);
        engine.reload(keymaps);
        engine
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the settings. Matchers pick up new timings on the next reload.
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    /// Rebuild every matcher from `keymaps`. In-flight detection is cancelled.
    pub fn reload(&mut self, keymaps: &[KeyMap]) -> Vec<Detection> {
        let mut out = Vec::new();
        for matcher in self.matchers.values_mut() {
            matcher.cancel(&mut out);
        }

        self.matchers = keymaps
            .iter()
            .filter(|keymap| {
                if keymap.trigger().is_empty() {
                    debug!("Skipping key map {} without trigger keys", keymap.uid());
                    false
                } else {
                    true
                }
            })
            .map(|keymap| {
                let options = self.options_for(keymap, keymaps);
                (
                    keymap.uid().to_string(),
                    TriggerMatcher::new(keymap, options),
                )
            })
            .collect();

        info!("Loaded {} key maps for detection", self.matchers.len());
        out
    }

    /// Timings from the trigger plus the overlap with other key maps.
    fn options_for(&self, keymap: &KeyMap, keymaps: &[KeyMap]) -> MatcherOptions {
        let mut options = MatcherOptions::from_trigger(keymap.trigger(), &self.settings);

        let trigger = keymap.trigger();
        let single_short_press = trigger.mode() == TriggerMode::Undefined
            && trigger
                .keys()
                .first()
                .map(|key| key.click_type() == ClickType::ShortPress)
                .unwrap_or(false);

        if !single_short_press {
            return options;
        }

        let overlapping: Vec<&TriggerKey> = keymaps
            .iter()
            .filter(|other| other.uid() != keymap.uid() && other.is_enabled())
            .flat_map(|other| other.trigger().keys())
            .filter(|other_key| {
                trigger
                    .keys()
                    .iter()
                    .any(|key| key.is_same_input(other_key))
            })
            .collect();

        if overlapping
            .iter()
            .any(|key| key.click_type() != ClickType::ShortPress)
        {
            options.short_press_on_release = true;
        }
        if overlapping
            .iter()
            .any(|key| key.click_type() == ClickType::DoublePress)
        {
            options.detect_double_press = true;
        }

        options
    }

    pub fn matcher(&self, keymap_uid: &str) -> Option<&TriggerMatcher> {
        self.matchers.get(keymap_uid)
    }

    pub fn matchers(&self) -> impl Iterator<Item = &TriggerMatcher> {
        self.matchers.values()
    }

    pub fn constraint_snapshot(&self) -> &ConstraintSnapshot {
        &self.snapshot
    }

    /// Replace the host state constraints are evaluated against.
    ///
    /// Matchers that stop listening in the middle of a press are cancelled,
    /// so whatever they fired is released.
    pub fn set_constraint_snapshot(&mut self, snapshot: ConstraintSnapshot) -> Vec<Detection> {
        self.snapshot = snapshot;
        let mut out = Vec::new();
        self.cancel_unheard(&mut out);
        out
    }

    /// Cancel in-flight matchers that no longer receive events.
    fn cancel_unheard(&mut self, out: &mut Vec<Detection>) {
        let snapshot = &self.snapshot;
        for matcher in self.matchers.values_mut() {
            if matcher.is_in_flight() && !listens(matcher, snapshot) {
                matcher.cancel(out);
            }
        }
    }

    /// Enable or disable one key map. Disabling cancels its detection.
    pub fn set_enabled(&mut self, keymap_uid: &str, enabled: bool) -> Vec<Detection> {
        let mut out = Vec::new();
        match self.matchers.get_mut(keymap_uid) {
            Some(matcher) => matcher.set_enabled(enabled, &mut out),
            None => debug!("No matcher for key map {}", keymap_uid),
        }
        out
    }

    /// Cancel every matcher.
    pub fn cancel_all(&mut self) -> Vec<Detection> {
        let mut out = Vec::new();
        for matcher in self.matchers.values_mut() {
            matcher.cancel(&mut out);
        }
        out
    }

    /// Feed one event to every listening matcher.
    pub fn handle_event(&mut self, event: &InputEvent) -> EngineOutput {
        let mut output = EngineOutput::default();

        if let Some(time_ms) = event.time_ms() {
            output.detections = self.tick(time_ms);
        }

        match event {
            InputEvent::Key(key_event) => {
                if key_event.key_code == KEYCODE_UNKNOWN && key_event.scan_code.is_none() {
                    warn!("Ignoring key event without key code or scan code");
                    return output;
                }

                let uids = self.listening_uids();
                for uid in uids {
                    if let Some(matcher) = self.matchers.get_mut(&uid) {
                        output.consume |= matcher.handle_key(key_event, &mut output.detections);
                    }
                }
            }
            InputEvent::FloatingButton {
                button_uid,
                action,
                time_ms,
            } => {
                for uid in self.listening_uids() {
                    if let Some(matcher) = self.matchers.get_mut(&uid) {
                        output.consume |= matcher.handle_floating_button(
                            button_uid,
                            *action,
                            *time_ms,
                            &mut output.detections,
                        );
                    }
                }
            }
            InputEvent::Assistant { kind, time_ms } => {
                for uid in self.listening_uids() {
                    if let Some(matcher) = self.matchers.get_mut(&uid) {
                        output.consume |=
                            matcher.handle_assistant(*kind, *time_ms, &mut output.detections);
                    }
                }
            }
            InputEvent::FingerprintGesture { gesture, time_ms } => {
                for uid in self.listening_uids() {
                    if let Some(matcher) = self.matchers.get_mut(&uid) {
                        output.consume |=
                            matcher.handle_fingerprint(*gesture, *time_ms, &mut output.detections);
                    }
                }
            }
            InputEvent::ScreenOff => {
                debug!("Screen off");
                self.snapshot.screen_on = false;
                for matcher in self.matchers.values_mut() {
                    if !matcher.detects_when_screen_off() {
                        matcher.cancel(&mut output.detections);
                    }
                }
                self.cancel_unheard(&mut output.detections);
            }
            InputEvent::ScreenOn => {
                debug!("Screen on");
                self.snapshot.screen_on = true;
                self.cancel_unheard(&mut output.detections);
            }
            InputEvent::DeviceRemoved { descriptor } => {
                info!("Input device {} removed, cancelling detection", descriptor);
                for matcher in self.matchers.values_mut() {
                    matcher.forget_device(descriptor);
                    matcher.cancel(&mut output.detections);
                }
            }
        }

        output
    }

    fn listening_uids(&self) -> Vec<String> {
        self.matchers
            .values()
            .filter(|matcher| listens(matcher, &self.snapshot))
            .map(|matcher| matcher.keymap_uid().to_string())
            .collect()
    }

    /// Advance every matcher's timers to `now_ms`.
    pub fn tick(&mut self, now_ms: u64) -> Vec<Detection> {
        let mut out = Vec::new();
        for matcher in self.matchers.values_mut() {
            matcher.tick(now_ms, &mut out);
        }
        out
    }

    /// Earliest time at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<u64> {
        self.matchers
            .values()
            .filter_map(TriggerMatcher::next_deadline)
            .min()
    }
}

fn listens(matcher: &TriggerMatcher, snapshot: &ConstraintSnapshot) -> bool {
    matcher.is_enabled()
        && (snapshot.screen_on || matcher.detects_when_screen_off())
        && matcher.constraints_satisfied(snapshot)
}
