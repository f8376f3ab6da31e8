// Keymapper Action Dispatcher
// Performs, holds and repeats the actions of fired key maps

use indexmap::IndexMap;
use log::{debug, warn};
use thiserror::Error;

use crate::action::{ActionData, InputEventType, KeyMapAction, RepeatMode};
use crate::keymap::KeyMap;
use crate::matcher::Detection;
use crate::settings::Settings;

/// Why an action could not be performed.
#[derive(Debug, Error)]
pub enum PerformError {
    #[error("Unsupported action: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Action failed: {0}")]
    Failed(String),
}

/// Executes action payloads. Implemented by the host.
pub trait ActionPerformer {
    fn perform(&mut self, data: &ActionData, event_type: InputEventType)
        -> Result<(), PerformError>;
}

/// Result of one perform of one action.
#[derive(Debug)]
pub struct ActionOutcome {
    pub keymap_uid: String,
    pub action_uid: String,
    pub event_type: InputEventType,
    pub result: Result<(), PerformError>,
}

impl ActionOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Default timings for actions that leave their own unset (ms).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTimings {
    pub repeat_delay: u64,
    pub repeat_rate: u64,
    pub hold_down_duration: u64,
}

impl DispatchTimings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            repeat_delay: u64::from(settings.repeat_delay()),
            repeat_rate: u64::from(settings.repeat_rate()),
            hold_down_duration: u64::from(settings.hold_down_duration()),
        }
    }

    fn repeat_delay(&self, action: &KeyMapAction) -> u64 {
        action.repeat_delay.map(u64::from).unwrap_or(self.repeat_delay)
    }

    fn repeat_rate(&self, action: &KeyMapAction) -> u64 {
        // A zero rate would never let time advance
        action
            .repeat_rate
            .map(u64::from)
            .unwrap_or(self.repeat_rate)
            .max(1)
    }

    fn hold_down_duration(&self, action: &KeyMapAction) -> u64 {
        action
            .hold_down_duration
            .map(u64::from)
            .unwrap_or(self.hold_down_duration)
    }
}

#[derive(Debug, Clone, Copy)]
struct RepeatTask {
    generation: u64,
    due_ms: u64,
    /// Hold-down repeat: down was sent, up is due next
    pending_up: bool,
    count: u32,
}

/// First pass over the action list after a fire.
#[derive(Debug, Clone, Copy)]
struct InitialPass {
    generation: u64,
    next_index: usize,
    due_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Initial,
    Repeat(usize),
}

/// Action state of one key map.
///
/// Every scheduled task carries the generation it was started in. A reset
/// bumps the generation, so stopping is immediate and stopping twice is a
/// no-op.
#[derive(Debug)]
pub struct ActionDispatcher {
    keymap_uid: String,
    actions: Vec<KeyMapAction>,
    timings: DispatchTimings,
    held: Vec<bool>,
    repeats: Vec<Option<RepeatTask>>,
    initial: Option<InitialPass>,
    generation: u64,
}

impl ActionDispatcher {
    pub fn new(
        keymap_uid: impl Into<String>,
        actions: Vec<KeyMapAction>,
        timings: DispatchTimings,
    ) -> Self {
        let count = actions.len();
        Self {
            keymap_uid: keymap_uid.into(),
            actions,
            timings,
            held: vec![false; count],
            repeats: vec![None; count],
            initial: None,
            generation: 0,
        }
    }

    pub fn from_keymap(keymap: &KeyMap, timings: DispatchTimings) -> Self {
        Self::new(keymap.uid(), keymap.actions().to_vec(), timings)
    }

    pub fn keymap_uid(&self) -> &str {
        &self.keymap_uid
    }

    pub fn is_held(&self, index: usize) -> bool {
        self.held.get(index).copied().unwrap_or(false)
    }

    pub fn is_repeating(&self, index: usize) -> bool {
        self.repeats.get(index).map(Option::is_some).unwrap_or(false)
    }

    /// Whether any action is held down, repeating or still to be performed.
    pub fn is_busy(&self) -> bool {
        self.initial.is_some()
            || self.held.iter().any(|held| *held)
            || self.repeats.iter().any(Option::is_some)
    }

    /// The trigger fired.
    pub fn on_triggered(
        &mut self,
        now_ms: u64,
        performer: &mut dyn ActionPerformer,
    ) -> Vec<ActionOutcome> {
        self.generation += 1;
        let generation = self.generation;
        let mut outcomes = Vec::new();

        for index in 0..self.actions.len() {
            // A hold-down repeat caught between its Down and Up is released
            // before the slot is cleared or replaced
            let was_repeating = self.repeats[index].is_some();
            if let Some(outcome) = self.stop_repeat(index, performer) {
                outcomes.push(outcome);
            }

            let action = &self.actions[index];
            if !action.repeat {
                continue;
            }

            // Firing again toggles this kind of repeat off
            if action.repeat_mode == RepeatMode::TriggerPressedAgain && was_repeating {
                debug!("Stopped repeating action {}", action.uid);
                continue;
            }

            if action.data.is_modifier_key_event() {
                continue;
            }

            self.repeats[index] = Some(RepeatTask {
                generation,
                due_ms: now_ms.saturating_add(self.timings.repeat_delay(action)),
                pending_up: false,
                count: 0,
            });
        }

        self.initial = Some(InitialPass {
            generation,
            next_index: 0,
            due_ms: now_ms,
        });

        outcomes.extend(self.tick(now_ms, performer));
        outcomes
    }

    /// The fired trigger was released.
    pub fn on_released(
        &mut self,
        _now_ms: u64,
        performer: &mut dyn ActionPerformer,
    ) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::new();

        for index in 0..self.actions.len() {
            if self.actions[index].repeat_mode == RepeatMode::TriggerReleased {
                if let Some(outcome) = self.stop_repeat(index, performer) {
                    outcomes.push(outcome);
                }
            }
        }

        for index in 0..self.actions.len() {
            let action = &self.actions[index];
            if action.hold_down
                && !action.stop_hold_down_when_trigger_pressed_again()
                && self.held[index]
            {
                self.held[index] = false;
                outcomes.push(self.perform(index, InputEventType::Up, performer));
            }
        }

        outcomes
    }

    /// Stop everything and release whatever is held.
    pub fn reset(&mut self, performer: &mut dyn ActionPerformer) -> Vec<ActionOutcome> {
        self.generation += 1;
        self.initial = None;

        let mut outcomes = Vec::new();
        for index in 0..self.actions.len() {
            if let Some(outcome) = self.stop_repeat(index, performer) {
                outcomes.push(outcome);
            }
            if self.held[index] {
                self.held[index] = false;
                outcomes.push(self.perform(index, InputEventType::Up, performer));
            }
        }
        outcomes
    }

    fn stop_repeat(
        &mut self,
        index: usize,
        performer: &mut dyn ActionPerformer,
    ) -> Option<ActionOutcome> {
        let task = self.repeats[index].take()?;
        if task.pending_up {
            Some(self.perform(index, InputEventType::Up, performer))
        } else {
            None
        }
    }

    /// Earliest time at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<u64> {
        let initial = self.initial.map(|pass| pass.due_ms);
        let repeats = self.repeats.iter().flatten().map(|task| task.due_ms);
        initial.into_iter().chain(repeats).min()
    }

    fn next_step(&self, now_ms: u64) -> Option<Step> {
        let mut best: Option<(u64, Step)> = self
            .initial
            .filter(|pass| pass.due_ms <= now_ms)
            .map(|pass| (pass.due_ms, Step::Initial));

        for (index, task) in self.repeats.iter().enumerate() {
            if let Some(task) = task {
                let earlier = best.map(|(due, _)| task.due_ms < due).unwrap_or(true);
                if task.due_ms <= now_ms && earlier {
                    best = Some((task.due_ms, Step::Repeat(index)));
                }
            }
        }

        best.map(|(_, step)| step)
    }

    /// Run every step due at or before `now_ms`, earliest first.
    pub fn tick(&mut self, now_ms: u64, performer: &mut dyn ActionPerformer) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::new();

        while let Some(step) = self.next_step(now_ms) {
            match step {
                Step::Initial => self.run_initial_step(performer, &mut outcomes),
                Step::Repeat(index) => self.run_repeat_step(index, performer, &mut outcomes),
            }
        }

        outcomes
    }

    fn run_initial_step(
        &mut self,
        performer: &mut dyn ActionPerformer,
        outcomes: &mut Vec<ActionOutcome>,
    ) {
        let Some(pass) = self.initial.take() else {
            return;
        };
        if pass.generation != self.generation {
            return;
        }

        let index = pass.next_index;
        let Some(action) = self.actions.get(index) else {
            return;
        };

        let toggles_off = (action.hold_down
            && action.repeat
            && action.repeat_mode == RepeatMode::TriggerPressedAgain)
            || action.stop_hold_down_when_trigger_pressed_again();
        let perform_up = toggles_off && self.held[index];

        let event_type = if perform_up {
            InputEventType::Up
        } else if action.hold_down {
            InputEventType::Down
        } else {
            InputEventType::DownUp
        };

        let mut due_ms = pass.due_ms;
        if action.repeat && action.hold_down {
            due_ms = due_ms.saturating_add(self.timings.hold_down_duration(action));
        }
        due_ms = due_ms.saturating_add(u64::from(action.delay_before_next_action.unwrap_or(0)));

        self.held[index] = action.hold_down && !perform_up;
        outcomes.push(self.perform(index, event_type, performer));

        if index + 1 < self.actions.len() {
            self.initial = Some(InitialPass {
                generation: pass.generation,
                next_index: index + 1,
                due_ms,
            });
        }
    }

    fn run_repeat_step(
        &mut self,
        index: usize,
        performer: &mut dyn ActionPerformer,
        outcomes: &mut Vec<ActionOutcome>,
    ) {
        let Some(mut task) = self.repeats[index].take() else {
            return;
        };
        if task.generation != self.generation {
            return;
        }

        let action = &self.actions[index];
        let hold_down = action.hold_down;
        let limit = action.effective_repeat_limit();
        let rate = self.timings.repeat_rate(action);
        let hold_duration = self.timings.hold_down_duration(action);

        if hold_down && !task.pending_up {
            outcomes.push(self.perform(index, InputEventType::Down, performer));
            task.pending_up = true;
            task.due_ms = task.due_ms.saturating_add(hold_duration);
            self.repeats[index] = Some(task);
            return;
        }

        let event_type = if hold_down {
            InputEventType::Up
        } else {
            InputEventType::DownUp
        };
        outcomes.push(self.perform(index, event_type, performer));
        task.pending_up = false;
        task.count += 1;

        if limit.map(|limit| task.count >= limit).unwrap_or(false) {
            debug!("Action {} reached its repeat limit", self.actions[index].uid);
            return;
        }

        task.due_ms = task.due_ms.saturating_add(rate);
        self.repeats[index] = Some(task);
    }

    fn perform(
        &self,
        index: usize,
        event_type: InputEventType,
        performer: &mut dyn ActionPerformer,
    ) -> ActionOutcome {
        let action = &self.actions[index];
        let mut result = Ok(());

        for _ in 0..action.times() {
            if let Err(err) = performer.perform(&action.data, event_type) {
                warn!(
                    "Key map {}: failed to perform {} ({}): {}",
                    self.keymap_uid, action.data, event_type, err
                );
                result = Err(err);
                break;
            }
        }

        ActionOutcome {
            keymap_uid: self.keymap_uid.clone(),
            action_uid: action.uid.clone(),
            event_type,
            result,
        }
    }
}

/// Dispatchers of every key map, driven by matcher detections.
#[derive(Debug, Default)]
pub struct ActionDispatchers {
    dispatchers: IndexMap<String, ActionDispatcher>,
}

impl ActionDispatchers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all dispatchers, releasing everything the old ones held.
    pub fn reload(
        &mut self,
        keymaps: &[KeyMap],
        settings: &Settings,
        performer: &mut dyn ActionPerformer,
    ) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::new();
        for dispatcher in self.dispatchers.values_mut() {
            outcomes.extend(dispatcher.reset(performer));
        }

        let timings = DispatchTimings::from_settings(settings);
        self.dispatchers = keymaps
            .iter()
            .map(|keymap| {
                (
                    keymap.uid().to_string(),
                    ActionDispatcher::from_keymap(keymap, timings),
                )
            })
            .collect();

        outcomes
    }

    pub fn get(&self, keymap_uid: &str) -> Option<&ActionDispatcher> {
        self.dispatchers.get(keymap_uid)
    }

    /// Apply detections in the order they were reported.
    pub fn handle(
        &mut self,
        detections: &[Detection],
        now_ms: u64,
        performer: &mut dyn ActionPerformer,
    ) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::new();

        for detection in detections {
            let Some(dispatcher) = self.dispatchers.get_mut(detection.keymap_uid()) else {
                debug!("No actions for key map {}", detection.keymap_uid());
                continue;
            };

            let step = match detection {
                Detection::Fired(_) => dispatcher.on_triggered(now_ms, performer),
                Detection::Released { .. } => dispatcher.on_released(now_ms, performer),
                Detection::Cancelled { .. } => dispatcher.reset(performer),
            };
            outcomes.extend(step);
        }

        outcomes
    }

    pub fn tick(&mut self, now_ms: u64, performer: &mut dyn ActionPerformer) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::new();
        for dispatcher in self.dispatchers.values_mut() {
            outcomes.extend(dispatcher.tick(now_ms, performer));
        }
        outcomes
    }

    /// Release everything, e.g. on shutdown.
    pub fn reset_all(&mut self, performer: &mut dyn ActionPerformer) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::new();
        for dispatcher in self.dispatchers.values_mut() {
            outcomes.extend(dispatcher.reset(performer));
        }
        outcomes
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.dispatchers
            .values()
            .filter_map(ActionDispatcher::next_deadline)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keycode::*;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(ActionData, InputEventType)>,
    }

    impl ActionPerformer for Recorder {
        fn perform(
            &mut self,
            data: &ActionData,
            event_type: InputEventType,
        ) -> Result<(), PerformError> {
            self.calls.push((data.clone(), event_type));
            Ok(())
        }
    }

    fn timings() -> DispatchTimings {
        DispatchTimings {
            repeat_delay: 400,
            repeat_rate: 50,
            hold_down_duration: 1000,
        }
    }

    fn events(recorder: &Recorder) -> Vec<InputEventType> {
        recorder.calls.iter().map(|(_, event)| *event).collect()
    }

    #[test]
    fn test_plain_action_performs_once() {
        let action = KeyMapAction::new(ActionData::ToggleFlashlight);
        let mut dispatcher = ActionDispatcher::new("km", vec![action], timings());
        let mut recorder = Recorder::default();

        let outcomes = dispatcher.on_triggered(0, &mut recorder);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_ok());
        dispatcher.on_released(10, &mut recorder);
        dispatcher.tick(5000, &mut recorder);

        assert_eq!(events(&recorder), vec![InputEventType::DownUp]);
        assert!(!dispatcher.is_busy());
    }

    #[test]
    fn test_hold_down_until_release() {
        let mut action = KeyMapAction::new(ActionData::key_event(KEYCODE_CTRL_LEFT));
        action.hold_down = true;
        let mut dispatcher = ActionDispatcher::new("km", vec![action], timings());
        let mut recorder = Recorder::default();

        dispatcher.on_triggered(0, &mut recorder);
        assert!(dispatcher.is_held(0));
        dispatcher.on_released(300, &mut recorder);
        assert!(!dispatcher.is_held(0));
        assert_eq!(events(&recorder), vec![InputEventType::Down, InputEventType::Up]);
    }

    #[test]
    fn test_stop_hold_down_when_pressed_again() {
        let mut action = KeyMapAction::new(ActionData::key_event(KEYCODE_SHIFT_LEFT));
        action.hold_down = true;
        action.hold_down_mode = crate::action::HoldDownMode::TriggerPressedAgain;
        let mut dispatcher = ActionDispatcher::new("km", vec![action], timings());
        let mut recorder = Recorder::default();

        dispatcher.on_triggered(0, &mut recorder);
        dispatcher.on_released(100, &mut recorder);
        assert!(dispatcher.is_held(0));

        dispatcher.on_triggered(500, &mut recorder);
        assert!(!dispatcher.is_held(0));
        assert_eq!(events(&recorder), vec![InputEventType::Down, InputEventType::Up]);
    }

    #[test]
    fn test_repeat_until_released() {
        let mut action = KeyMapAction::new(ActionData::key_event(KEYCODE_A));
        action.repeat = true;
        let mut dispatcher = ActionDispatcher::new("km", vec![action], timings());
        let mut recorder = Recorder::default();

        dispatcher.on_triggered(0, &mut recorder);
        dispatcher.tick(399, &mut recorder);
        assert_eq!(recorder.calls.len(), 1);

        // Repeats at 400, 450, 500
        dispatcher.tick(500, &mut recorder);
        assert_eq!(recorder.calls.len(), 4);

        dispatcher.on_released(510, &mut recorder);
        dispatcher.tick(2000, &mut recorder);
        assert_eq!(recorder.calls.len(), 4);
        assert!(!dispatcher.is_repeating(0));
    }

    #[test]
    fn test_repeat_limit_reached() {
        let mut action = KeyMapAction::new(ActionData::VolumeUp);
        action.repeat = true;
        action.repeat_mode = RepeatMode::LimitReached;
        action.repeat_limit = Some(3);
        let mut dispatcher = ActionDispatcher::new("km", vec![action], timings());
        let mut recorder = Recorder::default();

        dispatcher.on_triggered(0, &mut recorder);
        // Release does not stop a limit repeat
        dispatcher.on_released(10, &mut recorder);
        dispatcher.tick(10_000, &mut recorder);

        assert_eq!(recorder.calls.len(), 4);
        assert!(!dispatcher.is_repeating(0));
    }

    #[test]
    fn test_repeat_toggled_by_pressing_again() {
        let mut action = KeyMapAction::new(ActionData::VolumeDown);
        action.repeat = true;
        action.repeat_mode = RepeatMode::TriggerPressedAgain;
        let mut dispatcher = ActionDispatcher::new("km", vec![action], timings());
        let mut recorder = Recorder::default();

        dispatcher.on_triggered(0, &mut recorder);
        dispatcher.on_released(10, &mut recorder);
        dispatcher.tick(1000, &mut recorder);
        assert!(dispatcher.is_repeating(0));
        let performed = recorder.calls.len();

        dispatcher.on_triggered(1000, &mut recorder);
        assert!(!dispatcher.is_repeating(0));
        dispatcher.tick(5000, &mut recorder);
        assert_eq!(recorder.calls.len(), performed + 1);
    }

    #[test]
    fn test_modifier_key_never_repeats() {
        let mut action = KeyMapAction::new(ActionData::key_event(KEYCODE_ALT_LEFT));
        action.repeat = true;
        let mut dispatcher = ActionDispatcher::new("km", vec![action], timings());
        let mut recorder = Recorder::default();

        dispatcher.on_triggered(0, &mut recorder);
        assert!(!dispatcher.is_repeating(0));
    }

    #[test]
    fn test_hold_and_repeat_cycles_down_up() {
        let mut action = KeyMapAction::new(ActionData::key_event(KEYCODE_A));
        action.repeat = true;
        action.hold_down = true;
        action.hold_down_duration = Some(100);
        action.repeat_limit = Some(1);
        let mut dispatcher = ActionDispatcher::new("km", vec![action], timings());
        let mut recorder = Recorder::default();

        dispatcher.on_triggered(0, &mut recorder);
        dispatcher.tick(450, &mut recorder);
        assert_eq!(
            events(&recorder),
            vec![InputEventType::Down, InputEventType::Down]
        );
        dispatcher.tick(500, &mut recorder);
        assert_eq!(
            events(&recorder),
            vec![InputEventType::Down, InputEventType::Down, InputEventType::Up]
        );
    }

    #[test]
    fn test_pressing_again_releases_pending_hold_repeat() {
        let mut action = KeyMapAction::new(ActionData::key_event(KEYCODE_A));
        action.repeat = true;
        action.hold_down = true;
        action.repeat_mode = RepeatMode::TriggerPressedAgain;
        let mut dispatcher = ActionDispatcher::new("km", vec![action], timings());
        let mut recorder = Recorder::default();

        dispatcher.on_triggered(0, &mut recorder);
        dispatcher.on_released(10, &mut recorder);
        // The first repeat is down and waits for its up
        dispatcher.tick(450, &mut recorder);
        assert!(dispatcher.is_repeating(0));

        let outcomes = dispatcher.on_triggered(600, &mut recorder);
        assert_eq!(
            outcomes.iter().map(|o| o.event_type).collect::<Vec<_>>(),
            vec![InputEventType::Up, InputEventType::Down]
        );
        dispatcher.on_released(610, &mut recorder);
        dispatcher.tick(10_000, &mut recorder);

        let downs = events(&recorder)
            .iter()
            .filter(|event| **event == InputEventType::Down)
            .count();
        let ups = events(&recorder)
            .iter()
            .filter(|event| **event == InputEventType::Up)
            .count();
        assert_eq!(downs, 3);
        assert_eq!(ups, 3);
        assert!(!dispatcher.is_busy());
    }

    #[test]
    fn test_delay_before_next_action() {
        let mut first = KeyMapAction::new(ActionData::key_event(KEYCODE_A));
        first.delay_before_next_action = Some(200);
        let second = KeyMapAction::new(ActionData::key_event(KEYCODE_Z));
        let mut dispatcher = ActionDispatcher::new("km", vec![first, second], timings());
        let mut recorder = Recorder::default();

        dispatcher.on_triggered(0, &mut recorder);
        assert_eq!(recorder.calls.len(), 1);
        assert_eq!(dispatcher.next_deadline(), Some(200));

        dispatcher.tick(200, &mut recorder);
        assert_eq!(recorder.calls[1].0, ActionData::key_event(KEYCODE_Z));
    }

    #[test]
    fn test_multiplier() {
        let mut action = KeyMapAction::new(ActionData::VolumeMute);
        action.multiplier = Some(3);
        let mut dispatcher = ActionDispatcher::new("km", vec![action], timings());
        let mut recorder = Recorder::default();

        let outcomes = dispatcher.on_triggered(0, &mut recorder);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(recorder.calls.len(), 3);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut action = KeyMapAction::new(ActionData::key_event(KEYCODE_A));
        action.hold_down = true;
        action.repeat = true;
        let mut dispatcher = ActionDispatcher::new("km", vec![action], timings());
        let mut recorder = Recorder::default();

        dispatcher.on_triggered(0, &mut recorder);
        let first = dispatcher.reset(&mut recorder);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].event_type, InputEventType::Up);

        assert!(dispatcher.reset(&mut recorder).is_empty());
        assert!(dispatcher.tick(10_000, &mut recorder).is_empty());
        assert!(!dispatcher.is_busy());
    }
}
