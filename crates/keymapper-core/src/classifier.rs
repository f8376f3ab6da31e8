// Keymapper Key Event Classifier
// Turns down/up timestamps into short, long and double presses

use std::collections::HashMap;

use log::trace;

use crate::input::InputDeviceInfo;
use crate::trigger::ClickType;

/// Identity of a physical press source.
///
/// Two events with the same id are the same key on the same device, which
/// is what double press and long press timing is tracked per.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PressId {
    Key {
        key_code: i32,
        scan_code: Option<i32>,
        device: Option<InputDeviceInfo>,
    },
    FloatingButton(String),
}

impl PressId {
    pub fn device(&self) -> Option<&InputDeviceInfo> {
        match self {
            PressId::Key { device, .. } => device.as_ref(),
            PressId::FloatingButton(_) => None,
        }
    }
}

/// What happened to a press source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressKind {
    Down,
    Up,
    /// The press has been classified
    Click(ClickType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub id: PressId,
    pub kind: PressKind,
    pub time_ms: u64,
}

impl Classified {
    fn new(id: &PressId, kind: PressKind, time_ms: u64) -> Self {
        Self {
            id: id.clone(),
            kind,
            time_ms,
        }
    }
}

/// Thresholds used to classify presses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Hold time after which a press is a long press (ms)
    pub long_press_delay: u64,
    /// Window after a release in which a second press is a double press (ms)
    pub double_press_delay: u64,
    /// Wait for the double press window before finalising a short press.
    /// Without it a short press is final on release.
    pub detect_double_press: bool,
}

/// Sub-states of a tracked press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PressPhase {
    /// Down, timing the press to tell short from long
    Pending,
    /// Long press already reported, waiting for the release
    LongPressed,
    /// Released once, waiting for a possible second press
    AwaitingSecond,
    /// Second press of a double press, waiting for the release
    SecondPress,
}

#[derive(Debug, Clone, Copy)]
struct PressState {
    phase: PressPhase,
    since_ms: u64,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    LongPress,
    DoublePressWindow,
}

#[derive(Debug, Clone)]
struct Timer {
    id: PressId,
    kind: TimerKind,
    generation: u64,
    due_ms: u64,
}

/// Per press source state machine.
///
/// Timers never call back. They are due records checked by [`tick`], tagged
/// with the generation of the press that scheduled them, so a timer whose
/// press was reset or superseded is dropped instead of firing.
///
/// [`tick`]: KeyEventClassifier::tick
#[derive(Debug)]
pub struct KeyEventClassifier {
    config: ClassifierConfig,
    presses: HashMap<PressId, PressState>,
    timers: Vec<Timer>,
    next_generation: u64,
}

impl KeyEventClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            presses: HashMap::new(),
            timers: Vec::new(),
            next_generation: 1,
        }
    }

    pub fn config(&self) -> ClassifierConfig {
        self.config
    }

    /// Whether `id` is currently held down.
    pub fn is_down(&self, id: &PressId) -> bool {
        self.presses
            .get(id)
            .map(|state| {
                matches!(
                    state.phase,
                    PressPhase::Pending | PressPhase::LongPressed | PressPhase::SecondPress
                )
            })
            .unwrap_or(false)
    }

    /// No press is tracked and no timer is pending.
    pub fn is_idle(&self) -> bool {
        self.presses.is_empty() && self.timers.is_empty()
    }

    fn start(&mut self, id: &PressId, phase: PressPhase, time_ms: u64) -> u64 {
        self.drop_timers(id);
        let generation = self.next_generation;
        self.next_generation += 1;
        self.presses.insert(
            id.clone(),
            PressState {
                phase,
                since_ms: time_ms,
                generation,
            },
        );
        generation
    }

    fn finish(&mut self, id: &PressId) {
        self.presses.remove(id);
        self.drop_timers(id);
    }

    fn drop_timers(&mut self, id: &PressId) {
        self.timers.retain(|timer| timer.id != *id);
    }

    fn schedule(&mut self, id: &PressId, kind: TimerKind, generation: u64, due_ms: u64) {
        self.timers.push(Timer {
            id: id.clone(),
            kind,
            generation,
            due_ms,
        });
    }

    /// A press source went down.
    pub fn press(&mut self, id: &PressId, time_ms: u64) -> Vec<Classified> {
        let mut out = self.tick(time_ms);

        match self.presses.get(id).copied() {
            Some(state) if state.phase == PressPhase::AwaitingSecond => {
                // The window timer has not expired, so this is the second press
                out.push(Classified::new(id, PressKind::Down, time_ms));
                out.push(Classified::new(
                    id,
                    PressKind::Click(ClickType::DoublePress),
                    time_ms,
                ));
                self.start(id, PressPhase::SecondPress, time_ms);
                trace!("Double press of {:?}", id);
            }
            Some(_) => {
                // Down while already down: a lost up event, start over
                trace!("Repeated down of {:?}, restarting press", id);
                out.push(Classified::new(id, PressKind::Down, time_ms));
                self.begin_press(id, time_ms);
            }
            None => {
                out.push(Classified::new(id, PressKind::Down, time_ms));
                self.begin_press(id, time_ms);
            }
        }

        out
    }

    fn begin_press(&mut self, id: &PressId, time_ms: u64) {
        let generation = self.start(id, PressPhase::Pending, time_ms);
        let due_ms = time_ms.saturating_add(self.config.long_press_delay);
        self.schedule(id, TimerKind::LongPress, generation, due_ms);
    }

    /// A press source went up.
    pub fn release(&mut self, id: &PressId, time_ms: u64) -> Vec<Classified> {
        let mut out = self.tick(time_ms);

        let Some(state) = self.presses.get(id).copied() else {
            // Up without a tracked down, e.g. pressed before a reset
            out.push(Classified::new(id, PressKind::Up, time_ms));
            return out;
        };

        match state.phase {
            PressPhase::Pending if self.config.detect_double_press => {
                out.push(Classified::new(id, PressKind::Up, time_ms));
                let generation = self.start(id, PressPhase::AwaitingSecond, time_ms);
                let due_ms = time_ms.saturating_add(self.config.double_press_delay);
                self.schedule(id, TimerKind::DoublePressWindow, generation, due_ms);
            }
            PressPhase::Pending => {
                self.finish(id);
                out.push(Classified::new(
                    id,
                    PressKind::Click(ClickType::ShortPress),
                    time_ms,
                ));
                out.push(Classified::new(id, PressKind::Up, time_ms));
            }
            PressPhase::LongPressed | PressPhase::SecondPress => {
                self.finish(id);
                out.push(Classified::new(id, PressKind::Up, time_ms));
            }
            PressPhase::AwaitingSecond => {
                out.push(Classified::new(id, PressKind::Up, time_ms));
            }
        }

        out
    }

    /// Process every timer due at or before `now_ms`, oldest first.
    pub fn tick(&mut self, now_ms: u64) -> Vec<Classified> {
        let mut out = Vec::new();
        if self.timers.is_empty() {
            return out;
        }

        let mut due: Vec<Timer> = Vec::new();
        self.timers.retain(|timer| {
            if timer.due_ms <= now_ms {
                due.push(timer.clone());
                false
            } else {
                true
            }
        });
        due.sort_by_key(|timer| timer.due_ms);

        for timer in due {
            let Some(state) = self.presses.get(&timer.id).copied() else {
                continue;
            };
            if state.generation != timer.generation {
                trace!("Dropping stale {:?} timer for {:?}", timer.kind, timer.id);
                continue;
            }

            match (timer.kind, state.phase) {
                (TimerKind::LongPress, PressPhase::Pending) => {
                    if let Some(state) = self.presses.get_mut(&timer.id) {
                        state.phase = PressPhase::LongPressed;
                    }
                    out.push(Classified::new(
                        &timer.id,
                        PressKind::Click(ClickType::LongPress),
                        timer.due_ms,
                    ));
                }
                (TimerKind::DoublePressWindow, PressPhase::AwaitingSecond) => {
                    self.finish(&timer.id);
                    out.push(Classified::new(
                        &timer.id,
                        PressKind::Click(ClickType::ShortPress),
                        timer.due_ms,
                    ));
                }
                _ => {}
            }
        }

        out
    }

    /// Forget every press and invalidate every pending timer.
    pub fn reset(&mut self) {
        self.presses.clear();
        self.timers.clear();
        self.next_generation += 1;
    }

    /// Forget presses from one device.
    pub fn forget_device(&mut self, descriptor: &str) {
        self.presses
            .retain(|id, _| id.device().map(|d| d.descriptor != descriptor).unwrap_or(true));
        let presses = &self.presses;
        self.timers.retain(|timer| presses.contains_key(&timer.id));
    }

    /// Earliest pending timer, for hosts that sleep until the next tick.
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.iter().map(|timer| timer.due_ms).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier(detect_double_press: bool) -> KeyEventClassifier {
        KeyEventClassifier::new(ClassifierConfig {
            long_press_delay: 500,
            double_press_delay: 300,
            detect_double_press,
        })
    }

    fn key(key_code: i32) -> PressId {
        PressId::Key {
            key_code,
            scan_code: None,
            device: None,
        }
    }

    fn clicks(events: &[Classified]) -> Vec<ClickType> {
        events
            .iter()
            .filter_map(|event| match event.kind {
                PressKind::Click(click_type) => Some(click_type),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_short_press_final_on_release() {
        let mut classifier = classifier(false);
        let down = classifier.press(&key(24), 0);
        assert_eq!(down[0].kind, PressKind::Down);

        let up = classifier.release(&key(24), 100);
        assert_eq!(clicks(&up), vec![ClickType::ShortPress]);
        assert_eq!(up.last().map(|e| e.kind), Some(PressKind::Up));
        assert!(clicks(&classifier.tick(1000)).is_empty());
    }

    #[test]
    fn test_long_press_while_held() {
        let mut classifier = classifier(true);
        classifier.press(&key(24), 0);
        assert!(classifier.tick(499).is_empty());

        let events = classifier.tick(500);
        assert_eq!(clicks(&events), vec![ClickType::LongPress]);
        assert_eq!(events[0].time_ms, 500);
        assert!(classifier.is_down(&key(24)));

        let up = classifier.release(&key(24), 800);
        assert!(clicks(&up).is_empty());
        assert!(!classifier.is_down(&key(24)));
    }

    #[test]
    fn test_release_after_threshold_without_tick_is_long_press() {
        let mut classifier = classifier(false);
        classifier.press(&key(24), 0);
        let up = classifier.release(&key(24), 700);
        assert_eq!(clicks(&up), vec![ClickType::LongPress]);
        assert_eq!(up.last().map(|e| e.kind), Some(PressKind::Up));
    }

    #[test]
    fn test_short_press_pending_until_window_ends() {
        let mut classifier = classifier(true);
        classifier.press(&key(24), 0);
        assert!(clicks(&classifier.release(&key(24), 100)).is_empty());
        assert!(clicks(&classifier.tick(399)).is_empty());
        assert_eq!(clicks(&classifier.tick(400)), vec![ClickType::ShortPress]);
    }

    #[test]
    fn test_double_press_inside_window() {
        let mut classifier = classifier(true);
        classifier.press(&key(24), 0);
        classifier.release(&key(24), 100);

        let second = classifier.press(&key(24), 250);
        assert_eq!(clicks(&second), vec![ClickType::DoublePress]);

        // Holding the second press does not turn it into a long press
        assert!(clicks(&classifier.tick(2000)).is_empty());
        assert!(clicks(&classifier.release(&key(24), 2100)).is_empty());
    }

    #[test]
    fn test_second_press_after_window_is_new_press() {
        let mut classifier = classifier(true);
        classifier.press(&key(24), 0);
        classifier.release(&key(24), 100);

        let events = classifier.press(&key(24), 450);
        assert_eq!(clicks(&events), vec![ClickType::ShortPress]);
        assert_eq!(events.last().map(|e| e.kind), Some(PressKind::Down));
    }

    #[test]
    fn test_long_press_preempts_double_press_window() {
        let mut classifier = classifier(true);
        classifier.press(&key(24), 0);
        let events = classifier.tick(600);
        assert_eq!(clicks(&events), vec![ClickType::LongPress]);
        classifier.release(&key(24), 650);
        // No pending short press after a long press
        assert!(clicks(&classifier.tick(2000)).is_empty());
    }

    #[test]
    fn test_keys_are_tracked_independently() {
        let mut classifier = classifier(false);
        classifier.press(&key(24), 0);
        classifier.press(&key(25), 300);
        let events = classifier.tick(500);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, key(24));
        let events = classifier.tick(800);
        assert_eq!(events[0].id, key(25));
    }

    #[test]
    fn test_same_code_on_other_device_is_other_press() {
        let mut classifier = classifier(true);
        let a = PressId::Key {
            key_code: 24,
            scan_code: None,
            device: Some(InputDeviceInfo::new("a", "A")),
        };
        let b = PressId::Key {
            key_code: 24,
            scan_code: None,
            device: Some(InputDeviceInfo::new("b", "B")),
        };
        classifier.press(&a, 0);
        classifier.release(&a, 50);
        let events = classifier.press(&b, 100);
        assert!(!clicks(&events).contains(&ClickType::DoublePress));
    }

    #[test]
    fn test_reset_discards_timers() {
        let mut classifier = classifier(true);
        classifier.press(&key(24), 0);
        assert!(!classifier.is_idle());
        classifier.reset();
        assert!(classifier.is_idle());
        assert!(classifier.tick(1000).is_empty());
        assert!(!classifier.is_down(&key(24)));
    }

    #[test]
    fn test_idle_after_double_press_window() {
        let mut classifier = classifier(true);
        classifier.press(&key(24), 0);
        classifier.release(&key(24), 50);
        // Still waiting to see whether a second press follows
        assert!(!classifier.is_idle());

        classifier.tick(350);
        assert!(classifier.is_idle());
    }

    #[test]
    fn test_forget_device() {
        let mut classifier = classifier(false);
        let id = PressId::Key {
            key_code: 24,
            scan_code: None,
            device: Some(InputDeviceInfo::new("gone", "Remote")),
        };
        classifier.press(&id, 0);
        classifier.press(&key(25), 0);
        classifier.forget_device("gone");
        assert!(!classifier.is_down(&id));
        assert!(classifier.is_down(&key(25)));
        assert_eq!(classifier.tick(600).len(), 1);
    }
}
