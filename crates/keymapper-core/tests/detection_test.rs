// Keymapper Detection Tests
//
// Drives the detection engine with timestamped input events and checks
// which key maps fire, when, and in which order.

use keymapper_core::builder::keymap as builder;
use keymapper_core::keycode::*;
use keymapper_core::{
    ActionData, AssistantKind, ClickType, Constraint, ConstraintSnapshot, Detection,
    DetectionEngine,
    EvdevDeviceInfo, Fire, InputDeviceInfo, InputEvent, KeyEventAction, KeyMap, PhoneState,
    RawKeyEvent, Settings, TriggerKeyDevice,
};

// =========================================================================
// Test Helpers
// =========================================================================

fn single_key(key_code: i32) -> KeyMap {
    builder::add_key_event_trigger_key(&KeyMap::new(), key_code, None, TriggerKeyDevice::Any, false)
}

fn two_keys(first: i32, second: i32) -> KeyMap {
    builder::add_key_event_trigger_key(
        &single_key(first),
        second,
        None,
        TriggerKeyDevice::Any,
        false,
    )
}

fn volume_sequence() -> KeyMap {
    builder::set_sequence_trigger_mode(&two_keys(KEYCODE_VOLUME_UP, KEYCODE_VOLUME_DOWN))
}

fn engine(keymaps: &[KeyMap]) -> DetectionEngine {
    DetectionEngine::with_keymaps(Settings::new(), keymaps)
}

fn down(key_code: i32, time_ms: u64) -> InputEvent {
    InputEvent::Key(RawKeyEvent::down(key_code, None, time_ms))
}

fn up(key_code: i32, time_ms: u64) -> InputEvent {
    InputEvent::Key(RawKeyEvent::up(key_code, None, time_ms))
}

fn fired(keymap: &KeyMap, click_type: ClickType) -> Detection {
    Detection::Fired(Fire {
        keymap_uid: keymap.uid().to_string(),
        click_type,
    })
}

fn released(keymap: &KeyMap) -> Detection {
    Detection::Released {
        keymap_uid: keymap.uid().to_string(),
    }
}

fn cancelled(keymap: &KeyMap) -> Detection {
    Detection::Cancelled {
        keymap_uid: keymap.uid().to_string(),
    }
}

fn handle(engine: &mut DetectionEngine, event: InputEvent) -> Vec<Detection> {
    engine.handle_event(&event).detections
}

// =========================================================================
// Single Key
// =========================================================================

#[test]
fn test_short_press_fires_on_down_and_releases_on_up() {
    let keymap = single_key(KEYCODE_VOLUME_UP);
    let mut engine = engine(&[keymap.clone()]);

    let output = engine.handle_event(&down(KEYCODE_VOLUME_UP, 0));
    assert_eq!(output.detections, vec![fired(&keymap, ClickType::ShortPress)]);
    assert!(output.consume);

    assert_eq!(handle(&mut engine, up(KEYCODE_VOLUME_UP, 80)), vec![released(&keymap)]);
}

#[test]
fn test_unrelated_key_is_not_consumed() {
    let mut engine = engine(&[single_key(KEYCODE_VOLUME_UP)]);

    let output = engine.handle_event(&down(KEYCODE_A, 0));
    assert!(output.detections.is_empty());
    assert!(!output.consume);
}

#[test]
fn test_long_press_fires_when_delay_elapses() {
    let keymap = builder::set_trigger_long_press(&single_key(KEYCODE_VOLUME_DOWN));
    let mut engine = engine(&[keymap.clone()]);

    assert!(handle(&mut engine, down(KEYCODE_VOLUME_DOWN, 1000)).is_empty());
    assert_eq!(engine.next_deadline(), Some(1500));
    assert!(engine.tick(1499).is_empty());
    assert_eq!(engine.tick(1500), vec![fired(&keymap, ClickType::LongPress)]);

    assert_eq!(handle(&mut engine, up(KEYCODE_VOLUME_DOWN, 1800)), vec![released(&keymap)]);
}

#[test]
fn test_long_press_released_early_never_fires() {
    let keymap = builder::set_trigger_long_press(&single_key(KEYCODE_VOLUME_DOWN));
    let mut engine = engine(&[keymap]);

    assert!(handle(&mut engine, down(KEYCODE_VOLUME_DOWN, 0)).is_empty());
    assert!(handle(&mut engine, up(KEYCODE_VOLUME_DOWN, 200)).is_empty());
    assert!(engine.tick(1000).is_empty());
    assert_eq!(engine.next_deadline(), None);
}

#[test]
fn test_long_press_fires_from_next_event_time() {
    let keymap = builder::set_trigger_long_press(&single_key(KEYCODE_VOLUME_DOWN));
    let mut engine = engine(&[keymap.clone()]);

    handle(&mut engine, down(KEYCODE_VOLUME_DOWN, 0));
    // No explicit tick: the release itself carries the clock past the delay
    assert_eq!(
        handle(&mut engine, up(KEYCODE_VOLUME_DOWN, 900)),
        vec![fired(&keymap, ClickType::LongPress), released(&keymap)]
    );
}

#[test]
fn test_double_press_fires_on_second_down() {
    let keymap = builder::set_trigger_double_press(&single_key(KEYCODE_CAMERA));
    let mut engine = engine(&[keymap.clone()]);

    assert!(handle(&mut engine, down(KEYCODE_CAMERA, 0)).is_empty());
    assert!(handle(&mut engine, up(KEYCODE_CAMERA, 100)).is_empty());
    assert_eq!(
        handle(&mut engine, down(KEYCODE_CAMERA, 200)),
        vec![fired(&keymap, ClickType::DoublePress)]
    );
    assert_eq!(handle(&mut engine, up(KEYCODE_CAMERA, 260)), vec![released(&keymap)]);
}

#[test]
fn test_double_press_too_slow_does_not_fire() {
    let keymap = builder::set_trigger_double_press(&single_key(KEYCODE_CAMERA));
    let mut engine = engine(&[keymap]);

    handle(&mut engine, down(KEYCODE_CAMERA, 0));
    handle(&mut engine, up(KEYCODE_CAMERA, 100));
    // Window closes at 400
    assert!(handle(&mut engine, down(KEYCODE_CAMERA, 500)).is_empty());
    assert!(handle(&mut engine, up(KEYCODE_CAMERA, 550)).is_empty());
}

// =========================================================================
// Parallel and Sequence
// =========================================================================

#[test]
fn test_parallel_fires_when_all_keys_down() {
    let keymap = two_keys(KEYCODE_VOLUME_UP, KEYCODE_VOLUME_DOWN);
    let mut engine = engine(&[keymap.clone()]);

    assert!(handle(&mut engine, down(KEYCODE_VOLUME_DOWN, 0)).is_empty());
    assert_eq!(
        handle(&mut engine, down(KEYCODE_VOLUME_UP, 40)),
        vec![fired(&keymap, ClickType::ShortPress)]
    );
    assert_eq!(handle(&mut engine, up(KEYCODE_VOLUME_UP, 150)), vec![released(&keymap)]);
    assert!(handle(&mut engine, up(KEYCODE_VOLUME_DOWN, 160)).is_empty());
}

#[test]
fn test_parallel_release_before_completion_resets() {
    let keymap = two_keys(KEYCODE_VOLUME_UP, KEYCODE_VOLUME_DOWN);
    let mut engine = engine(&[keymap.clone()]);

    handle(&mut engine, down(KEYCODE_VOLUME_UP, 0));
    handle(&mut engine, up(KEYCODE_VOLUME_UP, 50));
    assert!(handle(&mut engine, down(KEYCODE_VOLUME_DOWN, 100)).is_empty());

    // Pressing the first key again completes the chord
    assert_eq!(
        handle(&mut engine, down(KEYCODE_VOLUME_UP, 150)),
        vec![fired(&keymap, ClickType::ShortPress)]
    );
}

#[test]
fn test_parallel_long_press_waits_for_every_key() {
    let keymap = builder::set_trigger_long_press(&two_keys(KEYCODE_VOLUME_UP, KEYCODE_VOLUME_DOWN));
    let mut engine = engine(&[keymap.clone()]);

    handle(&mut engine, down(KEYCODE_VOLUME_UP, 0));
    handle(&mut engine, down(KEYCODE_VOLUME_DOWN, 100));
    // First key crosses the threshold at 500, the second at 600
    assert!(engine.tick(500).is_empty());
    assert_eq!(engine.tick(600), vec![fired(&keymap, ClickType::LongPress)]);
}

#[test]
fn test_sequence_fires_on_last_release() {
    let keymap = volume_sequence();
    let mut engine = engine(&[keymap.clone()]);

    assert!(handle(&mut engine, down(KEYCODE_VOLUME_UP, 0)).is_empty());
    assert!(handle(&mut engine, up(KEYCODE_VOLUME_UP, 50)).is_empty());
    assert!(handle(&mut engine, down(KEYCODE_VOLUME_DOWN, 200)).is_empty());
    assert_eq!(
        handle(&mut engine, up(KEYCODE_VOLUME_DOWN, 260)),
        vec![fired(&keymap, ClickType::ShortPress), released(&keymap)]
    );
}

#[test]
fn test_sequence_out_of_order_does_not_fire() {
    let keymap = volume_sequence();
    let mut engine = engine(&[keymap]);

    handle(&mut engine, down(KEYCODE_VOLUME_DOWN, 0));
    handle(&mut engine, up(KEYCODE_VOLUME_DOWN, 50));
    handle(&mut engine, down(KEYCODE_VOLUME_UP, 100));
    assert!(handle(&mut engine, up(KEYCODE_VOLUME_UP, 150)).is_empty());
}

#[test]
fn test_sequence_times_out() {
    let keymap = volume_sequence();
    let mut engine = engine(&[keymap.clone()]);

    handle(&mut engine, down(KEYCODE_VOLUME_UP, 0));
    handle(&mut engine, up(KEYCODE_VOLUME_UP, 50));
    assert_eq!(engine.next_deadline(), Some(2050));

    // Default timeout is two seconds from the first key
    handle(&mut engine, down(KEYCODE_VOLUME_DOWN, 2100));
    assert!(handle(&mut engine, up(KEYCODE_VOLUME_DOWN, 2150)).is_empty());

    // A fresh attempt still works
    handle(&mut engine, down(KEYCODE_VOLUME_UP, 3000));
    handle(&mut engine, up(KEYCODE_VOLUME_UP, 3050));
    handle(&mut engine, down(KEYCODE_VOLUME_DOWN, 3100));
    assert_eq!(
        handle(&mut engine, up(KEYCODE_VOLUME_DOWN, 3150)),
        vec![fired(&keymap, ClickType::ShortPress), released(&keymap)]
    );
}

#[test]
fn test_custom_sequence_timeout() {
    let settings = Settings::new();
    let keymap = volume_sequence();
    let keymap = builder::set_sequence_trigger_timeout(&keymap, 300, &settings);
    let mut engine = engine(&[keymap]);

    handle(&mut engine, down(KEYCODE_VOLUME_UP, 0));
    handle(&mut engine, up(KEYCODE_VOLUME_UP, 50));
    assert_eq!(engine.next_deadline(), Some(350));

    handle(&mut engine, down(KEYCODE_VOLUME_DOWN, 400));
    assert!(handle(&mut engine, up(KEYCODE_VOLUME_DOWN, 450)).is_empty());
}

#[test]
fn test_evdev_sequence_binds_to_first_device() {
    let gamepad = EvdevDeviceInfo::new("Gamepad", 0x03, 0x045e, 0x028e);
    let keymap =
        builder::add_evdev_trigger_key(&KeyMap::new(), KEYCODE_VOLUME_DOWN, 114, gamepad.clone());
    let keymap = builder::add_evdev_trigger_key(&keymap, KEYCODE_VOLUME_DOWN, 114, gamepad);
    let mut engine = engine(&[keymap.clone()]);

    let first =
        InputDeviceInfo::new("/dev/input/event3", "Gamepad").with_ids(0x03, 0x045e, 0x028e);
    let second =
        InputDeviceInfo::new("/dev/input/event4", "Gamepad").with_ids(0x03, 0x045e, 0x028e);
    let press = |device: &InputDeviceInfo, time_ms: u64| {
        [
            InputEvent::Key(RawKeyEvent::down(
                KEYCODE_VOLUME_DOWN,
                Some(device.clone()),
                time_ms,
            )),
            InputEvent::Key(RawKeyEvent::up(
                KEYCODE_VOLUME_DOWN,
                Some(device.clone()),
                time_ms + 30,
            )),
        ]
    };

    let mut detections = Vec::new();
    for event in press(&first, 0).into_iter().chain(press(&second, 100)) {
        detections.extend(handle(&mut engine, event));
    }
    assert!(detections.is_empty(), "identical device must not complete the sequence");

    // The second device restarted the attempt
    for event in press(&second, 200) {
        detections.extend(handle(&mut engine, event));
    }
    assert_eq!(detections, vec![fired(&keymap, ClickType::ShortPress), released(&keymap)]);
}

// =========================================================================
// Overlap and Ordering
// =========================================================================

#[test]
fn test_short_press_waits_for_release_when_long_press_shares_key() {
    let short = single_key(KEYCODE_VOLUME_UP);
    let long = builder::set_trigger_long_press(&single_key(KEYCODE_VOLUME_UP));
    let mut engine = engine(&[short.clone(), long.clone()]);

    // Quick tap: only the short press fires, on release
    assert!(handle(&mut engine, down(KEYCODE_VOLUME_UP, 0)).is_empty());
    assert_eq!(
        handle(&mut engine, up(KEYCODE_VOLUME_UP, 100)),
        vec![fired(&short, ClickType::ShortPress), released(&short)]
    );

    // Hold: only the long press fires
    handle(&mut engine, down(KEYCODE_VOLUME_UP, 1000));
    assert_eq!(engine.tick(1500), vec![fired(&long, ClickType::LongPress)]);
    assert_eq!(handle(&mut engine, up(KEYCODE_VOLUME_UP, 1700)), vec![released(&long)]);
}

#[test]
fn test_disabled_overlap_keeps_short_press_on_down() {
    let short = single_key(KEYCODE_VOLUME_UP);
    let long = builder::set_enabled(
        &builder::set_trigger_long_press(&single_key(KEYCODE_VOLUME_UP)),
        false,
    );
    let mut engine = engine(&[short.clone(), long]);

    assert_eq!(
        handle(&mut engine, down(KEYCODE_VOLUME_UP, 0)),
        vec![fired(&short, ClickType::ShortPress)]
    );
}

#[test]
fn test_simultaneous_fires_follow_keymap_order() {
    let first = single_key(KEYCODE_VOLUME_UP);
    let second = single_key(KEYCODE_VOLUME_UP);

    let mut forward = engine(&[first.clone(), second.clone()]);
    assert_eq!(
        handle(&mut forward, down(KEYCODE_VOLUME_UP, 0)),
        vec![fired(&first, ClickType::ShortPress), fired(&second, ClickType::ShortPress)]
    );

    let mut backward = engine(&[second.clone(), first.clone()]);
    assert_eq!(
        handle(&mut backward, down(KEYCODE_VOLUME_UP, 0)),
        vec![fired(&second, ClickType::ShortPress), fired(&first, ClickType::ShortPress)]
    );
}

// =========================================================================
// Gestures and Floating Buttons
// =========================================================================

#[test]
fn test_assistant_completes_held_chord() {
    let keymap =
        builder::add_assistant_trigger_key(&single_key(KEYCODE_VOLUME_UP), AssistantKind::Any);
    let mut engine = engine(&[keymap.clone()]);

    // Without the key held the invocation does nothing
    let voice = InputEvent::Assistant {
        kind: AssistantKind::Voice,
        time_ms: 0,
    };
    assert!(handle(&mut engine, voice).is_empty());

    handle(&mut engine, down(KEYCODE_VOLUME_UP, 100));
    assert_eq!(
        handle(&mut engine, InputEvent::Assistant { kind: AssistantKind::Voice, time_ms: 150 }),
        vec![fired(&keymap, ClickType::ShortPress), released(&keymap)]
    );
}

#[test]
fn test_floating_button_short_press() {
    let keymap = builder::add_floating_button_key(&KeyMap::new(), "button-1");
    let mut engine = engine(&[keymap.clone()]);

    let press = |action, time_ms| InputEvent::FloatingButton {
        button_uid: "button-1".to_string(),
        action,
        time_ms,
    };

    let output = engine.handle_event(&press(KeyEventAction::Down, 0));
    assert_eq!(output.detections, vec![fired(&keymap, ClickType::ShortPress)]);
    assert_eq!(
        handle(&mut engine, press(KeyEventAction::Up, 40)),
        vec![released(&keymap)]
    );
}

// =========================================================================
// Screen, Constraints and Devices
// =========================================================================

#[test]
fn test_screen_off_cancels_only_screen_on_triggers() {
    let always = builder::set_trigger_when_screen_off(&single_key(KEYCODE_VOLUME_UP), true);
    let screen_on_only = builder::set_trigger_long_press(&single_key(KEYCODE_VOLUME_DOWN));
    let mut engine = engine(&[always.clone(), screen_on_only.clone()]);

    handle(&mut engine, down(KEYCODE_VOLUME_DOWN, 0));
    assert_eq!(handle(&mut engine, InputEvent::ScreenOff), vec![cancelled(&screen_on_only)]);
    assert!(engine.tick(1000).is_empty());
    handle(&mut engine, up(KEYCODE_VOLUME_DOWN, 1100));

    // Only the screen-off trigger listens now
    assert_eq!(
        handle(&mut engine, down(KEYCODE_VOLUME_UP, 1200)),
        vec![fired(&always, ClickType::ShortPress)]
    );
    handle(&mut engine, up(KEYCODE_VOLUME_UP, 1250));

    let output = engine.handle_event(&down(KEYCODE_VOLUME_DOWN, 1300));
    assert!(output.detections.is_empty());
    assert!(!output.consume);
    assert!(engine.tick(2000).is_empty());
    handle(&mut engine, up(KEYCODE_VOLUME_DOWN, 2100));

    handle(&mut engine, InputEvent::ScreenOn);
    handle(&mut engine, down(KEYCODE_VOLUME_DOWN, 3000));
    assert_eq!(engine.tick(3500), vec![fired(&screen_on_only, ClickType::LongPress)]);
}

#[test]
fn test_constraints_gate_detection() {
    let keymap = builder::add_action(&single_key(KEYCODE_HEADSETHOOK), ActionData::AnswerCall);
    let mut engine = engine(&[keymap.clone()]);

    let output = engine.handle_event(&down(KEYCODE_HEADSETHOOK, 0));
    assert!(output.detections.is_empty());
    assert!(!output.consume);
    handle(&mut engine, up(KEYCODE_HEADSETHOOK, 50));

    engine.set_constraint_snapshot(ConstraintSnapshot {
        phone_state: PhoneState::Ringing,
        ..ConstraintSnapshot::default()
    });
    assert_eq!(
        handle(&mut engine, down(KEYCODE_HEADSETHOOK, 100)),
        vec![fired(&keymap, ClickType::ShortPress)]
    );
}

#[test]
fn test_constraint_lost_while_fired_cancels() {
    let keymap = builder::add_constraint(&single_key(KEYCODE_VOLUME_UP), Constraint::WifiOn);
    let mut engine = engine(&[keymap.clone()]);
    let wifi_on = ConstraintSnapshot {
        wifi_on: true,
        ..ConstraintSnapshot::default()
    };

    engine.set_constraint_snapshot(wifi_on.clone());
    assert_eq!(
        handle(&mut engine, down(KEYCODE_VOLUME_UP, 0)),
        vec![fired(&keymap, ClickType::ShortPress)]
    );

    assert_eq!(
        engine.set_constraint_snapshot(ConstraintSnapshot::default()),
        vec![cancelled(&keymap)]
    );
    assert!(handle(&mut engine, up(KEYCODE_VOLUME_UP, 50)).is_empty());

    // The matcher is not left latched
    engine.set_constraint_snapshot(wifi_on);
    assert_eq!(
        handle(&mut engine, down(KEYCODE_VOLUME_UP, 100)),
        vec![fired(&keymap, ClickType::ShortPress)]
    );
    assert_eq!(handle(&mut engine, up(KEYCODE_VOLUME_UP, 150)), vec![released(&keymap)]);
}

#[test]
fn test_constraint_lost_during_long_press_cancels() {
    let keymap = builder::set_trigger_long_press(&single_key(KEYCODE_VOLUME_UP));
    let keymap = builder::add_constraint(&keymap, Constraint::Charging);
    let mut engine = engine(&[keymap.clone()]);
    engine.set_constraint_snapshot(ConstraintSnapshot {
        charging: true,
        ..ConstraintSnapshot::default()
    });

    assert!(handle(&mut engine, down(KEYCODE_VOLUME_UP, 0)).is_empty());
    assert_eq!(
        engine.set_constraint_snapshot(ConstraintSnapshot::default()),
        vec![cancelled(&keymap)]
    );
    assert!(engine.tick(1000).is_empty());
    assert!(handle(&mut engine, up(KEYCODE_VOLUME_UP, 1100)).is_empty());
}

#[test]
fn test_idle_keymaps_are_not_cancelled_by_constraint_changes() {
    let keymap = builder::add_constraint(&single_key(KEYCODE_VOLUME_UP), Constraint::WifiOn);
    let mut engine = engine(&[keymap]);

    engine.set_constraint_snapshot(ConstraintSnapshot {
        wifi_on: true,
        ..ConstraintSnapshot::default()
    });
    assert!(engine
        .set_constraint_snapshot(ConstraintSnapshot::default())
        .is_empty());
}

#[test]
fn test_screen_on_cancels_fired_screen_off_only_keymap() {
    let keymap = builder::set_trigger_when_screen_off(&single_key(KEYCODE_VOLUME_UP), true);
    let keymap = builder::add_constraint(&keymap, Constraint::ScreenOff);
    let mut engine = engine(&[keymap.clone()]);

    assert!(handle(&mut engine, InputEvent::ScreenOff).is_empty());
    assert_eq!(
        handle(&mut engine, down(KEYCODE_VOLUME_UP, 0)),
        vec![fired(&keymap, ClickType::ShortPress)]
    );
    assert_eq!(handle(&mut engine, InputEvent::ScreenOn), vec![cancelled(&keymap)]);
    assert!(handle(&mut engine, up(KEYCODE_VOLUME_UP, 50)).is_empty());
}

#[test]
fn test_unknown_key_without_scan_code_is_dropped() {
    let keymap = single_key(KEYCODE_VOLUME_UP);
    let mut engine = engine(&[keymap]);

    let output = engine.handle_event(&down(KEYCODE_UNKNOWN, 0));
    assert!(output.detections.is_empty());
    assert!(!output.consume);
}

#[test]
fn test_device_removal_cancels_in_flight_press() {
    let keymap = builder::set_trigger_long_press(&single_key(KEYCODE_VOLUME_UP));
    let mut engine = engine(&[keymap.clone()]);

    let keyboard = InputDeviceInfo::new("/dev/input/event2", "Keyboard");
    handle(
        &mut engine,
        InputEvent::Key(RawKeyEvent::down(KEYCODE_VOLUME_UP, Some(keyboard), 0)),
    );

    let detections = handle(
        &mut engine,
        InputEvent::DeviceRemoved {
            descriptor: "/dev/input/event2".to_string(),
        },
    );
    assert_eq!(detections, vec![cancelled(&keymap)]);
    assert!(engine.tick(1000).is_empty());
}

#[test]
fn test_disabling_keymap_cancels_it() {
    let keymap = builder::set_trigger_long_press(&single_key(KEYCODE_VOLUME_UP));
    let mut engine = engine(&[keymap.clone()]);

    handle(&mut engine, down(KEYCODE_VOLUME_UP, 0));
    assert_eq!(engine.set_enabled(keymap.uid(), false), vec![cancelled(&keymap)]);
    assert!(engine.tick(1000).is_empty());
    assert!(handle(&mut engine, down(KEYCODE_VOLUME_UP, 1100)).is_empty());
}
