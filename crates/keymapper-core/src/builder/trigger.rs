// Keymapper Trigger Builder
// Pure edit operations that always return a consistent Trigger

//! Every function takes the current trigger and returns the edited one.
//! None of them fail: a request that would break an invariant is either
//! repaired (mode switched, click types downgraded, conflicting keys
//! dropped) or ignored, returning the trigger unchanged.

use std::collections::HashSet;

use crate::keycode::is_modifier_key;
use crate::settings::Settings;
use crate::trigger::{
    new_uid, AssistantKind, AssistantTriggerKey, ClickType, EvdevDeviceInfo, EvdevTriggerKey,
    FingerprintGesture, FingerprintTriggerKey, FloatingButtonKey, KeyEventTriggerKey, Trigger,
    TriggerKey, TriggerKeyDevice, TriggerMode,
};

/// Click type a key inserted into `trigger` starts with.
fn click_type_for_new_key(trigger: &Trigger) -> ClickType {
    match trigger.mode {
        TriggerMode::Parallel(click_type) => click_type,
        TriggerMode::Sequence | TriggerMode::Undefined => ClickType::ShortPress,
    }
}

fn inherit_click_type(trigger: &Trigger, new_key: TriggerKey) -> TriggerKey {
    let click_type = click_type_for_new_key(trigger);
    if new_key.allows_click_type(click_type) {
        new_key.with_click_type(click_type)
    } else {
        new_key.with_click_type(ClickType::ShortPress)
    }
}

/// Append `new_key` to `retained` and pick the resulting mode.
///
/// A key that is the same input as one already present can only be
/// distinguished in sequence, so it forces sequence mode. A second key
/// makes the trigger parallel.
fn insert_key(trigger: &Trigger, retained: Vec<TriggerKey>, new_key: TriggerKey) -> Trigger {
    let contains_key = retained.iter().any(|key| key.is_same_input(&new_key));
    let new_click_type = new_key.click_type();

    let mut keys = retained;
    keys.push(new_key);

    let mode = if trigger.mode != TriggerMode::Sequence && contains_key {
        TriggerMode::Sequence
    } else if keys.len() <= 1 {
        TriggerMode::Undefined
    } else if keys.len() == 2 && !contains_key {
        keys = keys
            .into_iter()
            .map(|key| key.with_click_type(new_click_type))
            .collect();
        TriggerMode::Parallel(new_click_type)
    } else {
        trigger.mode
    };

    repair(Trigger {
        keys,
        mode,
        ..trigger.clone()
    })
}

/// Restore the trigger invariants after a structural edit.
fn repair(mut trigger: Trigger) -> Trigger {
    if trigger.keys.len() <= 1 {
        trigger.mode = TriggerMode::Undefined;
        return trigger;
    }

    match trigger.mode {
        TriggerMode::Parallel(click_type) => {
            let mut slots = HashSet::new();
            let has_conflict = !trigger
                .keys
                .iter()
                .all(|key| slots.insert(key.parallel_slot()));

            if has_conflict {
                trigger.mode = TriggerMode::Sequence;
            } else if trigger.keys.iter().all(|key| key.allows_click_type(click_type)) {
                trigger.keys = set_click_type_of_all(trigger.keys, click_type);
            } else {
                trigger.keys = set_click_type_of_all(trigger.keys, ClickType::ShortPress);
                trigger.mode = TriggerMode::Parallel(ClickType::ShortPress);
            }
        }
        TriggerMode::Sequence => {}
        // More than one key must have a mode; sequence keeps every key
        TriggerMode::Undefined => trigger.mode = TriggerMode::Sequence,
    }

    trigger
}

fn set_click_type_of_all(keys: Vec<TriggerKey>, click_type: ClickType) -> Vec<TriggerKey> {
    keys.into_iter()
        .map(|key| key.with_click_type(click_type))
        .collect()
}

fn edit_key<F>(trigger: &Trigger, uid: &str, edit: F) -> Trigger
where
    F: Fn(TriggerKey) -> TriggerKey,
{
    let keys = trigger
        .keys
        .iter()
        .cloned()
        .map(|key| if key.uid() == uid { edit(key) } else { key })
        .collect();

    Trigger {
        keys,
        ..trigger.clone()
    }
}

/// Add a key detected through the platform key event API.
///
/// Evdev keys are removed because the two detection paths cannot be
/// combined. Modifier keys do not consume their events by default so
/// they keep working as modifiers for other apps.
pub fn add_key_event_trigger_key(
    trigger: &Trigger,
    key_code: i32,
    scan_code: Option<i32>,
    device: TriggerKeyDevice,
    requires_ime: bool,
) -> Trigger {
    // Same key code from the same device with another scan code means the
    // device reports two physical keys with one code.
    let has_conflicting_scan_code = trigger.keys.iter().any(|key| match key {
        TriggerKey::KeyEvent(key) => {
            key.key_code == key_code
                && key.scan_code != scan_code
                && key.device.is_same_device(&device)
        }
        _ => false,
    });

    let new_key = TriggerKey::KeyEvent(KeyEventTriggerKey {
        uid: new_uid(),
        key_code,
        scan_code,
        device,
        click_type: click_type_for_new_key(trigger),
        consume_event: !is_modifier_key(key_code),
        requires_ime,
        detect_with_scan_code: has_conflicting_scan_code && scan_code.is_some(),
    });

    let retained = trigger
        .keys
        .iter()
        .filter(|key| !key.is_evdev())
        .cloned()
        .collect();

    insert_key(trigger, retained, new_key)
}

/// Add a key read from an evdev device.
///
/// Every non-evdev key is removed. The same key code on the same device
/// forces sequence mode; on a different device it may stay parallel.
pub fn add_evdev_trigger_key(
    trigger: &Trigger,
    key_code: i32,
    scan_code: i32,
    device: EvdevDeviceInfo,
) -> Trigger {
    let has_conflicting_scan_code = trigger.keys.iter().any(|key| match key {
        TriggerKey::Evdev(key) => {
            key.key_code == key_code && key.scan_code != scan_code && key.device == device
        }
        _ => false,
    });

    let new_key = TriggerKey::Evdev(EvdevTriggerKey {
        uid: new_uid(),
        key_code,
        scan_code,
        device,
        click_type: click_type_for_new_key(trigger),
        consume_event: true,
        detect_with_scan_code: has_conflicting_scan_code,
    });

    let retained = trigger
        .keys
        .iter()
        .filter(|key| key.is_evdev())
        .cloned()
        .collect();

    insert_key(trigger, retained, new_key)
}

/// Add an assistant invocation.
///
/// Assistant invocations have no down/up so they are always short presses
/// and a parallel trigger holds at most one. Adding one of another kind to
/// a parallel trigger replaces the old one.
pub fn add_assistant_trigger_key(trigger: &Trigger, kind: AssistantKind) -> Trigger {
    let is_parallel = matches!(trigger.mode, TriggerMode::Parallel(_));

    let retained: Vec<TriggerKey> = trigger
        .keys
        .iter()
        .filter(|key| !key.is_evdev())
        .filter(|key| match key {
            TriggerKey::Assistant(existing) => !is_parallel || existing.kind == kind,
            _ => true,
        })
        .cloned()
        .collect();

    let new_key = TriggerKey::Assistant(AssistantTriggerKey {
        uid: new_uid(),
        kind,
        click_type: ClickType::ShortPress,
    });

    insert_gesture_key(trigger, retained, new_key)
}

/// Add a fingerprint swipe. Behaves like an assistant key.
pub fn add_fingerprint_gesture(trigger: &Trigger, gesture: FingerprintGesture) -> Trigger {
    let retained: Vec<TriggerKey> = trigger
        .keys
        .iter()
        .filter(|key| !key.is_evdev())
        .cloned()
        .collect();

    let new_key = TriggerKey::FingerprintGesture(FingerprintTriggerKey {
        uid: new_uid(),
        gesture,
        click_type: ClickType::ShortPress,
    });

    insert_gesture_key(trigger, retained, new_key)
}

/// Insert an assistant or fingerprint key. Only one such input can be
/// "held" at a time, so a second one forces sequence mode.
fn insert_gesture_key(
    trigger: &Trigger,
    retained: Vec<TriggerKey>,
    new_key: TriggerKey,
) -> Trigger {
    let contains_gesture = retained.iter().any(|key| {
        matches!(
            key,
            TriggerKey::Assistant(_) | TriggerKey::FingerprintGesture(_)
        )
    });

    let mut keys = retained;
    keys.push(new_key);

    let mode = if trigger.mode == TriggerMode::Sequence || contains_gesture {
        TriggerMode::Sequence
    } else if keys.len() <= 1 {
        TriggerMode::Undefined
    } else {
        TriggerMode::Parallel(ClickType::ShortPress)
    };

    if mode != TriggerMode::Sequence {
        keys = set_click_type_of_all(keys, ClickType::ShortPress);
    }

    repair(Trigger {
        keys,
        mode,
        ..trigger.clone()
    })
}

/// Add an on-screen floating button.
pub fn add_floating_button_key(trigger: &Trigger, button_uid: &str) -> Trigger {
    let new_key = inherit_click_type(
        trigger,
        TriggerKey::FloatingButton(FloatingButtonKey {
            uid: new_uid(),
            button_uid: button_uid.to_string(),
            click_type: ClickType::ShortPress,
        }),
    );

    let retained = trigger
        .keys
        .iter()
        .filter(|key| !key.is_evdev())
        .cloned()
        .collect();

    insert_key(trigger, retained, new_key)
}

pub fn remove_trigger_key(trigger: &Trigger, uid: &str) -> Trigger {
    let keys = trigger
        .keys
        .iter()
        .filter(|key| key.uid() != uid)
        .cloned()
        .collect();

    repair(Trigger {
        keys,
        ..trigger.clone()
    })
}

/// Move the key at `from` to `to`. Out of range indices are ignored.
pub fn move_trigger_key(trigger: &Trigger, from: usize, to: usize) -> Trigger {
    if from >= trigger.keys.len() || to >= trigger.keys.len() {
        return trigger.clone();
    }

    let mut keys = trigger.keys.clone();
    let key = keys.remove(from);
    keys.insert(to, key);

    Trigger {
        keys,
        ..trigger.clone()
    }
}

/// Change which device a key event trigger key listens to.
///
/// Other key types have no device reference and are left unchanged.
pub fn set_trigger_key_device(trigger: &Trigger, uid: &str, device: TriggerKeyDevice) -> Trigger {
    let edited = edit_key(trigger, uid, |key| match key {
        TriggerKey::KeyEvent(key) => TriggerKey::KeyEvent(KeyEventTriggerKey {
            device: device.clone(),
            ..key
        }),
        other => other,
    });

    repair(edited)
}

/// Make every key need to be held at the same time.
///
/// All keys become short presses and duplicate inputs are dropped since
/// they cannot be pressed simultaneously.
pub fn set_parallel_trigger_mode(trigger: &Trigger) -> Trigger {
    if matches!(trigger.mode, TriggerMode::Parallel(_)) {
        return trigger.clone();
    }

    if trigger.keys.len() <= 1 {
        return Trigger {
            mode: TriggerMode::Undefined,
            ..trigger.clone()
        };
    }

    let mut slots = HashSet::new();
    let keys: Vec<TriggerKey> = trigger
        .keys
        .iter()
        .filter(|key| slots.insert(key.parallel_slot()))
        .cloned()
        .map(|key| key.with_click_type(ClickType::ShortPress))
        .collect();

    let mode = match keys.first() {
        Some(first) if keys.len() > 1 => TriggerMode::Parallel(first.click_type()),
        _ => TriggerMode::Undefined,
    };

    Trigger {
        keys,
        mode,
        ..trigger.clone()
    }
}

pub fn set_sequence_trigger_mode(trigger: &Trigger) -> Trigger {
    if trigger.mode == TriggerMode::Sequence {
        return trigger.clone();
    }

    let mode = if trigger.keys.len() <= 1 {
        TriggerMode::Undefined
    } else {
        TriggerMode::Sequence
    };

    Trigger {
        mode,
        ..trigger.clone()
    }
}

/// Undefined mode is only valid for zero or one key.
pub fn set_undefined_trigger_mode(trigger: &Trigger) -> Trigger {
    if trigger.mode == TriggerMode::Undefined || trigger.keys.len() > 1 {
        return trigger.clone();
    }

    Trigger {
        mode: TriggerMode::Undefined,
        ..trigger.clone()
    }
}

pub fn set_trigger_short_press(trigger: &Trigger) -> Trigger {
    set_trigger_click_type(trigger, ClickType::ShortPress)
}

/// Make every key a long press. Ignored for sequence triggers and for
/// triggers containing keys without separate down/up events.
pub fn set_trigger_long_press(trigger: &Trigger) -> Trigger {
    set_trigger_click_type(trigger, ClickType::LongPress)
}

/// Make every key a double press. Same restrictions as long press.
pub fn set_trigger_double_press(trigger: &Trigger) -> Trigger {
    set_trigger_click_type(trigger, ClickType::DoublePress)
}

fn set_trigger_click_type(trigger: &Trigger, click_type: ClickType) -> Trigger {
    if trigger.mode == TriggerMode::Sequence {
        return trigger.clone();
    }

    if !trigger.keys.iter().all(|key| key.allows_click_type(click_type)) {
        return trigger.clone();
    }

    let keys = set_click_type_of_all(trigger.keys.clone(), click_type);
    let mode = if keys.len() <= 1 {
        TriggerMode::Undefined
    } else {
        TriggerMode::Parallel(click_type)
    };

    Trigger {
        keys,
        mode,
        ..trigger.clone()
    }
}

/// Set the click type of one key.
///
/// Keys of a parallel trigger share the trigger's click type and are only
/// changed through the trigger-wide setters.
pub fn set_trigger_key_click_type(trigger: &Trigger, uid: &str, click_type: ClickType) -> Trigger {
    if matches!(trigger.mode, TriggerMode::Parallel(_)) {
        return trigger.clone();
    }

    match trigger.key(uid) {
        Some(key) if key.allows_click_type(click_type) => {
            edit_key(trigger, uid, |key| key.with_click_type(click_type))
        }
        _ => trigger.clone(),
    }
}

pub fn set_trigger_key_consume_event(trigger: &Trigger, uid: &str, consume_event: bool) -> Trigger {
    edit_key(trigger, uid, |key| match key {
        TriggerKey::KeyEvent(key) => TriggerKey::KeyEvent(KeyEventTriggerKey {
            consume_event,
            ..key
        }),
        TriggerKey::Evdev(key) => TriggerKey::Evdev(EvdevTriggerKey {
            consume_event,
            ..key
        }),
        other => other,
    })
}

pub fn set_assistant_trigger_key_kind(
    trigger: &Trigger,
    uid: &str,
    kind: AssistantKind,
) -> Trigger {
    let edited = edit_key(trigger, uid, |key| match key {
        TriggerKey::Assistant(key) => TriggerKey::Assistant(AssistantTriggerKey { kind, ..key }),
        other => other,
    });

    repair(edited)
}

pub fn set_fingerprint_gesture(
    trigger: &Trigger,
    uid: &str,
    gesture: FingerprintGesture,
) -> Trigger {
    edit_key(trigger, uid, |key| match key {
        TriggerKey::FingerprintGesture(key) => {
            TriggerKey::FingerprintGesture(FingerprintTriggerKey { gesture, ..key })
        }
        other => other,
    })
}

/// Match a key by scan code instead of key code. Only keys that recorded
/// a scan code can switch.
pub fn set_scan_code_detection_enabled(trigger: &Trigger, uid: &str, enabled: bool) -> Trigger {
    edit_key(trigger, uid, |key| match key {
        TriggerKey::KeyEvent(key) if key.scan_code.is_some() => {
            TriggerKey::KeyEvent(KeyEventTriggerKey {
                detect_with_scan_code: enabled,
                ..key
            })
        }
        TriggerKey::Evdev(key) => TriggerKey::Evdev(EvdevTriggerKey {
            detect_with_scan_code: enabled,
            ..key
        }),
        other => other,
    })
}

pub fn set_vibrate_enabled(trigger: &Trigger, enabled: bool) -> Trigger {
    Trigger {
        vibrate: enabled,
        ..trigger.clone()
    }
}

pub fn set_long_press_double_vibration_enabled(trigger: &Trigger, enabled: bool) -> Trigger {
    Trigger {
        long_press_double_vibration: enabled,
        ..trigger.clone()
    }
}

pub fn set_trigger_when_screen_off(trigger: &Trigger, enabled: bool) -> Trigger {
    Trigger {
        screen_off_trigger: enabled,
        ..trigger.clone()
    }
}

pub fn set_trigger_from_other_apps_enabled(trigger: &Trigger, enabled: bool) -> Trigger {
    Trigger {
        trigger_from_other_apps: enabled,
        ..trigger.clone()
    }
}

pub fn set_show_toast_enabled(trigger: &Trigger, enabled: bool) -> Trigger {
    Trigger {
        show_toast: enabled,
        ..trigger.clone()
    }
}

// Timings equal to the user default are stored as None so the key map
// follows later changes of the default.
fn unless_default(value: u32, default: u32) -> Option<u32> {
    if value == default {
        None
    } else {
        Some(value)
    }
}

pub fn set_long_press_delay(trigger: &Trigger, delay: u32, settings: &Settings) -> Trigger {
    Trigger {
        long_press_delay: unless_default(delay, settings.long_press_delay()),
        ..trigger.clone()
    }
}

pub fn set_double_press_delay(trigger: &Trigger, delay: u32, settings: &Settings) -> Trigger {
    Trigger {
        double_press_delay: unless_default(delay, settings.double_press_delay()),
        ..trigger.clone()
    }
}

pub fn set_vibration_duration(trigger: &Trigger, duration: u32, settings: &Settings) -> Trigger {
    Trigger {
        vibrate_duration: unless_default(duration, settings.vibrate_duration()),
        ..trigger.clone()
    }
}

pub fn set_sequence_trigger_timeout(
    trigger: &Trigger,
    timeout: u32,
    settings: &Settings,
) -> Trigger {
    Trigger {
        sequence_trigger_timeout: unless_default(timeout, settings.sequence_trigger_timeout()),
        ..trigger.clone()
    }
}
