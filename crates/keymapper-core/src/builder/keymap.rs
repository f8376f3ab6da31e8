// Keymapper KeyMap Builder
// Editing operations over a whole key map

//! Trigger edits are forwarded to [`super::trigger`]. Action and constraint
//! edits live here because they depend on the trigger (DPAD keys force
//! hold-down) or on each other (call actions add phone constraints).

use crate::action::{ActionData, HoldDownMode, KeyMapAction, RepeatMode};
use crate::builder::trigger as trigger_builder;
use crate::constraint::{Constraint, ConstraintMode};
use crate::keycode::is_modifier_key;
use crate::keymap::KeyMap;
use crate::settings::Settings;
use crate::trigger::{
    AssistantKind, ClickType, EvdevDeviceInfo, FingerprintGesture, Trigger, TriggerKeyDevice,
};

fn with_trigger(keymap: &KeyMap, trigger: Trigger) -> KeyMap {
    KeyMap {
        trigger,
        ..keymap.clone()
    }
}

fn with_actions(keymap: &KeyMap, actions: Vec<KeyMapAction>) -> KeyMap {
    KeyMap {
        actions,
        ..keymap.clone()
    }
}

/// Add a key event trigger key.
///
/// DPAD keys are only delivered through the input method, which cannot
/// repeat injected keys, so every existing action is switched to hold-down.
pub fn add_key_event_trigger_key(
    keymap: &KeyMap,
    key_code: i32,
    scan_code: Option<i32>,
    device: TriggerKeyDevice,
    is_dpad: bool,
) -> KeyMap {
    let trigger = trigger_builder::add_key_event_trigger_key(
        &keymap.trigger,
        key_code,
        scan_code,
        device,
        is_dpad,
    );

    let actions = if is_dpad {
        keymap
            .actions
            .iter()
            .cloned()
            .map(|action| KeyMapAction {
                hold_down: true,
                repeat: false,
                ..action
            })
            .collect()
    } else {
        keymap.actions.clone()
    };

    KeyMap {
        trigger,
        actions,
        ..keymap.clone()
    }
}

pub fn add_evdev_trigger_key(
    keymap: &KeyMap,
    key_code: i32,
    scan_code: i32,
    device: EvdevDeviceInfo,
) -> KeyMap {
    with_trigger(
        keymap,
        trigger_builder::add_evdev_trigger_key(&keymap.trigger, key_code, scan_code, device),
    )
}

pub fn add_assistant_trigger_key(keymap: &KeyMap, kind: AssistantKind) -> KeyMap {
    with_trigger(
        keymap,
        trigger_builder::add_assistant_trigger_key(&keymap.trigger, kind),
    )
}

pub fn add_floating_button_key(keymap: &KeyMap, button_uid: &str) -> KeyMap {
    with_trigger(
        keymap,
        trigger_builder::add_floating_button_key(&keymap.trigger, button_uid),
    )
}

pub fn add_fingerprint_gesture(keymap: &KeyMap, gesture: FingerprintGesture) -> KeyMap {
    with_trigger(
        keymap,
        trigger_builder::add_fingerprint_gesture(&keymap.trigger, gesture),
    )
}

pub fn remove_trigger_key(keymap: &KeyMap, uid: &str) -> KeyMap {
    with_trigger(keymap, trigger_builder::remove_trigger_key(&keymap.trigger, uid))
}

pub fn move_trigger_key(keymap: &KeyMap, from: usize, to: usize) -> KeyMap {
    with_trigger(keymap, trigger_builder::move_trigger_key(&keymap.trigger, from, to))
}

pub fn set_trigger_key_device(keymap: &KeyMap, uid: &str, device: TriggerKeyDevice) -> KeyMap {
    with_trigger(
        keymap,
        trigger_builder::set_trigger_key_device(&keymap.trigger, uid, device),
    )
}

pub fn set_parallel_trigger_mode(keymap: &KeyMap) -> KeyMap {
    with_trigger(keymap, trigger_builder::set_parallel_trigger_mode(&keymap.trigger))
}

pub fn set_sequence_trigger_mode(keymap: &KeyMap) -> KeyMap {
    with_trigger(keymap, trigger_builder::set_sequence_trigger_mode(&keymap.trigger))
}

pub fn set_undefined_trigger_mode(keymap: &KeyMap) -> KeyMap {
    with_trigger(keymap, trigger_builder::set_undefined_trigger_mode(&keymap.trigger))
}

pub fn set_trigger_short_press(keymap: &KeyMap) -> KeyMap {
    with_trigger(keymap, trigger_builder::set_trigger_short_press(&keymap.trigger))
}

pub fn set_trigger_long_press(keymap: &KeyMap) -> KeyMap {
    with_trigger(keymap, trigger_builder::set_trigger_long_press(&keymap.trigger))
}

pub fn set_trigger_double_press(keymap: &KeyMap) -> KeyMap {
    with_trigger(keymap, trigger_builder::set_trigger_double_press(&keymap.trigger))
}

pub fn set_trigger_key_click_type(keymap: &KeyMap, uid: &str, click_type: ClickType) -> KeyMap {
    with_trigger(
        keymap,
        trigger_builder::set_trigger_key_click_type(&keymap.trigger, uid, click_type),
    )
}

pub fn set_trigger_key_consume_event(keymap: &KeyMap, uid: &str, consume_event: bool) -> KeyMap {
    with_trigger(
        keymap,
        trigger_builder::set_trigger_key_consume_event(&keymap.trigger, uid, consume_event),
    )
}

pub fn set_assistant_trigger_key_kind(keymap: &KeyMap, uid: &str, kind: AssistantKind) -> KeyMap {
    with_trigger(
        keymap,
        trigger_builder::set_assistant_trigger_key_kind(&keymap.trigger, uid, kind),
    )
}

pub fn set_fingerprint_gesture(
    keymap: &KeyMap,
    uid: &str,
    gesture: FingerprintGesture,
) -> KeyMap {
    with_trigger(
        keymap,
        trigger_builder::set_fingerprint_gesture(&keymap.trigger, uid, gesture),
    )
}

pub fn set_scan_code_detection_enabled(keymap: &KeyMap, uid: &str, enabled: bool) -> KeyMap {
    with_trigger(
        keymap,
        trigger_builder::set_scan_code_detection_enabled(&keymap.trigger, uid, enabled),
    )
}

pub fn set_vibrate_enabled(keymap: &KeyMap, enabled: bool) -> KeyMap {
    with_trigger(keymap, trigger_builder::set_vibrate_enabled(&keymap.trigger, enabled))
}

pub fn set_long_press_double_vibration_enabled(keymap: &KeyMap, enabled: bool) -> KeyMap {
    with_trigger(
        keymap,
        trigger_builder::set_long_press_double_vibration_enabled(&keymap.trigger, enabled),
    )
}

pub fn set_trigger_when_screen_off(keymap: &KeyMap, enabled: bool) -> KeyMap {
    with_trigger(
        keymap,
        trigger_builder::set_trigger_when_screen_off(&keymap.trigger, enabled),
    )
}

pub fn set_trigger_from_other_apps_enabled(keymap: &KeyMap, enabled: bool) -> KeyMap {
    with_trigger(
        keymap,
        trigger_builder::set_trigger_from_other_apps_enabled(&keymap.trigger, enabled),
    )
}

pub fn set_show_toast_enabled(keymap: &KeyMap, enabled: bool) -> KeyMap {
    with_trigger(keymap, trigger_builder::set_show_toast_enabled(&keymap.trigger, enabled))
}

pub fn set_long_press_delay(keymap: &KeyMap, delay: u32, settings: &Settings) -> KeyMap {
    with_trigger(
        keymap,
        trigger_builder::set_long_press_delay(&keymap.trigger, delay, settings),
    )
}

pub fn set_double_press_delay(keymap: &KeyMap, delay: u32, settings: &Settings) -> KeyMap {
    with_trigger(
        keymap,
        trigger_builder::set_double_press_delay(&keymap.trigger, delay, settings),
    )
}

pub fn set_vibration_duration(keymap: &KeyMap, duration: u32, settings: &Settings) -> KeyMap {
    with_trigger(
        keymap,
        trigger_builder::set_vibration_duration(&keymap.trigger, duration, settings),
    )
}

pub fn set_sequence_trigger_timeout(keymap: &KeyMap, timeout: u32, settings: &Settings) -> KeyMap {
    with_trigger(
        keymap,
        trigger_builder::set_sequence_trigger_timeout(&keymap.trigger, timeout, settings),
    )
}

pub fn set_enabled(keymap: &KeyMap, enabled: bool) -> KeyMap {
    KeyMap {
        enabled,
        ..keymap.clone()
    }
}

// ==================== Actions ====================

/// Create an action with defaults that suit its payload and the trigger.
fn create_action(keymap: &KeyMap, data: ActionData) -> KeyMapAction {
    let mut action = KeyMapAction::new(data);

    match &action.data {
        ActionData::InputKeyEvent { key_code, .. } => {
            if is_modifier_key(*key_code) || keymap.trigger.contains_dpad_key() {
                action.hold_down = true;
                action.repeat = false;
            } else {
                action.repeat = true;
            }
        }
        ActionData::VolumeUp | ActionData::VolumeDown => action.repeat = true,
        _ => {}
    }

    action
}

/// Append an action.
///
/// Answering only makes sense while ringing and hanging up only while in
/// a call, so those actions bring their constraint along.
pub fn add_action(keymap: &KeyMap, data: ActionData) -> KeyMap {
    let action = create_action(keymap, data);

    let keymap = match action.data {
        ActionData::AnswerCall => add_constraint(keymap, Constraint::PhoneRinging),
        ActionData::EndCall => add_constraint(keymap, Constraint::InPhoneCall),
        _ => keymap.clone(),
    };

    let mut actions = keymap.actions.clone();
    actions.push(action);
    with_actions(&keymap, actions)
}

pub fn remove_action(keymap: &KeyMap, uid: &str) -> KeyMap {
    let actions = keymap
        .actions
        .iter()
        .filter(|action| action.uid != uid)
        .cloned()
        .collect();
    with_actions(keymap, actions)
}

/// Move the action at `from` to `to`. Out of range indices are ignored.
pub fn move_action(keymap: &KeyMap, from: usize, to: usize) -> KeyMap {
    let len = keymap.actions.len();
    if from >= len || to >= len {
        return keymap.clone();
    }

    let mut actions = keymap.actions.clone();
    let action = actions.remove(from);
    actions.insert(to, action);
    with_actions(keymap, actions)
}

fn edit_action<F>(keymap: &KeyMap, uid: &str, edit: F) -> KeyMap
where
    F: Fn(&mut KeyMapAction),
{
    let actions = keymap
        .actions
        .iter()
        .cloned()
        .map(|mut action| {
            if action.uid == uid {
                edit(&mut action);
            }
            action
        })
        .collect();
    with_actions(keymap, actions)
}

/// Replace the payload of an action, keeping its options.
pub fn set_action_data(keymap: &KeyMap, uid: &str, data: ActionData) -> KeyMap {
    edit_action(keymap, uid, |action| action.data = data.clone())
}

pub fn set_action_repeat_enabled(keymap: &KeyMap, uid: &str, enabled: bool) -> KeyMap {
    edit_action(keymap, uid, |action| action.repeat = enabled)
}

pub fn set_action_repeat_rate(
    keymap: &KeyMap,
    uid: &str,
    rate: u32,
    settings: &Settings,
) -> KeyMap {
    let rate = unless_default(rate, settings.repeat_rate());
    edit_action(keymap, uid, |action| action.repeat_rate = rate)
}

pub fn set_action_repeat_delay(
    keymap: &KeyMap,
    uid: &str,
    delay: u32,
    settings: &Settings,
) -> KeyMap {
    let delay = unless_default(delay, settings.repeat_delay());
    edit_action(keymap, uid, |action| action.repeat_delay = delay)
}

/// Limit the number of repeats.
///
/// `u32::MAX` means no limit. When the action already stops because the
/// limit is reached, a limit of one is the implicit default.
pub fn set_action_repeat_limit(keymap: &KeyMap, uid: &str, limit: u32) -> KeyMap {
    edit_action(keymap, uid, |action| {
        let is_default = if action.repeat_mode == RepeatMode::LimitReached {
            limit == 1
        } else {
            limit == u32::MAX
        };
        action.repeat_limit = if is_default { None } else { Some(limit) };
    })
}

pub fn set_action_hold_down_enabled(keymap: &KeyMap, uid: &str, enabled: bool) -> KeyMap {
    edit_action(keymap, uid, |action| action.hold_down = enabled)
}

pub fn set_action_hold_down_duration(
    keymap: &KeyMap,
    uid: &str,
    duration: u32,
    settings: &Settings,
) -> KeyMap {
    let duration = unless_default(duration, settings.hold_down_duration());
    edit_action(keymap, uid, |action| action.hold_down_duration = duration)
}

pub fn set_action_stop_repeating_when_trigger_pressed_again(keymap: &KeyMap, uid: &str) -> KeyMap {
    edit_action(keymap, uid, |action| {
        action.repeat_mode = RepeatMode::TriggerPressedAgain
    })
}

pub fn set_action_stop_repeating_when_limit_reached(keymap: &KeyMap, uid: &str) -> KeyMap {
    edit_action(keymap, uid, |action| action.repeat_mode = RepeatMode::LimitReached)
}

pub fn set_action_stop_repeating_when_trigger_released(keymap: &KeyMap, uid: &str) -> KeyMap {
    edit_action(keymap, uid, |action| {
        action.repeat_mode = RepeatMode::TriggerReleased
    })
}

pub fn set_action_stop_hold_down_when_trigger_pressed_again(
    keymap: &KeyMap,
    uid: &str,
    enabled: bool,
) -> KeyMap {
    let mode = if enabled {
        HoldDownMode::TriggerPressedAgain
    } else {
        HoldDownMode::TriggerReleased
    };
    edit_action(keymap, uid, |action| action.hold_down_mode = mode)
}

pub fn set_action_multiplier(keymap: &KeyMap, uid: &str, multiplier: u32) -> KeyMap {
    let multiplier = if multiplier <= 1 { None } else { Some(multiplier) };
    edit_action(keymap, uid, |action| action.multiplier = multiplier)
}

pub fn set_delay_before_next_action(keymap: &KeyMap, uid: &str, delay: u32) -> KeyMap {
    let delay = if delay == 0 { None } else { Some(delay) };
    edit_action(keymap, uid, |action| action.delay_before_next_action = delay)
}

fn unless_default(value: u32, default: u32) -> Option<u32> {
    if value == default {
        None
    } else {
        Some(value)
    }
}

// ==================== Constraints ====================

/// Add a constraint. Adding one that is already present changes nothing.
pub fn add_constraint(keymap: &KeyMap, constraint: Constraint) -> KeyMap {
    if keymap.constraint_state.contains(&constraint) {
        return keymap.clone();
    }

    let mut state = keymap.constraint_state.clone();
    state.constraints.insert(constraint);
    KeyMap {
        constraint_state: state,
        ..keymap.clone()
    }
}

pub fn remove_constraint(keymap: &KeyMap, constraint: &Constraint) -> KeyMap {
    let mut state = keymap.constraint_state.clone();
    state.constraints.shift_remove(constraint);
    KeyMap {
        constraint_state: state,
        ..keymap.clone()
    }
}

pub fn set_and_mode(keymap: &KeyMap) -> KeyMap {
    set_constraint_mode(keymap, ConstraintMode::And)
}

pub fn set_or_mode(keymap: &KeyMap) -> KeyMap {
    set_constraint_mode(keymap, ConstraintMode::Or)
}

fn set_constraint_mode(keymap: &KeyMap, mode: ConstraintMode) -> KeyMap {
    let mut state = keymap.constraint_state.clone();
    state.mode = mode;
    KeyMap {
        constraint_state: state,
        ..keymap.clone()
    }
}
