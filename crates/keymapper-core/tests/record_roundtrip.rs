// Keymapper Persistence Tests
//
// Key maps built through the editing API survive a trip through the TOML
// file format, and the repository keeps them across open/save.

use keymapper_core::builder::keymap as builder;
use keymapper_core::keycode::*;
use keymapper_core::record::{decode_keymaps, encode_keymaps};
use keymapper_core::{
    ActionData, AssistantKind, ClickType, Constraint, ConstraintMode, EvdevDeviceInfo,
    FingerprintGesture, KeyMap, KeyMapRepository, RecordError, RepositoryError, Settings,
    TriggerKey, TriggerKeyDevice, TriggerMode,
};
use tempfile::TempDir;

// =========================================================================
// Test Helpers
// =========================================================================

/// Volume chord that toggles the flashlight, only while a player is open.
fn volume_chord() -> KeyMap {
    let settings = Settings::new();
    let keymap = builder::add_key_event_trigger_key(
        &KeyMap::new(),
        KEYCODE_VOLUME_UP,
        None,
        TriggerKeyDevice::Internal,
        false,
    );
    let keymap = builder::add_key_event_trigger_key(
        &keymap,
        KEYCODE_VOLUME_DOWN,
        Some(114),
        TriggerKeyDevice::External {
            descriptor: "usb-0000:00:14.0-2".to_string(),
            name: "Media Remote".to_string(),
        },
        false,
    );
    let keymap = builder::set_trigger_long_press(&keymap);
    let keymap = builder::set_long_press_delay(&keymap, 750, &settings);
    let keymap = builder::set_vibrate_enabled(&keymap, true);
    let keymap = builder::add_action(&keymap, ActionData::ToggleFlashlight);
    let keymap = builder::add_constraint(
        &keymap,
        Constraint::AppInForeground {
            package_name: "org.example.player".to_string(),
        },
    );
    builder::set_or_mode(&keymap)
}

/// Gamepad sequence typing text, with repeat options on a key action.
fn gamepad_sequence() -> KeyMap {
    let settings = Settings::new();
    let gamepad = EvdevDeviceInfo::new("Xbox Wireless Controller", 0x05, 0x045e, 0x0b13);
    let keymap =
        builder::add_evdev_trigger_key(&KeyMap::new(), KEYCODE_VOLUME_DOWN, 114, gamepad.clone());
    let keymap = builder::add_evdev_trigger_key(&keymap, KEYCODE_VOLUME_DOWN, 114, gamepad);
    let keymap = builder::set_sequence_trigger_timeout(&keymap, 800, &settings);
    let keymap = builder::add_action(
        &keymap,
        ActionData::Text {
            text: "gg".to_string(),
        },
    );
    let keymap = builder::add_action(&keymap, ActionData::key_event(KEYCODE_ENTER));

    let action_uid = keymap.actions()[1].uid.clone();
    let keymap = builder::set_action_repeat_rate(&keymap, &action_uid, 120, &settings);
    let keymap = builder::set_action_stop_repeating_when_limit_reached(&keymap, &action_uid);
    let keymap = builder::set_action_repeat_limit(&keymap, &action_uid, 5);
    let keymap = builder::set_action_multiplier(&keymap, &action_uid, 2);
    builder::set_enabled(&keymap, false)
}

/// Assistant chord plus a fingerprint swipe and a floating button.
fn gesture_keymaps() -> Vec<KeyMap> {
    let assistant = builder::add_key_event_trigger_key(
        &KeyMap::new(),
        KEYCODE_HEADSETHOOK,
        None,
        TriggerKeyDevice::Any,
        false,
    );
    let assistant = builder::add_assistant_trigger_key(&assistant, AssistantKind::Voice);
    let assistant = builder::add_action(&assistant, ActionData::AnswerCall);

    let swipe = builder::add_fingerprint_gesture(&KeyMap::new(), FingerprintGesture::SwipeDown);
    let swipe = builder::add_action(
        &swipe,
        ActionData::OpenUrl {
            url: "https://example.org".to_string(),
        },
    );

    let button = builder::add_floating_button_key(&KeyMap::new(), "overlay-1");
    let button = builder::set_trigger_double_press(&button);
    let button = builder::add_action(&button, ActionData::Tap { x: 540, y: 1200 });

    vec![assistant, swipe, button]
}

fn roundtrip(keymaps: &[KeyMap]) -> Vec<KeyMap> {
    let encoded = encode_keymaps(keymaps).expect("encode");
    decode_keymaps(&encoded).expect("decode")
}

// =========================================================================
// Encode / Decode
// =========================================================================

#[test]
fn test_key_event_chord_survives_roundtrip() {
    let keymap = volume_chord();
    assert_eq!(roundtrip(&[keymap.clone()]), vec![keymap]);
}

#[test]
fn test_evdev_sequence_survives_roundtrip() {
    let keymap = gamepad_sequence();
    let decoded = roundtrip(&[keymap.clone()]);

    assert_eq!(decoded, vec![keymap]);
    assert_eq!(decoded[0].trigger().mode(), TriggerMode::Sequence);
    assert_eq!(decoded[0].trigger().sequence_trigger_timeout(), Some(800));
    assert!(!decoded[0].is_enabled());
}

#[test]
fn test_gesture_keys_survive_roundtrip() {
    let keymaps = gesture_keymaps();
    assert_eq!(roundtrip(&keymaps), keymaps);
}

#[test]
fn test_order_is_preserved() {
    let mut keymaps = gesture_keymaps();
    keymaps.insert(0, volume_chord());
    keymaps.push(gamepad_sequence());

    let uids: Vec<String> = roundtrip(&keymaps)
        .iter()
        .map(|keymap| keymap.uid().to_string())
        .collect();
    let expected: Vec<String> = keymaps.iter().map(|keymap| keymap.uid().to_string()).collect();
    assert_eq!(uids, expected);
}

#[test]
fn test_decode_hand_written_file() {
    let content = r#"
[[keymap]]
uid = "volume-chord"
constraint_mode = "or"

[keymap.trigger]
mode = 0
flags = 4

[[keymap.trigger.keys]]
key_type = "key_event"
uid = "up"
click_type = 0
key_code = 24

[[keymap.trigger.keys]]
key_type = "key_event"
uid = "down"
click_type = 0
key_code = 25
device_type = "internal"

[[keymap.actions]]
uid = "action"
repeat = true
data = { type = "volume_up" }

[[keymap.constraints]]
kind = "app_in_foreground"
package_name = "org.example.player"
"#;

    let keymaps = decode_keymaps(content).expect("decode");
    assert_eq!(keymaps.len(), 1);

    let keymap = &keymaps[0];
    assert_eq!(keymap.uid(), "volume-chord");
    assert!(keymap.is_enabled());
    assert_eq!(keymap.trigger().mode(), TriggerMode::Parallel(ClickType::ShortPress));
    assert!(keymap.trigger().detects_when_screen_off());
    assert!(matches!(
        &keymap.trigger().keys()[1],
        TriggerKey::KeyEvent(key) if key.device == TriggerKeyDevice::Internal && key.consume_event
    ));
    assert_eq!(keymap.actions()[0].data, ActionData::VolumeUp);
    assert!(keymap.actions()[0].repeat);
    assert_eq!(keymap.constraint_state().mode(), ConstraintMode::Or);
}

#[test]
fn test_decode_rejects_unknown_values() {
    let unknown_key = r#"
[[keymap]]
uid = "x"
[keymap.trigger]
mode = 2
[[keymap.trigger.keys]]
key_type = "joystick"
uid = "k"
click_type = 0
"#;
    assert!(matches!(
        decode_keymaps(unknown_key),
        Err(RecordError::UnknownKeyType(key_type)) if key_type == "joystick"
    ));

    let unknown_mode = "[[keymap]]\nuid = \"x\"\n[keymap.trigger]\nmode = 7\n";
    assert!(matches!(decode_keymaps(unknown_mode), Err(RecordError::UnknownMode(7))));

    let missing_code = r#"
[[keymap]]
uid = "x"
[keymap.trigger]
mode = 2
[[keymap.trigger.keys]]
key_type = "evdev"
uid = "k"
click_type = 0
"#;
    assert!(matches!(
        decode_keymaps(missing_code),
        Err(RecordError::MissingField { field: "key_code", .. })
    ));

    assert!(matches!(decode_keymaps("[[keymap]"), Err(RecordError::TomlParse(_))));
}

// =========================================================================
// Repository
// =========================================================================

#[test]
fn test_repository_save_and_open() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("nested").join("keymaps.toml");

    let repository = KeyMapRepository::open(&path).expect("open missing file");
    assert!(repository.is_empty());

    let first = repository.insert(volume_chord());
    let second = repository.insert(gamepad_sequence());
    assert_eq!((first.id(), second.id()), (1, 2));
    repository.save().expect("save");

    let reopened = KeyMapRepository::open(&path).expect("reopen");
    assert_eq!(reopened.all(), vec![first.clone(), second]);

    // The gamepad key map is disabled
    let enabled: Vec<String> = reopened
        .enabled()
        .iter()
        .map(|keymap| keymap.uid().to_string())
        .collect();
    assert_eq!(enabled, vec![first.uid().to_string()]);
}

#[test]
fn test_repository_skips_invalid_keymaps_for_detection() {
    let repository = KeyMapRepository::new();
    let no_actions = builder::add_key_event_trigger_key(
        &KeyMap::new(),
        KEYCODE_CAMERA,
        None,
        TriggerKeyDevice::Any,
        false,
    );
    repository.insert(no_actions);
    repository.insert(volume_chord());

    assert_eq!(repository.len(), 2);
    assert_eq!(repository.enabled().len(), 1);
}

#[test]
fn test_repository_reload_picks_up_edits() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("keymaps.toml");

    let repository = KeyMapRepository::open(&path).expect("open");
    let stored = repository.insert(volume_chord());
    repository.save().expect("save");

    // Another writer replaces the file
    let edited = builder::set_enabled(&stored, false);
    std::fs::write(&path, encode_keymaps([&edited]).expect("encode")).expect("write");

    assert_eq!(repository.reload().expect("reload"), 1);
    assert_eq!(repository.get(stored.uid()), Some(edited));
    assert!(repository.enabled().is_empty());
}

#[test]
fn test_repository_reports_malformed_file() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("keymaps.toml");
    std::fs::write(&path, "this is not toml [").expect("write");

    assert!(matches!(
        KeyMapRepository::open(&path),
        Err(RepositoryError::Record(RecordError::TomlParse(_)))
    ));
}

#[test]
fn test_update_of_unknown_keymap_fails() {
    let repository = KeyMapRepository::new();
    let keymap = volume_chord();

    assert!(matches!(
        repository.update(keymap.clone()),
        Err(RepositoryError::NotFound(uid)) if uid == keymap.uid()
    ));
    assert!(repository.save().is_err());
}
