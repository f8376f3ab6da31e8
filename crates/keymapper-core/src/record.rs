// Keymapper Persisted Records
// Serde records for key maps, decoupled from the domain types

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::{ActionData, HoldDownMode, KeyMapAction, RepeatMode};
use crate::constraint::{Constraint, ConstraintMode, ConstraintState};
use crate::keymap::KeyMap;
use crate::trigger::{
    AssistantKind, AssistantTriggerKey, ClickType, EvdevDeviceInfo, EvdevTriggerKey,
    FingerprintGesture, FingerprintTriggerKey, FloatingButtonKey, KeyEventTriggerKey, Trigger,
    TriggerKey, TriggerKeyDevice, TriggerMode,
};

pub const TRIGGER_FLAG_VIBRATE: i32 = 1;
pub const TRIGGER_FLAG_LONG_PRESS_DOUBLE_VIBRATION: i32 = 2;
pub const TRIGGER_FLAG_SCREEN_OFF_TRIGGERS: i32 = 4;
pub const TRIGGER_FLAG_FROM_OTHER_APPS: i32 = 8;
pub const TRIGGER_FLAG_SHOW_TOAST: i32 = 16;

pub const KEY_FLAG_DO_NOT_CONSUME_KEY_EVENT: i32 = 1;
pub const KEY_FLAG_DETECT_WITH_SCAN_CODE: i32 = 2;
pub const KEY_FLAG_REQUIRES_IME: i32 = 4;

pub const MODE_PARALLEL: i32 = 0;
pub const MODE_SEQUENCE: i32 = 1;
pub const MODE_UNDEFINED: i32 = 2;

const KEY_TYPE_KEY_EVENT: &str = "key_event";
const KEY_TYPE_EVDEV: &str = "evdev";
const KEY_TYPE_ASSISTANT: &str = "assistant";
const KEY_TYPE_FLOATING_BUTTON: &str = "floating_button";
const KEY_TYPE_FINGERPRINT: &str = "fingerprint_gesture";

const DEVICE_INTERNAL: &str = "internal";
const DEVICE_ANY: &str = "any";
const DEVICE_EXTERNAL: &str = "external";

/// Errors that can occur when decoding records
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Unknown trigger key type: {0}")]
    UnknownKeyType(String),

    #[error("Unknown click type: {0}")]
    UnknownClickType(i32),

    #[error("Unknown trigger mode: {0}")]
    UnknownMode(i32),

    #[error("Unknown repeat mode: {0}")]
    UnknownRepeatMode(i32),

    #[error("Unknown hold down mode: {0}")]
    UnknownHoldDownMode(i32),

    #[error("Unknown constraint: {0}")]
    UnknownConstraint(String),

    #[error("Trigger key {key_type} is missing {field}")]
    MissingField {
        key_type: &'static str,
        field: &'static str,
    },

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(String),
}

pub type Result<T> = std::result::Result<T, RecordError>;

fn has_flag(flags: i32, flag: i32) -> bool {
    flags & flag == flag
}

fn flag_if(enabled: bool, flag: i32) -> i32 {
    if enabled {
        flag
    } else {
        0
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn click_type(code: i32) -> Result<ClickType> {
    ClickType::from_i32(code).ok_or(RecordError::UnknownClickType(code))
}

fn required<T>(value: Option<T>, key_type: &'static str, field: &'static str) -> Result<T> {
    value.ok_or(RecordError::MissingField { key_type, field })
}

/// One trigger key. Which optional fields are present depends on `key_type`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriggerKeyRecord {
    pub key_type: String,
    pub uid: String,
    pub click_type: i32,
    #[serde(default)]
    pub flags: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_descriptor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_bus: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_vendor: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_product: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gesture: Option<String>,
}

impl From<&TriggerKey> for TriggerKeyRecord {
    fn from(key: &TriggerKey) -> Self {
        let mut record = TriggerKeyRecord {
            uid: key.uid().to_string(),
            click_type: key.click_type().to_i32(),
            ..Default::default()
        };

        match key {
            TriggerKey::KeyEvent(key) => {
                record.key_type = KEY_TYPE_KEY_EVENT.to_string();
                record.key_code = Some(key.key_code);
                record.scan_code = key.scan_code;
                record.flags = flag_if(!key.consume_event, KEY_FLAG_DO_NOT_CONSUME_KEY_EVENT)
                    | flag_if(key.detect_with_scan_code, KEY_FLAG_DETECT_WITH_SCAN_CODE)
                    | flag_if(key.requires_ime, KEY_FLAG_REQUIRES_IME);
                match &key.device {
                    TriggerKeyDevice::Internal => {
                        record.device_type = Some(DEVICE_INTERNAL.to_string());
                    }
                    TriggerKeyDevice::Any => {
                        record.device_type = Some(DEVICE_ANY.to_string());
                    }
                    TriggerKeyDevice::External { descriptor, name } => {
                        record.device_type = Some(DEVICE_EXTERNAL.to_string());
                        record.device_descriptor = Some(descriptor.clone());
                        record.device_name = Some(name.clone());
                    }
                }
            }
            TriggerKey::Evdev(key) => {
                record.key_type = KEY_TYPE_EVDEV.to_string();
                record.key_code = Some(key.key_code);
                record.scan_code = Some(key.scan_code);
                record.flags = flag_if(!key.consume_event, KEY_FLAG_DO_NOT_CONSUME_KEY_EVENT)
                    | flag_if(key.detect_with_scan_code, KEY_FLAG_DETECT_WITH_SCAN_CODE);
                record.device_name = Some(key.device.name.clone());
                record.device_bus = Some(key.device.bus);
                record.device_vendor = Some(key.device.vendor);
                record.device_product = Some(key.device.product);
            }
            TriggerKey::Assistant(key) => {
                record.key_type = KEY_TYPE_ASSISTANT.to_string();
                record.assistant_kind = Some(key.kind.to_string());
            }
            TriggerKey::FloatingButton(key) => {
                record.key_type = KEY_TYPE_FLOATING_BUTTON.to_string();
                record.button_uid = Some(key.button_uid.clone());
            }
            TriggerKey::FingerprintGesture(key) => {
                record.key_type = KEY_TYPE_FINGERPRINT.to_string();
                record.gesture = Some(key.gesture.to_string());
            }
        }

        record
    }
}

impl TryFrom<TriggerKeyRecord> for TriggerKey {
    type Error = RecordError;

    fn try_from(record: TriggerKeyRecord) -> Result<Self> {
        let click_type = click_type(record.click_type)?;
        let consume_event = !has_flag(record.flags, KEY_FLAG_DO_NOT_CONSUME_KEY_EVENT);
        let detect_with_scan_code = has_flag(record.flags, KEY_FLAG_DETECT_WITH_SCAN_CODE);

        let key = match record.key_type.as_str() {
            KEY_TYPE_KEY_EVENT => {
                let device = match record.device_type.as_deref() {
                    Some(DEVICE_INTERNAL) => TriggerKeyDevice::Internal,
                    Some(DEVICE_ANY) | None => TriggerKeyDevice::Any,
                    Some(DEVICE_EXTERNAL) => TriggerKeyDevice::External {
                        descriptor: required(
                            record.device_descriptor,
                            KEY_TYPE_KEY_EVENT,
                            "device_descriptor",
                        )?,
                        name: record.device_name.unwrap_or_default(),
                    },
                    Some(other) => {
                        return Err(RecordError::InvalidValue(format!(
                            "device type {}",
                            other
                        )))
                    }
                };

                TriggerKey::KeyEvent(KeyEventTriggerKey {
                    uid: record.uid,
                    key_code: required(record.key_code, KEY_TYPE_KEY_EVENT, "key_code")?,
                    scan_code: record.scan_code,
                    device,
                    click_type,
                    consume_event,
                    requires_ime: has_flag(record.flags, KEY_FLAG_REQUIRES_IME),
                    detect_with_scan_code,
                })
            }
            KEY_TYPE_EVDEV => TriggerKey::Evdev(EvdevTriggerKey {
                uid: record.uid,
                key_code: required(record.key_code, KEY_TYPE_EVDEV, "key_code")?,
                scan_code: required(record.scan_code, KEY_TYPE_EVDEV, "scan_code")?,
                device: EvdevDeviceInfo::new(
                    required(record.device_name, KEY_TYPE_EVDEV, "device_name")?,
                    required(record.device_bus, KEY_TYPE_EVDEV, "device_bus")?,
                    required(record.device_vendor, KEY_TYPE_EVDEV, "device_vendor")?,
                    required(record.device_product, KEY_TYPE_EVDEV, "device_product")?,
                ),
                click_type,
                consume_event,
                detect_with_scan_code,
            }),
            KEY_TYPE_ASSISTANT => {
                let kind = required(record.assistant_kind, KEY_TYPE_ASSISTANT, "assistant_kind")?;
                TriggerKey::Assistant(AssistantTriggerKey {
                    uid: record.uid,
                    kind: kind.parse::<AssistantKind>().map_err(|_| {
                        RecordError::InvalidValue(format!("assistant kind {}", kind))
                    })?,
                    click_type,
                })
            }
            KEY_TYPE_FLOATING_BUTTON => TriggerKey::FloatingButton(FloatingButtonKey {
                uid: record.uid,
                button_uid: required(record.button_uid, KEY_TYPE_FLOATING_BUTTON, "button_uid")?,
                click_type,
            }),
            KEY_TYPE_FINGERPRINT => {
                let gesture = required(record.gesture, KEY_TYPE_FINGERPRINT, "gesture")?;
                TriggerKey::FingerprintGesture(FingerprintTriggerKey {
                    uid: record.uid,
                    gesture: gesture.parse::<FingerprintGesture>().map_err(|_| {
                        RecordError::InvalidValue(format!("fingerprint gesture {}", gesture))
                    })?,
                    click_type,
                })
            }
            other => return Err(RecordError::UnknownKeyType(other.to_string())),
        };

        Ok(key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub mode: i32,
    #[serde(default)]
    pub flags: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_press_delay: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub double_press_delay: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibrate_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_trigger_timeout: Option<u32>,
    #[serde(default)]
    pub keys: Vec<TriggerKeyRecord>,
}

impl From<&Trigger> for TriggerRecord {
    fn from(trigger: &Trigger) -> Self {
        let mode = match trigger.mode {
            TriggerMode::Parallel(_) => MODE_PARALLEL,
            TriggerMode::Sequence => MODE_SEQUENCE,
            TriggerMode::Undefined => MODE_UNDEFINED,
        };

        let flags = flag_if(trigger.vibrate, TRIGGER_FLAG_VIBRATE)
            | flag_if(
                trigger.long_press_double_vibration,
                TRIGGER_FLAG_LONG_PRESS_DOUBLE_VIBRATION,
            )
            | flag_if(trigger.screen_off_trigger, TRIGGER_FLAG_SCREEN_OFF_TRIGGERS)
            | flag_if(trigger.trigger_from_other_apps, TRIGGER_FLAG_FROM_OTHER_APPS)
            | flag_if(trigger.show_toast, TRIGGER_FLAG_SHOW_TOAST);

        TriggerRecord {
            mode,
            flags,
            long_press_delay: trigger.long_press_delay,
            double_press_delay: trigger.double_press_delay,
            vibrate_duration: trigger.vibrate_duration,
            sequence_trigger_timeout: trigger.sequence_trigger_timeout,
            keys: trigger.keys.iter().map(TriggerKeyRecord::from).collect(),
        }
    }
}

impl TryFrom<TriggerRecord> for Trigger {
    type Error = RecordError;

    fn try_from(record: TriggerRecord) -> Result<Self> {
        let keys = record
            .keys
            .into_iter()
            .map(TriggerKey::try_from)
            .collect::<Result<Vec<_>>>()?;

        // The parallel click type lives on the keys
        let mode = match record.mode {
            MODE_PARALLEL if keys.len() > 1 => TriggerMode::Parallel(keys[0].click_type()),
            MODE_SEQUENCE if keys.len() > 1 => TriggerMode::Sequence,
            MODE_PARALLEL | MODE_SEQUENCE | MODE_UNDEFINED => TriggerMode::Undefined,
            other => return Err(RecordError::UnknownMode(other)),
        };

        Ok(Trigger {
            keys,
            mode,
            vibrate: has_flag(record.flags, TRIGGER_FLAG_VIBRATE),
            long_press_double_vibration: has_flag(
                record.flags,
                TRIGGER_FLAG_LONG_PRESS_DOUBLE_VIBRATION,
            ),
            screen_off_trigger: has_flag(record.flags, TRIGGER_FLAG_SCREEN_OFF_TRIGGERS),
            long_press_delay: record.long_press_delay,
            double_press_delay: record.double_press_delay,
            vibrate_duration: record.vibrate_duration,
            sequence_trigger_timeout: record.sequence_trigger_timeout,
            trigger_from_other_apps: has_flag(record.flags, TRIGGER_FLAG_FROM_OTHER_APPS),
            show_toast: has_flag(record.flags, TRIGGER_FLAG_SHOW_TOAST),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub uid: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub repeat: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hold_down: bool,
    #[serde(default)]
    pub repeat_mode: i32,
    #[serde(default)]
    pub hold_down_mode: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_delay: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_down_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_before_next_action: Option<u32>,
    pub data: ActionData,
}

impl From<&KeyMapAction> for ActionRecord {
    fn from(action: &KeyMapAction) -> Self {
        ActionRecord {
            uid: action.uid.clone(),
            repeat: action.repeat,
            hold_down: action.hold_down,
            repeat_mode: action.repeat_mode.to_i32(),
            hold_down_mode: action.hold_down_mode.to_i32(),
            repeat_rate: action.repeat_rate,
            repeat_delay: action.repeat_delay,
            repeat_limit: action.repeat_limit,
            hold_down_duration: action.hold_down_duration,
            multiplier: action.multiplier,
            delay_before_next_action: action.delay_before_next_action,
            data: action.data.clone(),
        }
    }
}

impl TryFrom<ActionRecord> for KeyMapAction {
    type Error = RecordError;

    fn try_from(record: ActionRecord) -> Result<Self> {
        Ok(KeyMapAction {
            uid: record.uid,
            data: record.data,
            repeat: record.repeat,
            hold_down: record.hold_down,
            repeat_mode: RepeatMode::from_i32(record.repeat_mode)
                .ok_or(RecordError::UnknownRepeatMode(record.repeat_mode))?,
            hold_down_mode: HoldDownMode::from_i32(record.hold_down_mode)
                .ok_or(RecordError::UnknownHoldDownMode(record.hold_down_mode))?,
            repeat_rate: record.repeat_rate,
            repeat_delay: record.repeat_delay,
            repeat_limit: record.repeat_limit,
            hold_down_duration: record.hold_down_duration,
            multiplier: record.multiplier,
            delay_before_next_action: record.delay_before_next_action,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintRecord {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
}

impl From<&Constraint> for ConstraintRecord {
    fn from(constraint: &Constraint) -> Self {
        let (kind, package_name) = match constraint {
            Constraint::AppInForeground { package_name } => {
                ("app_in_foreground", Some(package_name.clone()))
            }
            Constraint::AppNotInForeground { package_name } => {
                ("app_not_in_foreground", Some(package_name.clone()))
            }
            Constraint::MediaPlaying => ("media_playing", None),
            Constraint::NoMediaPlaying => ("no_media_playing", None),
            Constraint::ScreenOn => ("screen_on", None),
            Constraint::ScreenOff => ("screen_off", None),
            Constraint::OrientationPortrait => ("orientation_portrait", None),
            Constraint::OrientationLandscape => ("orientation_landscape", None),
            Constraint::WifiOn => ("wifi_on", None),
            Constraint::WifiOff => ("wifi_off", None),
            Constraint::DeviceIsLocked => ("device_is_locked", None),
            Constraint::DeviceIsUnlocked => ("device_is_unlocked", None),
            Constraint::InPhoneCall => ("in_phone_call", None),
            Constraint::NotInPhoneCall => ("not_in_phone_call", None),
            Constraint::PhoneRinging => ("phone_ringing", None),
            Constraint::Charging => ("charging", None),
            Constraint::Discharging => ("discharging", None),
        };

        ConstraintRecord {
            kind: kind.to_string(),
            package_name,
        }
    }
}

impl TryFrom<ConstraintRecord> for Constraint {
    type Error = RecordError;

    fn try_from(record: ConstraintRecord) -> Result<Self> {
        let package_name = || {
            record
                .package_name
                .clone()
                .ok_or_else(|| {
                    RecordError::InvalidValue(format!("{} needs a package name", record.kind))
                })
        };

        let constraint = match record.kind.as_str() {
            "app_in_foreground" => Constraint::AppInForeground {
                package_name: package_name()?,
            },
            "app_not_in_foreground" => Constraint::AppNotInForeground {
                package_name: package_name()?,
            },
            "media_playing" => Constraint::MediaPlaying,
            "no_media_playing" => Constraint::NoMediaPlaying,
            "screen_on" => Constraint::ScreenOn,
            "screen_off" => Constraint::ScreenOff,
            "orientation_portrait" => Constraint::OrientationPortrait,
            "orientation_landscape" => Constraint::OrientationLandscape,
            "wifi_on" => Constraint::WifiOn,
            "wifi_off" => Constraint::WifiOff,
            "device_is_locked" => Constraint::DeviceIsLocked,
            "device_is_unlocked" => Constraint::DeviceIsUnlocked,
            "in_phone_call" => Constraint::InPhoneCall,
            "not_in_phone_call" => Constraint::NotInPhoneCall,
            "phone_ringing" => Constraint::PhoneRinging,
            "charging" => Constraint::Charging,
            "discharging" => Constraint::Discharging,
            other => return Err(RecordError::UnknownConstraint(other.to_string())),
        };

        Ok(constraint)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMapRecord {
    #[serde(default)]
    pub id: i64,
    pub uid: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub constraint_mode: ConstraintMode,
    pub trigger: TriggerRecord,
    #[serde(default)]
    pub actions: Vec<ActionRecord>,
    #[serde(default)]
    pub constraints: Vec<ConstraintRecord>,
}

fn default_enabled() -> bool {
    true
}

impl From<&KeyMap> for KeyMapRecord {
    fn from(keymap: &KeyMap) -> Self {
        KeyMapRecord {
            id: keymap.id,
            uid: keymap.uid.clone(),
            enabled: keymap.enabled,
            constraint_mode: keymap.constraint_state.mode,
            trigger: TriggerRecord::from(&keymap.trigger),
            actions: keymap.actions.iter().map(ActionRecord::from).collect(),
            constraints: keymap
                .constraint_state
                .constraints
                .iter()
                .map(ConstraintRecord::from)
                .collect(),
        }
    }
}

impl TryFrom<KeyMapRecord> for KeyMap {
    type Error = RecordError;

    fn try_from(record: KeyMapRecord) -> Result<Self> {
        let actions = record
            .actions
            .into_iter()
            .map(KeyMapAction::try_from)
            .collect::<Result<Vec<_>>>()?;

        let constraints = record
            .constraints
            .into_iter()
            .map(Constraint::try_from)
            .collect::<Result<_>>()?;

        Ok(KeyMap {
            id: record.id,
            uid: record.uid,
            trigger: Trigger::try_from(record.trigger)?,
            actions,
            constraint_state: ConstraintState {
                constraints,
                mode: record.constraint_mode,
            },
            enabled: record.enabled,
        })
    }
}

/// Layout of a key map file: a list of `[[keymap]]` tables.
#[derive(Debug, Default, Serialize, Deserialize)]
struct KeyMapFile {
    #[serde(default)]
    keymap: Vec<KeyMapRecord>,
}

/// Encode key maps as TOML.
pub fn encode_keymaps<'a, I>(keymaps: I) -> Result<String>
where
    I: IntoIterator<Item = &'a KeyMap>,
{
    let file = KeyMapFile {
        keymap: keymaps.into_iter().map(KeyMapRecord::from).collect(),
    };
    toml::to_string(&file).map_err(|e| RecordError::TomlSerialize(e.to_string()))
}

/// Decode key maps from TOML.
pub fn decode_keymaps(content: &str) -> Result<Vec<KeyMap>> {
    let file: KeyMapFile =
        toml::from_str(content).map_err(|e| RecordError::TomlParse(e.to_string()))?;
    file.keymap.into_iter().map(KeyMap::try_from).collect()
}
