// Keymapper Key Codes
// Android key code constants, key classes and the Linux input code table

/// Key code used when the platform could not resolve a key.
pub const KEYCODE_UNKNOWN: i32 = 0;
pub const KEYCODE_HOME: i32 = 3;
pub const KEYCODE_BACK: i32 = 4;
pub const KEYCODE_CALL: i32 = 5;
pub const KEYCODE_ENDCALL: i32 = 6;
pub const KEYCODE_0: i32 = 7;
pub const KEYCODE_9: i32 = 16;
pub const KEYCODE_DPAD_UP: i32 = 19;
pub const KEYCODE_DPAD_DOWN: i32 = 20;
pub const KEYCODE_DPAD_LEFT: i32 = 21;
pub const KEYCODE_DPAD_RIGHT: i32 = 22;
pub const KEYCODE_DPAD_CENTER: i32 = 23;
pub const KEYCODE_VOLUME_UP: i32 = 24;
pub const KEYCODE_VOLUME_DOWN: i32 = 25;
pub const KEYCODE_POWER: i32 = 26;
pub const KEYCODE_CAMERA: i32 = 27;
pub const KEYCODE_A: i32 = 29;
pub const KEYCODE_Z: i32 = 54;
pub const KEYCODE_ALT_LEFT: i32 = 57;
pub const KEYCODE_ALT_RIGHT: i32 = 58;
pub const KEYCODE_SHIFT_LEFT: i32 = 59;
pub const KEYCODE_SHIFT_RIGHT: i32 = 60;
pub const KEYCODE_TAB: i32 = 61;
pub const KEYCODE_SPACE: i32 = 62;
pub const KEYCODE_SYM: i32 = 63;
pub const KEYCODE_ENTER: i32 = 66;
pub const KEYCODE_DEL: i32 = 67;
pub const KEYCODE_MINUS: i32 = 69;
pub const KEYCODE_EQUALS: i32 = 70;
pub const KEYCODE_NUM: i32 = 78;
pub const KEYCODE_HEADSETHOOK: i32 = 79;
pub const KEYCODE_FOCUS: i32 = 80;
pub const KEYCODE_MENU: i32 = 82;
pub const KEYCODE_SEARCH: i32 = 84;
pub const KEYCODE_MEDIA_PLAY_PAUSE: i32 = 85;
pub const KEYCODE_MEDIA_STOP: i32 = 86;
pub const KEYCODE_MEDIA_NEXT: i32 = 87;
pub const KEYCODE_MEDIA_PREVIOUS: i32 = 88;
pub const KEYCODE_PAGE_UP: i32 = 92;
pub const KEYCODE_PAGE_DOWN: i32 = 93;
pub const KEYCODE_ESCAPE: i32 = 111;
pub const KEYCODE_FORWARD_DEL: i32 = 112;
pub const KEYCODE_CTRL_LEFT: i32 = 113;
pub const KEYCODE_CTRL_RIGHT: i32 = 114;
pub const KEYCODE_CAPS_LOCK: i32 = 115;
pub const KEYCODE_META_LEFT: i32 = 117;
pub const KEYCODE_META_RIGHT: i32 = 118;
pub const KEYCODE_FUNCTION: i32 = 119;
pub const KEYCODE_MOVE_HOME: i32 = 122;
pub const KEYCODE_MOVE_END: i32 = 123;
pub const KEYCODE_INSERT: i32 = 124;
pub const KEYCODE_F1: i32 = 131;
pub const KEYCODE_F12: i32 = 142;
pub const KEYCODE_VOLUME_MUTE: i32 = 164;
pub const KEYCODE_ASSIST: i32 = 219;
pub const KEYCODE_DPAD_UP_LEFT: i32 = 268;
pub const KEYCODE_DPAD_DOWN_LEFT: i32 = 269;
pub const KEYCODE_DPAD_UP_RIGHT: i32 = 270;
pub const KEYCODE_DPAD_DOWN_RIGHT: i32 = 271;

const MODIFIER_KEYCODES: &[i32] = &[
    KEYCODE_SHIFT_LEFT,
    KEYCODE_SHIFT_RIGHT,
    KEYCODE_ALT_LEFT,
    KEYCODE_ALT_RIGHT,
    KEYCODE_CTRL_LEFT,
    KEYCODE_CTRL_RIGHT,
    KEYCODE_META_LEFT,
    KEYCODE_META_RIGHT,
    KEYCODE_SYM,
    KEYCODE_NUM,
    KEYCODE_FUNCTION,
];

const DPAD_KEYCODES: &[i32] = &[
    KEYCODE_DPAD_UP,
    KEYCODE_DPAD_DOWN,
    KEYCODE_DPAD_LEFT,
    KEYCODE_DPAD_RIGHT,
    KEYCODE_DPAD_CENTER,
    KEYCODE_DPAD_UP_LEFT,
    KEYCODE_DPAD_DOWN_LEFT,
    KEYCODE_DPAD_UP_RIGHT,
    KEYCODE_DPAD_DOWN_RIGHT,
];

// Keys the kernel still reports while the display is off.
const SCREEN_OFF_KEYCODES: &[i32] = &[
    KEYCODE_VOLUME_DOWN,
    KEYCODE_VOLUME_UP,
    KEYCODE_HEADSETHOOK,
    KEYCODE_FOCUS,
    KEYCODE_CAMERA,
    KEYCODE_MENU,
    KEYCODE_ASSIST,
    KEYCODE_SEARCH,
];

/// Shift, Alt, Ctrl, Meta, Sym, Num and Function keys.
///
/// Trigger keys with a modifier code default to not consuming the event,
/// and key-event actions with a modifier code are held down instead of
/// repeated.
pub fn is_modifier_key(key_code: i32) -> bool {
    MODIFIER_KEYCODES.contains(&key_code)
}

/// Directional pad keys, including the diagonal codes.
pub fn is_dpad_key(key_code: i32) -> bool {
    DPAD_KEYCODES.contains(&key_code)
}

pub fn is_volume_key(key_code: i32) -> bool {
    key_code == KEYCODE_VOLUME_UP || key_code == KEYCODE_VOLUME_DOWN
}

/// Whether a key can still be detected when the screen is off.
pub fn can_detect_when_screen_off(key_code: i32) -> bool {
    SCREEN_OFF_KEYCODES.contains(&key_code)
}

/// Display name for a key code
pub fn key_name(key_code: i32) -> String {
    let name = match key_code {
        KEYCODE_UNKNOWN => "UNKNOWN",
        KEYCODE_HOME => "HOME",
        KEYCODE_BACK => "BACK",
        KEYCODE_CALL => "CALL",
        KEYCODE_ENDCALL => "ENDCALL",
        KEYCODE_DPAD_UP => "DPAD_UP",
        KEYCODE_DPAD_DOWN => "DPAD_DOWN",
        KEYCODE_DPAD_LEFT => "DPAD_LEFT",
        KEYCODE_DPAD_RIGHT => "DPAD_RIGHT",
        KEYCODE_DPAD_CENTER => "DPAD_CENTER",
        KEYCODE_VOLUME_UP => "VOLUME_UP",
        KEYCODE_VOLUME_DOWN => "VOLUME_DOWN",
        KEYCODE_POWER => "POWER",
        KEYCODE_CAMERA => "CAMERA",
        KEYCODE_ALT_LEFT => "ALT_LEFT",
        KEYCODE_ALT_RIGHT => "ALT_RIGHT",
        KEYCODE_SHIFT_LEFT => "SHIFT_LEFT",
        KEYCODE_SHIFT_RIGHT => "SHIFT_RIGHT",
        KEYCODE_TAB => "TAB",
        KEYCODE_SPACE => "SPACE",
        KEYCODE_SYM => "SYM",
        KEYCODE_ENTER => "ENTER",
        KEYCODE_DEL => "DEL",
        KEYCODE_MINUS => "MINUS",
        KEYCODE_EQUALS => "EQUALS",
        KEYCODE_NUM => "NUM",
        KEYCODE_HEADSETHOOK => "HEADSETHOOK",
        KEYCODE_FOCUS => "FOCUS",
        KEYCODE_MENU => "MENU",
        KEYCODE_SEARCH => "SEARCH",
        KEYCODE_MEDIA_PLAY_PAUSE => "MEDIA_PLAY_PAUSE",
        KEYCODE_MEDIA_STOP => "MEDIA_STOP",
        KEYCODE_MEDIA_NEXT => "MEDIA_NEXT",
        KEYCODE_MEDIA_PREVIOUS => "MEDIA_PREVIOUS",
        KEYCODE_PAGE_UP => "PAGE_UP",
        KEYCODE_PAGE_DOWN => "PAGE_DOWN",
        KEYCODE_ESCAPE => "ESCAPE",
        KEYCODE_FORWARD_DEL => "FORWARD_DEL",
        KEYCODE_CTRL_LEFT => "CTRL_LEFT",
        KEYCODE_CTRL_RIGHT => "CTRL_RIGHT",
        KEYCODE_CAPS_LOCK => "CAPS_LOCK",
        KEYCODE_META_LEFT => "META_LEFT",
        KEYCODE_META_RIGHT => "META_RIGHT",
        KEYCODE_FUNCTION => "FUNCTION",
        KEYCODE_MOVE_HOME => "MOVE_HOME",
        KEYCODE_MOVE_END => "MOVE_END",
        KEYCODE_INSERT => "INSERT",
        KEYCODE_VOLUME_MUTE => "VOLUME_MUTE",
        KEYCODE_ASSIST => "ASSIST",
        KEYCODE_DPAD_UP_LEFT => "DPAD_UP_LEFT",
        KEYCODE_DPAD_DOWN_LEFT => "DPAD_DOWN_LEFT",
        KEYCODE_DPAD_UP_RIGHT => "DPAD_UP_RIGHT",
        KEYCODE_DPAD_DOWN_RIGHT => "DPAD_DOWN_RIGHT",
        KEYCODE_0..=KEYCODE_9 => return format!("{}", key_code - KEYCODE_0),
        KEYCODE_A..=KEYCODE_Z => {
            let letter = (b'A' + (key_code - KEYCODE_A) as u8) as char;
            return letter.to_string();
        }
        KEYCODE_F1..=KEYCODE_F12 => return format!("F{}", key_code - KEYCODE_F1 + 1),
        _ => return format!("KEYCODE_{}", key_code),
    };
    name.to_string()
}

// Linux input-event-codes.h letters, in A..Z order.
const LINUX_LETTER_CODES: [u16; 26] = [
    30, 48, 46, 32, 18, 33, 34, 35, 23, 36, 37, 38, 50, 49, 24, 25, 16, 19, 31, 20, 22, 47, 17,
    45, 21, 44,
];

/// Translate a Linux input event code into the key code used by key event
/// trigger keys.
///
/// Returns `None` for codes with no equivalent; such events can still
/// match evdev trigger keys, which use the raw code.
pub fn from_linux_code(code: u16) -> Option<i32> {
    if let Some(index) = LINUX_LETTER_CODES.iter().position(|&c| c == code) {
        return Some(KEYCODE_A + index as i32);
    }

    let key_code = match code {
        1 => KEYCODE_ESCAPE,
        // KEY_1..KEY_9, then KEY_0
        2..=10 => KEYCODE_0 + (code as i32 - 1),
        11 => KEYCODE_0,
        12 => KEYCODE_MINUS,
        13 => KEYCODE_EQUALS,
        14 => KEYCODE_DEL,
        15 => KEYCODE_TAB,
        28 => KEYCODE_ENTER,
        29 => KEYCODE_CTRL_LEFT,
        42 => KEYCODE_SHIFT_LEFT,
        54 => KEYCODE_SHIFT_RIGHT,
        56 => KEYCODE_ALT_LEFT,
        57 => KEYCODE_SPACE,
        58 => KEYCODE_CAPS_LOCK,
        59..=68 => KEYCODE_F1 + (code as i32 - 59),
        87 => KEYCODE_F1 + 10,
        88 => KEYCODE_F12,
        97 => KEYCODE_CTRL_RIGHT,
        100 => KEYCODE_ALT_RIGHT,
        102 => KEYCODE_MOVE_HOME,
        103 => KEYCODE_DPAD_UP,
        104 => KEYCODE_PAGE_UP,
        105 => KEYCODE_DPAD_LEFT,
        106 => KEYCODE_DPAD_RIGHT,
        107 => KEYCODE_MOVE_END,
        108 => KEYCODE_DPAD_DOWN,
        109 => KEYCODE_PAGE_DOWN,
        110 => KEYCODE_INSERT,
        111 => KEYCODE_FORWARD_DEL,
        113 => KEYCODE_VOLUME_MUTE,
        114 => KEYCODE_VOLUME_DOWN,
        115 => KEYCODE_VOLUME_UP,
        116 => KEYCODE_POWER,
        125 => KEYCODE_META_LEFT,
        126 => KEYCODE_META_RIGHT,
        139 => KEYCODE_MENU,
        158 => KEYCODE_BACK,
        163 => KEYCODE_MEDIA_NEXT,
        164 => KEYCODE_MEDIA_PLAY_PAUSE,
        165 => KEYCODE_MEDIA_PREVIOUS,
        166 => KEYCODE_MEDIA_STOP,
        169 => KEYCODE_CALL,
        172 => KEYCODE_HOME,
        212 => KEYCODE_CAMERA,
        217 => KEYCODE_SEARCH,
        226 => KEYCODE_HEADSETHOOK,
        353 => KEYCODE_DPAD_CENTER,
        528 => KEYCODE_FOCUS,
        583 => KEYCODE_ASSIST,
        _ => return None,
    };
    Some(key_code)
}

/// Reverse of [`from_linux_code`], used when emitting key-event actions.
pub fn to_linux_code(key_code: i32) -> Option<u16> {
    if (KEYCODE_A..=KEYCODE_Z).contains(&key_code) {
        return Some(LINUX_LETTER_CODES[(key_code - KEYCODE_A) as usize]);
    }

    // Scan the table instead of keeping a second one in sync.
    (1u16..=583).find(|&code| {
        !LINUX_LETTER_CODES.contains(&code) && from_linux_code(code) == Some(key_code)
    })
}
