//! Mapping between Windows virtual-key codes and evdev keys.
//!
//! The wire carries Windows virtual-key codes, so the Linux backends translate
//! at both ends.

use evdev::KeyCode as EvdevKey;
use remote_km_types::MouseButtonId;

/// Virtual-key table. Left/right-specific modifiers come before the generic
/// ones so reverse lookup yields the specific code, as a low-level hook does.
const VK_TABLE: &[(u8, EvdevKey)] = &[
    (0x08, EvdevKey::KEY_BACKSPACE),
    (0x09, EvdevKey::KEY_TAB),
    (0x0D, EvdevKey::KEY_ENTER),
    (0x0D, EvdevKey::KEY_KPENTER),
    (0x13, EvdevKey::KEY_PAUSE),
    (0x14, EvdevKey::KEY_CAPSLOCK),
    (0x1B, EvdevKey::KEY_ESC),
    (0x20, EvdevKey::KEY_SPACE),
    (0x21, EvdevKey::KEY_PAGEUP),
    (0x22, EvdevKey::KEY_PAGEDOWN),
    (0x23, EvdevKey::KEY_END),
    (0x24, EvdevKey::KEY_HOME),
    (0x25, EvdevKey::KEY_LEFT),
    (0x26, EvdevKey::KEY_UP),
    (0x27, EvdevKey::KEY_RIGHT),
    (0x28, EvdevKey::KEY_DOWN),
    (0x2C, EvdevKey::KEY_SYSRQ),
    (0x2D, EvdevKey::KEY_INSERT),
    (0x2E, EvdevKey::KEY_DELETE),
    // Digits
    (0x30, EvdevKey::KEY_0),
    (0x31, EvdevKey::KEY_1),
    (0x32, EvdevKey::KEY_2),
    (0x33, EvdevKey::KEY_3),
    (0x34, EvdevKey::KEY_4),
    (0x35, EvdevKey::KEY_5),
    (0x36, EvdevKey::KEY_6),
    (0x37, EvdevKey::KEY_7),
    (0x38, EvdevKey::KEY_8),
    (0x39, EvdevKey::KEY_9),
    // Letters
    (0x41, EvdevKey::KEY_A),
    (0x42, EvdevKey::KEY_B),
    (0x43, EvdevKey::KEY_C),
    (0x44, EvdevKey::KEY_D),
    (0x45, EvdevKey::KEY_E),
    (0x46, EvdevKey::KEY_F),
    (0x47, EvdevKey::KEY_G),
    (0x48, EvdevKey::KEY_H),
    (0x49, EvdevKey::KEY_I),
    (0x4A, EvdevKey::KEY_J),
    (0x4B, EvdevKey::KEY_K),
    (0x4C, EvdevKey::KEY_L),
    (0x4D, EvdevKey::KEY_M),
    (0x4E, EvdevKey::KEY_N),
    (0x4F, EvdevKey::KEY_O),
    (0x50, EvdevKey::KEY_P),
    (0x51, EvdevKey::KEY_Q),
    (0x52, EvdevKey::KEY_R),
    (0x53, EvdevKey::KEY_S),
    (0x54, EvdevKey::KEY_T),
    (0x55, EvdevKey::KEY_U),
    (0x56, EvdevKey::KEY_V),
    (0x57, EvdevKey::KEY_W),
    (0x58, EvdevKey::KEY_X),
    (0x59, EvdevKey::KEY_Y),
    (0x5A, EvdevKey::KEY_Z),
    (0x5B, EvdevKey::KEY_LEFTMETA),
    (0x5C, EvdevKey::KEY_RIGHTMETA),
    (0x5D, EvdevKey::KEY_COMPOSE),
    // Numpad
    (0x60, EvdevKey::KEY_KP0),
    (0x61, EvdevKey::KEY_KP1),
    (0x62, EvdevKey::KEY_KP2),
    (0x63, EvdevKey::KEY_KP3),
    (0x64, EvdevKey::KEY_KP4),
    (0x65, EvdevKey::KEY_KP5),
    (0x66, EvdevKey::KEY_KP6),
    (0x67, EvdevKey::KEY_KP7),
    (0x68, EvdevKey::KEY_KP8),
    (0x69, EvdevKey::KEY_KP9),
    (0x6A, EvdevKey::KEY_KPASTERISK),
    (0x6B, EvdevKey::KEY_KPPLUS),
    (0x6D, EvdevKey::KEY_KPMINUS),
    (0x6E, EvdevKey::KEY_KPDOT),
    (0x6F, EvdevKey::KEY_KPSLASH),
    // Function keys
    (0x70, EvdevKey::KEY_F1),
    (0x71, EvdevKey::KEY_F2),
    (0x72, EvdevKey::KEY_F3),
    (0x73, EvdevKey::KEY_F4),
    (0x74, EvdevKey::KEY_F5),
    (0x75, EvdevKey::KEY_F6),
    (0x76, EvdevKey::KEY_F7),
    (0x77, EvdevKey::KEY_F8),
    (0x78, EvdevKey::KEY_F9),
    (0x79, EvdevKey::KEY_F10),
    (0x7A, EvdevKey::KEY_F11),
    (0x7B, EvdevKey::KEY_F12),
    (0x7C, EvdevKey::KEY_F13),
    (0x7D, EvdevKey::KEY_F14),
    (0x7E, EvdevKey::KEY_F15),
    (0x7F, EvdevKey::KEY_F16),
    (0x80, EvdevKey::KEY_F17),
    (0x81, EvdevKey::KEY_F18),
    (0x82, EvdevKey::KEY_F19),
    (0x83, EvdevKey::KEY_F20),
    (0x84, EvdevKey::KEY_F21),
    (0x85, EvdevKey::KEY_F22),
    (0x86, EvdevKey::KEY_F23),
    (0x87, EvdevKey::KEY_F24),
    (0x90, EvdevKey::KEY_NUMLOCK),
    (0x91, EvdevKey::KEY_SCROLLLOCK),
    // Modifiers
    (0xA0, EvdevKey::KEY_LEFTSHIFT),
    (0xA1, EvdevKey::KEY_RIGHTSHIFT),
    (0xA2, EvdevKey::KEY_LEFTCTRL),
    (0xA3, EvdevKey::KEY_RIGHTCTRL),
    (0xA4, EvdevKey::KEY_LEFTALT),
    (0xA5, EvdevKey::KEY_RIGHTALT),
    (0x10, EvdevKey::KEY_LEFTSHIFT),
    (0x11, EvdevKey::KEY_LEFTCTRL),
    (0x12, EvdevKey::KEY_LEFTALT),
    // Media
    (0xAD, EvdevKey::KEY_MUTE),
    (0xAE, EvdevKey::KEY_VOLUMEDOWN),
    (0xAF, EvdevKey::KEY_VOLUMEUP),
    (0xB0, EvdevKey::KEY_NEXTSONG),
    (0xB1, EvdevKey::KEY_PREVIOUSSONG),
    (0xB2, EvdevKey::KEY_STOPCD),
    (0xB3, EvdevKey::KEY_PLAYPAUSE),
    // Punctuation (US layout positions)
    (0xBA, EvdevKey::KEY_SEMICOLON),
    (0xBB, EvdevKey::KEY_EQUAL),
    (0xBC, EvdevKey::KEY_COMMA),
    (0xBD, EvdevKey::KEY_MINUS),
    (0xBE, EvdevKey::KEY_DOT),
    (0xBF, EvdevKey::KEY_SLASH),
    (0xC0, EvdevKey::KEY_GRAVE),
    (0xDB, EvdevKey::KEY_LEFTBRACE),
    (0xDC, EvdevKey::KEY_BACKSLASH),
    (0xDD, EvdevKey::KEY_RIGHTBRACE),
    (0xDE, EvdevKey::KEY_APOSTROPHE),
    (0xE2, EvdevKey::KEY_102ND),
];

/// Translate a virtual-key code to the evdev key it is typed with.
pub fn vk_to_evdev(vk_code: u8) -> Option<EvdevKey> {
    VK_TABLE
        .iter()
        .find(|(vk, _)| *vk == vk_code)
        .map(|(_, key)| *key)
}

/// Translate an evdev key to the virtual-key code a low-level hook reports.
pub fn evdev_to_vk(key: EvdevKey) -> Option<u8> {
    VK_TABLE
        .iter()
        .find(|(_, k)| *k == key)
        .map(|(vk, _)| *vk)
}

/// Every evdev key the table can produce.
pub fn mapped_keys() -> impl Iterator<Item = EvdevKey> {
    VK_TABLE.iter().map(|(_, key)| *key)
}

/// evdev button for a wire button id.
pub fn mouse_button_to_evdev(button: MouseButtonId) -> EvdevKey {
    match button {
        MouseButtonId::Left => EvdevKey::BTN_LEFT,
        MouseButtonId::Right => EvdevKey::BTN_RIGHT,
        MouseButtonId::Middle => EvdevKey::BTN_MIDDLE,
        MouseButtonId::Aux1 => EvdevKey::BTN_SIDE,
        MouseButtonId::Aux2 => EvdevKey::BTN_EXTRA,
    }
}

/// Wire button id for an evdev button, if it is one of the five.
pub fn evdev_to_mouse_button(key: EvdevKey) -> Option<MouseButtonId> {
    match key {
        EvdevKey::BTN_LEFT => Some(MouseButtonId::Left),
        EvdevKey::BTN_RIGHT => Some(MouseButtonId::Right),
        EvdevKey::BTN_MIDDLE => Some(MouseButtonId::Middle),
        EvdevKey::BTN_SIDE => Some(MouseButtonId::Aux1),
        EvdevKey::BTN_EXTRA => Some(MouseButtonId::Aux2),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_and_digits() {
        assert_eq!(vk_to_evdev(0x41), Some(EvdevKey::KEY_A));
        assert_eq!(vk_to_evdev(0x5A), Some(EvdevKey::KEY_Z));
        assert_eq!(vk_to_evdev(0x30), Some(EvdevKey::KEY_0));
        assert_eq!(evdev_to_vk(EvdevKey::KEY_Q), Some(0x51));
    }

    #[test]
    fn scroll_lock_is_the_default_toggle() {
        assert_eq!(
            evdev_to_vk(EvdevKey::KEY_SCROLLLOCK),
            Some(remote_km_types::VK_SCROLL)
        );
    }

    #[test]
    fn reverse_lookup_prefers_sided_modifiers() {
        assert_eq!(evdev_to_vk(EvdevKey::KEY_LEFTSHIFT), Some(0xA0));
        assert_eq!(evdev_to_vk(EvdevKey::KEY_RIGHTCTRL), Some(0xA3));
        // Generic codes still type something sensible.
        assert_eq!(vk_to_evdev(0x10), Some(EvdevKey::KEY_LEFTSHIFT));
        assert_eq!(vk_to_evdev(0x12), Some(EvdevKey::KEY_LEFTALT));
    }

    #[test]
    fn enter_keys_share_a_code() {
        assert_eq!(evdev_to_vk(EvdevKey::KEY_KPENTER), Some(0x0D));
        assert_eq!(vk_to_evdev(0x0D), Some(EvdevKey::KEY_ENTER));
    }

    #[test]
    fn unmapped_codes() {
        assert_eq!(vk_to_evdev(0x00), None);
        assert_eq!(vk_to_evdev(0xFF), None);
        assert_eq!(evdev_to_vk(EvdevKey(0x300)), None);
    }

    #[test]
    fn forward_then_reverse_is_stable() {
        for &(vk, _) in VK_TABLE {
            let typed = vk_to_evdev(vk).unwrap();
            assert_eq!(
                evdev_to_vk(typed).and_then(vk_to_evdev),
                Some(typed),
                "vk 0x{vk:02X} via {typed:?}"
            );
        }
    }

    #[test]
    fn mouse_buttons_roundtrip() {
        for button in MouseButtonId::ALL {
            let key = mouse_button_to_evdev(button);
            assert_eq!(evdev_to_mouse_button(key), Some(button));
        }
        assert!(evdev_to_mouse_button(EvdevKey::KEY_A).is_none());
    }
}
