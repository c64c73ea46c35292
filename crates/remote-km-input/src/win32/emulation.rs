//! `SendInput`-based synthesis.

use async_trait::async_trait;
use remote_km_types::MouseButtonId;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_EXTENDEDKEY, KEYEVENTF_KEYUP, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP,
    MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP, MOUSEEVENTF_MOVE, MOUSEEVENTF_RIGHTDOWN,
    MOUSEEVENTF_RIGHTUP, MOUSEEVENTF_WHEEL, MOUSEEVENTF_XDOWN, MOUSEEVENTF_XUP, MOUSEINPUT,
    MOUSE_EVENT_FLAGS, VIRTUAL_KEY,
};

use crate::error::InputError;
use crate::synthesis::InputSynthesis;

/// `mouseData` values telling X1 from X2; both share the XDOWN/XUP flags.
const XBUTTON1: u32 = 1;
const XBUTTON2: u32 = 2;

/// Virtual keys that need `KEYEVENTF_EXTENDEDKEY`.
const EXTENDED_VKS: &[u8] = &[
    0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, // navigation
    0x2D, 0x2E, // Insert, Delete
    0x5B, 0x5C, 0x5D, // Win keys, Apps
    0x6F, // numpad divide
    0x90, // Num Lock
    0xA3, 0xA5, // right Ctrl, right Alt
];

/// Windows input synthesis through `SendInput`.
#[derive(Debug, Default)]
pub struct SendInputSynthesis;

impl SendInputSynthesis {
    pub fn new() -> Self {
        Self
    }
}

fn send(input: INPUT) -> Result<(), InputError> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let size = std::mem::size_of::<INPUT>() as i32;
    // SAFETY: input is a fully initialised INPUT on the stack.
    let sent = unsafe { SendInput(&[input], size) };
    if sent == 1 {
        Ok(())
    } else {
        Err(InputError::Inject(format!(
            "SendInput: {}",
            windows::core::Error::from_win32()
        )))
    }
}

fn mouse(dx: i32, dy: i32, mouse_data: u32, flags: MOUSE_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx,
                dy,
                mouseData: mouse_data,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

#[async_trait]
impl InputSynthesis for SendInputSynthesis {
    async fn move_by(&mut self, dx: i16, dy: i16) -> Result<(), InputError> {
        send(mouse(i32::from(dx), i32::from(dy), 0, MOUSEEVENTF_MOVE))
    }

    async fn button(&mut self, button: MouseButtonId, down: bool) -> Result<(), InputError> {
        let (flags, mouse_data) = match (button, down) {
            (MouseButtonId::Left, true) => (MOUSEEVENTF_LEFTDOWN, 0),
            (MouseButtonId::Left, false) => (MOUSEEVENTF_LEFTUP, 0),
            (MouseButtonId::Right, true) => (MOUSEEVENTF_RIGHTDOWN, 0),
            (MouseButtonId::Right, false) => (MOUSEEVENTF_RIGHTUP, 0),
            (MouseButtonId::Middle, true) => (MOUSEEVENTF_MIDDLEDOWN, 0),
            (MouseButtonId::Middle, false) => (MOUSEEVENTF_MIDDLEUP, 0),
            (MouseButtonId::Aux1, true) => (MOUSEEVENTF_XDOWN, XBUTTON1),
            (MouseButtonId::Aux1, false) => (MOUSEEVENTF_XUP, XBUTTON1),
            (MouseButtonId::Aux2, true) => (MOUSEEVENTF_XDOWN, XBUTTON2),
            (MouseButtonId::Aux2, false) => (MOUSEEVENTF_XUP, XBUTTON2),
        };
        send(mouse(0, 0, mouse_data, flags))
    }

    async fn scroll(&mut self, delta: i16) -> Result<(), InputError> {
        // mouseData carries the signed delta in two's complement.
        let mouse_data = u32::from_ne_bytes(i32::from(delta).to_ne_bytes());
        send(mouse(0, 0, mouse_data, MOUSEEVENTF_WHEEL))
    }

    async fn key(&mut self, vk_code: u8, down: bool) -> Result<(), InputError> {
        let mut flags = KEYBD_EVENT_FLAGS(0);
        if !down {
            flags |= KEYEVENTF_KEYUP;
        }
        if EXTENDED_VKS.contains(&vk_code) {
            flags |= KEYEVENTF_EXTENDEDKEY;
        }
        send(INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: VIRTUAL_KEY(u16::from(vk_code)),
                    wScan: 0,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        })
    }

    async fn shutdown(&mut self) -> Result<(), InputError> {
        Ok(())
    }
}
