//! Input event types.
//!
//! Normalized keyboard and mouse events produced by the capture side while
//! it is capturing.

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Windows virtual-key code of Scroll Lock, the default capture toggle.
pub const VK_SCROLL: u8 = 0x91;

/// Whether local input is being redirected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureState {
    /// Events pass through to the local desktop.
    #[default]
    Idle,
    /// Events are swallowed and forwarded to the peer.
    Capturing,
}

impl CaptureState {
    #[must_use]
    pub fn is_capturing(self) -> bool {
        self == Self::Capturing
    }
}

impl From<bool> for CaptureState {
    fn from(capturing: bool) -> Self {
        if capturing {
            Self::Capturing
        } else {
            Self::Idle
        }
    }
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Capturing => write!(f, "Capturing"),
        }
    }
}

/// Mouse button identifier.
///
/// The discriminants are the on-wire button ids and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MouseButtonId {
    Left = 0,
    Right = 1,
    Middle = 2,
    /// First auxiliary ("X1", usually "back") button.
    Aux1 = 3,
    /// Second auxiliary ("X2", usually "forward") button.
    Aux2 = 4,
}

impl MouseButtonId {
    pub const ALL: [Self; 5] = [Self::Left, Self::Right, Self::Middle, Self::Aux1, Self::Aux2];

    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MouseButtonId {
    type Error = TypeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Left),
            1 => Ok(Self::Right),
            2 => Ok(Self::Middle),
            3 => Ok(Self::Aux1),
            4 => Ok(Self::Aux2),
            other => Err(TypeError::UnknownMouseButton(other)),
        }
    }
}

/// A normalized event emitted by input capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Relative pointer motion since the previous observed position.
    MouseMove { dx: i32, dy: i32 },

    /// Mouse button press or release.
    MouseButton { button: MouseButtonId, down: bool },

    /// Vertical wheel, in native wheel units (120 per notch).
    Wheel { delta: i16 },

    /// Key press or release, as a raw virtual-key code.
    Key { vk_code: u8, down: bool },

    /// Capture was switched on or off.
    CapturingChanged(bool),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mouse_button_ids_are_stable() {
        for (expected, button) in MouseButtonId::ALL.iter().enumerate() {
            assert_eq!(usize::from(button.as_u8()), expected);
            assert_eq!(MouseButtonId::try_from(button.as_u8()).unwrap(), *button);
        }
    }

    #[test]
    fn unknown_mouse_button_rejected() {
        assert_eq!(
            MouseButtonId::try_from(5),
            Err(TypeError::UnknownMouseButton(5))
        );
    }

    #[test]
    fn capture_state_from_bool() {
        assert_eq!(CaptureState::from(true), CaptureState::Capturing);
        assert!(!CaptureState::from(false).is_capturing());
        assert_eq!(CaptureState::default(), CaptureState::Idle);
    }
}
