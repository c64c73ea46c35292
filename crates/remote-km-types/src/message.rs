//! Wire message types.
//!
//! One [`WireMessage`] travels per datagram from the controller to the
//! receiver. The byte layout lives in `remote-km-protocol::wire`.

use crate::event::{CaptureEvent, MouseButtonId};

/// A discrete input event as exchanged on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireMessage {
    /// Relative pointer motion.
    MouseMove { dx: i16, dy: i16 },

    /// Mouse button transition.
    MouseButton { button: MouseButtonId, down: bool },

    /// Key transition, raw virtual-key code.
    Key { vk_code: u8, down: bool },

    /// Vertical wheel delta (120 per notch).
    Scroll { delta: i16 },
}

impl WireMessage {
    /// Convert a captured event into its wire form.
    ///
    /// Motion deltas saturate at the i16 range. Returns `None` for events that
    /// never leave the local machine.
    #[must_use]
    pub fn from_capture(event: CaptureEvent) -> Option<Self> {
        match event {
            CaptureEvent::MouseMove { dx, dy } => Some(Self::MouseMove {
                dx: saturate_i16(dx),
                dy: saturate_i16(dy),
            }),
            CaptureEvent::MouseButton { button, down } => Some(Self::MouseButton { button, down }),
            CaptureEvent::Wheel { delta } => Some(Self::Scroll { delta }),
            CaptureEvent::Key { vk_code, down } => Some(Self::Key { vk_code, down }),
            CaptureEvent::CapturingChanged(_) => None,
        }
    }

    /// Short name used in log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MouseMove { .. } => "mouse_move",
            Self::MouseButton { .. } => "mouse_button",
            Self::Key { .. } => "key",
            Self::Scroll { .. } => "scroll",
        }
    }
}

fn saturate_i16(value: i32) -> i16 {
    i16::try_from(value).unwrap_or(if value < 0 { i16::MIN } else { i16::MAX })
}
