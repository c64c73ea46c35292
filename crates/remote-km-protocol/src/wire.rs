//! Wire format: one fixed-layout message per datagram.
//!
//! ```text
//! 0x01 MouseMove    [tag][dx:i16 LE][dy:i16 LE]   5 bytes
//! 0x02 MouseButton  [tag][button:u8][down:u8]     3 bytes
//! 0x03 Key          [tag][vk_code:u8][down:u8]    3 bytes
//! 0x04 Scroll       [tag][delta:i16 LE]           3 bytes
//! ```
//!
//! There is no length prefix: the tag alone determines the size. Trailing
//! bytes after a complete message are ignored.

use std::ops::Deref;

use remote_km_types::{MouseButtonId, WireMessage};

use crate::error::Malformed;

pub const TAG_MOUSE_MOVE: u8 = 0x01;
pub const TAG_MOUSE_BUTTON: u8 = 0x02;
pub const TAG_KEY: u8 = 0x03;
pub const TAG_SCROLL: u8 = 0x04;

/// Size of the largest message on the wire.
pub const MAX_MESSAGE_SIZE: usize = 5;

/// Total encoded size for a tag, or `None` if the tag is unknown.
#[must_use]
pub fn message_size(tag: u8) -> Option<usize> {
    match tag {
        TAG_MOUSE_MOVE => Some(5),
        TAG_MOUSE_BUTTON | TAG_KEY | TAG_SCROLL => Some(3),
        _ => None,
    }
}

/// An encoded message, stored inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    buf: [u8; MAX_MESSAGE_SIZE],
    len: usize,
}

impl Frame {
    fn new(bytes: &[u8]) -> Self {
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        buf[..bytes.len()].copy_from_slice(bytes);
        Self {
            buf,
            len: bytes.len(),
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Encode a message into its fixed-size wire form.
#[must_use]
pub fn encode(msg: &WireMessage) -> Frame {
    match *msg {
        WireMessage::MouseMove { dx, dy } => {
            let [dx0, dx1] = dx.to_le_bytes();
            let [dy0, dy1] = dy.to_le_bytes();
            Frame::new(&[TAG_MOUSE_MOVE, dx0, dx1, dy0, dy1])
        }
        WireMessage::MouseButton { button, down } => {
            Frame::new(&[TAG_MOUSE_BUTTON, button.as_u8(), u8::from(down)])
        }
        WireMessage::Key { vk_code, down } => Frame::new(&[TAG_KEY, vk_code, u8::from(down)]),
        WireMessage::Scroll { delta } => {
            let [d0, d1] = delta.to_le_bytes();
            Frame::new(&[TAG_SCROLL, d0, d1])
        }
    }
}

/// Decode one message from the start of a datagram payload.
pub fn decode(bytes: &[u8]) -> Result<WireMessage, Malformed> {
    let (&tag, _) = bytes.split_first().ok_or(Malformed::Empty)?;
    let needed = message_size(tag).ok_or(Malformed::UnknownTag(tag))?;
    if bytes.len() < needed {
        return Err(Malformed::Truncated {
            tag,
            needed,
            available: bytes.len(),
        });
    }

    let msg = match tag {
        TAG_MOUSE_MOVE => WireMessage::MouseMove {
            dx: i16::from_le_bytes([bytes[1], bytes[2]]),
            dy: i16::from_le_bytes([bytes[3], bytes[4]]),
        },
        TAG_MOUSE_BUTTON => WireMessage::MouseButton {
            button: MouseButtonId::try_from(bytes[1])
                .map_err(|_| Malformed::UnknownButton(bytes[1]))?,
            down: bytes[2] != 0,
        },
        TAG_KEY => WireMessage::Key {
            vk_code: bytes[1],
            down: bytes[2] != 0,
        },
        TAG_SCROLL => WireMessage::Scroll {
            delta: i16::from_le_bytes([bytes[1], bytes[2]]),
        },
        _ => return Err(Malformed::UnknownTag(tag)),
    };
    Ok(msg)
}
