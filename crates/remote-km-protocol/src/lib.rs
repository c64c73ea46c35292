//! UDP transport and wire codec for remote-km.
//!
//! Each input event travels as one self-describing datagram. There is no
//! connection, handshake, acknowledgement or retransmission: a lost datagram
//! is a lost event.

pub mod error;
pub mod transport;
pub mod wire;

pub use error::{Malformed, ProtocolError};
pub use transport::{parse_target, ReceiverEvent, UdpReceiver, UdpSender, DEFAULT_PORT};
pub use wire::{decode, encode, Frame};
