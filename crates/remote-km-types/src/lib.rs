//! Shared types for remote-km.
//!
//! This crate contains the types shared across the remote-km workspace:
//! capture state, normalized input events, mouse button ids, wire messages,
//! and screen/confinement geometry.

pub mod error;
pub mod event;
pub mod message;
pub mod screen;

pub use error::TypeError;
pub use event::{CaptureEvent, CaptureState, MouseButtonId, VK_SCROLL};
pub use message::WireMessage;
pub use screen::{ConfineRegion, Point, ScreenGeometry};
