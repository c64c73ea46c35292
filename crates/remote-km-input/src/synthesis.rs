//! Input synthesis: replaying received messages as local input.

use async_trait::async_trait;
use remote_km_types::{MouseButtonId, WireMessage};
use tracing::trace;

use crate::error::InputError;

/// Injects keyboard and mouse events into the local input stream.
///
/// Each method is a single injection; nothing is batched or retried.
#[async_trait]
pub trait InputSynthesis: Send + 'static {
    /// Move the pointer by a relative offset.
    async fn move_by(&mut self, dx: i16, dy: i16) -> Result<(), InputError>;

    /// Press or release a mouse button.
    async fn button(&mut self, button: MouseButtonId, down: bool) -> Result<(), InputError>;

    /// Turn the vertical wheel by `delta` (120 per notch).
    async fn scroll(&mut self, delta: i16) -> Result<(), InputError>;

    /// Press or release a key, identified by its Windows virtual-key code.
    async fn key(&mut self, vk_code: u8, down: bool) -> Result<(), InputError>;

    /// Release any virtual devices or OS resources.
    async fn shutdown(&mut self) -> Result<(), InputError>;
}

/// Inject one decoded message with exactly one synthesis call.
pub async fn synthesize(
    synth: &mut dyn InputSynthesis,
    msg: WireMessage,
) -> Result<(), InputError> {
    trace!(kind = msg.kind(), "synthesizing");
    match msg {
        WireMessage::MouseMove { dx, dy } => synth.move_by(dx, dy).await,
        WireMessage::MouseButton { button, down } => synth.button(button, down).await,
        WireMessage::Key { vk_code, down } => synth.key(vk_code, down).await,
        WireMessage::Scroll { delta } => synth.scroll(delta).await,
    }
}
