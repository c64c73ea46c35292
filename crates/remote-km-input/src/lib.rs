//! Global input interception and synthesis for remote-km.
//!
//! The controller side uses [`InputHook`] on top of an
//! [`InterceptionBackend`] to capture local input; the receiver side replays
//! messages through an [`InputSynthesis`] backend. Platform backends live in
//! `linux` (evdev/uinput, behind the `linux` feature) and `win32`
//! (low-level hooks and `SendInput`); in-memory backends for tests are in
//! `mock`.

use std::sync::Arc;

use remote_km_types::ScreenGeometry;

pub mod capture;
pub mod error;
pub mod synthesis;

#[cfg(all(target_os = "linux", feature = "linux"))]
pub mod linux;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
#[cfg(windows)]
pub mod win32;

pub use capture::{
    Disposition, HookClass, HookGuard, InputHook, InterceptionBackend, RawButton, RawEvent,
    RawEventSink,
};
pub use error::InputError;
pub use synthesis::{synthesize, InputSynthesis};

/// The interception backend for this platform.
///
/// `screen` bounds the virtual pointer on platforms without a queryable
/// global cursor.
#[allow(unused_variables)]
pub fn platform_interception(
    screen: &ScreenGeometry,
) -> Result<Arc<dyn InterceptionBackend>, InputError> {
    #[cfg(all(target_os = "linux", feature = "linux"))]
    {
        return Ok(Arc::new(linux::EvdevInterception::new(screen)?));
    }
    #[cfg(windows)]
    {
        return Ok(Arc::new(win32::HookInterception::new()));
    }
    #[allow(unreachable_code)]
    Err(InputError::Unavailable)
}

/// The synthesis backend for this platform.
pub fn platform_synthesis() -> Result<Box<dyn InputSynthesis>, InputError> {
    #[cfg(all(target_os = "linux", feature = "linux"))]
    {
        return Ok(Box::new(linux::UinputSynthesis::new()?));
    }
    #[cfg(windows)]
    {
        return Ok(Box::new(win32::SendInputSynthesis::new()));
    }
    #[allow(unreachable_code)]
    Err(InputError::Unavailable)
}
