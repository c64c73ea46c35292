//! Windows backends: low-level hooks, `ClipCursor` and `SendInput`.
//!
//! This is the only place in the workspace that needs `unsafe`; every block
//! is a Win32 FFI call.

#![allow(unsafe_code)]

mod capture;
mod emulation;

pub use capture::HookInterception;
pub use emulation::SendInputSynthesis;
