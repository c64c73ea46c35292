//! Input subsystem errors.

use thiserror::Error;

use crate::capture::HookClass;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to install {class} hook: {reason}")]
    HookInstall { class: HookClass, reason: String },

    #[error("input hook is already installed")]
    AlreadyInstalled,

    #[error("failed to open device: {0}")]
    DeviceOpen(String),

    #[error("failed to grab device: {0}")]
    DeviceGrab(String),

    #[error("failed to create virtual device: {0}")]
    VirtualDeviceCreate(String),

    #[error("failed to inject event: {0}")]
    Inject(String),

    #[error("backend not available on this platform")]
    Unavailable,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
