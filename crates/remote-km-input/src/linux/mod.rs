//! Linux backends built on evdev and uinput.
//!
//! Interception grabs every physical keyboard and mouse exclusively and
//! re-emits whatever is passed through on a uinput mirror device. Synthesis
//! writes to a second uinput device.

mod capture;
mod emulation;
mod keymap;

use evdev::uinput::VirtualDevice;
use evdev::{AttributeSet, KeyCode as EvdevKey, RelativeAxisCode};

use crate::error::InputError;

pub use capture::EvdevInterception;
pub use emulation::UinputSynthesis;

/// Devices whose name starts with this are ours and never grabbed.
const OWN_DEVICE_PREFIX: &str = "remote-km";

const PASSTHROUGH_DEVICE_NAME: &str = "remote-km pass-through";
const SYNTHESIS_DEVICE_NAME: &str = "remote-km virtual input";

/// Build a uinput device that can emit every mapped key, the five mouse
/// buttons, relative motion and both wheels.
fn build_virtual_device(name: &str) -> Result<VirtualDevice, InputError> {
    let mut keys = AttributeSet::<EvdevKey>::new();
    // Register all standard keys
    for code in 1..=248 {
        keys.insert(EvdevKey(code));
    }
    for key in keymap::mapped_keys() {
        keys.insert(key);
    }
    for button in [
        EvdevKey::BTN_LEFT,
        EvdevKey::BTN_RIGHT,
        EvdevKey::BTN_MIDDLE,
        EvdevKey::BTN_SIDE,
        EvdevKey::BTN_EXTRA,
    ] {
        keys.insert(button);
    }

    let mut rel = AttributeSet::<RelativeAxisCode>::new();
    rel.insert(RelativeAxisCode::REL_X);
    rel.insert(RelativeAxisCode::REL_Y);
    rel.insert(RelativeAxisCode::REL_WHEEL);
    rel.insert(RelativeAxisCode::REL_HWHEEL);

    VirtualDevice::builder()
        .map_err(|e| InputError::VirtualDeviceCreate(e.to_string()))?
        .name(name)
        .with_keys(&keys)
        .map_err(|e| InputError::VirtualDeviceCreate(e.to_string()))?
        .with_relative_axes(&rel)
        .map_err(|e| InputError::VirtualDeviceCreate(e.to_string()))?
        .build()
        .map_err(|e| InputError::VirtualDeviceCreate(e.to_string()))
}
