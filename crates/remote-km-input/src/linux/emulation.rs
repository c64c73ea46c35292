//! uinput-based input synthesis for Linux.

use async_trait::async_trait;
use evdev::uinput::VirtualDevice;
use evdev::{EventType, RelativeAxisCode};
use remote_km_types::MouseButtonId;
use tracing::{debug, info};

use super::{build_virtual_device, keymap, SYNTHESIS_DEVICE_NAME};
use crate::error::InputError;
use crate::synthesis::InputSynthesis;

/// Native wheel units per evdev notch.
const WHEEL_DELTA: i32 = 120;

/// Linux input synthesis through one uinput virtual keyboard/mouse.
pub struct UinputSynthesis {
    device: Option<VirtualDevice>,
    /// Wheel units not yet worth a whole notch.
    wheel_remainder: i32,
}

impl UinputSynthesis {
    pub fn new() -> Result<Self, InputError> {
        let device = build_virtual_device(SYNTHESIS_DEVICE_NAME)?;
        info!(name = SYNTHESIS_DEVICE_NAME, "created virtual device");
        Ok(Self {
            device: Some(device),
            wheel_remainder: 0,
        })
    }

    fn emit(&mut self, events: &[evdev::InputEvent]) -> Result<(), InputError> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| InputError::Inject("virtual device already shut down".to_string()))?;
        device
            .emit(events)
            .map_err(|e| InputError::Inject(e.to_string()))
    }
}

fn key_event(code: u16, down: bool) -> evdev::InputEvent {
    evdev::InputEvent::new(EventType::KEY.0, code, i32::from(down))
}

fn rel_event(axis: RelativeAxisCode, value: i32) -> evdev::InputEvent {
    evdev::InputEvent::new(EventType::RELATIVE.0, axis.0, value)
}

#[async_trait]
impl InputSynthesis for UinputSynthesis {
    async fn move_by(&mut self, dx: i16, dy: i16) -> Result<(), InputError> {
        self.emit(&[
            rel_event(RelativeAxisCode::REL_X, i32::from(dx)),
            rel_event(RelativeAxisCode::REL_Y, i32::from(dy)),
        ])
    }

    async fn button(&mut self, button: MouseButtonId, down: bool) -> Result<(), InputError> {
        let key = keymap::mouse_button_to_evdev(button);
        self.emit(&[key_event(key.0, down)])
    }

    async fn scroll(&mut self, delta: i16) -> Result<(), InputError> {
        let total = self.wheel_remainder + i32::from(delta);
        let notches = total / WHEEL_DELTA;
        self.wheel_remainder = total % WHEEL_DELTA;
        if notches == 0 {
            return Ok(());
        }
        self.emit(&[rel_event(RelativeAxisCode::REL_WHEEL, notches)])
    }

    async fn key(&mut self, vk_code: u8, down: bool) -> Result<(), InputError> {
        let Some(key) = keymap::vk_to_evdev(vk_code) else {
            debug!(vk_code, "no evdev key for virtual-key code, dropping");
            return Ok(());
        };
        self.emit(&[key_event(key.0, down)])
    }

    async fn shutdown(&mut self) -> Result<(), InputError> {
        if self.device.take().is_some() {
            info!("destroyed virtual device");
        }
        Ok(())
    }
}
