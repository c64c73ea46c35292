//! evdev-based interception for Linux.
//!
//! evdev has no notion of a hook that can veto an event, so interception is
//! emulated: every physical keyboard and mouse is grabbed exclusively, each
//! event is offered to the installed sink, and events that come back as
//! [`Disposition::PassThrough`] are re-emitted on a uinput mirror device.
//!
//! There is no global cursor to query either. A virtual pointer tracks the
//! position implied by passed-through motion, clamped to the configured
//! screen and to the current confinement region.

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use evdev::uinput::VirtualDevice;
use evdev::{
    Device, EventStream, EventSummary, EventType, KeyCode as EvdevKey, RelativeAxisCode,
    SynchronizationCode,
};
use remote_km_types::{ConfineRegion, MouseButtonId, Point, ScreenGeometry};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{build_virtual_device, keymap, OWN_DEVICE_PREFIX, PASSTHROUGH_DEVICE_NAME};
use crate::capture::{
    Disposition, HookClass, InterceptionBackend, RawButton, RawEvent, RawEventSink,
};
use crate::error::InputError;

/// Scale from one evdev wheel notch to native wheel units.
const WHEEL_DELTA: i32 = 120;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Pointer {
    /// Where the desktop pointer is believed to be.
    pos: Point,
    /// The position most recently reported to the sink. Differs from `pos`
    /// while motion is being consumed.
    reported: Point,
    confine: Option<ConfineRegion>,
}

struct Shared {
    screen: ConfineRegion,
    pointer: Mutex<Pointer>,
    sinks: Mutex<HashMap<HookClass, Arc<dyn RawEventSink>>>,
    mirror: Mutex<Option<VirtualDevice>>,
}

impl Shared {
    fn dispatch(&self, event: RawEvent) -> Disposition {
        let sink = lock(&self.sinks).get(&event.class()).cloned();
        let Some(sink) = sink else {
            return Disposition::PassThrough;
        };
        catch_unwind(AssertUnwindSafe(|| sink.dispatch(event))).unwrap_or_else(|_| {
            warn!(?event, "panic in input dispatch, passing event through");
            Disposition::PassThrough
        })
    }

    fn clamp(&self, pointer: &Pointer, point: Point) -> Point {
        let point = self.screen.clamp(point);
        match pointer.confine {
            Some(region) => region.clamp(point),
            None => point,
        }
    }

    /// Classify one evdev event, accumulating into `frame`.
    fn handle(&self, frame: &mut Frame, ev: evdev::InputEvent) {
        match ev.destructure() {
            EventSummary::Key(_, key, value) => {
                let down = value != 0;
                let raw = if let Some(button) = keymap::evdev_to_mouse_button(key) {
                    raw_button(button, down)
                } else if let Some(vk_code) = keymap::evdev_to_vk(key) {
                    RawEvent::Key { vk_code, down }
                } else {
                    RawEvent::Other {
                        class: HookClass::Keyboard,
                    }
                };
                self.flush_motion(frame);
                let disposition = self.dispatch(raw);
                frame.key(ev, key, down, disposition);
            }
            EventSummary::RelativeAxis(_, RelativeAxisCode::REL_X, value) => {
                frame.dx = frame.dx.saturating_add(value);
            }
            EventSummary::RelativeAxis(_, RelativeAxisCode::REL_Y, value) => {
                frame.dy = frame.dy.saturating_add(value);
            }
            EventSummary::RelativeAxis(_, RelativeAxisCode::REL_WHEEL, value) => {
                self.flush_motion(frame);
                let raw = RawEvent::Wheel {
                    mouse_data: wheel_mouse_data(value),
                };
                if self.dispatch(raw) == Disposition::PassThrough {
                    frame.passthrough.push(ev);
                }
            }
            EventSummary::RelativeAxis(_, RelativeAxisCode::REL_HWHEEL, _) => {
                self.flush_motion(frame);
                let raw = RawEvent::Other {
                    class: HookClass::Mouse,
                };
                if self.dispatch(raw) == Disposition::PassThrough {
                    frame.passthrough.push(ev);
                }
            }
            EventSummary::Synchronization(_, SynchronizationCode::SYN_REPORT, _) => {
                self.flush(frame);
            }
            // High-resolution wheel, MSC_SCAN and the rest are not mirrored.
            _ => {}
        }
    }

    /// Report motion accumulated so far in this frame, so it reaches the sink
    /// ahead of any button or wheel event that follows it.
    fn flush_motion(&self, frame: &mut Frame) {
        let (dx, dy) = (std::mem::take(&mut frame.dx), std::mem::take(&mut frame.dy));
        if dx == 0 && dy == 0 {
            return;
        }
        let candidate = lock(&self.pointer).reported.offset(dx, dy);
        let disposition = self.dispatch(RawEvent::MouseMove { point: candidate });

        let mut pointer = lock(&self.pointer);
        if disposition == Disposition::PassThrough {
            let next = self.clamp(&pointer, pointer.pos.offset(dx, dy));
            pointer.pos = next;
            pointer.reported = next;
            if dx != 0 {
                frame.passthrough.push(rel_event(RelativeAxisCode::REL_X, dx));
            }
            if dy != 0 {
                frame.passthrough.push(rel_event(RelativeAxisCode::REL_Y, dy));
            }
        } else {
            pointer.reported = candidate;
        }
    }

    /// End of an evdev frame: report coalesced motion and emit whatever
    /// passed through.
    fn flush(&self, frame: &mut Frame) {
        self.flush_motion(frame);
        if frame.passthrough.is_empty() {
            return;
        }
        if let Some(mirror) = lock(&self.mirror).as_mut() {
            if let Err(e) = mirror.emit(&frame.passthrough) {
                warn!(error = %e, "failed to re-emit passed-through events");
            }
        }
        frame.passthrough.clear();
    }
}

/// Per-device reader state: events of the current frame, up to
/// `SYN_REPORT`, and the keys held down on the mirror.
#[derive(Default)]
struct Frame {
    dx: i32,
    dy: i32,
    passthrough: Vec<evdev::InputEvent>,
    /// Keys and buttons whose press went out on the mirror and whose release
    /// has not.
    mirrored_down: HashSet<EvdevKey>,
}

impl Frame {
    /// Queue a key or button event for the mirror according to `disposition`.
    ///
    /// A release is always mirrored when the matching press was, even if the
    /// sink consumed it. Otherwise the mirror would keep the key held, e.g.
    /// the toggle key pressed while idle and released to start capture.
    fn key(&mut self, ev: evdev::InputEvent, key: EvdevKey, down: bool, disposition: Disposition) {
        let passed = disposition == Disposition::PassThrough;
        if down {
            if passed {
                self.mirrored_down.insert(key);
                self.passthrough.push(ev);
            }
        } else if self.mirrored_down.remove(&key) || passed {
            self.passthrough.push(ev);
        }
    }
}

fn raw_button(button: MouseButtonId, down: bool) -> RawEvent {
    match button {
        MouseButtonId::Left => RawEvent::Button {
            button: RawButton::Left,
            down,
        },
        MouseButtonId::Right => RawEvent::Button {
            button: RawButton::Right,
            down,
        },
        MouseButtonId::Middle => RawEvent::Button {
            button: RawButton::Middle,
            down,
        },
        MouseButtonId::Aux1 => RawEvent::XButton {
            mouse_data: 1 << 16,
            down,
        },
        MouseButtonId::Aux2 => RawEvent::XButton {
            mouse_data: 2 << 16,
            down,
        },
    }
}

/// Pack wheel notches into the high word of `mouse_data`.
fn wheel_mouse_data(notches: i32) -> u32 {
    let delta = notches
        .saturating_mul(WHEEL_DELTA)
        .clamp(i32::from(i16::MIN), i32::from(i16::MAX));
    let delta = i16::try_from(delta).unwrap_or_default();
    u32::from(u16::from_be_bytes(delta.to_be_bytes())) << 16
}

fn rel_event(axis: RelativeAxisCode, value: i32) -> evdev::InputEvent {
    evdev::InputEvent::new(EventType::RELATIVE.0, axis.0, value)
}

/// Whether a device looks like a keyboard or a relative pointer.
fn is_input_device(device: &Device) -> bool {
    let keyboard = device.supported_keys().is_some_and(|keys| {
        keys.contains(EvdevKey::KEY_A)
            && keys.contains(EvdevKey::KEY_Z)
            && keys.contains(EvdevKey::KEY_ENTER)
    });
    let mouse = device.supported_relative_axes().is_some_and(|rel| {
        rel.contains(RelativeAxisCode::REL_X) && rel.contains(RelativeAxisCode::REL_Y)
    });
    keyboard || mouse
}

/// Linux interception using exclusive evdev grabs and a uinput mirror.
pub struct EvdevInterception {
    runtime: Handle,
    shared: Arc<Shared>,
    readers: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl EvdevInterception {
    /// Create the backend. Must be called from within a tokio runtime; reader
    /// tasks are spawned on it later.
    pub fn new(screen: &ScreenGeometry) -> Result<Self, InputError> {
        let runtime = Handle::try_current()
            .map_err(|e| InputError::Other(anyhow::anyhow!("no tokio runtime: {e}")))?;
        let center = screen.center();
        Ok(Self {
            runtime,
            shared: Arc::new(Shared {
                screen: screen.bounds(),
                pointer: Mutex::new(Pointer {
                    pos: center,
                    reported: center,
                    confine: None,
                }),
                sinks: Mutex::new(HashMap::new()),
                mirror: Mutex::new(None),
            }),
            readers: Mutex::new(Vec::new()),
            shutdown_tx: Mutex::new(None),
        })
    }

    /// Create the mirror, grab every keyboard and mouse, and start a reader
    /// task per device.
    fn start(&self) -> Result<(), InputError> {
        *lock(&self.shared.mirror) = Some(build_virtual_device(PASSTHROUGH_DEVICE_NAME)?);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let _guard = self.runtime.enter();

        let mut handles = Vec::new();
        for (path, mut device) in evdev::enumerate() {
            let name = device.name().unwrap_or("Unknown Device").to_string();
            if name.starts_with(OWN_DEVICE_PREFIX) || !is_input_device(&device) {
                continue;
            }
            if let Err(e) = device.grab() {
                warn!(device = %name, path = %path.display(), error = %e, "failed to grab device");
                continue;
            }
            let stream = match device.into_event_stream() {
                Ok(s) => s,
                Err(e) => {
                    warn!(device = %name, error = %e, "failed to create event stream");
                    continue;
                }
            };
            info!(device = %name, path = %path.display(), "grabbed device");
            handles.push(self.runtime.spawn(read_device(
                name,
                path,
                stream,
                Arc::clone(&self.shared),
                shutdown_rx.clone(),
            )));
        }

        if handles.is_empty() {
            *lock(&self.shared.mirror) = None;
            return Err(InputError::DeviceGrab(
                "no keyboard or mouse devices could be grabbed".to_string(),
            ));
        }

        *lock(&self.readers) = handles;
        *lock(&self.shutdown_tx) = Some(shutdown_tx);
        Ok(())
    }

    fn stop(&self) {
        if let Some(tx) = lock(&self.shutdown_tx).take() {
            let _ = tx.send(true);
        }
        let handles = std::mem::take(&mut *lock(&self.readers));
        let count = handles.len();
        for handle in handles {
            // Readers may be parked in a read; aborting drops the stream,
            // which closes the fd and releases the grab.
            handle.abort();
        }
        *lock(&self.shared.mirror) = None;
        if count > 0 {
            info!(count, "released all input devices");
        }
    }
}

impl InterceptionBackend for EvdevInterception {
    fn install(
        &self,
        class: HookClass,
        sink: Arc<dyn RawEventSink>,
    ) -> Result<(), InputError> {
        let first = {
            let mut sinks = lock(&self.shared.sinks);
            let first = sinks.is_empty();
            sinks.insert(class, sink);
            first
        };
        if first {
            if let Err(e) = self.start() {
                lock(&self.shared.sinks).remove(&class);
                return Err(e);
            }
        }
        debug!(%class, "evdev interception installed");
        Ok(())
    }

    fn remove(&self, class: HookClass) {
        let now_empty = {
            let mut sinks = lock(&self.shared.sinks);
            if sinks.remove(&class).is_none() {
                return;
            }
            sinks.is_empty()
        };
        debug!(%class, "evdev interception removed");
        if now_empty {
            self.stop();
        }
    }

    fn cursor_position(&self) -> Point {
        lock(&self.shared.pointer).pos
    }

    fn confine_cursor(&self, region: Option<ConfineRegion>) {
        let mut pointer = lock(&self.shared.pointer);
        pointer.confine = region;
        let pos = self.shared.clamp(&pointer, pointer.pos);
        pointer.pos = pos;
        pointer.reported = pos;
        trace!(?region, "pointer confinement changed");
    }
}

impl Drop for EvdevInterception {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn read_device(
    name: String,
    path: PathBuf,
    mut stream: EventStream,
    shared: Arc<Shared>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut frame = Frame::default();
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                break;
            }
            result = stream.next_event() => {
                match result {
                    Ok(ev) => shared.handle(&mut frame, ev),
                    Err(e) => {
                        warn!(device = %name, path = %path.display(), error = %e, "device read error");
                        break;
                    }
                }
            }
        }
    }
    debug!(device = %name, "device reader stopped");
}
