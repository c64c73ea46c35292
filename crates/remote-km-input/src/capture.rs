//! Global input capture with a hot-key toggle and cursor confinement.
//!
//! [`InputHook`] sits on top of an [`InterceptionBackend`], which delivers
//! every raw keyboard and mouse event on the machine before anything else sees
//! it. While idle, events pass through untouched. While capturing, they are
//! swallowed and turned into [`CaptureEvent`]s for a single listener, and the
//! pointer is pinned to the point where capture started.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use remote_km_types::{CaptureEvent, CaptureState, ConfineRegion, MouseButtonId, Point, VK_SCROLL};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::error::InputError;

/// Which class of interception point a backend installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookClass {
    Keyboard,
    Mouse,
}

impl std::fmt::Display for HookClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Keyboard => write!(f, "keyboard"),
            Self::Mouse => write!(f, "mouse"),
        }
    }
}

/// The three buttons reported without a side-channel discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawButton {
    Left,
    Right,
    Middle,
}

/// A native input event as delivered by an interception backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEvent {
    Key { vk_code: u8, down: bool },
    /// Absolute pointer position after the motion.
    MouseMove { point: Point },
    Button { button: RawButton, down: bool },
    /// X button; the high word of `mouse_data` is 1 for X1.
    XButton { mouse_data: u32, down: bool },
    /// Vertical wheel; the high word of `mouse_data` is the signed delta.
    Wheel { mouse_data: u32 },
    /// Anything without a wire form (horizontal wheel, unmapped keys).
    /// Swallowed while capturing, never forwarded.
    Other { class: HookClass },
}

impl RawEvent {
    /// The interception point that delivers this event.
    pub fn class(&self) -> HookClass {
        match self {
            Self::Key { .. } => HookClass::Keyboard,
            Self::Other { class } => *class,
            _ => HookClass::Mouse,
        }
    }
}

/// What the backend should do with an event after dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Suppress the event: the OS and other applications never see it.
    Consume,
    /// Let the event continue to the OS.
    PassThrough,
}

/// Receives raw events from an interception backend.
///
/// Called on the backend's delivery thread; must return promptly.
pub trait RawEventSink: Send + Sync {
    fn dispatch(&self, event: RawEvent) -> Disposition;
}

/// A platform mechanism for system-wide input interception.
pub trait InterceptionBackend: Send + Sync + 'static {
    /// Register an interception point for `class` that feeds `sink`.
    fn install(&self, class: HookClass, sink: Arc<dyn RawEventSink>) -> Result<(), InputError>;

    /// Remove the interception point for `class`. Idempotent.
    fn remove(&self, class: HookClass);

    /// Current absolute pointer position.
    fn cursor_position(&self) -> Point;

    /// Restrict the pointer to `region`, or release it with `None`.
    fn confine_cursor(&self, region: Option<ConfineRegion>);
}

struct HookState {
    capture: CaptureState,
    lock_point: Option<Point>,
    last_pos: Point,
    installed: bool,
}

/// Capture state machine bound to one interception backend.
pub struct InputHook {
    backend: Arc<dyn InterceptionBackend>,
    toggle_key: u8,
    events: mpsc::Sender<CaptureEvent>,
    state: Mutex<HookState>,
}

impl InputHook {
    /// Create a hook that reports to `events`. Nothing is installed yet.
    pub fn new(backend: Arc<dyn InterceptionBackend>, events: mpsc::Sender<CaptureEvent>) -> Self {
        Self {
            backend,
            toggle_key: VK_SCROLL,
            events,
            state: Mutex::new(HookState {
                capture: CaptureState::Idle,
                lock_point: None,
                last_pos: Point::default(),
                installed: false,
            }),
        }
    }

    /// Use a different virtual-key code as the capture toggle.
    #[must_use]
    pub fn with_toggle_key(mut self, vk_code: u8) -> Self {
        self.toggle_key = vk_code;
        self
    }

    pub fn toggle_key(&self) -> u8 {
        self.toggle_key
    }

    fn lock_state(&self) -> MutexGuard<'_, HookState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install keyboard and mouse interception.
    ///
    /// Either both are installed or neither is. The returned guard
    /// uninstalls on drop.
    pub fn install(self: &Arc<Self>) -> Result<HookGuard, InputError> {
        {
            let mut state = self.lock_state();
            if state.installed {
                return Err(InputError::AlreadyInstalled);
            }
            state.installed = true;
        }

        let sink: Arc<dyn RawEventSink> = Arc::new(HookSink(Arc::downgrade(self)));

        if let Err(e) = self.backend.install(HookClass::Keyboard, Arc::clone(&sink)) {
            self.lock_state().installed = false;
            return Err(install_error(HookClass::Keyboard, e));
        }
        if let Err(e) = self.backend.install(HookClass::Mouse, sink) {
            self.backend.remove(HookClass::Keyboard);
            self.lock_state().installed = false;
            return Err(install_error(HookClass::Mouse, e));
        }

        info!(toggle_key = self.toggle_key, "input hook installed");
        Ok(HookGuard {
            hook: Arc::clone(self),
        })
    }

    /// Remove interception and release any cursor confinement.
    ///
    /// Safe to call repeatedly, from any thread, installed or not.
    pub fn uninstall(&self) {
        let was_installed = std::mem::replace(&mut self.lock_state().installed, false);
        // The state lock must not be held here: removing a hook may wait for
        // its delivery thread, which may be blocked in `dispatch`.
        if was_installed {
            self.backend.remove(HookClass::Mouse);
            self.backend.remove(HookClass::Keyboard);
            info!("input hook uninstalled");
        }

        let mut state = self.lock_state();
        if state.capture.is_capturing() {
            self.transition(&mut state, false);
        } else {
            self.backend.confine_cursor(None);
        }
    }

    pub fn is_installed(&self) -> bool {
        self.lock_state().installed
    }

    /// Enter or leave capturing. Setting the current state again does nothing.
    pub fn set_capturing(&self, capturing: bool) {
        let mut state = self.lock_state();
        self.transition(&mut state, capturing);
    }

    pub fn is_capturing(&self) -> bool {
        self.lock_state().capture.is_capturing()
    }

    /// Flip the capture state.
    pub fn toggle(&self) {
        let mut state = self.lock_state();
        let next = !state.capture.is_capturing();
        self.transition(&mut state, next);
    }

    /// Where the pointer is pinned while capturing.
    pub fn lock_point(&self) -> Option<Point> {
        self.lock_state().lock_point
    }

    fn transition(&self, state: &mut HookState, capturing: bool) {
        if state.capture.is_capturing() == capturing {
            return;
        }

        if capturing {
            let lock = self.backend.cursor_position();
            self.backend
                .confine_cursor(Some(ConfineRegion::single_point(lock)));
            state.lock_point = Some(lock);
            state.last_pos = lock;
            info!(lock = %lock, "capture started");
        } else {
            self.backend.confine_cursor(None);
            state.lock_point = None;
            info!("capture stopped");
        }

        state.capture = CaptureState::from(capturing);
        self.emit(CaptureEvent::CapturingChanged(capturing));
    }

    fn emit(&self, event: CaptureEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "capture channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("capture listener gone");
            }
        }
    }

    fn dispatch(&self, event: RawEvent) -> Disposition {
        let Ok(mut state) = self.state.lock() else {
            return Disposition::PassThrough;
        };

        if let RawEvent::Key { vk_code, down } = event {
            if vk_code == self.toggle_key {
                if down {
                    return if state.capture.is_capturing() {
                        Disposition::Consume
                    } else {
                        Disposition::PassThrough
                    };
                }
                let next = !state.capture.is_capturing();
                debug!(capturing = next, "toggle key released");
                self.transition(&mut state, next);
                return Disposition::Consume;
            }
        }

        if !state.capture.is_capturing() {
            return Disposition::PassThrough;
        }

        match event {
            RawEvent::Key { vk_code, down } => {
                self.emit(CaptureEvent::Key { vk_code, down });
            }
            RawEvent::MouseMove { point } => {
                let (dx, dy) = point.delta_from(state.last_pos);
                state.last_pos = point;
                if dx != 0 || dy != 0 {
                    self.emit(CaptureEvent::MouseMove { dx, dy });
                }
            }
            RawEvent::Button { button, down } => {
                let button = match button {
                    RawButton::Left => MouseButtonId::Left,
                    RawButton::Right => MouseButtonId::Right,
                    RawButton::Middle => MouseButtonId::Middle,
                };
                self.emit(CaptureEvent::MouseButton { button, down });
            }
            RawEvent::XButton { mouse_data, down } => {
                let button = if mouse_data >> 16 == 1 {
                    MouseButtonId::Aux1
                } else {
                    MouseButtonId::Aux2
                };
                self.emit(CaptureEvent::MouseButton { button, down });
            }
            RawEvent::Wheel { mouse_data } => {
                self.emit(CaptureEvent::Wheel {
                    delta: high_word_signed(mouse_data),
                });
            }
            RawEvent::Other { class } => {
                trace!(%class, "swallowing unforwardable event");
            }
        }
        Disposition::Consume
    }
}

impl Drop for InputHook {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if state.capture.is_capturing() {
            self.backend.confine_cursor(None);
        }
    }
}

fn install_error(class: HookClass, err: InputError) -> InputError {
    match err {
        InputError::HookInstall { .. } => err,
        other => InputError::HookInstall {
            class,
            reason: other.to_string(),
        },
    }
}

/// Reinterpret the high 16 bits of `mouse_data` as a signed value.
fn high_word_signed(mouse_data: u32) -> i16 {
    let [hi, lo, _, _] = mouse_data.to_be_bytes();
    i16::from_be_bytes([hi, lo])
}

/// Backend-facing adapter. Holds the hook weakly so the backend never keeps
/// it alive.
struct HookSink(Weak<InputHook>);

impl RawEventSink for HookSink {
    fn dispatch(&self, event: RawEvent) -> Disposition {
        match self.0.upgrade() {
            Some(hook) => hook.dispatch(event),
            None => Disposition::PassThrough,
        }
    }
}

/// Keeps the hook installed. Dropping it uninstalls.
pub struct HookGuard {
    hook: Arc<InputHook>,
}

impl HookGuard {
    pub fn hook(&self) -> &Arc<InputHook> {
        &self.hook
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        self.hook.uninstall();
    }
}
