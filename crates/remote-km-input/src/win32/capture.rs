//! `WH_KEYBOARD_LL` / `WH_MOUSE_LL` interception.
//!
//! Each hook class runs on its own thread with its own message loop, since a
//! low-level hook is serviced by the thread that installed it. Hook
//! procedures carry no context, so the active sinks live in statics.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use remote_km_types::{ConfineRegion, Point};
use tracing::{debug, info, warn};
use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, POINT, RECT, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, ClipCursor, DispatchMessageW, GetCursorPos, GetMessageW, PeekMessageW,
    PostThreadMessageW, SetWindowsHookExW, UnhookWindowsHookEx, HC_ACTION, HHOOK,
    KBDLLHOOKSTRUCT, MSG, MSLLHOOKSTRUCT, PM_NOREMOVE, WH_KEYBOARD_LL, WH_MOUSE_LL,
    WINDOWS_HOOK_ID, WM_KEYDOWN, WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MBUTTONDOWN, WM_MBUTTONUP,
    WM_MOUSEMOVE, WM_MOUSEWHEEL, WM_QUIT, WM_RBUTTONDOWN, WM_RBUTTONUP, WM_SYSKEYDOWN,
    WM_XBUTTONDOWN, WM_XBUTTONUP,
};

use crate::capture::{
    Disposition, HookClass, InterceptionBackend, RawButton, RawEvent, RawEventSink,
};
use crate::error::InputError;

type Sink = RwLock<Option<Arc<dyn RawEventSink>>>;

static KEYBOARD_SINK: Sink = RwLock::new(None);
static MOUSE_SINK: Sink = RwLock::new(None);

fn sink_slot(class: HookClass) -> &'static Sink {
    match class {
        HookClass::Keyboard => &KEYBOARD_SINK,
        HookClass::Mouse => &MOUSE_SINK,
    }
}

fn set_sink(class: HookClass, sink: Option<Arc<dyn RawEventSink>>) {
    *sink_slot(class)
        .write()
        .unwrap_or_else(PoisonError::into_inner) = sink;
}

/// Offer an event to the sink for its class. Never unwinds into the OS.
fn deliver(event: RawEvent) -> Disposition {
    let sink = sink_slot(event.class())
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    let Some(sink) = sink else {
        return Disposition::PassThrough;
    };
    catch_unwind(AssertUnwindSafe(|| sink.dispatch(event))).unwrap_or(Disposition::PassThrough)
}

fn is_action(n_code: i32) -> bool {
    u32::try_from(n_code) == Ok(HC_ACTION)
}

fn message_id(w_param: WPARAM) -> u32 {
    u32::try_from(w_param.0).unwrap_or(0)
}

unsafe extern "system" fn keyboard_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if is_action(n_code) {
        // SAFETY: for HC_ACTION, l_param points to a KBDLLHOOKSTRUCT.
        let kb = &*(l_param.0 as *const KBDLLHOOKSTRUCT);
        let down = matches!(message_id(w_param), WM_KEYDOWN | WM_SYSKEYDOWN);
        let event = match u8::try_from(kb.vkCode) {
            Ok(vk_code) => RawEvent::Key { vk_code, down },
            Err(_) => RawEvent::Other {
                class: HookClass::Keyboard,
            },
        };
        if deliver(event) == Disposition::Consume {
            return LRESULT(1);
        }
    }
    // SAFETY: forwarding to the next hook in the chain.
    CallNextHookEx(HHOOK::default(), n_code, w_param, l_param)
}

/// Every mouse message maps to an event; ones without a wire form (horizontal
/// wheel, non-client messages) become `Other` so capture still swallows them.
fn mouse_event(msg: u32, ms: &MSLLHOOKSTRUCT) -> RawEvent {
    let button = |button, down| RawEvent::Button { button, down };
    match msg {
        WM_MOUSEMOVE => RawEvent::MouseMove {
            point: Point::new(ms.pt.x, ms.pt.y),
        },
        WM_LBUTTONDOWN => button(RawButton::Left, true),
        WM_LBUTTONUP => button(RawButton::Left, false),
        WM_RBUTTONDOWN => button(RawButton::Right, true),
        WM_RBUTTONUP => button(RawButton::Right, false),
        WM_MBUTTONDOWN => button(RawButton::Middle, true),
        WM_MBUTTONUP => button(RawButton::Middle, false),
        WM_XBUTTONDOWN => RawEvent::XButton {
            mouse_data: ms.mouseData,
            down: true,
        },
        WM_XBUTTONUP => RawEvent::XButton {
            mouse_data: ms.mouseData,
            down: false,
        },
        WM_MOUSEWHEEL => RawEvent::Wheel {
            mouse_data: ms.mouseData,
        },
        _ => RawEvent::Other {
            class: HookClass::Mouse,
        },
    }
}

unsafe extern "system" fn mouse_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if is_action(n_code) {
        // SAFETY: for HC_ACTION, l_param points to a MSLLHOOKSTRUCT.
        let ms = &*(l_param.0 as *const MSLLHOOKSTRUCT);
        if deliver(mouse_event(message_id(w_param), ms)) == Disposition::Consume {
            return LRESULT(1);
        }
    }
    // SAFETY: forwarding to the next hook in the chain.
    CallNextHookEx(HHOOK::default(), n_code, w_param, l_param)
}

struct HookThread {
    thread_id: u32,
    join: JoinHandle<()>,
}

/// Install the hook, report the outcome, then pump messages until `WM_QUIT`.
fn run_hook_thread(class: HookClass, ready: mpsc::Sender<Result<u32, String>>) {
    type HookProc = unsafe extern "system" fn(i32, WPARAM, LPARAM) -> LRESULT;
    let (id, proc): (WINDOWS_HOOK_ID, HookProc) = match class {
        HookClass::Keyboard => (WH_KEYBOARD_LL, keyboard_proc),
        HookClass::Mouse => (WH_MOUSE_LL, mouse_proc),
    };

    let mut msg = MSG::default();
    // SAFETY: standard hook thread setup. PeekMessageW forces creation of the
    // thread's message queue so WM_QUIT can be posted to it.
    unsafe {
        let _ = PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_NOREMOVE);
        let hook = match SetWindowsHookExW(id, Some(proc), HINSTANCE::default(), 0) {
            Ok(hook) => hook,
            Err(e) => {
                let _ = ready.send(Err(e.to_string()));
                return;
            }
        };
        let _ = ready.send(Ok(GetCurrentThreadId()));

        while GetMessageW(&mut msg, HWND::default(), 0, 0).0 > 0 {
            DispatchMessageW(&msg);
        }
        if let Err(e) = UnhookWindowsHookEx(hook) {
            warn!(%class, error = %e, "failed to remove hook");
        }
    }
}

/// Windows interception through low-level hooks.
///
/// Only one instance should be active per process; hook procedures share
/// process-wide sink slots.
#[derive(Default)]
pub struct HookInterception {
    threads: Mutex<HashMap<HookClass, HookThread>>,
}

impl HookInterception {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InterceptionBackend for HookInterception {
    fn install(&self, class: HookClass, sink: Arc<dyn RawEventSink>) -> Result<(), InputError> {
        let mut threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        if threads.contains_key(&class) {
            return Err(InputError::AlreadyInstalled);
        }

        set_sink(class, Some(sink));
        let (ready_tx, ready_rx) = mpsc::channel();
        let join = thread::Builder::new()
            .name(format!("remote-km-{class}-hook"))
            .spawn(move || run_hook_thread(class, ready_tx))
            .map_err(|e| {
                set_sink(class, None);
                InputError::HookInstall {
                    class,
                    reason: e.to_string(),
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(thread_id)) => {
                threads.insert(class, HookThread { thread_id, join });
                info!(%class, "low-level hook installed");
                Ok(())
            }
            Ok(Err(reason)) => {
                set_sink(class, None);
                let _ = join.join();
                Err(InputError::HookInstall { class, reason })
            }
            Err(_) => {
                set_sink(class, None);
                let _ = join.join();
                Err(InputError::HookInstall {
                    class,
                    reason: "hook thread exited before installing".to_string(),
                })
            }
        }
    }

    fn remove(&self, class: HookClass) {
        let thread = self
            .threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&class);
        let Some(thread) = thread else {
            return;
        };

        // SAFETY: posting to a thread id we created; failure means the thread
        // already exited.
        if let Err(e) =
            unsafe { PostThreadMessageW(thread.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) }
        {
            debug!(%class, error = %e, "hook thread already gone");
        }
        let _ = thread.join.join();
        set_sink(class, None);
        info!(%class, "low-level hook removed");
    }

    fn cursor_position(&self) -> Point {
        let mut pt = POINT::default();
        // SAFETY: pt is a valid out-pointer.
        if let Err(e) = unsafe { GetCursorPos(&mut pt) } {
            warn!(error = %e, "GetCursorPos failed");
        }
        Point::new(pt.x, pt.y)
    }

    fn confine_cursor(&self, region: Option<ConfineRegion>) {
        let result = match region {
            Some(r) => {
                let rect = RECT {
                    left: r.left,
                    top: r.top,
                    right: r.right,
                    bottom: r.bottom,
                };
                // SAFETY: rect outlives the call.
                unsafe { ClipCursor(Some(&rect)) }
            }
            // SAFETY: a null rectangle removes the restriction.
            None => unsafe { ClipCursor(None) },
        };
        if let Err(e) = result {
            warn!(?region, error = %e, "ClipCursor failed");
        }
    }
}

impl Drop for HookInterception {
    fn drop(&mut self) {
        self.remove(HookClass::Mouse);
        self.remove(HookClass::Keyboard);
    }
}
