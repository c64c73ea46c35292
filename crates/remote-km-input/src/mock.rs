//! Mock input backends for testing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use remote_km_types::{ConfineRegion, MouseButtonId, Point};

use crate::capture::{Disposition, HookClass, InterceptionBackend, RawEvent, RawEventSink};
use crate::error::InputError;
use crate::synthesis::InputSynthesis;

// ---------------------------------------------------------------------------
// MockInterception
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockInterceptionState {
    sinks: HashMap<HookClass, Arc<dyn RawEventSink>>,
    fail_on: Option<HookClass>,
    cursor: Point,
    confinements: Vec<Option<ConfineRegion>>,
}

/// In-memory interception backend.
///
/// Tests drive it through a [`MockInterceptionHandle`]: feeding raw events,
/// moving the cursor, and observing installs and confinement.
pub struct MockInterception {
    state: Arc<Mutex<MockInterceptionState>>,
}

impl Default for MockInterception {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInterception {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockInterceptionState::default())),
        }
    }

    /// Get a clonable handle for driving and observing the backend.
    pub fn handle(&self) -> MockInterceptionHandle {
        MockInterceptionHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl InterceptionBackend for MockInterception {
    fn install(&self, class: HookClass, sink: Arc<dyn RawEventSink>) -> Result<(), InputError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_on == Some(class) {
            return Err(InputError::Other(anyhow::anyhow!(
                "simulated {class} hook failure"
            )));
        }
        state.sinks.insert(class, sink);
        Ok(())
    }

    fn remove(&self, class: HookClass) {
        self.state.lock().unwrap().sinks.remove(&class);
    }

    fn cursor_position(&self) -> Point {
        self.state.lock().unwrap().cursor
    }

    fn confine_cursor(&self, region: Option<ConfineRegion>) {
        let mut state = self.state.lock().unwrap();
        if let Some(region) = region {
            state.cursor = region.clamp(state.cursor);
        }
        state.confinements.push(region);
    }
}

/// Clonable driver/observer handle for `MockInterception`.
#[derive(Clone)]
pub struct MockInterceptionHandle {
    state: Arc<Mutex<MockInterceptionState>>,
}

impl MockInterceptionHandle {
    /// Deliver a raw event as the OS would. Unhooked classes pass through.
    pub fn feed(&self, event: RawEvent) -> Disposition {
        let sink = self.state.lock().unwrap().sinks.get(&event.class()).cloned();
        match sink {
            Some(sink) => sink.dispatch(event),
            None => Disposition::PassThrough,
        }
    }

    /// Make the next install of `class` fail, or clear with `None`.
    pub fn fail_install(&self, class: Option<HookClass>) {
        self.state.lock().unwrap().fail_on = class;
    }

    pub fn set_cursor(&self, point: Point) {
        self.state.lock().unwrap().cursor = point;
    }

    pub fn cursor(&self) -> Point {
        self.state.lock().unwrap().cursor
    }

    pub fn is_installed(&self, class: HookClass) -> bool {
        self.state.lock().unwrap().sinks.contains_key(&class)
    }

    pub fn installed_classes(&self) -> Vec<HookClass> {
        self.state.lock().unwrap().sinks.keys().copied().collect()
    }

    /// Every `confine_cursor` call, in order.
    pub fn confinements(&self) -> Vec<Option<ConfineRegion>> {
        self.state.lock().unwrap().confinements.clone()
    }

    /// The region set by the most recent `confine_cursor` call.
    pub fn current_confinement(&self) -> Option<ConfineRegion> {
        self.state
            .lock()
            .unwrap()
            .confinements
            .last()
            .copied()
            .flatten()
    }
}

// ---------------------------------------------------------------------------
// MockSynthesis
// ---------------------------------------------------------------------------

/// One recorded injection call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesizedCall {
    MoveBy { dx: i16, dy: i16 },
    Button { button: MouseButtonId, down: bool },
    Scroll { delta: i16 },
    Key { vk_code: u8, down: bool },
}

#[derive(Debug, Default)]
struct MockSynthesisState {
    calls: Vec<SynthesizedCall>,
    fail: bool,
    shutdown: bool,
}

/// Mock synthesis backend that records every call.
pub struct MockSynthesis {
    state: Arc<Mutex<MockSynthesisState>>,
}

impl Default for MockSynthesis {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSynthesis {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockSynthesisState::default())),
        }
    }

    /// Get a clonable handle for observing the synthesis state from tests.
    pub fn handle(&self) -> MockSynthesisHandle {
        MockSynthesisHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn record(&self, call: SynthesizedCall) -> Result<(), InputError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.fail {
            return Err(InputError::Inject("simulated injection failure".to_string()));
        }
        Ok(())
    }
}

/// Clonable observer handle for `MockSynthesis`.
#[derive(Clone)]
pub struct MockSynthesisHandle {
    state: Arc<Mutex<MockSynthesisState>>,
}

impl MockSynthesisHandle {
    /// Snapshot of all calls made so far.
    pub fn calls(&self) -> Vec<SynthesizedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Make every subsequent call record itself and then fail.
    pub fn set_failing(&self, fail: bool) {
        self.state.lock().unwrap().fail = fail;
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().unwrap().shutdown
    }
}

#[async_trait]
impl InputSynthesis for MockSynthesis {
    async fn move_by(&mut self, dx: i16, dy: i16) -> Result<(), InputError> {
        self.record(SynthesizedCall::MoveBy { dx, dy })
    }

    async fn button(&mut self, button: MouseButtonId, down: bool) -> Result<(), InputError> {
        self.record(SynthesizedCall::Button { button, down })
    }

    async fn scroll(&mut self, delta: i16) -> Result<(), InputError> {
        self.record(SynthesizedCall::Scroll { delta })
    }

    async fn key(&mut self, vk_code: u8, down: bool) -> Result<(), InputError> {
        self.record(SynthesizedCall::Key { vk_code, down })
    }

    async fn shutdown(&mut self) -> Result<(), InputError> {
        self.state.lock().unwrap().shutdown = true;
        Ok(())
    }
}
