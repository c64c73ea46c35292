//! Per-mode sessions: capture-and-send, or receive-and-replay.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use remote_km_input::{synthesize, HookGuard, InputHook, InputSynthesis, InterceptionBackend};
use remote_km_protocol::{ReceiverEvent, UdpReceiver, UdpSender};
use remote_km_types::{CaptureEvent, WireMessage};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::daemon::DaemonEvent;
use crate::error::DaemonError;

/// How long `stop` waits for a session task before aborting it.
const STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Capacity of the capture and receive channels.
const CHANNEL_CAPACITY: usize = 1024;

/// Wait for `task` to finish, aborting it if it takes longer than
/// [`STOP_TIMEOUT`].
async fn join_or_abort<T>(task: &mut JoinHandle<T>, what: &str) -> Option<T> {
    match tokio::time::timeout(STOP_TIMEOUT, &mut *task).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!(task = what, error = %e, "session task failed");
            None
        }
        Err(_) => {
            warn!(task = what, "session task did not stop in time, aborting");
            task.abort();
            None
        }
    }
}

/// Controller mode: the input hook plus the task that ships its events.
pub struct ControllerSession {
    hook: Arc<InputHook>,
    guard: Option<HookGuard>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ControllerSession {
    /// Install the hook and start forwarding captured input to `sender`.
    ///
    /// A hook that cannot be installed fails the whole session.
    pub fn start(
        backend: Arc<dyn InterceptionBackend>,
        toggle_key: u8,
        sender: Arc<UdpSender>,
        events: mpsc::Sender<DaemonEvent>,
    ) -> Result<Self, DaemonError> {
        let (capture_tx, capture_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let hook = Arc::new(InputHook::new(backend, capture_tx).with_toggle_key(toggle_key));
        let guard = hook.install()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(forward_captured(capture_rx, sender, events, shutdown_rx));

        info!(toggle_key, "controller session started");
        Ok(Self {
            hook,
            guard: Some(guard),
            shutdown_tx,
            task: Some(task),
        })
    }

    pub fn hook(&self) -> &Arc<InputHook> {
        &self.hook
    }

    pub fn toggle(&self) {
        self.hook.toggle();
    }

    pub fn set_capturing(&self, capturing: bool) {
        self.hook.set_capturing(capturing);
    }

    pub fn is_capturing(&self) -> bool {
        self.hook.is_capturing()
    }

    /// Stop forwarding, then uninstall the hook and release the cursor.
    ///
    /// Idempotent. The hook is uninstalled even if the forwarder hangs.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(mut task) = self.task.take() {
            join_or_abort(&mut task, "capture forwarder").await;
        }
        match self.guard.take() {
            Some(guard) => drop(guard),
            None => self.hook.uninstall(),
        }
        debug!("controller session stopped");
    }
}

impl Drop for ControllerSession {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn forward_captured(
    mut rx: mpsc::Receiver<CaptureEvent>,
    sender: Arc<UdpSender>,
    events: mpsc::Sender<DaemonEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                if let CaptureEvent::CapturingChanged(capturing) = event {
                    if events.try_send(DaemonEvent::CapturingChanged(capturing)).is_err() {
                        warn!(capturing, "daemon event channel unavailable");
                    }
                    continue;
                }
                if let Some(msg) = WireMessage::from_capture(event) {
                    if let Err(e) = sender.send(&msg) {
                        warn!(kind = msg.kind(), error = %e, "failed to send input");
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    trace!(
        sent = sender.datagrams_sent(),
        dropped = sender.datagrams_dropped(),
        "capture forwarder stopped"
    );
}

/// Receiver mode: the receive loop plus the task that replays its messages.
pub struct ReceiverSession {
    local_addr: Option<SocketAddr>,
    shutdown_tx: watch::Sender<bool>,
    receive_task: Option<JoinHandle<()>>,
    apply_task: Option<JoinHandle<Box<dyn InputSynthesis>>>,
}

impl ReceiverSession {
    /// Start receiving on `receiver` and replaying through `synthesis`.
    pub fn start(
        receiver: UdpReceiver,
        synthesis: Box<dyn InputSynthesis>,
        events: mpsc::Sender<DaemonEvent>,
    ) -> Self {
        let local_addr = receiver.local_addr().ok();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let receive_task = tokio::spawn(receiver.run(shutdown_rx, tx));
        let apply_task = tokio::spawn(apply_received(rx, synthesis, events));

        info!(addr = ?local_addr, "receiver session started");
        Self {
            local_addr,
            shutdown_tx,
            receive_task: Some(receive_task),
            apply_task: Some(apply_task),
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Stop the receive loop and hand back the synthesis backend.
    ///
    /// Idempotent; returns `None` after the first call or if the replay task
    /// had to be aborted.
    pub async fn stop(&mut self) -> Option<Box<dyn InputSynthesis>> {
        let _ = self.shutdown_tx.send(true);
        if let Some(mut task) = self.receive_task.take() {
            join_or_abort(&mut task, "receive loop").await;
        }
        let mut task = self.apply_task.take()?;
        let synthesis = join_or_abort(&mut task, "synthesis").await;
        debug!("receiver session stopped");
        synthesis
    }
}

impl Drop for ReceiverSession {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.receive_task.take() {
            task.abort();
        }
        if let Some(task) = self.apply_task.take() {
            task.abort();
        }
    }
}

async fn apply_received(
    mut rx: mpsc::Receiver<ReceiverEvent>,
    mut synthesis: Box<dyn InputSynthesis>,
    events: mpsc::Sender<DaemonEvent>,
) -> Box<dyn InputSynthesis> {
    while let Some(event) = rx.recv().await {
        match event {
            ReceiverEvent::PeerChanged(peer) => {
                if events.try_send(DaemonEvent::PeerChanged(peer)).is_err() {
                    warn!(%peer, "daemon event channel unavailable");
                }
            }
            ReceiverEvent::Message(msg) => {
                if let Err(e) = synthesize(synthesis.as_mut(), msg).await {
                    warn!(kind = msg.kind(), error = %e, "failed to inject input");
                }
            }
        }
    }
    synthesis
}
