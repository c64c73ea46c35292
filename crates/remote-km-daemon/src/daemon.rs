//! Core daemon orchestration.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use remote_km_input::{InputError, InputSynthesis, InterceptionBackend};
use remote_km_protocol::{UdpReceiver, UdpSender};
use remote_km_types::VK_SCROLL;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::{Config, Mode};
use crate::error::DaemonError;
use crate::session::{ControllerSession, ReceiverSession};

/// Events processed by the daemon's main loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonEvent {
    /// Flip capture on the controller side. Ignored in receiver mode.
    ToggleCapture,
    /// Point the sender at a new receiver IP.
    SetTarget(String),
    /// Tear down the current mode and start `Mode`.
    SetMode(Mode),
    /// The input hook entered or left capturing.
    CapturingChanged(bool),
    /// The receiver saw datagrams from a new sender.
    PeerChanged(SocketAddr),
    /// Shutdown signal.
    Shutdown,
}

/// Snapshot of the daemon's state, published after every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonStatus {
    /// Active mode, or `None` while stopped or after a failed start.
    pub mode: Option<Mode>,
    pub capturing: bool,
    pub target: Option<SocketAddr>,
    pub peer: Option<SocketAddr>,
    pub listen_port: Option<u16>,
    pub toggle_key: u8,
    /// Why the last mode start failed.
    pub error: Option<String>,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            mode: None,
            capturing: false,
            target: None,
            peer: None,
            listen_port: None,
            toggle_key: VK_SCROLL,
            error: None,
        }
    }
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(error) = &self.error {
            return write!(f, "Error - {error}");
        }
        match self.mode {
            Some(Mode::Controller) if self.capturing => match self.target {
                Some(target) => write!(f, "ACTIVE - Sending to {}", target.ip()),
                None => write!(f, "ACTIVE - No target"),
            },
            Some(Mode::Controller) if self.toggle_key == VK_SCROLL => {
                write!(f, "Ready - Press Scroll Lock to control")
            }
            Some(Mode::Controller) => {
                write!(f, "Ready - Press key 0x{:02X} to control", self.toggle_key)
            }
            Some(Mode::Receiver) => match (self.peer, self.listen_port) {
                (Some(peer), _) => write!(f, "Receiving from {}", peer.ip()),
                (None, Some(port)) => write!(f, "Listening on port {port}"),
                (None, None) => write!(f, "Listening"),
            },
            None => write!(f, "Stopped"),
        }
    }
}

/// Produces a synthesis backend when receiver mode first starts.
pub type SynthesisFactory =
    Box<dyn FnMut() -> Result<Box<dyn InputSynthesis>, InputError> + Send>;

/// Platform input backends handed to the daemon.
pub struct Backends {
    pub interception: Arc<dyn InterceptionBackend>,
    pub synthesis: SynthesisFactory,
}

impl Backends {
    pub fn new(
        interception: Arc<dyn InterceptionBackend>,
        synthesis: impl FnMut() -> Result<Box<dyn InputSynthesis>, InputError> + Send + 'static,
    ) -> Self {
        Self {
            interception,
            synthesis: Box::new(synthesis),
        }
    }

    /// Use one pre-built synthesis backend. The daemon keeps it across mode
    /// switches.
    pub fn with_synthesis(
        interception: Arc<dyn InterceptionBackend>,
        synthesis: Box<dyn InputSynthesis>,
    ) -> Self {
        let mut slot = Some(synthesis);
        Self::new(interception, move || slot.take().ok_or(InputError::Unavailable))
    }
}

/// The remote-km daemon.
pub struct Daemon {
    config: Config,
    backends: Backends,
    sender: Option<Arc<UdpSender>>,
    controller: Option<ControllerSession>,
    receiver: Option<ReceiverSession>,
    /// Synthesis backend kept while no receiver session is running.
    synthesis: Option<Box<dyn InputSynthesis>>,
    event_tx: mpsc::Sender<DaemonEvent>,
    event_rx: mpsc::Receiver<DaemonEvent>,
    status_tx: watch::Sender<DaemonStatus>,
}

impl Daemon {
    /// Create a new daemon instance.
    pub fn new(config: Config, backends: Backends) -> Self {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let (status_tx, _) = watch::channel(DaemonStatus {
            toggle_key: config.input.toggle_key,
            ..DaemonStatus::default()
        });

        Self {
            config,
            backends,
            sender: None,
            controller: None,
            receiver: None,
            synthesis: None,
            event_tx,
            event_rx,
            status_tx,
        }
    }

    /// Get a clone of the event sender for feeding events into the daemon.
    pub fn event_sender(&self) -> mpsc::Sender<DaemonEvent> {
        self.event_tx.clone()
    }

    /// Subscribe to status updates.
    pub fn status_receiver(&self) -> watch::Receiver<DaemonStatus> {
        self.status_tx.subscribe()
    }

    /// Run the daemon event loop until [`DaemonEvent::Shutdown`].
    ///
    /// Fails if the sender socket cannot be bound or the configured mode
    /// cannot start. Controller mode also fails on a target that is not an IP
    /// address; receiver mode never looks at the target.
    pub async fn run(&mut self) -> Result<(), DaemonError> {
        self.sender = Some(Arc::new(UdpSender::bind_ephemeral().await?));

        let mode = self.config.daemon.mode;
        self.start_mode(mode).await?;
        info!(%mode, "daemon running");

        while let Some(event) = self.event_rx.recv().await {
            debug!(?event, "daemon event");
            match event {
                DaemonEvent::ToggleCapture => self.toggle_capture(),
                DaemonEvent::SetTarget(host) => self.set_target(&host),
                DaemonEvent::SetMode(mode) => self.switch_mode(mode).await,
                DaemonEvent::CapturingChanged(_) => {
                    // Trust the hook over a possibly stale notification.
                    let capturing = self
                        .controller
                        .as_ref()
                        .is_some_and(ControllerSession::is_capturing);
                    self.status_tx.send_if_modified(|s| {
                        let changed = s.capturing != capturing;
                        s.capturing = capturing;
                        changed
                    });
                }
                DaemonEvent::PeerChanged(peer) => {
                    if self.receiver.is_some() {
                        info!(%peer, "receiving from new peer");
                        self.status_tx.send_modify(|s| s.peer = Some(peer));
                    }
                }
                DaemonEvent::Shutdown => {
                    info!("shutting down");
                    break;
                }
            }
        }

        self.shutdown().await
    }

    fn toggle_capture(&self) {
        match &self.controller {
            Some(session) => session.toggle(),
            None => debug!("toggle ignored outside controller mode"),
        }
    }

    fn set_target(&self, host: &str) {
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.set_target_host(host, self.config.daemon.port) {
            Ok(target) => {
                info!(%target, "target changed");
                self.status_tx.send_modify(|s| s.target = Some(target));
            }
            Err(e) => warn!(host, error = %e, "ignoring invalid target"),
        }
    }

    async fn switch_mode(&mut self, mode: Mode) {
        info!(%mode, "switching mode");
        self.stop_mode().await;
        if let Err(e) = self.start_mode(mode).await {
            warn!(%mode, error = %e, "failed to start mode");
            self.status_tx.send_modify(|s| s.error = Some(e.to_string()));
        }
    }

    async fn start_mode(&mut self, mode: Mode) -> Result<(), DaemonError> {
        let listen_port = match mode {
            Mode::Controller => {
                let sender = self
                    .sender
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("sender socket not bound"))?;
                self.apply_configured_target(&sender)?;
                self.controller = Some(ControllerSession::start(
                    Arc::clone(&self.backends.interception),
                    self.config.input.toggle_key,
                    sender,
                    self.event_tx.clone(),
                )?);
                None
            }
            Mode::Receiver => {
                let addr = self.config.bind_addr()?;
                let receiver = UdpReceiver::bind(addr).await?;
                let synthesis = match self.synthesis.take() {
                    Some(synthesis) => synthesis,
                    None => (self.backends.synthesis)()?,
                };
                let session = ReceiverSession::start(receiver, synthesis, self.event_tx.clone());
                let port = session.local_addr().map(|a| a.port());
                self.receiver = Some(session);
                port
            }
        };

        self.status_tx.send_modify(|s| {
            s.mode = Some(mode);
            s.capturing = false;
            s.peer = None;
            s.listen_port = listen_port;
            s.error = None;
        });
        Ok(())
    }

    /// Point `sender` at the configured target unless one is already set.
    ///
    /// An unset target leaves the controller running with nothing to send to.
    fn apply_configured_target(&self, sender: &UdpSender) -> Result<(), DaemonError> {
        if sender.target().is_some() {
            return Ok(());
        }
        let Some(host) = self.config.controller.target_host() else {
            info!("no target configured, captured input will be dropped");
            return Ok(());
        };
        let target = sender.set_target_host(host, self.config.daemon.port)?;
        self.status_tx.send_modify(|s| s.target = Some(target));
        Ok(())
    }

    async fn stop_mode(&mut self) {
        if let Some(mut session) = self.controller.take() {
            session.stop().await;
        }
        if let Some(mut session) = self.receiver.take() {
            if let Some(synthesis) = session.stop().await {
                self.synthesis = Some(synthesis);
            }
        }
        self.status_tx.send_modify(|s| {
            s.mode = None;
            s.capturing = false;
            s.peer = None;
            s.listen_port = None;
            s.error = None;
        });
    }

    async fn shutdown(&mut self) -> Result<(), DaemonError> {
        info!("daemon shutting down");
        self.stop_mode().await;
        if let Some(mut synthesis) = self.synthesis.take() {
            synthesis.shutdown().await?;
        }
        if let Some(sender) = self.sender.take() {
            sender.clear_target();
        }
        info!("daemon shut down complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(mode: Option<Mode>) -> DaemonStatus {
        DaemonStatus {
            mode,
            target: Some("192.168.1.100:9876".parse().unwrap()),
            ..DaemonStatus::default()
        }
    }

    #[test]
    fn controller_status_strings() {
        let mut s = status(Some(Mode::Controller));
        assert_eq!(s.to_string(), "Ready - Press Scroll Lock to control");
        s.capturing = true;
        assert_eq!(s.to_string(), "ACTIVE - Sending to 192.168.1.100");
        s.capturing = false;
        s.toggle_key = 0x7B;
        assert_eq!(s.to_string(), "Ready - Press key 0x7B to control");
    }

    #[test]
    fn receiver_status_strings() {
        let mut s = status(Some(Mode::Receiver));
        s.listen_port = Some(9876);
        assert_eq!(s.to_string(), "Listening on port 9876");
        s.peer = Some("10.0.0.5:50000".parse().unwrap());
        assert_eq!(s.to_string(), "Receiving from 10.0.0.5");
    }

    #[test]
    fn stopped_and_error_strings() {
        let mut s = status(None);
        assert_eq!(s.to_string(), "Stopped");
        s.error = Some("hook failed".to_string());
        assert_eq!(s.to_string(), "Error - hook failed");
    }
}
