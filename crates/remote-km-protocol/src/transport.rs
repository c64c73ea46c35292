//! UDP transport: fire-and-forget sender and single-slot receiver.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use remote_km_types::WireMessage;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::error::ProtocolError;
use crate::wire;

/// Default UDP port used by both sides.
pub const DEFAULT_PORT: u16 = 9876;

/// Largest possible UDP payload; the receive buffer never truncates.
const RECV_BUFFER_SIZE: usize = 65_536;

/// Sends one datagram per message to a single configurable target.
///
/// Sends never queue and never wait: each is a single non-blocking
/// `send_to`. With no target configured, sends are silently skipped.
pub struct UdpSender {
    socket: UdpSocket,
    target: RwLock<Option<SocketAddr>>,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl UdpSender {
    /// Bind an ephemeral sending socket on all interfaces.
    pub async fn bind_ephemeral() -> Result<Self, ProtocolError> {
        Self::bind(SocketAddr::from(([0, 0, 0, 0], 0))).await
    }

    /// Bind a sending socket on a specific local address.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ProtocolError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ProtocolError::Bind { addr, source })?;
        debug!(addr = %addr, "UDP sender bound");
        Ok(Self {
            socket,
            target: RwLock::new(None),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    /// Local address of the sending socket.
    pub fn local_addr(&self) -> Result<SocketAddr, ProtocolError> {
        self.socket.local_addr().map_err(ProtocolError::Send)
    }

    /// Set the destination for subsequent sends.
    pub fn set_target(&self, addr: SocketAddr) {
        *self
            .target
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(addr);
        info!(target = %addr, "send target set");
    }

    /// Parse `host` as an IP address and set it with `port` as the destination.
    pub fn set_target_host(&self, host: &str, port: u16) -> Result<SocketAddr, ProtocolError> {
        let addr = parse_target(host, port)?;
        self.set_target(addr);
        Ok(addr)
    }

    /// Remove the destination; sends become no-ops.
    pub fn clear_target(&self) {
        *self
            .target
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
        debug!("send target cleared");
    }

    /// The currently configured destination, if any.
    pub fn target(&self) -> Option<SocketAddr> {
        *self
            .target
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Encode and send one message.
    pub fn send(&self, msg: &WireMessage) -> Result<(), ProtocolError> {
        let frame = wire::encode(msg);
        trace!(kind = msg.kind(), "sending message");
        self.send_bytes(&frame)
    }

    /// Send one raw datagram to the current target.
    pub fn send_bytes(&self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let Some(target) = self.target() else {
            return Ok(());
        };

        match self.socket.try_send_to(bytes, target) {
            Ok(_) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // Socket buffer full: the datagram is simply lost.
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(target = %target, "send buffer full, datagram dropped");
                Ok(())
            }
            Err(e) => Err(ProtocolError::Send(e)),
        }
    }

    /// Number of datagrams handed to the OS.
    pub fn datagrams_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Number of datagrams dropped because the socket buffer was full.
    pub fn datagrams_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Parse an IP address string and port into a target address.
pub fn parse_target(host: &str, port: u16) -> Result<SocketAddr, ProtocolError> {
    let ip: IpAddr = host
        .trim()
        .parse()
        .map_err(|_| ProtocolError::InvalidAddress(host.to_string()))?;
    Ok(SocketAddr::new(ip, port))
}

/// Something the receive loop observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverEvent {
    /// A datagram arrived from a different sender than the previous one.
    PeerChanged(SocketAddr),
    /// A well-formed message arrived.
    Message(WireMessage),
}

/// Receives datagrams on a fixed port from any sender.
///
/// Only the most recent sender is tracked, and only to report changes.
pub struct UdpReceiver {
    socket: UdpSocket,
    last_peer: Option<SocketAddr>,
    malformed: u64,
}

impl UdpReceiver {
    /// Bind the receiving socket.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ProtocolError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ProtocolError::Bind { addr, source })?;
        info!(addr = %addr, "UDP receiver bound");
        Ok(Self {
            socket,
            last_peer: None,
            malformed: 0,
        })
    }

    /// Get the local address this receiver is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ProtocolError> {
        self.socket.local_addr().map_err(ProtocolError::Receive)
    }

    /// The most recently observed sender.
    pub fn last_peer(&self) -> Option<SocketAddr> {
        self.last_peer
    }

    /// Record the sender of a datagram. Returns `true` if it differs from the
    /// previous one.
    fn observe_peer(&mut self, from: SocketAddr) -> bool {
        if self.last_peer == Some(from) {
            return false;
        }
        self.last_peer = Some(from);
        true
    }

    /// Run the receive loop until `shutdown` fires, the socket fails, or the
    /// event consumer goes away. All three are a normal exit.
    ///
    /// Malformed datagrams are dropped and the loop continues.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
        tx: mpsc::Sender<ReceiverEvent>,
    ) {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        let local = self.socket.local_addr().ok();
        debug!(addr = ?local, "receive loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let (len, from) = tokio::select! {
                _ = shutdown.changed() => {
                    break;
                }
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok(received) => received,
                        Err(e) => {
                            info!(error = %e, "receive socket closed");
                            break;
                        }
                    }
                }
            };

            if self.observe_peer(from) {
                info!(peer = %from, "receiving from new peer");
                if tx.send(ReceiverEvent::PeerChanged(from)).await.is_err() {
                    break;
                }
            }

            match wire::decode(&buf[..len]) {
                Ok(msg) => {
                    trace!(peer = %from, kind = msg.kind(), "received message");
                    if tx.send(ReceiverEvent::Message(msg)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    self.malformed += 1;
                    trace!(peer = %from, len, error = %e, "dropping malformed datagram");
                }
            }
        }

        if self.malformed > 0 {
            warn!(count = self.malformed, "malformed datagrams dropped");
        }
        info!("receive loop stopped");
    }
}
