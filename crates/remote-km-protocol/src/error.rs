//! Protocol and transport errors.

use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),

    #[error("receive failed: {0}")]
    Receive(#[source] std::io::Error),

    #[error(transparent)]
    Malformed(#[from] Malformed),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why a datagram could not be decoded.
///
/// Malformed datagrams are dropped by the receiver; this is never sent back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Malformed {
    #[error("empty datagram")]
    Empty,

    #[error("unknown message tag: 0x{0:02X}")]
    UnknownTag(u8),

    #[error("truncated message 0x{tag:02X}: need {needed} bytes, got {available}")]
    Truncated {
        tag: u8,
        needed: usize,
        available: usize,
    },

    #[error("unknown mouse button id: {0}")]
    UnknownButton(u8),
}
