//! Daemon errors.

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("protocol error: {0}")]
    Protocol(#[from] remote_km_protocol::ProtocolError),

    #[error("input error: {0}")]
    Input(#[from] remote_km_input::InputError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
