//! Session controller and daemon for remote-km.
//!
//! The daemon owns at most one active mode at a time: a controller session
//! that captures local input and sends it, or a receiver session that listens
//! for datagrams and replays them. Callers drive it through [`DaemonEvent`]s
//! and observe it through a [`DaemonStatus`] watch channel.

pub mod config;
pub mod daemon;
pub mod error;
pub mod session;

pub use config::{Config, Mode};
pub use daemon::{Backends, Daemon, DaemonEvent, DaemonStatus};
pub use error::DaemonError;
