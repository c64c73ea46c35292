//! Shared type conversion errors.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("unknown mouse button id: {0}")]
    UnknownMouseButton(u8),
}
