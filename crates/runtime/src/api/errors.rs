//! Error types surfaced by the runtime API.
//!
//! Registration errors are returned to the caller. Errors raised while a
//! session ticks never reach callers; the session logs them and terminates.
use component_core::DiscoveryError;
use thiserror::Error;

use crate::session::SessionStatus;

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrarError {
    #[error("source `{source_name}` is already registered")]
    DuplicateSource { source_name: String },

    #[error("source `{source_name}` has not been registered")]
    SourceNotFound { source_name: String },

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("deferred queue is closed")]
    QueueClosed,

    #[error("update handlers need a frequency of at least one tick")]
    ZeroFrequency,

    #[error("session is {status} but has no component store")]
    StoreMissing { status: SessionStatus },

    #[error(transparent)]
    Registrar(#[from] RegistrarError),

    /// Carries the panic message, e.g. `panicked: index out of bounds`.
    #[error("session tick {0}")]
    Panicked(String),
}
