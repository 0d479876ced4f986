//! Public runtime API surface.
//!
//! Types that hosts and component sources interact with directly: errors,
//! the host boundary, and the thread-safe session handle.

pub mod errors;
pub mod handle;
pub mod host;

pub use errors::{RegistrarError, Result, SessionError};
pub use handle::SessionHandle;
pub use host::{Host, HostReadiness};
