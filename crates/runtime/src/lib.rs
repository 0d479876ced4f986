//! Runtime for declaratively registered components.
//!
//! This crate turns the metadata described by `component-core` into live,
//! dispatching components. Hosts embed a [`ComponentSession`], drive it once
//! per tick, and forward lifecycle notifications to it; other threads talk to
//! it through a [`SessionHandle`].
//!
//! Modules are organized by responsibility:
//! - [`registrar`] caches discovered metadata per source, process-wide
//! - [`store`] holds live instances and routes events and updates to them
//! - [`session`] sequences initialization, per-tick dispatch and teardown
//! - [`messaging`] routes inbound network messages to registered handlers
//! - [`api`] exposes errors, the host boundary and the session handle
pub mod api;
pub mod messaging;
pub mod registrar;
pub mod session;
pub mod store;

pub use api::{Host, HostReadiness, RegistrarError, Result, SessionError, SessionHandle};
pub use messaging::{Envelope, MessageKey, MessageRouter};
pub use registrar::ComponentRegistrar;
pub use session::{ComponentSession, SessionConfig, SessionStatus};
pub use store::{
    CollectionStore, EntityStore, ExternalUpdate, SessionStore, UpdatePass, UpdateRegistry,
};
