//! Containers for live component instances.
//!
//! - [`SessionStore`]: singleton components of a session
//! - [`EntityStore`]: per-target components of one entity kind
//! - [`CollectionStore`]: one of each, sharing an [`UpdateRegistry`]
//!
//! Stores are owned by the driving thread; every mutation takes `&mut self`.

mod collection;
mod entity;
mod session;
mod update;

pub use collection::{CollectionStore, ExternalUpdate};
pub use entity::EntityStore;
pub use session::SessionStore;
pub use update::{UpdatePass, UpdateRegistry};
