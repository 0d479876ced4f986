//! Cloneable, thread-safe façade for requesting work from a session.
//!
//! [`SessionHandle`] never touches the component store. Every request becomes
//! a task on the session's deferred queue and runs on the driving thread at
//! the start of the next initialized tick, before updates are dispatched.
use std::fmt;
use std::sync::Arc;

use component_core::{ActionId, EventName, HandlerResult, SourceHandle, TargetRef};
use tracing::trace;

use super::errors::{Result, SessionError};
use crate::messaging::Envelope;
use crate::registrar::ComponentRegistrar;
use crate::session::deferred::{DeferredQueue, Task, TaskContext};
use crate::store::ExternalUpdate;

/// Handle to enqueue requests for a [`ComponentSession`](crate::ComponentSession).
#[derive(Clone)]
pub struct SessionHandle {
    queue: Arc<DeferredQueue>,
    registrar: Arc<ComponentRegistrar>,
}

impl SessionHandle {
    pub(crate) fn new(queue: Arc<DeferredQueue>, registrar: Arc<ComponentRegistrar>) -> Self {
        Self { queue, registrar }
    }

    fn enqueue(&self, what: &'static str, task: Task) -> Result<()> {
        self.queue.push(what, task)?;
        trace!(target: "component::deferred", what, "Enqueued deferred request");
        Ok(())
    }

    /// Registers an update handler that belongs to no component.
    ///
    /// The returned id can be passed to
    /// [`unregister_update_handler`](Self::unregister_update_handler).
    pub fn register_update_handler(
        &self,
        update: ExternalUpdate,
        handler: impl Fn() -> HandlerResult + Send + 'static,
    ) -> Result<ActionId> {
        if update.frequency == 0 {
            return Err(SessionError::ZeroFrequency);
        }
        let id = ActionId::next();
        self.enqueue(
            "register_update_handler",
            Box::new(move |ctx: TaskContext<'_>| {
                ctx.store.add_update_handler(id, update, handler);
            }),
        )?;
        Ok(id)
    }

    pub fn unregister_update_handler(&self, id: ActionId) -> Result<()> {
        self.enqueue(
            "unregister_update_handler",
            Box::new(move |ctx: TaskContext<'_>| {
                ctx.store.remove_update_handler(id);
            }),
        )
    }

    /// Loads `group` of an already registered source into the session.
    ///
    /// The group is looked up immediately, so an unknown source fails here
    /// rather than on the driving thread.
    pub fn register_component_group(&self, source: &SourceHandle, group: i32) -> Result<()> {
        let collection = self.registrar.get_group(source, group)?;
        self.enqueue(
            "register_component_group",
            Box::new(move |ctx: TaskContext<'_>| {
                ctx.store.try_add_collection(&collection);
            }),
        )
    }

    pub fn raise_session_event(&self, event: impl Into<EventName>) -> Result<()> {
        let event = event.into();
        self.enqueue(
            "raise_session_event",
            Box::new(move |ctx: TaskContext<'_>| {
                ctx.store.raise_session_event(&event);
            }),
        )
    }

    pub fn raise_entity_event(&self, event: impl Into<EventName>, target: TargetRef) -> Result<()> {
        let event = event.into();
        self.enqueue(
            "raise_entity_event",
            Box::new(move |ctx: TaskContext<'_>| {
                ctx.store.raise_entity_event(&event, &target);
            }),
        )
    }

    /// Routes an inbound message on the driving thread.
    pub fn deliver_message(&self, envelope: Envelope) -> Result<()> {
        self.enqueue(
            "deliver_message",
            Box::new(move |ctx: TaskContext<'_>| {
                ctx.router.dispatch(&envelope, ctx.store.diagnostics());
            }),
        )
    }

    /// Requests waiting for the next tick.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_open(&self) -> bool {
        self.queue.is_open()
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
