//! Invocable handler actions.
//!
//! An [`EventAction`] is one event binding resolved against one live
//! component instance. Actions are what stores keep in their dispatch tables.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::error;

use crate::diagnostics::Diagnostics;
use crate::error::{HandlerError, HandlerResult};
use crate::event::EventName;
use crate::source::SourceHandle;

static NEXT_ACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an action, used to unregister it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(u64);

impl ActionId {
    pub fn next() -> Self {
        Self(NEXT_ACTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action-{}", self.0)
    }
}

type Invoke = Box<dyn Fn() -> HandlerResult>;

/// A handler bound to its instance, ready to be invoked.
pub struct EventAction {
    id: ActionId,
    event: EventName,
    frequency: u32,
    order: i32,
    label: String,
    source: SourceHandle,
    invoke: Invoke,
}

/// Shared handle to an action; held by instances and dispatch tables at once.
pub type ActionRef = Rc<EventAction>;

impl EventAction {
    pub fn new(
        event: EventName,
        frequency: u32,
        order: i32,
        label: impl Into<String>,
        source: SourceHandle,
        invoke: impl Fn() -> HandlerResult + 'static,
    ) -> Self {
        Self {
            id: ActionId::next(),
            event,
            frequency,
            order,
            label: label.into(),
            source,
            invoke: Box::new(invoke),
        }
    }

    /// Replaces the generated id with one reserved earlier via [`ActionId::next`].
    #[must_use]
    pub fn with_id(mut self, id: ActionId) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn event(&self) -> &EventName {
        &self.event
    }

    /// Update cadence in ticks; 0 for plain event handlers.
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn is_update(&self) -> bool {
        self.frequency > 0
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    /// `component.method` label used in logs and profiles.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self) -> &SourceHandle {
        &self.source
    }

    /// Runs the handler, absorbing errors and panics.
    ///
    /// Returns `false` if the handler failed; callers drop failed actions from
    /// their dispatch tables.
    pub fn try_invoke(&self, diagnostics: &Diagnostics) -> bool {
        let started = self.source.is_profiled().then(Instant::now);

        let outcome = match catch_unwind(AssertUnwindSafe(|| (self.invoke)())) {
            Ok(result) => result,
            Err(payload) => Err(HandlerError::from_panic(payload.as_ref())),
        };

        if let Some(started) = started {
            diagnostics
                .profiler()
                .record(&self.source, &self.label, started.elapsed());
        }

        match outcome {
            Ok(()) => true,
            Err(err) => {
                error!(
                    target: "component::dispatch",
                    action = %self.id,
                    handler = %self.label,
                    event = %self.event,
                    source = %self.source,
                    error = %err,
                    "Handler failed, removing it from dispatch"
                );
                diagnostics.notify_error(
                    &self.source,
                    &format!("Error running {} for {}.", self.label, self.event),
                );
                false
            }
        }
    }
}

impl fmt::Debug for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventAction")
            .field("id", &self.id)
            .field("event", &self.event)
            .field("frequency", &self.frequency)
            .field("order", &self.order)
            .field("label", &self.label)
            .field("source", &self.source.name())
            .finish_non_exhaustive()
    }
}
