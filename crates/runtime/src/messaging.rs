//! Routing of inbound network messages to registered handlers.
//!
//! The transport is external: hosts hand decoded [`Envelope`]s to the session,
//! which routes them by `(domain, kind)`. Handlers follow the same contract as
//! component handlers: a handler that fails is logged and detached.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use component_core::{ActionId, Diagnostics, HandlerError, HandlerResult, SourceHandle};
use tracing::{error, trace, warn};

/// Routing key of a message: a domain owned by one source, and a kind within it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageKey {
    pub domain: u16,
    pub kind: u16,
}

impl MessageKey {
    pub const fn new(domain: u16, kind: u16) -> Self {
        Self { domain, kind }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.domain, self.kind)
    }
}

/// One inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub key: MessageKey,
    /// Transport-level id of the sending peer.
    pub sender: u64,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new(key: MessageKey, sender: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            key,
            sender,
            payload: payload.into(),
        }
    }
}

type MessageHandler = Box<dyn Fn(&Envelope) -> HandlerResult>;

struct Route {
    id: ActionId,
    source: SourceHandle,
    label: String,
    handler: MessageHandler,
}

impl Route {
    fn try_invoke(&self, envelope: &Envelope, diagnostics: &Diagnostics) -> bool {
        let outcome = catch_unwind(AssertUnwindSafe(|| (self.handler)(envelope)))
            .unwrap_or_else(|payload| Err(HandlerError::from_panic(payload.as_ref())));

        match outcome {
            Ok(()) => true,
            Err(err) => {
                error!(
                    target: "component::messaging",
                    handler = %self.label,
                    source = %self.source,
                    key = %envelope.key,
                    sender = envelope.sender,
                    error = %err,
                    "Message handler failed, detaching it"
                );
                diagnostics.notify_error(
                    &self.source,
                    &format!("Error running {} for message {}.", self.label, envelope.key),
                );
                false
            }
        }
    }
}

/// Message handlers by routing key.
#[derive(Default)]
pub struct MessageRouter {
    routes: BTreeMap<MessageKey, Vec<Route>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes messages with `key` to `handler`.
    pub fn register(
        &mut self,
        key: MessageKey,
        source: SourceHandle,
        label: impl Into<String>,
        handler: impl Fn(&Envelope) -> HandlerResult + 'static,
    ) -> ActionId {
        let id = ActionId::next();
        let label = label.into();
        trace!(
            target: "component::messaging",
            %key,
            handler = %label,
            "Registering message handler"
        );
        self.routes.entry(key).or_default().push(Route {
            id,
            source,
            label,
            handler: Box::new(handler),
        });
        id
    }

    /// Returns whether a handler with `id` was registered.
    pub fn unregister(&mut self, id: ActionId) -> bool {
        let mut removed = false;
        for routes in self.routes.values_mut() {
            let before = routes.len();
            routes.retain(|route| route.id != id);
            removed |= routes.len() != before;
        }
        self.routes.retain(|_, routes| !routes.is_empty());
        removed
    }

    /// Delivers `envelope` to every handler of its key.
    ///
    /// Returns the number of handlers invoked; failed handlers are detached.
    pub fn dispatch(&mut self, envelope: &Envelope, diagnostics: &Diagnostics) -> usize {
        let Some(routes) = self.routes.get_mut(&envelope.key) else {
            warn!(
                target: "component::messaging",
                key = %envelope.key,
                sender = envelope.sender,
                "Received message without a handler"
            );
            return 0;
        };

        let invoked = routes.len();
        routes.retain(|route| route.try_invoke(envelope, diagnostics));
        if routes.is_empty() {
            self.routes.remove(&envelope.key);
        }
        invoked
    }

    pub fn handler_count(&self, key: MessageKey) -> usize {
        self.routes.get(&key).map_or(0, Vec::len)
    }

    /// Detaches every handler.
    pub fn clear(&mut self) {
        self.routes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    const CHAT: MessageKey = MessageKey::new(7, 1);

    #[test]
    fn test_routes_by_key() {
        let mut router = MessageRouter::new();
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&received);
        router.register(CHAT, SourceHandle::new("chat"), "chat.receive", move |envelope| {
            sink.borrow_mut().push((envelope.sender, envelope.payload.clone()));
            Ok(())
        });

        let diagnostics = Diagnostics::default();
        assert_eq!(router.dispatch(&Envelope::new(CHAT, 42, b"hi".to_vec()), &diagnostics), 1);
        assert_eq!(
            router.dispatch(&Envelope::new(MessageKey::new(7, 2), 42, Vec::new()), &diagnostics),
            0
        );
        assert_eq!(*received.borrow(), vec![(42, b"hi".to_vec())]);
    }

    #[test]
    fn test_failing_handler_detached() {
        let mut router = MessageRouter::new();
        router.register(CHAT, SourceHandle::new("chat"), "chat.strict", |envelope| {
            if envelope.payload.is_empty() {
                return Err("empty payload".into());
            }
            Ok(())
        });
        let keep = router.register(CHAT, SourceHandle::new("chat"), "chat.log", |_| Ok(()));

        let diagnostics = Diagnostics::default();
        assert_eq!(router.dispatch(&Envelope::new(CHAT, 1, Vec::new()), &diagnostics), 2);
        assert_eq!(router.handler_count(CHAT), 1);

        assert!(router.unregister(keep));
        assert_eq!(router.handler_count(CHAT), 0);
    }
}
