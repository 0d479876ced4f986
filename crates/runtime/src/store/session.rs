//! Store of session components.

use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use component_core::{
    ActionRef, ComponentInstance, ComponentKey, ComponentMetadata, Diagnostics, EventName,
    RunLocation, try_instantiate,
};
use tracing::{debug, trace};

use super::UpdateRegistry;

/// Singleton components of one session and their event handlers.
pub struct SessionStore {
    runtime: RunLocation,
    known: HashSet<ComponentKey>,
    instances: Vec<ComponentInstance>,
    /// Event name, then binding order, then registration order.
    handlers: BTreeMap<EventName, BTreeMap<i32, Vec<ActionRef>>>,
}

impl SessionStore {
    pub fn new(runtime: RunLocation) -> Self {
        Self {
            runtime,
            known: HashSet::new(),
            instances: Vec::new(),
            handlers: BTreeMap::new(),
        }
    }

    /// Instantiates a session component and wires up its handlers.
    ///
    /// Stateless components run their [`EventName::STATELESS_INIT`] handlers
    /// right away instead of registering them.
    pub fn add_component(
        &mut self,
        metadata: &Arc<ComponentMetadata>,
        updates: &mut UpdateRegistry,
        diagnostics: &Diagnostics,
    ) {
        if !self.known.insert(metadata.key()) {
            debug!(
                target: "component::store",
                component = %metadata.key(),
                "Session component already tracked"
            );
            return;
        }

        let Some(instance) = try_instantiate(metadata, self.runtime, None, diagnostics) else {
            return;
        };

        for action in instance.actions() {
            if action.is_update() {
                updates.register(action);
            } else if metadata.is_stateless() && *action.event() == EventName::STATELESS_INIT {
                action.try_invoke(diagnostics);
            } else {
                self.handlers
                    .entry(action.event().clone())
                    .or_default()
                    .entry(action.order())
                    .or_default()
                    .push(Rc::clone(action));
            }
        }

        trace!(
            target: "component::store",
            component = %metadata.name(),
            source = %metadata.source(),
            "Session component added"
        );
        self.instances.push(instance);
    }

    /// Invokes every handler of `event`, ordered by binding order.
    ///
    /// Returns the number of handlers invoked.
    pub fn raise_event(&mut self, event: &EventName, diagnostics: &Diagnostics) -> usize {
        let Some(by_order) = self.handlers.get_mut(event) else {
            return 0;
        };

        let mut invoked = 0;
        for handlers in by_order.values_mut() {
            invoked += handlers.len();
            handlers.retain(|action| action.try_invoke(diagnostics));
        }
        by_order.retain(|_, handlers| !handlers.is_empty());
        invoked
    }

    pub fn handler_count(&self, event: &EventName) -> usize {
        self.handlers
            .get(event)
            .map_or(0, |by_order| by_order.values().map(Vec::len).sum())
    }

    /// Component names in registration order.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.instances.iter().map(ComponentInstance::name)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Raises [`EventName::SESSION_CLOSE`] and drops every instance.
    pub fn close(&mut self, diagnostics: &Diagnostics) {
        self.raise_event(&EventName::SESSION_CLOSE, diagnostics);
        self.handlers.clear();
        self.instances.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    use component_core::{
        BindingSpec, ComponentDeclarations, ComponentDescriptor, HandlerResult, SourceHandle,
    };

    thread_local! {
        static CALLS: Cell<u32> = const { Cell::new(0) };
    }

    fn bump() {
        CALLS.with(|calls| calls.set(calls.get() + 1));
    }

    fn calls() -> u32 {
        CALLS.with(Cell::get)
    }

    thread_local! {
        static ORDER: RefCell<Vec<&'static str>> = const { RefCell::new(Vec::new()) };
    }

    fn push(name: &'static str) -> impl Fn(&mut ()) -> HandlerResult + Send + Sync + 'static {
        move |_| {
            ORDER.with(|order| order.borrow_mut().push(name));
            Ok(())
        }
    }

    #[test]
    fn test_stateless_init_fires_immediately() {
        let mut decl = ComponentDeclarations::new(SourceHandle::new("tests"));
        decl.declare(
            ComponentDescriptor::<()>::stateless("boot")
                .on(EventName::STATELESS_INIT, |_| {
                    bump();
                    Ok(())
                })
                .on(EventName::SESSION_CLOSE, |_| Ok(())),
        )
        .unwrap();
        let collection = decl.into_collection();

        let diagnostics = Diagnostics::default();
        let mut updates = UpdateRegistry::new();
        let mut store = SessionStore::new(RunLocation::BOTH);
        store.add_component(&collection.session()[0], &mut updates, &diagnostics);
        store.add_component(&collection.session()[0], &mut updates, &diagnostics);

        assert_eq!(calls(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.handler_count(&EventName::STATELESS_INIT), 0);
        assert_eq!(store.handler_count(&EventName::SESSION_CLOSE), 1);
    }

    #[test]
    fn test_events_ordered_across_components() {
        let mut decl = ComponentDeclarations::new(SourceHandle::new("tests"));
        decl.declare(
            ComponentDescriptor::<()>::session("a")
                .with_new(|| Ok(()))
                .bind(BindingSpec::event("Save").order(5), push("a5")),
        )
        .unwrap();
        decl.declare(
            ComponentDescriptor::<()>::session("b")
                .with_new(|| Ok(()))
                .bind(BindingSpec::event("Save").order(-1), push("b-1"))
                .bind(BindingSpec::event("Save").order(5), push("b5")),
        )
        .unwrap();
        let collection = decl.into_collection();

        let diagnostics = Diagnostics::default();
        let mut updates = UpdateRegistry::new();
        let mut store = SessionStore::new(RunLocation::BOTH);
        for metadata in collection.session() {
            store.add_component(metadata, &mut updates, &diagnostics);
        }

        assert_eq!(store.raise_event(&EventName::new("Save"), &diagnostics), 3);
        ORDER.with(|order| assert_eq!(*order.borrow(), vec!["b-1", "a5", "b5"]));
    }

    #[test]
    fn test_failed_handlers_are_removed() {
        let mut decl = ComponentDeclarations::new(SourceHandle::new("tests"));
        decl.declare(
            ComponentDescriptor::<()>::session("flaky")
                .with_new(|| Ok(()))
                .on("Save", |_| Err("disk full".into()))
                .on("Save", |_| Ok(())),
        )
        .unwrap();
        let collection = decl.into_collection();

        let diagnostics = Diagnostics::default();
        let mut updates = UpdateRegistry::new();
        let mut store = SessionStore::new(RunLocation::BOTH);
        store.add_component(&collection.session()[0], &mut updates, &diagnostics);

        let save = EventName::new("Save");
        assert_eq!(store.raise_event(&save, &diagnostics), 2);
        assert_eq!(store.raise_event(&save, &diagnostics), 1);
        assert_eq!(store.raise_event(&EventName::new("Unknown"), &diagnostics), 0);
    }
}
