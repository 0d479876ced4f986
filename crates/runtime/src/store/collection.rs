//! Composite store owning every component of one session.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use component_core::{
    ActionId, Diagnostics, EventAction, EventName, HandlerError, HandlerResult, MetadataCollection,
    RunLocation, SourceHandle, TargetId, TargetKind, TargetRef,
};
use strum::IntoEnumIterator;
use tracing::{debug, error, info, warn};

use super::{EntityStore, SessionStore, UpdateRegistry};

/// Update handler registered from outside any component.
pub struct ExternalUpdate {
    pub frequency: u32,
    pub source: SourceHandle,
    pub label: String,
    /// Unregisters the handler automatically when this target is removed.
    /// The target must be tracked by the time the registration runs.
    pub owner: Option<TargetId>,
}

/// Session store, one entity store per kind, and the shared update registry.
pub struct CollectionStore {
    runtime: RunLocation,
    diagnostics: Diagnostics,
    session: SessionStore,
    entities: BTreeMap<TargetKind, EntityStore>,
    updates: UpdateRegistry,
    owned: BTreeMap<TargetId, Vec<ActionId>>,
}

impl CollectionStore {
    pub fn new(runtime: RunLocation, diagnostics: Diagnostics) -> Self {
        Self {
            runtime,
            diagnostics,
            session: SessionStore::new(runtime),
            entities: TargetKind::iter()
                .map(|kind| (kind, EntityStore::new(kind, runtime)))
                .collect(),
            updates: UpdateRegistry::new(),
            owned: BTreeMap::new(),
        }
    }

    pub fn run_location(&self) -> RunLocation {
        self.runtime
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Adds session components first, then each entity kind.
    pub fn add_collection(&mut self, collection: &MetadataCollection) {
        for metadata in collection.session() {
            self.session
                .add_component(metadata, &mut self.updates, &self.diagnostics);
        }
        for (kind, store) in self.entities.iter_mut() {
            for metadata in collection.entity(*kind) {
                store.add_component(metadata, &mut self.updates, &self.diagnostics);
            }
        }
        debug!(
            target: "component::store",
            source = %collection.source(),
            components = collection.len(),
            "Added component collection"
        );
    }

    /// [`add_collection`](Self::add_collection), logging instead of unwinding.
    ///
    /// Returns false if adding the collection panicked.
    pub fn try_add_collection(&mut self, collection: &MetadataCollection) -> bool {
        match catch_unwind(AssertUnwindSafe(|| self.add_collection(collection))) {
            Ok(()) => true,
            Err(payload) => {
                let err = HandlerError::from_panic(payload.as_ref());
                error!(
                    target: "component::store",
                    source = %collection.source(),
                    error = %err,
                    "Failed to add component collection"
                );
                self.diagnostics.notify_error(
                    collection.source(),
                    &format!("Error adding components of {}.", collection.source()),
                );
                false
            }
        }
    }

    pub fn add_target_any(&mut self, target: &TargetRef) {
        if let Some(store) = self.entities.get_mut(&target.kind()) {
            store.add_target(target, &mut self.updates, &self.diagnostics);
        }
    }

    /// Removes `target` from its store and drops handlers it owned.
    pub fn remove_target_any(&mut self, target: &TargetRef) {
        let id = target.id();
        if let Some(store) = self.entities.get_mut(&target.kind()) {
            store.remove_target(id, &mut self.updates, &self.diagnostics);
        }
        if let Some(owned) = self.owned.remove(&id) {
            for action in owned {
                self.updates.unregister(action);
            }
        }
    }

    pub fn tracks(&self, target: &TargetRef) -> bool {
        self.entities
            .get(&target.kind())
            .is_some_and(|store| store.contains(target.id()))
    }

    /// Returns false if the target is not tracked.
    pub fn raise_entity_event(&mut self, event: &EventName, target: &TargetRef) -> bool {
        self.entities
            .get_mut(&target.kind())
            .is_some_and(|store| store.raise_event(event, target.id(), &self.diagnostics))
    }

    /// Returns the number of handlers invoked.
    pub fn raise_session_event(&mut self, event: &EventName) -> usize {
        self.session.raise_event(event, &self.diagnostics)
    }

    /// Advances one frame and runs the due update buckets.
    pub fn tick(&mut self) -> usize {
        let pass = self.updates.tick(&self.diagnostics);
        if !pass.failed.is_empty() {
            self.forget_owned(&pass.failed);
        }
        pass.invoked
    }

    fn forget_owned(&mut self, ids: &[ActionId]) {
        for owned in self.owned.values_mut() {
            owned.retain(|action| !ids.contains(action));
        }
        self.owned.retain(|_, owned| !owned.is_empty());
    }

    fn tracks_id(&self, id: TargetId) -> bool {
        self.entities.values().any(|store| store.contains(id))
    }

    pub fn frame(&self) -> u64 {
        self.updates.frame()
    }

    /// Registers an update handler that belongs to no component.
    ///
    /// Returns false, registering nothing, if the owner target is not tracked.
    pub fn add_update_handler(
        &mut self,
        id: ActionId,
        update: ExternalUpdate,
        handler: impl Fn() -> HandlerResult + 'static,
    ) -> bool {
        if let Some(owner) = update.owner
            && !self.tracks_id(owner)
        {
            warn!(
                target: "component::store",
                action = %id,
                handler = %update.label,
                owner = %owner,
                "Owner of update handler is not tracked, dropping it"
            );
            return false;
        }
        let action = Rc::new(
            EventAction::new(
                EventName::UPDATE,
                update.frequency,
                0,
                update.label,
                update.source,
                handler,
            )
            .with_id(id),
        );
        self.updates.register(&action);
        if let Some(owner) = update.owner {
            self.owned.entry(owner).or_default().push(id);
        }
        true
    }

    /// Returns whether a handler with `id` was registered.
    pub fn remove_update_handler(&mut self, id: ActionId) -> bool {
        self.forget_owned(&[id]);
        self.updates.unregister(id)
    }

    pub fn updates(&self) -> &UpdateRegistry {
        &self.updates
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn entity(&self, kind: TargetKind) -> Option<&EntityStore> {
        self.entities.get(&kind)
    }

    /// Raises [`EventName::SESSION_CLOSE`] and drops every instance.
    pub fn close(&mut self) {
        self.session.close(&self.diagnostics);
        for store in self.entities.values_mut() {
            store.clear();
        }
        self.updates.clear();
        self.owned.clear();
        info!(
            target: "component::store",
            frames = self.updates.frame(),
            "Component store closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use component_core::Target;

    #[derive(Debug)]
    struct Grid(u64);

    impl Target for Grid {
        fn id(&self) -> TargetId {
            TargetId(self.0)
        }

        fn kind(&self) -> TargetKind {
            TargetKind::Grid
        }
    }

    fn store() -> CollectionStore {
        CollectionStore::new(RunLocation::BOTH, Diagnostics::default())
    }

    fn owned_by(owner: Option<TargetId>) -> ExternalUpdate {
        ExternalUpdate {
            frequency: 1,
            source: SourceHandle::new("tests"),
            label: "tests.watch".into(),
            owner,
        }
    }

    #[test]
    fn test_failed_owned_handler_forgotten() {
        let mut store = store();
        let grid: TargetRef = Arc::new(Grid(4));
        store.add_target_any(&grid);

        let failing = ActionId::next();
        let healthy = ActionId::next();
        assert!(store.add_update_handler(failing, owned_by(Some(grid.id())), || Err("gone".into())));
        assert!(store.add_update_handler(healthy, owned_by(Some(grid.id())), || Ok(())));
        assert_eq!(store.owned[&grid.id()], vec![failing, healthy]);

        assert_eq!(store.tick(), 2);
        assert_eq!(store.owned[&grid.id()], vec![healthy]);
        assert_eq!(store.updates().len(), 1);

        store.remove_target_any(&grid);
        assert!(store.owned.is_empty());
        assert!(store.updates().is_empty());
    }

    #[test]
    fn test_untracked_owner_rejected() {
        let mut store = store();
        let id = ActionId::next();
        assert!(!store.add_update_handler(id, owned_by(Some(TargetId(77))), || Ok(())));
        assert!(store.owned.is_empty());
        assert!(store.updates().is_empty());

        // Unowned handlers need no tracked target.
        assert!(store.add_update_handler(ActionId::next(), owned_by(None), || Ok(())));
        assert_eq!(store.updates().len(), 1);
        assert!(store.owned.is_empty());
    }
}
