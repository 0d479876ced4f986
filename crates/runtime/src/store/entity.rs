//! Per-kind store of entity components.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use component_core::{
    ActionId, ComponentInstance, ComponentKey, ComponentMetadata, Diagnostics, EventName,
    RunLocation, TargetId, TargetKind, TargetRef, try_instantiate,
};
use tracing::{debug, error, trace};

use super::UpdateRegistry;

struct TrackedTarget {
    target: TargetRef,
    /// Sorted by component order.
    instances: Vec<ComponentInstance>,
}

/// Live components of every known target of one [`TargetKind`].
pub struct EntityStore {
    kind: TargetKind,
    runtime: RunLocation,
    components: Vec<Arc<ComponentMetadata>>,
    known: HashSet<ComponentKey>,
    targets: BTreeMap<TargetId, TrackedTarget>,
}

fn insert_sorted(instances: &mut Vec<ComponentInstance>, instance: ComponentInstance) {
    let at = instances.partition_point(|existing| existing.order_cmp(&instance) != Ordering::Greater);
    instances.insert(at, instance);
}

fn note_removed(instance: &ComponentInstance, failed: &[ActionId]) {
    if !failed.is_empty() {
        debug!(
            target: "component::store",
            component = %instance.name(),
            removed = failed.len(),
            remaining = instance.actions().len(),
            "Dropped failed handlers"
        );
    }
}

fn register_updates(instance: &ComponentInstance, updates: &mut UpdateRegistry) {
    for action in instance.update_actions() {
        updates.register(action);
    }
}

impl EntityStore {
    pub fn new(kind: TargetKind, runtime: RunLocation) -> Self {
        Self {
            kind,
            runtime,
            components: Vec::new(),
            known: HashSet::new(),
            targets: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// Tracks a component type and instantiates it on every known target.
    pub fn add_component(
        &mut self,
        metadata: &Arc<ComponentMetadata>,
        updates: &mut UpdateRegistry,
        diagnostics: &Diagnostics,
    ) {
        if !metadata.runs_on().runs_on(self.runtime) {
            trace!(
                target: "component::store",
                component = %metadata.name(),
                kind = %self.kind,
                "Component does not run here"
            );
            return;
        }
        if !self.known.insert(metadata.key()) {
            debug!(
                target: "component::store",
                component = %metadata.key(),
                kind = %self.kind,
                "Component already tracked"
            );
            return;
        }

        self.components.push(Arc::clone(metadata));
        for tracked in self.targets.values_mut() {
            if let Some(instance) =
                try_instantiate(metadata, self.runtime, Some(&tracked.target), diagnostics)
            {
                register_updates(&instance, updates);
                insert_sorted(&mut tracked.instances, instance);
            }
        }
    }

    /// Starts tracking `target` and instantiates every applicable component.
    ///
    /// A target that is already tracked is never instantiated twice; kinds
    /// that expect re-announcements get their re-announce event instead.
    pub fn add_target(
        &mut self,
        target: &TargetRef,
        updates: &mut UpdateRegistry,
        diagnostics: &Diagnostics,
    ) {
        let id = target.id();
        if self.targets.contains_key(&id) {
            match self.kind.reannounce_event() {
                Some(event) => {
                    self.raise_event(&event, id, diagnostics);
                }
                None => error!(
                    target: "component::store",
                    target_id = %id,
                    name = %target.display_name(),
                    kind = %self.kind,
                    "Target added twice"
                ),
            }
            return;
        }

        let mut instances = Vec::new();
        for metadata in &self.components {
            if let Some(instance) = try_instantiate(metadata, self.runtime, Some(target), diagnostics) {
                register_updates(&instance, updates);
                insert_sorted(&mut instances, instance);
            }
        }
        trace!(
            target: "component::store",
            target_id = %id,
            kind = %self.kind,
            components = instances.len(),
            "Tracking target"
        );
        self.targets.insert(
            id,
            TrackedTarget {
                target: Arc::clone(target),
                instances,
            },
        );
    }

    /// Closes every component of `id` and stops tracking it.
    pub fn remove_target(
        &mut self,
        id: TargetId,
        updates: &mut UpdateRegistry,
        diagnostics: &Diagnostics,
    ) -> Option<TargetRef> {
        let Some(mut tracked) = self.targets.remove(&id) else {
            error!(
                target: "component::store",
                target_id = %id,
                kind = %self.kind,
                "Removing a target that is not tracked"
            );
            return None;
        };

        for instance in &mut tracked.instances {
            let failed = instance.raise_event(&EventName::ENTITY_CLOSE, diagnostics);
            note_removed(instance, &failed);
            for action in instance.update_actions() {
                updates.unregister(action.id());
            }
        }
        Some(tracked.target)
    }

    /// Invokes `event` on every component of `id`, in component order.
    ///
    /// Returns false if the target is not tracked.
    pub fn raise_event(&mut self, event: &EventName, id: TargetId, diagnostics: &Diagnostics) -> bool {
        let Some(tracked) = self.targets.get_mut(&id) else {
            debug!(
                target: "component::store",
                target_id = %id,
                event = %event,
                "Event raised on an untracked target"
            );
            return false;
        };

        for instance in &mut tracked.instances {
            let failed = instance.raise_event(event, diagnostics);
            note_removed(instance, &failed);
        }
        true
    }

    pub fn contains(&self, id: TargetId) -> bool {
        self.targets.contains_key(&id)
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Component names instantiated on `id`, in dispatch order.
    pub fn instances(&self, id: TargetId) -> Vec<&str> {
        self.targets
            .get(&id)
            .map(|tracked| tracked.instances.iter().map(ComponentInstance::name).collect())
            .unwrap_or_default()
    }

    /// Drops every instance without raising events.
    pub fn clear(&mut self) {
        self.targets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use component_core::{ComponentDeclarations, ComponentDescriptor, SourceHandle, Target};

    #[derive(Debug)]
    struct Block(u64);

    impl Target for Block {
        fn id(&self) -> TargetId {
            TargetId(self.0)
        }

        fn kind(&self) -> TargetKind {
            TargetKind::Block
        }
    }

    thread_local! {
        static LOG: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    }

    fn record(entry: &str) {
        LOG.with(|log| log.borrow_mut().push(entry.to_owned()));
    }

    fn take_log() -> Vec<String> {
        LOG.with(|log| std::mem::take(&mut *log.borrow_mut()))
    }

    fn component(name: &'static str, order: i32) -> Arc<ComponentMetadata> {
        let mut decl = ComponentDeclarations::new(SourceHandle::new("tests"));
        decl.declare(
            ComponentDescriptor::<()>::entity(name, TargetKind::Block)
                .order(order)
                .constructor(|_| Ok(()))
                .on("Ping", move |_| {
                    record(name);
                    Ok(())
                })
                .on(EventName::BLOCK_GRID_CHANGE, move |_| {
                    record(&format!("{name}:regrid"));
                    Ok(())
                })
                .on(EventName::ENTITY_CLOSE, move |_| {
                    record(&format!("{name}:close"));
                    Ok(())
                })
                .on_update(1, |_| Ok(())),
        )
        .unwrap();
        Arc::clone(&decl.into_collection().entity(TargetKind::Block)[0])
    }

    #[test]
    fn test_instances_follow_component_order() {
        let diagnostics = Diagnostics::default();
        let mut updates = UpdateRegistry::new();
        let mut store = EntityStore::new(TargetKind::Block, RunLocation::BOTH);
        let block: TargetRef = Arc::new(Block(1));

        store.add_target(&block, &mut updates, &diagnostics);
        store.add_component(&component("second", 2), &mut updates, &diagnostics);
        store.add_component(&component("first", 1), &mut updates, &diagnostics);

        assert_eq!(store.instances(TargetId(1)), vec!["first", "second"]);
        assert!(store.raise_event(&EventName::new("Ping"), TargetId(1), &diagnostics));
        assert_eq!(take_log(), vec!["first", "second"]);
    }

    #[test]
    fn test_duplicate_add_reannounces_blocks() {
        let diagnostics = Diagnostics::default();
        let mut updates = UpdateRegistry::new();
        let mut store = EntityStore::new(TargetKind::Block, RunLocation::BOTH);
        store.add_component(&component("radar", 0), &mut updates, &diagnostics);

        let block: TargetRef = Arc::new(Block(4));
        store.add_target(&block, &mut updates, &diagnostics);
        store.add_target(&block, &mut updates, &diagnostics);

        assert_eq!(store.instances(TargetId(4)), vec!["radar"]);
        assert_eq!(updates.len(), 1);
        assert_eq!(take_log(), vec!["radar:regrid"]);
    }

    #[test]
    fn test_remove_closes_and_unregisters() {
        let diagnostics = Diagnostics::default();
        let mut updates = UpdateRegistry::new();
        let mut store = EntityStore::new(TargetKind::Block, RunLocation::BOTH);
        store.add_component(&component("radar", 0), &mut updates, &diagnostics);
        store.add_target(&(Arc::new(Block(9)) as TargetRef), &mut updates, &diagnostics);
        assert_eq!(updates.len(), 1);

        assert!(store.remove_target(TargetId(9), &mut updates, &diagnostics).is_some());
        assert_eq!(take_log(), vec!["radar:close"]);
        assert!(updates.is_empty());

        assert!(store.remove_target(TargetId(9), &mut updates, &diagnostics).is_none());
        assert_eq!(store.target_count(), 0);
    }

    #[test]
    fn test_remove_unknown_target_leaves_others_alone() {
        let diagnostics = Diagnostics::default();
        let mut updates = UpdateRegistry::new();
        let mut store = EntityStore::new(TargetKind::Block, RunLocation::BOTH);
        store.add_component(&component("radar", 0), &mut updates, &diagnostics);
        store.add_component(&component("drill", 1), &mut updates, &diagnostics);
        for id in [5, 6] {
            store.add_target(&(Arc::new(Block(id)) as TargetRef), &mut updates, &diagnostics);
        }
        let registered = updates.len();

        assert!(store.remove_target(TargetId(42), &mut updates, &diagnostics).is_none());
        assert_eq!(store.target_count(), 2);
        assert_eq!(store.instances(TargetId(5)), vec!["radar", "drill"]);
        assert_eq!(store.instances(TargetId(6)), vec!["radar", "drill"]);
        assert_eq!(updates.len(), registered);
        assert!(take_log().is_empty());
    }

    #[test]
    fn test_run_location_and_dedupe() {
        let diagnostics = Diagnostics::default();
        let mut updates = UpdateRegistry::new();
        let mut store = EntityStore::new(TargetKind::Block, RunLocation::CLIENT);

        let mut decl = ComponentDeclarations::new(SourceHandle::new("tests"));
        decl.declare(
            ComponentDescriptor::<()>::entity("server_only", TargetKind::Block)
                .runs_on(RunLocation::SERVER)
                .constructor(|_| Ok(())),
        )
        .unwrap();
        let server_only = Arc::clone(&decl.into_collection().entity(TargetKind::Block)[0]);

        store.add_component(&server_only, &mut updates, &diagnostics);
        let radar = component("radar", 0);
        store.add_component(&radar, &mut updates, &diagnostics);
        store.add_component(&radar, &mut updates, &diagnostics);
        assert_eq!(store.component_count(), 1);
    }
}
