//! Process-wide catalog of component sources.
//!
//! Sources are discovered once, when added, and their metadata is cached for
//! the lifetime of the process. Sessions ask the registrar for the groups
//! marked to load on initialization; sources can also request further groups
//! at runtime through a [`SessionHandle`](crate::SessionHandle).

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use component_core::{ComponentSource, MetadataCollection, SourceHandle, discover};
use tracing::{debug, info, warn};

use crate::api::RegistrarError;

static SHARED: OnceLock<Arc<ComponentRegistrar>> = OnceLock::new();

#[derive(Default)]
struct Catalog {
    /// Discovered collections by source name.
    collections: HashMap<String, MetadataCollection>,
    /// Source names in the order they were added.
    sources: Vec<SourceHandle>,
    /// (source name, group) in the order they were first marked.
    init_groups: Vec<(String, i32)>,
}

/// Thread-safe registry mapping sources to their discovered metadata.
#[derive(Default)]
pub struct ComponentRegistrar {
    catalog: RwLock<Catalog>,
}

impl ComponentRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registrar.
    pub fn shared() -> Arc<Self> {
        Arc::clone(SHARED.get_or_init(|| Arc::new(Self::new())))
    }

    fn read(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.catalog.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Discovers `source` and caches its metadata.
    ///
    /// Adding a source name twice fails and keeps the first registration.
    pub fn add_source(&self, source: &dyn ComponentSource) -> Result<SourceHandle, RegistrarError> {
        let handle = source.handle();
        if self.contains(&handle) {
            return Err(RegistrarError::DuplicateSource {
                source_name: handle.name().to_owned(),
            });
        }

        // Discovery runs user code; keep it outside the lock.
        let collection = discover(source)?;

        let mut catalog = self.write();
        if catalog.collections.contains_key(handle.name()) {
            return Err(RegistrarError::DuplicateSource {
                source_name: handle.name().to_owned(),
            });
        }
        info!(
            target: "component::registrar",
            source = %handle,
            components = collection.len(),
            "Registered component source"
        );
        catalog
            .collections
            .insert(handle.name().to_owned(), collection);
        catalog.sources.push(handle.clone());
        Ok(handle)
    }

    /// Marks `group` of `source` to be loaded when a session initializes.
    ///
    /// A source has at most one init group; marking again replaces the group
    /// but keeps the source's original position.
    pub fn mark_load_on_init(&self, source: &SourceHandle, group: i32) {
        let mut catalog = self.write();
        match catalog
            .init_groups
            .iter_mut()
            .find(|(name, _)| name == source.name())
        {
            Some(entry) => {
                debug!(
                    target: "component::registrar",
                    source = %source,
                    previous = entry.1,
                    group,
                    "Replacing init group"
                );
                entry.1 = group;
            }
            None => catalog.init_groups.push((source.name().to_owned(), group)),
        }
    }

    /// Components of `source` belonging to `group`.
    pub fn get_group(
        &self,
        source: &SourceHandle,
        group: i32,
    ) -> Result<MetadataCollection, RegistrarError> {
        self.read()
            .collections
            .get(source.name())
            .map(|collection| collection.select_group(group))
            .ok_or_else(|| RegistrarError::SourceNotFound {
                source_name: source.name().to_owned(),
            })
    }

    /// Every init group, in the order the groups were marked.
    pub fn init_groups(&self) -> Vec<MetadataCollection> {
        let catalog = self.read();
        catalog
            .init_groups
            .iter()
            .filter_map(|(name, group)| match catalog.collections.get(name) {
                Some(collection) => Some(collection.select_group(*group)),
                None => {
                    warn!(
                        target: "component::registrar",
                        source = %name,
                        group,
                        "Init group marked for a source that was never added"
                    );
                    None
                }
            })
            .collect()
    }

    pub fn contains(&self, source: &SourceHandle) -> bool {
        self.read().collections.contains_key(source.name())
    }

    /// Registered sources, in registration order.
    pub fn sources(&self) -> Vec<SourceHandle> {
        self.read().sources.clone()
    }

    /// Full collection of `source`, every group included.
    pub fn collection(&self, source: &SourceHandle) -> Option<MetadataCollection> {
        self.read().collections.get(source.name()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use component_core::{ComponentDeclarations, ComponentDescriptor, DiscoveryError};

    struct Groups(&'static str);

    impl ComponentSource for Groups {
        fn handle(&self) -> SourceHandle {
            SourceHandle::new(self.0)
        }

        fn register(&self, decl: &mut ComponentDeclarations) -> Result<(), DiscoveryError> {
            decl.declare(ComponentDescriptor::<()>::stateless("early").group(0))?;
            decl.declare(ComponentDescriptor::<()>::stateless("late").group(1))
        }
    }

    #[test]
    fn test_empty_before_any_source() {
        let registrar = ComponentRegistrar::new();
        assert!(registrar.init_groups().is_empty());
        assert!(registrar.sources().is_empty());
    }

    #[test]
    fn test_duplicate_source_keeps_first() {
        let registrar = ComponentRegistrar::new();
        let handle = registrar.add_source(&Groups("mod")).unwrap();

        let err = registrar.add_source(&Groups("mod")).unwrap_err();
        assert_eq!(
            err,
            RegistrarError::DuplicateSource {
                source_name: "mod".into()
            }
        );
        assert_eq!(registrar.sources(), vec![handle]);
    }

    #[test]
    fn test_get_group_requires_registration() {
        let registrar = ComponentRegistrar::new();
        let err = registrar
            .get_group(&SourceHandle::new("ghost"), 0)
            .unwrap_err();
        assert!(matches!(err, RegistrarError::SourceNotFound { .. }));
    }

    #[test]
    fn test_init_groups_in_registration_order() {
        let registrar = ComponentRegistrar::new();
        let a = registrar.add_source(&Groups("a")).unwrap();
        let b = registrar.add_source(&Groups("b")).unwrap();

        registrar.mark_load_on_init(&b, 1);
        registrar.mark_load_on_init(&a, 0);
        registrar.mark_load_on_init(&SourceHandle::new("never_added"), 0);
        // Replaces b's group without moving it.
        registrar.mark_load_on_init(&b, 0);

        let groups = registrar.init_groups();
        let sources: Vec<&str> = groups.iter().map(|c| c.source().name()).collect();
        assert_eq!(sources, vec!["b", "a"]);
        assert_eq!(groups[0].session()[0].name(), "early");
        assert_eq!(groups[0].len(), 1);
    }

    #[test]
    fn test_shared_is_a_singleton() {
        assert!(Arc::ptr_eq(
            &ComponentRegistrar::shared(),
            &ComponentRegistrar::shared()
        ));
    }
}
