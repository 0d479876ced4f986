//! Discovered metadata of one source, partitioned by scope.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use strum::IntoEnumIterator;
use tracing::debug;

use crate::descriptor::ComponentDeclarations;
use crate::error::{DiscoveryError, HandlerError};
use crate::metadata::{ComponentKey, ComponentMetadata, sort_components};
use crate::source::{ComponentSource, SourceHandle};
use crate::target::{TargetKind, TargetScope};

/// Every component of one source, one sorted list per scope.
#[derive(Clone, Debug)]
pub struct MetadataCollection {
    source: SourceHandle,
    entities: BTreeMap<TargetKind, Vec<Arc<ComponentMetadata>>>,
    session: Vec<Arc<ComponentMetadata>>,
}

impl MetadataCollection {
    /// An empty collection for `source`.
    pub fn empty(source: SourceHandle) -> Self {
        Self {
            source,
            entities: TargetKind::iter().map(|kind| (kind, Vec::new())).collect(),
            session: Vec::new(),
        }
    }

    pub(crate) fn from_components(source: SourceHandle, components: Vec<ComponentMetadata>) -> Self {
        let mut collection = Self::empty(source);
        for metadata in components {
            let metadata = Arc::new(metadata);
            match metadata.scope() {
                TargetScope::Session => collection.session.push(metadata),
                TargetScope::Entity(kind) => collection.entities.entry(kind).or_default().push(metadata),
            }
        }

        sort_components(&mut collection.session);
        for list in collection.entities.values_mut() {
            sort_components(list);
        }
        collection
    }

    pub fn source(&self) -> &SourceHandle {
        &self.source
    }

    /// Entity components of `kind`, in load order.
    pub fn entity(&self, kind: TargetKind) -> &[Arc<ComponentMetadata>] {
        self.entities.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    /// Session components, in load order.
    pub fn session(&self) -> &[Arc<ComponentMetadata>] {
        &self.session
    }

    pub fn len(&self) -> usize {
        self.session.len() + self.entities.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Session components first, then each entity kind.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ComponentMetadata>> {
        self.session.iter().chain(self.entities.values().flatten())
    }

    pub fn keys(&self) -> Vec<ComponentKey> {
        self.iter().map(|metadata| metadata.key()).collect()
    }

    /// Distinct group ids present in the collection.
    pub fn groups(&self) -> BTreeSet<i32> {
        self.iter().map(|metadata| metadata.group()).collect()
    }

    /// A copy holding only components of `group`, order preserved.
    pub fn select_group(&self, group: i32) -> MetadataCollection {
        let filter = |list: &Vec<Arc<ComponentMetadata>>| {
            list.iter()
                .filter(|metadata| metadata.group() == group)
                .cloned()
                .collect::<Vec<_>>()
        };

        MetadataCollection {
            source: self.source.clone(),
            entities: self
                .entities
                .iter()
                .map(|(kind, list)| (*kind, filter(list)))
                .collect(),
            session: filter(&self.session),
        }
    }
}

/// Runs the source's registration function and collects its components.
///
/// A registration function that panics yields [`DiscoveryError::Source`].
pub fn discover(source: &dyn ComponentSource) -> Result<MetadataCollection, DiscoveryError> {
    let handle = source.handle();
    let mut declarations = ComponentDeclarations::new(handle.clone());
    catch_unwind(AssertUnwindSafe(|| source.register(&mut declarations))).unwrap_or_else(
        |payload| {
            Err(DiscoveryError::Source {
                source_name: handle.name().to_owned(),
                reason: HandlerError::from_panic(payload.as_ref()).message().to_owned(),
            })
        },
    )?;

    let collection = declarations.into_collection();
    debug!(
        target: "component::discovery",
        source = %handle,
        components = collection.len(),
        session = collection.session().len(),
        "Discovered components"
    );
    Ok(collection)
}
