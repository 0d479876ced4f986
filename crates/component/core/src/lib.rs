//! Component metadata model shared by component sources and the runtime.
//!
//! `component-core` describes component types declaratively: where they apply
//! ([`TargetScope`]), when they load ([`ComponentMetadata::group`]), how they are
//! ordered, and which events they handle. Sources declare components through
//! [`ComponentDescriptor`]; [`discover`] turns a source into a sorted
//! [`MetadataCollection`], and [`try_instantiate`] builds live
//! [`ComponentInstance`]s whose handlers are exposed as [`EventAction`]s.
//! Stateful dispatch lives in `component-runtime`.
pub mod action;
pub mod collection;
pub mod descriptor;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod location;
pub mod metadata;
pub mod source;
pub mod target;

pub use action::{ActionId, ActionRef, EventAction};
pub use collection::{MetadataCollection, discover};
pub use descriptor::{BindingSpec, ComponentDeclarations, ComponentDescriptor};
pub use diagnostics::{
    DEFAULT_NOTICE_DURATION, Diagnostics, NoopProfiler, Notifier, ProfileRecorder, ProfileRow,
    ProfileStats, Profiler, TracingNotifier,
};
pub use error::{DiscoveryError, HandlerError, HandlerResult};
pub use event::EventName;
pub use location::RunLocation;
pub use metadata::{
    ComponentInstance, ComponentKey, ComponentMetadata, EventBinding, sort_bindings,
    sort_components, try_instantiate,
};
pub use source::{ComponentSource, SourceHandle};
pub use target::{Target, TargetId, TargetKind, TargetRef, TargetScope};
