//! Component sources.
//!
//! A source is an independently-authored unit (a plugin, a mod) that declares
//! components. Sources identify themselves explicitly with a [`SourceHandle`]
//! at every registration call.

use std::fmt;
use std::sync::Arc;

use crate::descriptor::ComponentDeclarations;
use crate::error::DiscoveryError;

/// Identity and diagnostic switches of a component source.
///
/// Two handles are the same source iff their names match; the flags are
/// carried along so every component and action can gate its diagnostics
/// without a lookup.
#[derive(Clone, Debug)]
pub struct SourceHandle {
    name: Arc<str>,
    debug: bool,
    profile: bool,
}

impl SourceHandle {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            debug: false,
            profile: false,
        }
    }

    /// Surfaces instantiation and dispatch failures as user-visible notices.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Wraps every handler invocation in profiling markers.
    #[must_use]
    pub fn with_profile(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn is_profiled(&self) -> bool {
        self.profile
    }
}

impl PartialEq for SourceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for SourceHandle {}

impl std::hash::Hash for SourceHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A unit that declares components through the explicit registration API.
///
/// # Example
///
/// ```ignore
/// struct Autopilot;
///
/// impl ComponentSource for Autopilot {
///     fn handle(&self) -> SourceHandle {
///         SourceHandle::new("autopilot").with_debug(cfg!(debug_assertions))
///     }
///
///     fn register(&self, decl: &mut ComponentDeclarations) -> Result<(), DiscoveryError> {
///         decl.declare(
///             ComponentDescriptor::<Navigator>::entity("navigator", TargetKind::Grid)
///                 .constructor(|grid| Ok(Navigator::new(grid)))
///                 .on_update(10, Navigator::update),
///         )
///     }
/// }
/// ```
pub trait ComponentSource: Send + Sync {
    fn handle(&self) -> SourceHandle;

    /// Declares every component of this source.
    fn register(&self, decl: &mut ComponentDeclarations) -> Result<(), DiscoveryError>;
}
