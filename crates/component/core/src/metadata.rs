//! Type-erased component metadata and live instances.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use std::sync::Arc;

use tracing::{error, trace};

use crate::action::{ActionId, ActionRef};
use crate::diagnostics::Diagnostics;
use crate::error::{HandlerError, HandlerResult};
use crate::event::EventName;
use crate::location::RunLocation;
use crate::source::SourceHandle;
use crate::target::{TargetId, TargetRef, TargetScope};

/// One declared handler of a component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventBinding {
    pub(crate) event: EventName,
    pub(crate) frequency: u32,
    pub(crate) order: i32,
    pub(crate) runs_on: RunLocation,
    pub(crate) method: String,
    /// Index of the handler in declaration order.
    pub(crate) slot: usize,
}

impl EventBinding {
    pub fn event(&self) -> &EventName {
        &self.event
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn is_update(&self) -> bool {
        self.frequency > 0
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn runs_on(&self) -> RunLocation {
        self.runs_on
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Event name, then order, then broader run locations first.
    pub fn dispatch_cmp(&self, other: &Self) -> Ordering {
        self.event
            .cmp(&other.event)
            .then(self.order.cmp(&other.order))
            .then(other.runs_on.bits().cmp(&self.runs_on.bits()))
    }
}

/// Stable sort of bindings into dispatch order.
pub fn sort_bindings(bindings: &mut [EventBinding]) {
    bindings.sort_by(EventBinding::dispatch_cmp);
}

/// Stable sort of components into load order.
pub fn sort_components(components: &mut [Arc<ComponentMetadata>]) {
    components.sort_by(|a, b| a.load_cmp(b));
}

/// Identity of a component type across the process.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKey {
    pub source: String,
    pub component: String,
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.component)
    }
}

pub(crate) struct ResolvedInstance {
    pub(crate) state: Rc<dyn Any>,
    pub(crate) actions: Vec<ActionRef>,
}

/// Constructs instances of one concrete component type.
pub(crate) trait InstanceFactory: Send + Sync {
    /// Evaluates the user applicability predicate.
    fn accepts(&self, target: Option<&TargetRef>) -> bool;

    fn build(
        &self,
        metadata: &ComponentMetadata,
        runtime: RunLocation,
        target: Option<&TargetRef>,
    ) -> HandlerResult<ResolvedInstance>;
}

/// Immutable description of one component type.
pub struct ComponentMetadata {
    pub(crate) name: String,
    pub(crate) source: SourceHandle,
    pub(crate) scope: TargetScope,
    pub(crate) stateless: bool,
    pub(crate) group: i32,
    pub(crate) order: i32,
    pub(crate) runs_on: RunLocation,
    pub(crate) subtypes: Vec<String>,
    pub(crate) bindings: Vec<EventBinding>,
    pub(crate) factory: Arc<dyn InstanceFactory>,
}

impl ComponentMetadata {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &SourceHandle {
        &self.source
    }

    pub fn scope(&self) -> TargetScope {
        self.scope
    }

    pub fn is_stateless(&self) -> bool {
        self.stateless
    }

    pub fn group(&self) -> i32 {
        self.group
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn runs_on(&self) -> RunLocation {
        self.runs_on
    }

    pub fn subtypes(&self) -> &[String] {
        &self.subtypes
    }

    /// Bindings in dispatch order.
    pub fn bindings(&self) -> &[EventBinding] {
        &self.bindings
    }

    pub fn key(&self) -> ComponentKey {
        ComponentKey {
            source: self.source.name().to_owned(),
            component: self.name.clone(),
        }
    }

    /// Group, then order, then broader run locations first.
    pub fn load_cmp(&self, other: &Self) -> Ordering {
        self.group
            .cmp(&other.group)
            .then(self.order.cmp(&other.order))
            .then(other.runs_on.bits().cmp(&self.runs_on.bits()))
    }

    pub(crate) fn action_label(&self, binding: &EventBinding) -> String {
        format!("{}.{}", self.name, binding.method)
    }

    fn allows_subtype(&self, target: &TargetRef) -> bool {
        self.subtypes.is_empty()
            || target
                .subtype()
                .is_some_and(|subtype| self.subtypes.iter().any(|s| s == subtype))
    }
}

impl fmt::Debug for ComponentMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentMetadata")
            .field("name", &self.name)
            .field("source", &self.source.name())
            .field("scope", &self.scope)
            .field("stateless", &self.stateless)
            .field("group", &self.group)
            .field("order", &self.order)
            .field("runs_on", &self.runs_on)
            .field("subtypes", &self.subtypes)
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

/// A live component bound to zero or one target.
pub struct ComponentInstance {
    metadata: Arc<ComponentMetadata>,
    target: Option<TargetId>,
    actions: Vec<ActionRef>,
    _state: Rc<dyn Any>,
}

impl ComponentInstance {
    pub fn metadata(&self) -> &Arc<ComponentMetadata> {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        self.metadata.name()
    }

    pub fn target(&self) -> Option<TargetId> {
        self.target
    }

    /// Component order, then broader run locations first.
    pub fn order_cmp(&self, other: &Self) -> Ordering {
        self.metadata
            .order
            .cmp(&other.metadata.order)
            .then(other.metadata.runs_on.bits().cmp(&self.metadata.runs_on.bits()))
    }

    /// Actions that survived run-location filtering and dispatch failures.
    pub fn actions(&self) -> &[ActionRef] {
        &self.actions
    }

    pub fn update_actions(&self) -> impl Iterator<Item = &ActionRef> {
        self.actions.iter().filter(|action| action.is_update())
    }

    pub fn handles(&self, event: &EventName) -> bool {
        self.actions
            .iter()
            .any(|action| !action.is_update() && action.event() == event)
    }

    /// Invokes every non-update action bound to `event` in binding order.
    ///
    /// Failed actions are removed from the instance; their ids are returned.
    #[must_use]
    pub fn raise_event(&mut self, event: &EventName, diagnostics: &Diagnostics) -> Vec<ActionId> {
        let mut failed = Vec::new();
        self.actions.retain(|action| {
            if action.is_update() || action.event() != event || action.try_invoke(diagnostics) {
                return true;
            }
            failed.push(action.id());
            false
        });
        failed
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("component", &self.metadata.name)
            .field("target", &self.target)
            .field("actions", &self.actions.len())
            .finish_non_exhaustive()
    }
}

/// Creates an instance of `metadata`, or `None` if it does not apply.
///
/// Checks run in order: run location, target kind, sub-type allow-list, the
/// user condition. Condition and constructor failures (including panics) are
/// logged and surfaced through `diagnostics`; they never propagate.
pub fn try_instantiate(
    metadata: &Arc<ComponentMetadata>,
    runtime: RunLocation,
    target: Option<&TargetRef>,
    diagnostics: &Diagnostics,
) -> Option<ComponentInstance> {
    if !metadata.runs_on.runs_on(runtime) {
        trace!(
            target: "component::instantiate",
            component = %metadata.name,
            declared = %metadata.runs_on,
            runtime = %runtime,
            "Skipping component for run location"
        );
        return None;
    }

    if let TargetScope::Entity(kind) = metadata.scope {
        let target = target?;
        if target.kind() != kind || !metadata.allows_subtype(target) {
            return None;
        }
    }

    let accepted = catch_unwind(AssertUnwindSafe(|| metadata.factory.accepts(target)));
    match accepted {
        Ok(true) => {}
        Ok(false) => return None,
        Err(payload) => {
            let err = HandlerError::from_panic(payload.as_ref());
            report_failure(metadata, target, &err, "Error invoking condition func for", diagnostics);
            return None;
        }
    }

    let built = catch_unwind(AssertUnwindSafe(|| {
        metadata.factory.build(metadata, runtime, target)
    }))
    .unwrap_or_else(|payload| Err(HandlerError::from_panic(payload.as_ref())));

    match built {
        Ok(resolved) => Some(ComponentInstance {
            metadata: Arc::clone(metadata),
            target: target.map(|t| t.id()),
            actions: resolved.actions,
            _state: resolved.state,
        }),
        Err(err) => {
            report_failure(metadata, target, &err, "Error instantiating", diagnostics);
            None
        }
    }
}

fn report_failure(
    metadata: &ComponentMetadata,
    target: Option<&TargetRef>,
    err: &HandlerError,
    prefix: &str,
    diagnostics: &Diagnostics,
) {
    let attached_to = target
        .map(|t| t.display_name())
        .unwrap_or_else(|| "session".to_owned());
    error!(
        target: "component::instantiate",
        component = %metadata.name,
        source = %metadata.source,
        %attached_to,
        error = %err,
        "{prefix} component"
    );
    diagnostics.notify_error(&metadata.source, &format!("{prefix} {}.", metadata.name));
}
