//! Explicit component registration API.
//!
//! Sources describe each component type with a [`ComponentDescriptor`] and hand
//! it to [`ComponentDeclarations::declare`]. Declaring validates the descriptor
//! and erases its component type into [`ComponentMetadata`], so the runtime
//! never needs to know concrete component types.
//!
//! # Example
//!
//! ```ignore
//! decl.declare(
//!     ComponentDescriptor::<Thruster>::entity("thruster", TargetKind::Block)
//!         .subtypes(["Thrust"])
//!         .order(2)
//!         .runs_on(RunLocation::SERVER)
//!         .constructor(|block| Ok(Thruster::new(block)))
//!         .on_update(1, Thruster::update)
//!         .on(EventName::ENTITY_CLOSE, Thruster::close),
//! )?;
//! ```

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use crate::action::{ActionRef, EventAction};
use crate::collection::MetadataCollection;
use crate::error::{DiscoveryError, HandlerResult};
use crate::event::EventName;
use crate::location::RunLocation;
use crate::metadata::{ComponentMetadata, EventBinding, InstanceFactory, ResolvedInstance};
use crate::source::SourceHandle;
use crate::target::{TargetKind, TargetRef, TargetScope};

type Handler<T> = Arc<dyn Fn(&mut T) -> HandlerResult + Send + Sync>;

enum Condition {
    Target(Arc<dyn Fn(&TargetRef) -> bool + Send + Sync>),
    Session(Arc<dyn Fn() -> bool + Send + Sync>),
}

enum Constructor<T> {
    Target(Arc<dyn Fn(&TargetRef) -> HandlerResult<T> + Send + Sync>),
    Plain(Arc<dyn Fn() -> HandlerResult<T> + Send + Sync>),
}

/// Declared shape of one binding, before it is attached to a handler.
#[derive(Clone, Debug)]
pub struct BindingSpec {
    event: EventName,
    frequency: u32,
    order: i32,
    runs_on: RunLocation,
    method: Option<String>,
}

impl BindingSpec {
    /// A plain event handler.
    pub fn event(name: impl Into<EventName>) -> Self {
        Self {
            event: name.into(),
            frequency: 0,
            order: 0,
            runs_on: RunLocation::BOTH,
            method: None,
        }
    }

    /// An update handler invoked every `frequency` ticks.
    pub fn update(frequency: u32) -> Self {
        Self {
            frequency,
            ..Self::event(EventName::UPDATE)
        }
    }

    #[must_use]
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn runs_on(mut self, location: RunLocation) -> Self {
        self.runs_on = location;
        self
    }

    /// Method name shown in logs and profiles.
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }
}

struct BindingDecl<T> {
    spec: BindingSpec,
    handler: Handler<T>,
}

/// Builder describing one component type.
pub struct ComponentDescriptor<T> {
    name: String,
    scope: TargetScope,
    stateless: bool,
    user_constructor: bool,
    group: i32,
    order: i32,
    runs_on: RunLocation,
    subtypes: Vec<String>,
    condition: Option<Condition>,
    constructor: Option<Constructor<T>>,
    bindings: Vec<BindingDecl<T>>,
}

impl<T: 'static> ComponentDescriptor<T> {
    fn with_scope(name: impl Into<String>, scope: TargetScope) -> Self {
        Self {
            name: name.into(),
            scope,
            stateless: false,
            user_constructor: false,
            group: 0,
            order: 0,
            runs_on: RunLocation::BOTH,
            subtypes: Vec::new(),
            condition: None,
            constructor: None,
            bindings: Vec::new(),
        }
    }

    /// A component instantiated once per target of `kind`.
    pub fn entity(name: impl Into<String>, kind: TargetKind) -> Self {
        Self::with_scope(name, TargetScope::Entity(kind))
    }

    /// A component instantiated once per session.
    pub fn session(name: impl Into<String>) -> Self {
        Self::with_scope(name, TargetScope::Session)
    }

    /// Loading phase; groups are fed to the runtime independently.
    #[must_use]
    pub fn group(mut self, group: i32) -> Self {
        self.group = group;
        self
    }

    #[must_use]
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn runs_on(mut self, location: RunLocation) -> Self {
        self.runs_on = location;
        self
    }

    /// Restricts an entity component to targets whose sub-type is listed.
    #[must_use]
    pub fn subtypes<I, S>(mut self, subtypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subtypes = subtypes.into_iter().map(Into::into).collect();
        self
    }

    /// Applicability predicate evaluated against each candidate target.
    #[must_use]
    pub fn condition(mut self, condition: impl Fn(&TargetRef) -> bool + Send + Sync + 'static) -> Self {
        self.condition = Some(Condition::Target(Arc::new(condition)));
        self
    }

    /// Applicability predicate that does not look at the target.
    #[must_use]
    pub fn session_condition(mut self, condition: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.condition = Some(Condition::Session(Arc::new(condition)));
        self
    }

    /// Builds the component for a target.
    #[must_use]
    pub fn constructor(
        mut self,
        constructor: impl Fn(&TargetRef) -> HandlerResult<T> + Send + Sync + 'static,
    ) -> Self {
        self.constructor = Some(Constructor::Target(Arc::new(constructor)));
        self.user_constructor = true;
        self
    }

    /// Builds the component without looking at the target.
    #[must_use]
    pub fn with_new(mut self, constructor: impl Fn() -> HandlerResult<T> + Send + Sync + 'static) -> Self {
        self.constructor = Some(Constructor::Plain(Arc::new(constructor)));
        self.user_constructor = true;
        self
    }

    /// Binds a handler with full control over ordering and location.
    #[must_use]
    pub fn bind(
        mut self,
        spec: BindingSpec,
        handler: impl Fn(&mut T) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        self.bindings.push(BindingDecl {
            spec,
            handler: Arc::new(handler),
        });
        self
    }

    /// Binds a plain event handler with default ordering.
    #[must_use]
    pub fn on(
        self,
        event: impl Into<EventName>,
        handler: impl Fn(&mut T) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        self.bind(BindingSpec::event(event), handler)
    }

    /// Binds an update handler invoked every `frequency` ticks.
    #[must_use]
    pub fn on_update(
        self,
        frequency: u32,
        handler: impl Fn(&mut T) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        self.bind(BindingSpec::update(frequency), handler)
    }

    fn validate(&self) -> Result<(), DiscoveryError> {
        let component = || self.name.clone();

        if self.runs_on.is_empty() {
            return Err(DiscoveryError::EmptyRunLocation {
                component: component(),
            });
        }

        if self.stateless {
            if let TargetScope::Entity(kind) = self.scope {
                return Err(DiscoveryError::StatelessEntityComponent {
                    component: component(),
                    kind,
                });
            }
            if self.user_constructor {
                return Err(DiscoveryError::StatelessWithConstructor {
                    component: component(),
                });
            }
        } else if self.constructor.is_none() {
            return Err(DiscoveryError::MissingConstructor {
                component: component(),
            });
        }

        if self.scope == TargetScope::Session {
            let target_only = if !self.subtypes.is_empty() {
                Some("a sub-type allow-list")
            } else if matches!(self.condition, Some(Condition::Target(_))) {
                Some("a target condition")
            } else if matches!(self.constructor, Some(Constructor::Target(_))) {
                Some("a target constructor")
            } else {
                None
            };
            if let Some(what) = target_only {
                return Err(DiscoveryError::TargetOnlyOption {
                    component: component(),
                    what,
                });
            }
        }

        if let Some(binding) = self
            .bindings
            .iter()
            .find(|b| b.spec.event == EventName::UPDATE && b.spec.frequency == 0)
        {
            return Err(DiscoveryError::ZeroFrequency {
                component: component(),
                event: binding.spec.event.to_string(),
            });
        }

        Ok(())
    }

    fn into_metadata(self, source: &SourceHandle) -> ComponentMetadata {
        let mut bindings: Vec<EventBinding> = self
            .bindings
            .iter()
            .enumerate()
            .map(|(slot, decl)| EventBinding {
                event: decl.spec.event.clone(),
                frequency: decl.spec.frequency,
                order: decl.spec.order,
                runs_on: decl.spec.runs_on,
                method: decl
                    .spec
                    .method
                    .clone()
                    .unwrap_or_else(|| decl.spec.event.as_str().to_owned()),
                slot,
            })
            .collect();
        crate::metadata::sort_bindings(&mut bindings);

        let factory = TypedFactory {
            condition: self.condition,
            constructor: self.constructor,
            handlers: self.bindings.into_iter().map(|b| b.handler).collect(),
        };

        ComponentMetadata {
            name: self.name,
            source: source.clone(),
            scope: self.scope,
            stateless: self.stateless,
            group: self.group,
            order: self.order,
            runs_on: self.runs_on,
            subtypes: self.subtypes,
            bindings,
            factory: Arc::new(factory),
        }
    }
}

impl ComponentDescriptor<()> {
    /// A session component without instance state.
    ///
    /// Stateless components run no user constructor; their
    /// [`EventName::STATELESS_INIT`] handlers fire as soon as they are registered.
    pub fn stateless(name: impl Into<String>) -> Self {
        Self {
            stateless: true,
            constructor: Some(Constructor::Plain(Arc::new(|| Ok(())))),
            ..Self::with_scope(name, TargetScope::Session)
        }
    }
}

impl<T> ComponentDescriptor<T> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

struct TypedFactory<T> {
    condition: Option<Condition>,
    constructor: Option<Constructor<T>>,
    handlers: Vec<Handler<T>>,
}

impl<T: 'static> InstanceFactory for TypedFactory<T> {
    fn accepts(&self, target: Option<&TargetRef>) -> bool {
        match (&self.condition, target) {
            (None, _) => true,
            (Some(Condition::Session(f)), _) => f(),
            (Some(Condition::Target(f)), Some(target)) => f(target),
            (Some(Condition::Target(_)), None) => false,
        }
    }

    fn build(
        &self,
        metadata: &ComponentMetadata,
        runtime: RunLocation,
        target: Option<&TargetRef>,
    ) -> HandlerResult<ResolvedInstance> {
        let component = match (&self.constructor, target) {
            (Some(Constructor::Plain(f)), _) => f()?,
            (Some(Constructor::Target(f)), Some(target)) => f(target)?,
            (Some(Constructor::Target(_)), None) => {
                return Err("target constructor invoked without a target".into());
            }
            (None, _) => return Err("component has no constructor".into()),
        };
        let state = Rc::new(RefCell::new(component));

        let actions = metadata
            .bindings
            .iter()
            .filter(|binding| binding.runs_on.runs_on(runtime))
            .filter_map(|binding| {
                let handler = Arc::clone(self.handlers.get(binding.slot)?);
                let state = Rc::clone(&state);
                let action = EventAction::new(
                    binding.event.clone(),
                    binding.frequency,
                    binding.order,
                    metadata.action_label(binding),
                    metadata.source.clone(),
                    move || {
                        let mut state = state.borrow_mut();
                        handler(&mut *state)
                    },
                );
                Some(Rc::new(action) as ActionRef)
            })
            .collect();

        Ok(ResolvedInstance {
            state: state as Rc<dyn Any>,
            actions,
        })
    }
}

/// Collects and validates the components declared by one source.
pub struct ComponentDeclarations {
    source: SourceHandle,
    names: HashSet<String>,
    components: Vec<ComponentMetadata>,
}

impl ComponentDeclarations {
    pub fn new(source: SourceHandle) -> Self {
        Self {
            source,
            names: HashSet::new(),
            components: Vec::new(),
        }
    }

    pub fn source(&self) -> &SourceHandle {
        &self.source
    }

    /// Validates `descriptor` and records its metadata.
    pub fn declare<T: 'static>(
        &mut self,
        descriptor: ComponentDescriptor<T>,
    ) -> Result<(), DiscoveryError> {
        descriptor.validate()?;

        if !self.names.insert(descriptor.name.clone()) {
            return Err(DiscoveryError::DuplicateComponent {
                source_name: self.source.name().to_owned(),
                component: descriptor.name,
            });
        }

        self.components.push(descriptor.into_metadata(&self.source));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Partitions and sorts everything declared so far.
    pub fn into_collection(self) -> MetadataCollection {
        MetadataCollection::from_components(self.source, self.components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Radar;

    fn declarations() -> ComponentDeclarations {
        ComponentDeclarations::new(SourceHandle::new("tests"))
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let mut decl = declarations();
        decl.declare(ComponentDescriptor::<()>::stateless("clock"))
            .unwrap();
        let err = decl
            .declare(ComponentDescriptor::<()>::stateless("clock"))
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::DuplicateComponent { .. }));
        assert_eq!(decl.len(), 1);
    }

    #[test]
    fn test_rejects_zero_frequency_update() {
        let err = declarations()
            .declare(
                ComponentDescriptor::<Radar>::session("radar")
                    .with_new(|| Ok(Radar))
                    .on_update(0, |_| Ok(())),
            )
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::ZeroFrequency { .. }));
    }

    #[test]
    fn test_rejects_missing_constructor() {
        let err = declarations()
            .declare(ComponentDescriptor::<Radar>::entity("radar", TargetKind::Grid))
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::MissingConstructor { .. }));
    }

    #[test]
    fn test_rejects_stateless_with_constructor() {
        let err = declarations()
            .declare(ComponentDescriptor::<()>::stateless("clock").with_new(|| Ok(())))
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::StatelessWithConstructor { .. }));
    }

    #[test]
    fn test_rejects_target_options_on_session_components() {
        let err = declarations()
            .declare(
                ComponentDescriptor::<Radar>::session("radar")
                    .with_new(|| Ok(Radar))
                    .subtypes(["Antenna"]),
            )
            .unwrap_err();
        assert_eq!(
            err,
            DiscoveryError::TargetOnlyOption {
                component: "radar".into(),
                what: "a sub-type allow-list",
            }
        );

        let err = declarations()
            .declare(
                ComponentDescriptor::<Radar>::session("radar")
                    .constructor(|_| Ok(Radar)),
            )
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::TargetOnlyOption { .. }));
    }

    #[test]
    fn test_rejects_empty_run_location() {
        let err = declarations()
            .declare(ComponentDescriptor::<()>::stateless("clock").runs_on(RunLocation::empty()))
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::EmptyRunLocation { .. }));
    }

    #[test]
    fn test_bindings_sorted_at_declaration() {
        let mut decl = declarations();
        decl.declare(
            ComponentDescriptor::<Radar>::entity("radar", TargetKind::Grid)
                .constructor(|_| Ok(Radar))
                .bind(BindingSpec::event("Scan").order(2).method("scan_late"), |_| Ok(()))
                .bind(BindingSpec::event("Scan").order(1).method("scan_early"), |_| Ok(()))
                .on(EventName::ENTITY_CLOSE, |_| Ok(())),
        )
        .unwrap();

        let collection = decl.into_collection();
        let radar = &collection.entity(TargetKind::Grid)[0];
        let methods: Vec<&str> = radar.bindings().iter().map(|b| b.method()).collect();
        assert_eq!(methods, vec!["EntityClose", "scan_early", "scan_late"]);
    }
}
