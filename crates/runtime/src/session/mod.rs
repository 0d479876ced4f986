//! Session orchestration.
//!
//! A [`ComponentSession`] is driven by a single caller once per tick. It waits
//! for the host to become ready, builds a [`CollectionStore`] from the
//! registrar's init groups, and from then on drains deferred requests before
//! dispatching updates. Anything escaping a tick terminates the session.

pub(crate) mod deferred;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use component_core::{
    DEFAULT_NOTICE_DURATION, Diagnostics, EventName, HandlerError, RunLocation, TargetRef,
};
use tracing::{debug, error, info, trace, warn};

use crate::api::{Host, SessionError, SessionHandle};
use crate::messaging::{Envelope, MessageRouter};
use crate::registrar::ComponentRegistrar;
use crate::store::CollectionStore;
use deferred::{DeferredQueue, TaskContext};

/// Lifecycle state of a session.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    /// Waiting for the host to become ready.
    NotInitialized,
    /// Dispatching events and updates.
    Initialized,
    /// Closed, or failed fatally. Only [`ComponentSession::open`] leaves this state.
    Terminated,
}

/// Session tunables.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Announce the children of composite targets (e.g. blocks of a grid)
    /// along with the target itself.
    pub announce_children: bool,
    /// How long debug-mode error notices stay visible.
    pub notice_duration: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            announce_children: true,
            notice_duration: DEFAULT_NOTICE_DURATION,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_announce_children(mut self, announce: bool) -> Self {
        self.announce_children = announce;
        self
    }

    #[must_use]
    pub fn with_notice_duration(mut self, duration: Duration) -> Self {
        self.notice_duration = duration;
        self
    }
}

/// Owns the component store of one session and bridges host notifications to it.
pub struct ComponentSession<H: Host> {
    host: H,
    registrar: Arc<ComponentRegistrar>,
    config: SessionConfig,
    diagnostics: Diagnostics,
    status: SessionStatus,
    store: Option<CollectionStore>,
    router: MessageRouter,
    queue: Arc<DeferredQueue>,
}

impl<H: Host> ComponentSession<H> {
    /// Creates an open session in [`SessionStatus::NotInitialized`].
    pub fn new(host: H, registrar: Arc<ComponentRegistrar>, config: SessionConfig) -> Self {
        let diagnostics = Diagnostics::default().with_notice_duration(config.notice_duration);
        let mut session = Self {
            host,
            registrar,
            config,
            diagnostics,
            status: SessionStatus::Terminated,
            store: None,
            router: MessageRouter::new(),
            queue: Arc::new(DeferredQueue::default()),
        };
        session.open();
        session
    }

    /// Replaces the notice and profiling sinks.
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics.with_notice_duration(self.config.notice_duration);
        self
    }

    /// Resets to [`SessionStatus::NotInitialized`] for a new host session.
    pub fn open(&mut self) {
        debug!(target: "component::session", previous = %self.status, "Opening session");
        self.status = SessionStatus::NotInitialized;
        self.store = None;
        self.queue.open();
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Resolved once the session initializes.
    pub fn run_location(&self) -> Option<RunLocation> {
        self.store.as_ref().map(CollectionStore::run_location)
    }

    pub fn store(&self) -> Option<&CollectionStore> {
        self.store.as_ref()
    }

    /// Message handlers; register on the driving thread.
    pub fn router_mut(&mut self) -> &mut MessageRouter {
        &mut self.router
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(Arc::clone(&self.queue), Arc::clone(&self.registrar))
    }

    /// Advances the session by one host tick.
    pub fn tick(&mut self) {
        if self.status == SessionStatus::Terminated {
            return;
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| self.tick_inner())).unwrap_or_else(|payload| {
            Err(SessionError::Panicked(
                HandlerError::from_panic(payload.as_ref()).message().to_owned(),
            ))
        });

        if let Err(err) = outcome {
            error!(
                target: "component::session",
                fatal = true,
                status = %self.status,
                error = %err,
                "Session tick failed, terminating"
            );
            self.status = SessionStatus::Terminated;
            self.queue.close();
        }
    }

    fn tick_inner(&mut self) -> Result<(), SessionError> {
        match self.status {
            SessionStatus::Terminated => Ok(()),
            SessionStatus::NotInitialized => self.try_initialize(),
            SessionStatus::Initialized => self.update(),
        }
    }

    fn try_initialize(&mut self) -> Result<(), SessionError> {
        let readiness = self.host.probe();
        if !readiness.is_ready() {
            trace!(target: "component::session", ?readiness, "Host not ready");
            return Ok(());
        }

        let runtime = readiness.run_location();
        info!(
            target: "component::session",
            run_location = %runtime,
            multiplayer = readiness.multiplayer_active,
            authority = readiness.is_authority,
            "Initializing component session"
        );

        let mut store = CollectionStore::new(runtime, self.diagnostics.clone());
        for target in self.host.existing_targets() {
            announce(&mut store, &target, self.config.announce_children);
        }
        for collection in self.registrar.init_groups() {
            store.try_add_collection(&collection);
        }

        self.store = Some(store);
        self.status = SessionStatus::Initialized;
        Ok(())
    }

    fn update(&mut self) -> Result<(), SessionError> {
        let store = self.store.as_mut().ok_or(SessionError::StoreMissing {
            status: self.status,
        })?;

        for task in self.queue.drain() {
            task(TaskContext {
                store: &mut *store,
                router: &mut self.router,
            });
        }
        store.tick();
        Ok(())
    }

    /// Queues `event` for the next tick. Safe from any thread through [`SessionHandle`].
    pub fn raise_event_deferred(&self, event: impl Into<EventName>) -> Result<(), SessionError> {
        self.handle().raise_session_event(event)
    }

    /// Raises `event` right now; returns the number of handlers invoked.
    pub fn raise_event_immediate(&mut self, event: impl Into<EventName>) -> usize {
        let event = event.into();
        match self.live_store() {
            Some(store) => store.raise_session_event(&event),
            None => {
                trace!(target: "component::session", %event, "Session not live, event dropped");
                0
            }
        }
    }

    /// Routes `envelope` right now; returns the number of handlers invoked.
    ///
    /// A terminated session routes nothing.
    pub fn deliver_message(&mut self, envelope: &Envelope) -> usize {
        if self.status == SessionStatus::Terminated {
            trace!(target: "component::session", key = %envelope.key, "Session terminated, message dropped");
            return 0;
        }
        self.router.dispatch(envelope, &self.diagnostics)
    }

    /// The store, while the session is initialized.
    ///
    /// A fatal tick keeps the store only so that [`close`](Self::close) can
    /// still raise [`EventName::SESSION_CLOSE`].
    fn live_store(&mut self) -> Option<&mut CollectionStore> {
        match self.status {
            SessionStatus::Initialized => self.store.as_mut(),
            SessionStatus::NotInitialized | SessionStatus::Terminated => None,
        }
    }

    /// Host notification: a target came into existence.
    ///
    /// Ignored unless initialized; existing targets are collected from the
    /// host when the session initializes.
    pub fn target_added(&mut self, target: &TargetRef) {
        let announce_children = self.config.announce_children;
        match self.live_store() {
            Some(store) => announce(store, target, announce_children),
            None => trace!(
                target: "component::session",
                target_id = %target.id(),
                "Target added while the session is not live"
            ),
        }
    }

    /// Host notification: a target is closing.
    pub fn target_removed(&mut self, target: &TargetRef) {
        let announce_children = self.config.announce_children;
        if let Some(store) = self.live_store() {
            retire(store, target, announce_children);
        }
    }

    /// Host notification: simulation paused. Raised immediately so handlers
    /// run before the host resumes.
    pub fn updating_stopped(&mut self) {
        self.raise_event_immediate(EventName::UPDATING_STOPPED);
    }

    /// Host notification: simulation resumed. Raised on the next tick.
    pub fn updating_resumed(&self) {
        if let Err(err) = self.raise_event_deferred(EventName::UPDATING_RESUMED) {
            warn!(target: "component::session", error = %err, "Dropping UpdatingResumed");
        }
    }

    /// Host notification: the session is being saved.
    pub fn save(&mut self) {
        self.raise_event_immediate(EventName::SESSION_SAVE);
    }

    /// Raises [`EventName::SESSION_CLOSE`], releases everything and terminates.
    pub fn close(&mut self) {
        if let Some(mut store) = self.store.take() {
            store.close();
        }
        self.host.detach();
        self.router.clear();
        let dropped = self.queue.close();
        self.status = SessionStatus::Terminated;
        info!(target: "component::session", dropped, "Session closed");
    }
}

fn announce(store: &mut CollectionStore, target: &TargetRef, children: bool) {
    store.add_target_any(target);
    if children {
        for child in target.children() {
            announce(store, &child, children);
        }
    }
}

fn retire(store: &mut CollectionStore, target: &TargetRef, children: bool) {
    if children {
        for child in target.children() {
            if store.tracks(&child) {
                retire(store, &child, children);
            }
        }
    }
    store.remove_target_any(target);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::HostReadiness;

    struct NeverReady;

    impl Host for NeverReady {
        fn probe(&self) -> HostReadiness {
            HostReadiness::pending()
        }

        fn existing_targets(&self) -> Vec<TargetRef> {
            Vec::new()
        }
    }

    #[test]
    fn test_waits_for_host() {
        let mut session = ComponentSession::new(
            NeverReady,
            Arc::new(ComponentRegistrar::new()),
            SessionConfig::default(),
        );
        for _ in 0..3 {
            session.tick();
        }
        assert_eq!(session.status(), SessionStatus::NotInitialized);
        assert!(session.run_location().is_none());
        assert_eq!(session.raise_event_immediate("Anything"), 0);
    }

    #[test]
    fn test_close_terminates_and_rejects_requests() {
        let mut session = ComponentSession::new(
            NeverReady,
            Arc::new(ComponentRegistrar::new()),
            SessionConfig::default(),
        );
        let handle = session.handle();
        handle.raise_session_event("Queued").unwrap();

        session.close();
        assert_eq!(session.status(), SessionStatus::Terminated);
        assert_eq!(handle.pending(), 0);
        assert_eq!(
            handle.raise_session_event("Late").unwrap_err(),
            SessionError::QueueClosed
        );

        session.open();
        assert_eq!(session.status(), SessionStatus::NotInitialized);
        assert!(handle.raise_session_event("Reopened").is_ok());
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(SessionStatus::NotInitialized.to_string(), "not_initialized");
        assert_eq!(SessionStatus::Terminated.as_ref(), "terminated");
    }
}
