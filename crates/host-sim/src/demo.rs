//! Components the simulator loads.
use component_core::{
    BindingSpec, ComponentDeclarations, ComponentDescriptor, ComponentSource, DiscoveryError,
    EventName, HandlerError, RunLocation, SourceHandle, TargetKind,
};
use component_runtime::{Envelope, MessageKey, MessageRouter};
use tracing::{debug, info};

pub const SOURCE_NAME: &str = "demo";

/// Raised by the background task every few ticks.
pub const PULSE: &str = "Pulse";
/// Raised on a block to fire it.
pub const IGNITE: &str = "Ignite";

/// Group loaded on request rather than at session start.
pub const LATE_GROUP: i32 = 1;

pub const CHAT: MessageKey = MessageKey::new(1, 1);

pub struct DemoSource {
    debug: bool,
}

impl DemoSource {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }
}

#[derive(Debug, Default)]
struct SaveCounter {
    saves: u32,
    paused: bool,
}

#[derive(Debug)]
struct GridMonitor {
    name: String,
    samples: u64,
}

#[derive(Debug, Default)]
struct Thruster {
    ignitions: u32,
}

impl ComponentSource for DemoSource {
    fn handle(&self) -> SourceHandle {
        SourceHandle::new(SOURCE_NAME)
            .with_debug(self.debug)
            .with_profile(true)
    }

    fn register(&self, decl: &mut ComponentDeclarations) -> Result<(), DiscoveryError> {
        decl.declare(
            ComponentDescriptor::stateless("heartbeat")
                .on(EventName::STATELESS_INIT, |_| {
                    info!(target: "sim::demo", "Heartbeat online");
                    Ok(())
                })
                .on_update(60, |_| {
                    debug!(target: "sim::demo", "Heartbeat");
                    Ok(())
                }),
        )?;

        decl.declare(
            ComponentDescriptor::<SaveCounter>::session("autosave")
                .with_new(|| Ok(SaveCounter::default()))
                .on(EventName::SESSION_SAVE, |state| {
                    state.saves += 1;
                    info!(
                        target: "sim::demo",
                        saves = state.saves,
                        paused = state.paused,
                        "Session saved"
                    );
                    Ok(())
                })
                .on(EventName::UPDATING_STOPPED, |state| {
                    state.paused = true;
                    Ok(())
                })
                .on(EventName::UPDATING_RESUMED, |state| {
                    state.paused = false;
                    Ok(())
                })
                .on(EventName::SESSION_CLOSE, |state| {
                    info!(target: "sim::demo", saves = state.saves, "Autosave closing");
                    Ok(())
                }),
        )?;

        decl.declare(
            ComponentDescriptor::<u64>::session("pulse_listener")
                .order(-1)
                .with_new(|| Ok(0))
                .on(PULSE, |pulses| {
                    *pulses += 1;
                    debug!(target: "sim::demo", pulses = *pulses, "Pulse");
                    Ok(())
                }),
        )?;

        decl.declare(
            ComponentDescriptor::<GridMonitor>::entity("grid_monitor", TargetKind::Grid)
                .constructor(|grid| {
                    Ok(GridMonitor {
                        name: grid.display_name(),
                        samples: 0,
                    })
                })
                .on_update(30, |monitor| {
                    monitor.samples += 1;
                    Ok(())
                })
                .on(EventName::ENTITY_CLOSE, |monitor| {
                    info!(
                        target: "sim::demo",
                        grid = %monitor.name,
                        samples = monitor.samples,
                        "Grid closed"
                    );
                    Ok(())
                }),
        )?;

        decl.declare(
            ComponentDescriptor::<Thruster>::entity("thruster", TargetKind::Block)
                .subtypes(["thruster"])
                .runs_on(RunLocation::SERVER)
                .constructor(|_| Ok(Thruster::default()))
                .bind(BindingSpec::event(IGNITE).order(-10), |thruster| {
                    thruster.ignitions += 1;
                    if thruster.ignitions > 3 {
                        return Err(HandlerError::new("thruster overheated"));
                    }
                    Ok(())
                })
                .on(EventName::BLOCK_GRID_CHANGE, |_| {
                    debug!(target: "sim::demo", "Thruster changed grid");
                    Ok(())
                }),
        )?;

        decl.declare(
            ComponentDescriptor::<()>::entity("cargo_audit", TargetKind::Block)
                .group(LATE_GROUP)
                .subtypes(["cargo"])
                .constructor(|block| {
                    info!(target: "sim::demo", block = %block.display_name(), "Auditing cargo");
                    Ok(())
                }),
        )?;

        Ok(())
    }
}

/// Message handlers live outside the component store.
pub fn register_routes(router: &mut MessageRouter, source: &SourceHandle) {
    router.register(CHAT, source.clone(), "chat", |envelope: &Envelope| {
        let text = std::str::from_utf8(&envelope.payload)
            .map_err(|err| HandlerError::new(format!("chat payload: {err}")))?;
        info!(target: "sim::demo", sender = envelope.sender, text, "Chat");
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use component_core::discover;

    #[test]
    fn test_declares_every_component() {
        let collection = discover(&DemoSource::new(false)).unwrap();
        assert_eq!(collection.len(), 6);
        assert_eq!(collection.groups().into_iter().collect::<Vec<_>>(), vec![0, LATE_GROUP]);
        assert_eq!(collection.select_group(LATE_GROUP).len(), 1);
    }
}
