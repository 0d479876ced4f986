//! Boundary to the host engine.

use component_core::{RunLocation, TargetRef};

/// Host services the session needs to initialize.
///
/// Lifecycle notifications flow the other way: the host calls
/// [`ComponentSession::target_added`](crate::ComponentSession::target_added)
/// and friends on the driving thread.
pub trait Host {
    /// Reports whether the host's services are up yet.
    fn probe(&self) -> HostReadiness;

    /// Targets that existed before the session initialized.
    fn existing_targets(&self) -> Vec<TargetRef>;

    /// Stops delivering lifecycle notifications to the session.
    fn detach(&mut self) {}
}

/// Snapshot of host readiness and topology.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HostReadiness {
    pub entities: bool,
    pub multiplayer: bool,
    pub session: bool,
    /// The local player exists; only required on peers.
    pub local_player: bool,
    pub multiplayer_active: bool,
    pub is_authority: bool,
}

impl HostReadiness {
    /// Nothing is ready yet.
    pub const fn pending() -> Self {
        Self {
            entities: false,
            multiplayer: false,
            session: false,
            local_player: false,
            multiplayer_active: false,
            is_authority: false,
        }
    }

    /// Fully ready with the given topology.
    pub const fn ready(multiplayer_active: bool, is_authority: bool) -> Self {
        Self {
            entities: true,
            multiplayer: true,
            session: true,
            local_player: true,
            multiplayer_active,
            is_authority,
        }
    }

    pub const fn single_player() -> Self {
        Self::ready(false, true)
    }

    pub const fn is_ready(&self) -> bool {
        self.entities && self.multiplayer && self.session && (self.is_authority || self.local_player)
    }

    pub const fn run_location(&self) -> RunLocation {
        RunLocation::resolve(self.multiplayer_active, self.is_authority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authority_needs_no_local_player() {
        let server = HostReadiness {
            local_player: false,
            ..HostReadiness::ready(true, true)
        };
        assert!(server.is_ready());
        assert_eq!(server.run_location(), RunLocation::SERVER);

        let peer = HostReadiness {
            local_player: false,
            ..HostReadiness::ready(true, false)
        };
        assert!(!peer.is_ready());
        assert_eq!(HostReadiness::ready(true, false).run_location(), RunLocation::CLIENT);

        assert!(!HostReadiness::pending().is_ready());
        assert_eq!(HostReadiness::single_player().run_location(), RunLocation::BOTH);
    }
}
