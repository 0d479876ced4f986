//! Execution locations for components and bindings.

use bitflags::bitflags;

bitflags! {
    /// Where a component or a single binding is allowed to execute.
    ///
    /// A declaration runs iff it intersects the runtime location resolved for
    /// the session, so `BOTH` always runs and `SERVER`-only components are
    /// skipped on peers.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct RunLocation: u8 {
        const CLIENT = 1 << 0;
        const SERVER = 1 << 1;
        const BOTH   = Self::CLIENT.bits() | Self::SERVER.bits();
    }
}

impl RunLocation {
    /// Resolves the runtime location from the host topology.
    ///
    /// - Single player: `BOTH` (this process is host and peer at once)
    /// - Multiplayer authority: `SERVER`
    /// - Multiplayer peer: `CLIENT`
    pub const fn resolve(multiplayer_active: bool, is_authority: bool) -> Self {
        if !multiplayer_active {
            Self::BOTH
        } else if is_authority {
            Self::SERVER
        } else {
            Self::CLIENT
        }
    }

    /// Returns true if a declaration with this location runs at `runtime`.
    pub const fn runs_on(self, runtime: RunLocation) -> bool {
        self.intersects(runtime)
    }

    pub const fn as_str(&self) -> &'static str {
        match self.bits() {
            1 => "client",
            2 => "server",
            3 => "both",
            _ => "none",
        }
    }
}

impl Default for RunLocation {
    fn default() -> Self {
        Self::BOTH
    }
}

impl std::fmt::Display for RunLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_topology() {
        assert_eq!(RunLocation::resolve(false, false), RunLocation::BOTH);
        assert_eq!(RunLocation::resolve(false, true), RunLocation::BOTH);
        assert_eq!(RunLocation::resolve(true, true), RunLocation::SERVER);
        assert_eq!(RunLocation::resolve(true, false), RunLocation::CLIENT);
    }

    #[test]
    fn test_runs_on() {
        assert!(RunLocation::BOTH.runs_on(RunLocation::CLIENT));
        assert!(RunLocation::BOTH.runs_on(RunLocation::SERVER));
        assert!(RunLocation::SERVER.runs_on(RunLocation::BOTH));
        assert!(!RunLocation::SERVER.runs_on(RunLocation::CLIENT));
        assert!(!RunLocation::CLIENT.runs_on(RunLocation::SERVER));
        assert!(!RunLocation::empty().runs_on(RunLocation::BOTH));
    }

    #[test]
    fn test_descending_rank_puts_broader_first() {
        let mut locations = vec![RunLocation::CLIENT, RunLocation::BOTH, RunLocation::SERVER];
        locations.sort_by(|a, b| b.bits().cmp(&a.bits()));
        assert_eq!(
            locations,
            vec![RunLocation::BOTH, RunLocation::SERVER, RunLocation::CLIENT]
        );
    }
}
