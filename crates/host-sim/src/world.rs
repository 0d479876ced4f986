//! Simulated host: a handful of grids made of blocks.
use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use component_core::{Target, TargetId, TargetKind, TargetRef};
use component_runtime::{Host, HostReadiness};

use crate::config::SimConfig;

/// Block sub-types placed on every grid, round-robin.
pub const BLOCK_SUBTYPES: [&str; 3] = ["reactor", "thruster", "cargo"];

#[derive(Debug)]
pub struct SimBlock {
    id: TargetId,
    subtype: &'static str,
}

impl Target for SimBlock {
    fn id(&self) -> TargetId {
        self.id
    }

    fn kind(&self) -> TargetKind {
        TargetKind::Block
    }

    fn subtype(&self) -> Option<&str> {
        Some(self.subtype)
    }

    fn display_name(&self) -> String {
        format!("{} #{}", self.subtype, self.id)
    }
}

#[derive(Debug)]
pub struct SimGrid {
    id: TargetId,
    name: String,
    blocks: Vec<TargetRef>,
}

impl Target for SimGrid {
    fn id(&self) -> TargetId {
        self.id
    }

    fn kind(&self) -> TargetKind {
        TargetKind::Grid
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn children(&self) -> Vec<TargetRef> {
        self.blocks.clone()
    }
}

/// Host whose services come up after a configurable number of probes.
pub struct SimHost {
    readiness: HostReadiness,
    warmup: Cell<u32>,
    ids: AtomicU64,
    grids: Vec<TargetRef>,
    blocks_per_grid: u64,
    attached: bool,
}

impl SimHost {
    pub fn new(config: &SimConfig) -> Self {
        let mut host = Self {
            readiness: HostReadiness::ready(config.multiplayer, config.authority),
            warmup: Cell::new(config.warmup_probes),
            ids: AtomicU64::new(1),
            grids: Vec::new(),
            blocks_per_grid: config.blocks_per_grid,
            attached: true,
        };
        for _ in 0..config.grids {
            host.spawn_grid();
        }
        host
    }

    fn next_id(&self) -> TargetId {
        TargetId(self.ids.fetch_add(1, Ordering::Relaxed))
    }

    /// Builds a new grid with its blocks and starts tracking it.
    pub fn spawn_grid(&mut self) -> TargetRef {
        let id = self.next_id();
        let blocks = (0..self.blocks_per_grid)
            .map(|n| {
                let subtype = BLOCK_SUBTYPES[n as usize % BLOCK_SUBTYPES.len()];
                Arc::new(SimBlock {
                    id: self.next_id(),
                    subtype,
                }) as TargetRef
            })
            .collect();
        let grid: TargetRef = Arc::new(SimGrid {
            id,
            name: format!("Grid {}", self.grids.len() + 1),
            blocks,
        });
        self.grids.push(Arc::clone(&grid));
        grid
    }

    /// Stops tracking the oldest grid and returns it.
    pub fn despawn_grid(&mut self) -> Option<TargetRef> {
        (!self.grids.is_empty()).then(|| self.grids.remove(0))
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }
}

impl Host for SimHost {
    fn probe(&self) -> HostReadiness {
        let remaining = self.warmup.get();
        if remaining > 0 {
            self.warmup.set(remaining - 1);
            return HostReadiness {
                session: false,
                ..self.readiness
            };
        }
        self.readiness
    }

    fn existing_targets(&self) -> Vec<TargetRef> {
        self.grids.clone()
    }

    fn detach(&mut self) {
        self.attached = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(warmup_probes: u32) -> SimConfig {
        SimConfig {
            warmup_probes,
            grids: 1,
            blocks_per_grid: 4,
            ..SimConfig::default()
        }
    }

    #[test]
    fn test_ready_after_warmup() {
        let host = SimHost::new(&config(2));
        assert!(!host.probe().is_ready());
        assert!(!host.probe().is_ready());
        assert!(host.probe().is_ready());
    }

    #[test]
    fn test_grids_carry_blocks_with_subtypes() {
        let mut host = SimHost::new(&config(0));
        let grid = host.spawn_grid();
        let blocks = grid.children();
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0].subtype(), Some("reactor"));
        assert_eq!(blocks[3].subtype(), Some("reactor"));
        assert_eq!(host.existing_targets().len(), 2);

        let oldest = host.despawn_grid().unwrap();
        assert_ne!(oldest.id(), grid.id());
        assert_eq!(host.existing_targets().len(), 1);
    }
}
