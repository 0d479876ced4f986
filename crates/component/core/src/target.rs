//! Attachment targets.
//!
//! A target is a long-lived host object a component attaches to. The runtime
//! only needs a stable identity, the entity kind used to pick the right store,
//! and an optional structural sub-type for allow-list filtering.

use std::fmt;
use std::sync::Arc;

use crate::event::EventName;

/// Stable identity of a host entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TargetId(pub u64);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Entity kinds that get their own component store.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum TargetKind {
    /// A functional block placed on a grid.
    Block,
    /// A player or NPC body.
    Character,
    /// A structure made of blocks.
    Grid,
}

impl TargetKind {
    /// Event raised when a target of this kind is announced while already tracked.
    ///
    /// Blocks are re-announced whenever their grid splits or merges, so a repeat
    /// is expected and surfaces as [`EventName::BLOCK_GRID_CHANGE`]. For other
    /// kinds a repeat indicates a lifecycle bug and returns `None`.
    pub const fn reannounce_event(self) -> Option<EventName> {
        match self {
            TargetKind::Block => Some(EventName::BLOCK_GRID_CHANGE),
            TargetKind::Character | TargetKind::Grid => None,
        }
    }
}

/// Which store a component belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetScope {
    /// One instance per session, no target.
    Session,
    /// One instance per target of the given kind.
    Entity(TargetKind),
}

impl fmt::Display for TargetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetScope::Session => f.write_str("session"),
            TargetScope::Entity(kind) => write!(f, "{kind}"),
        }
    }
}

/// Host entity a component can attach to.
pub trait Target: Send + Sync + fmt::Debug {
    fn id(&self) -> TargetId;

    fn kind(&self) -> TargetKind;

    /// Structural sub-type (e.g. a block definition type), checked against
    /// component allow-lists.
    fn subtype(&self) -> Option<&str> {
        None
    }

    /// Human-readable name used in log lines.
    fn display_name(&self) -> String {
        format!("{} {}", self.kind(), self.id())
    }

    /// Sub-targets announced together with this one (e.g. the blocks of a grid).
    fn children(&self) -> Vec<TargetRef> {
        Vec::new()
    }
}

/// Shared handle to a host target.
pub type TargetRef = Arc<dyn Target>;
