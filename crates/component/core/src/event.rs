//! Event name keys.
//!
//! Event names form an open vocabulary: any source can mint a new name and
//! bind handlers to it without the runtime knowing about it in advance. The
//! runtime itself only gives meaning to the names in [`EventName`]'s
//! associated constants.

use std::borrow::Cow;
use std::fmt;

/// Opaque, ordered key identifying an event.
///
/// Names compare lexicographically, which is the first key of the binding
/// order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct EventName(Cow<'static, str>);

impl EventName {
    /// Raised on a block that is announced again, e.g. after moving to another grid.
    pub const BLOCK_GRID_CHANGE: EventName = EventName::from_static("BlockGridChange");
    /// Raised on every instance of a target right before its state is dropped.
    pub const ENTITY_CLOSE: EventName = EventName::from_static("EntityClose");
    /// Raised once when the session closes.
    pub const SESSION_CLOSE: EventName = EventName::from_static("SessionClose");
    /// Raised when the host saves.
    pub const SESSION_SAVE: EventName = EventName::from_static("SessionSave");
    /// Fired at registration for stateless session components, which have no constructor.
    pub const STATELESS_INIT: EventName = EventName::from_static("StatelessInit");
    /// Name carried by every update binding.
    pub const UPDATE: EventName = EventName::from_static("Update");
    /// Raised when the host pauses ticking.
    pub const UPDATING_STOPPED: EventName = EventName::from_static("UpdatingStopped");
    /// Raised on the first tick after a pause.
    pub const UPDATING_RESUMED: EventName = EventName::from_static("UpdatingResumed");

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for EventName {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for EventName {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl AsRef<str> for EventName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_borrowed_and_owned_names_are_equal() {
        let owned = EventName::from(String::from("Update"));
        assert_eq!(owned, EventName::UPDATE);
    }

    #[test]
    fn test_lexicographic_order() {
        let mut names = vec![
            EventName::UPDATE,
            EventName::ENTITY_CLOSE,
            EventName::new("Docked"),
        ];
        names.sort();
        let names: Vec<&str> = names.iter().map(EventName::as_str).collect();
        assert_eq!(names, vec!["Docked", "EntityClose", "Update"]);
    }
}
