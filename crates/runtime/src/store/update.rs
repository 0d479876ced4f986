//! Frequency-bucketed update scheduling shared by every store of a session.

use std::collections::BTreeMap;
use std::rc::Rc;

use component_core::{ActionId, ActionRef, Diagnostics};
use tracing::{trace, warn};

/// Outcome of one [`UpdateRegistry::tick`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdatePass {
    pub invoked: usize,
    /// Actions that failed and were swept from the registry.
    pub failed: Vec<ActionId>,
}

/// Update actions grouped by their tick frequency.
#[derive(Debug, Default)]
pub struct UpdateRegistry {
    buckets: BTreeMap<u32, Vec<ActionRef>>,
    frame: u64,
}

impl UpdateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames dispatched so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Adds `action` to the bucket of its frequency.
    pub fn register(&mut self, action: &ActionRef) {
        let frequency = action.frequency();
        if frequency == 0 {
            warn!(
                target: "component::update",
                handler = %action.label(),
                "Ignoring update registration without a frequency"
            );
            return;
        }
        trace!(
            target: "component::update",
            action = %action.id(),
            handler = %action.label(),
            frequency,
            "Registered update handler"
        );
        self.buckets
            .entry(frequency)
            .or_default()
            .push(Rc::clone(action));
    }

    /// Removes the action with `id`; returns whether it was registered.
    pub fn unregister(&mut self, id: ActionId) -> bool {
        let mut removed = false;
        for bucket in self.buckets.values_mut() {
            let before = bucket.len();
            bucket.retain(|action| action.id() != id);
            removed |= bucket.len() != before;
        }
        self.buckets.retain(|_, bucket| !bucket.is_empty());
        removed
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of actions registered at `frequency`.
    pub fn bucket_len(&self, frequency: u32) -> usize {
        self.buckets.get(&frequency).map_or(0, Vec::len)
    }

    /// Advances one frame and runs every bucket whose frequency divides it.
    ///
    /// Each due bucket runs from a snapshot; handlers that fail are swept
    /// out once the whole bucket has run.
    pub fn tick(&mut self, diagnostics: &Diagnostics) -> UpdatePass {
        self.frame += 1;
        let frame = self.frame;
        let mut pass = UpdatePass::default();

        for (frequency, bucket) in self.buckets.iter_mut() {
            if frame % u64::from(*frequency) != 0 {
                continue;
            }

            let snapshot = bucket.clone();
            let failed: Vec<ActionId> = snapshot
                .iter()
                .filter(|action| !action.try_invoke(diagnostics))
                .map(|action| action.id())
                .collect();
            pass.invoked += snapshot.len();

            if !failed.is_empty() {
                bucket.retain(|action| !failed.contains(&action.id()));
                pass.failed.extend(failed);
            }
        }

        self.buckets.retain(|_, bucket| !bucket.is_empty());
        pass
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use component_core::{EventAction, EventName, HandlerResult, SourceHandle};

    fn update(frequency: u32, invoke: impl Fn() -> HandlerResult + 'static) -> ActionRef {
        Rc::new(EventAction::new(
            EventName::UPDATE,
            frequency,
            0,
            "test.update",
            SourceHandle::new("tests"),
            invoke,
        ))
    }

    #[test]
    fn test_frequency_divides_frame() {
        let mut registry = UpdateRegistry::new();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        registry.register(&update(10, move || {
            counter.set(counter.get() + 1);
            Ok(())
        }));

        let diagnostics = Diagnostics::default();
        for _ in 0..100 {
            registry.tick(&diagnostics);
        }
        assert_eq!(calls.get(), 10);
        assert_eq!(registry.frame(), 100);
    }

    #[test]
    fn test_failed_handler_swept_siblings_survive() {
        let mut registry = UpdateRegistry::new();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);

        let broken = update(1, || Err("broken".into()));
        registry.register(&broken);
        registry.register(&update(1, move || {
            counter.set(counter.get() + 1);
            Ok(())
        }));

        let diagnostics = Diagnostics::default();
        assert_eq!(
            registry.tick(&diagnostics),
            UpdatePass {
                invoked: 2,
                failed: vec![broken.id()],
            }
        );
        assert_eq!(registry.bucket_len(1), 1);
        let pass = registry.tick(&diagnostics);
        assert_eq!(pass.invoked, 1);
        assert!(pass.failed.is_empty());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_unregister() {
        let mut registry = UpdateRegistry::new();
        let action = update(3, || Ok(()));
        registry.register(&action);
        registry.register(&update(0, || Ok(())));
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(action.id()));
        assert!(!registry.unregister(action.id()));
        assert!(registry.is_empty());
    }
}
