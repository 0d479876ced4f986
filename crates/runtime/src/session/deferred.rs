//! Cross-thread queue of work for the driving thread.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::api::SessionError;
use crate::messaging::MessageRouter;
use crate::store::CollectionStore;

/// What a deferred task may touch when it runs.
pub(crate) struct TaskContext<'a> {
    pub(crate) store: &'a mut CollectionStore,
    pub(crate) router: &'a mut MessageRouter,
}

pub(crate) type Task = Box<dyn for<'a> FnOnce(TaskContext<'a>) + Send>;

#[derive(Default)]
struct QueueState {
    open: bool,
    tasks: Vec<Task>,
}

/// Push from any thread, drain on the driving thread.
#[derive(Default)]
pub(crate) struct DeferredQueue {
    state: Mutex<QueueState>,
}

impl DeferredQueue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn open(&self) {
        self.lock().open = true;
    }

    /// Stops accepting tasks and drops the pending ones; returns how many were dropped.
    pub(crate) fn close(&self) -> usize {
        let mut state = self.lock();
        state.open = false;
        std::mem::take(&mut state.tasks).len()
    }

    pub(crate) fn push(&self, what: &'static str, task: Task) -> Result<(), SessionError> {
        let mut state = self.lock();
        if !state.open {
            trace!(target: "component::deferred", what, "Dropping request for a closed session");
            return Err(SessionError::QueueClosed);
        }
        state.tasks.push(task);
        Ok(())
    }

    /// Takes every pending task in FIFO order. Tasks run after the lock is released.
    pub(crate) fn drain(&self) -> Vec<Task> {
        std::mem::take(&mut self.lock().tasks)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.lock().open
    }
}

impl fmt::Debug for DeferredQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("DeferredQueue")
            .field("open", &state.open)
            .field("pending", &state.tasks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_queue_rejects() {
        let queue = DeferredQueue::default();
        assert_eq!(
            queue.push("noop", Box::new(|_: TaskContext<'_>| {})).unwrap_err(),
            SessionError::QueueClosed
        );

        queue.open();
        queue.push("noop", Box::new(|_: TaskContext<'_>| {})).unwrap();
        queue.push("noop", Box::new(|_: TaskContext<'_>| {})).unwrap();
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.close(), 2);
        assert!(!queue.is_open());
        assert!(queue.drain().is_empty());
    }
}
