//! Shared first-come-first-served task queue

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::task::TaskDescriptor;

/// Shared FIFO queue of task descriptors
///
/// Populated single-threaded before any worker starts; afterwards the only
/// operation is the non-blocking [`pop`](TaskQueue::pop), so each descriptor
/// is delivered to exactly one worker and an empty queue never blocks.
#[derive(Debug, Default)]
pub struct TaskQueue {
    inner: Mutex<VecDeque<TaskDescriptor>>,
}

impl TaskQueue {
    /// Build a queue from a task catalog, preserving catalog order
    pub fn new(tasks: impl IntoIterator<Item = TaskDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(tasks.into_iter().collect()),
        })
    }

    /// Claim the next task without blocking; `None` once the queue is drained
    pub fn pop(&self) -> Option<TaskDescriptor> {
        self.lock().pop_front()
    }

    /// Number of unclaimed tasks
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether every task has been claimed
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // The queue holds plain data, so a panic while holding the lock cannot
    // leave it in a torn state; recover instead of propagating the poison.
    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<TaskDescriptor>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
