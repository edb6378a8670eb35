//! Priority-ordered pending queue.
//!
//! Tasks that cannot be dispatched immediately wait here. Higher priority
//! tiers are drained first; within a tier, submission order is preserved.

use crate::task::TaskPriority;
use std::collections::VecDeque;

/// A three-tier FIFO queue keyed by [`TaskPriority`].
///
/// Only the dispatcher touches this structure, so it needs no internal
/// locking.
#[derive(Debug)]
pub struct PendingQueue<T> {
    tiers: [VecDeque<T>; 3],
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PendingQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            tiers: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
        }
    }

    /// Append an entry to the back of its priority tier.
    pub fn push(&mut self, priority: TaskPriority, entry: T) {
        self.tiers[priority.index()].push_back(entry);
    }

    /// Remove and return the next entry: front of the highest non-empty
    /// tier. Returns `None` when the queue is empty.
    pub fn pop(&mut self) -> Option<T> {
        for priority in TaskPriority::DESCENDING {
            if let Some(entry) = self.tiers[priority.index()].pop_front() {
                return Some(entry);
            }
        }
        None
    }

    /// Total entries across all tiers.
    pub fn len(&self) -> usize {
        self.tiers.iter().map(VecDeque::len).sum()
    }

    /// Whether every tier is empty.
    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(VecDeque::is_empty)
    }

    /// Remove and return every entry, highest tier first. Used during
    /// termination to settle queued submissions.
    pub fn drain(&mut self) -> Vec<T> {
        let mut drained = Vec::with_capacity(self.len());
        for priority in TaskPriority::DESCENDING {
            drained.extend(self.tiers[priority.index()].drain(..));
        }
        drained
    }
}
