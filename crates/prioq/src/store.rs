//! Mutex-guarded binary max-heap of pending tasks.
//!
//! Ordering is priority descending, then FIFO by the sequence number a task
//! receives on its first push. A preempted task keeps its number when it is
//! requeued, so it resumes ahead of equal-priority tasks pushed after it.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::signal::Mailbox;
use crate::task::Task;

struct Entry {
    priority: i64,
    sequence: u64,
    task: Arc<Task>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Earlier sequence numbers compare greater so they pop first.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Pending tasks, highest priority first. All operations lock internally.
pub(crate) struct PriorityStore {
    heap: Mutex<BinaryHeap<Entry>>,
    next_sequence: AtomicU64,
    mailbox: Arc<Mailbox>,
}

impl PriorityStore {
    pub(crate) fn new(mailbox: Arc<Mailbox>) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            next_sequence: AtomicU64::new(0),
            mailbox,
        }
    }

    /// Insert a task and raise a (coalesced) wake-up.
    pub(crate) fn push(&self, task: Arc<Task>) {
        let sequence = task.sequence(|| self.next_sequence.fetch_add(1, AtomicOrdering::Relaxed));
        let entry = Entry {
            priority: task.priority(),
            sequence,
            task,
        };
        self.heap.lock().push(entry);
        self.mailbox.wake();
    }

    /// Remove and return the highest-priority task.
    pub(crate) fn pop(&self) -> Option<Arc<Task>> {
        self.heap.lock().pop().map(|e| e.task)
    }

    /// Highest-priority task without removing it.
    pub(crate) fn peek(&self) -> Option<Arc<Task>> {
        self.heap.lock().peek().map(|e| Arc::clone(&e.task))
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.lock().len()
    }
}
