use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Scheduler counters, updated from the loop and execution threads.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pushed: AtomicU64,
    started: AtomicU64,
    resumed: AtomicU64,
    preempted: AtomicU64,
    finished: AtomicU64,
    panicked: AtomicU64,
    races_lost: AtomicU64,
}

impl Counters {
    pub(crate) fn record_push(&self) {
        self.pushed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_start(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_resume(&self) {
        self.resumed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_preemption(&self) {
        self.preempted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_finished(&self) {
        self.finished.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_panic(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_race_lost(&self) {
        self.races_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, queued: usize, in_flight: usize) -> SchedulerStats {
        SchedulerStats {
            tasks_pushed: self.pushed.load(Ordering::Relaxed),
            tasks_started: self.started.load(Ordering::Relaxed),
            tasks_resumed: self.resumed.load(Ordering::Relaxed),
            tasks_preempted: self.preempted.load(Ordering::Relaxed),
            tasks_finished: self.finished.load(Ordering::Relaxed),
            tasks_panicked: self.panicked.load(Ordering::Relaxed),
            pause_races_lost: self.races_lost.load(Ordering::Relaxed),
            queued,
            in_flight,
        }
    }
}

/// Point-in-time view of scheduler activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Tasks accepted by `push`.
    pub tasks_pushed: u64,
    /// Work functions started on a fresh execution thread.
    pub tasks_started: u64,
    /// Paused tasks resumed in place.
    pub tasks_resumed: u64,
    /// Successful pauses, whether for preemption or during stop.
    pub tasks_preempted: u64,
    /// Work functions that returned or panicked.
    pub tasks_finished: u64,
    /// Work functions that panicked.
    pub tasks_panicked: u64,
    /// Pause requests that lost the race to completion.
    pub pause_races_lost: u64,
    /// Tasks waiting in the store.
    pub queued: usize,
    /// Execution threads actively running a work function.
    pub in_flight: usize,
}
