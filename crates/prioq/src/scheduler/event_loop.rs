use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::signal::{Event, LoopFlag};
use crate::task::{PauseOutcome, RunOutcome, Task, TaskId};

use super::Shared;

/// Body of the scheduler thread. Returns once a stop has been drained.
pub(super) fn run(shared: Arc<Shared>) {
    let _exit = ExitGuard(&shared.loop_flag);
    let mut event_loop = EventLoop::new(&shared);
    info!("scheduler loop running");

    loop {
        match shared.mailbox.next() {
            Event::Finished(id) => event_loop.on_finished(id),
            Event::Wake => event_loop.on_wake(),
            Event::Stop => {
                event_loop.on_stop();
                break;
            }
        }
    }

    let stale = shared.mailbox.clear_finished();
    info!(
        queued = shared.store.len(),
        stale_reports = stale,
        "scheduler loop stopped"
    );
}

/// Marks the loop as exited even if it unwinds.
struct ExitGuard<'a>(&'a LoopFlag);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.0.set_stopped();
    }
}

/// Loop-local state. The running set is only ever touched from the loop
/// thread, so it needs no lock.
pub(super) struct EventLoop<'a> {
    shared: &'a Arc<Shared>,
    running: HashMap<TaskId, Arc<Task>>,
}

impl<'a> EventLoop<'a> {
    pub(super) fn new(shared: &'a Arc<Shared>) -> Self {
        Self {
            shared,
            running: HashMap::new(),
        }
    }

    fn limit(&self) -> usize {
        self.shared.config.concurrency_limit
    }

    /// A work function returned: free its slot and re-evaluate.
    pub(super) fn on_finished(&mut self, id: TaskId) {
        if self.running.remove(&id).is_some() {
            trace!(task = %id.short(), running = self.running.len(), "slot freed");
        }
        self.shared.mailbox.wake();
    }

    /// Fill free slots from the store head, preempting lower-priority
    /// pausable work when no slot is free.
    pub(super) fn on_wake(&mut self) {
        trace!(queued = self.shared.store.len(), running = self.running.len(), "wake");
        while let Some(head) = self.shared.store.peek() {
            if self.running.len() < self.limit() {
                self.start_next();
                continue;
            }
            if !self.preempt_for(&head) {
                // The head waits for the next completion.
                break;
            }
        }
    }

    /// Pop the store head and run it.
    fn start_next(&mut self) {
        let Some(task) = self.shared.store.pop() else {
            return;
        };
        match task.run(self.shared) {
            RunOutcome::Started => {
                self.shared.stats.record_start();
                self.running.insert(task.id(), task);
            }
            RunOutcome::Resumed => {
                self.shared.stats.record_resume();
                self.running.insert(task.id(), task);
            }
            RunOutcome::Failed => {}
            RunOutcome::Skipped => {
                warn!(
                    task = %task.label(),
                    state = ?task.state(),
                    "dropping unrunnable task from the store"
                );
            }
        }
    }

    /// Try to pause one running task of strictly lower priority than `head`,
    /// lowest priority first. On success the victim is requeued and the head
    /// started in its slot.
    fn preempt_for(&mut self, head: &Arc<Task>) -> bool {
        let mut candidates: Vec<Arc<Task>> = self
            .running
            .values()
            .filter(|t| t.is_pausable() && t.priority() < head.priority())
            .cloned()
            .collect();
        candidates.sort_by_key(|t| t.priority());

        for victim in candidates {
            match victim.pause(&self.shared.in_flight) {
                PauseOutcome::Paused => {
                    info!(
                        preempted = %victim.label(),
                        preempted_priority = victim.priority(),
                        by = %head.label(),
                        by_priority = head.priority(),
                        "preempting task"
                    );
                    self.running.remove(&victim.id());
                    self.shared.stats.record_preemption();
                    self.shared.store.push(victim);
                    self.start_next();
                    return true;
                }
                PauseOutcome::Finished => {
                    // Its completion report will free the slot.
                    self.shared.stats.record_race_lost();
                    warn!(task = %victim.label(), "pause lost the race to completion");
                }
                PauseOutcome::Ineligible => {}
            }
        }
        false
    }

    /// Pause and requeue every running pausable task, then wait for all
    /// other work functions to return.
    pub(super) fn on_stop(&mut self) {
        info!(running = self.running.len(), "scheduler stopping");

        let pausable: Vec<Arc<Task>> = self
            .running
            .values()
            .filter(|t| t.is_pausable())
            .cloned()
            .collect();

        for task in pausable {
            match task.pause(&self.shared.in_flight) {
                PauseOutcome::Paused => {
                    self.running.remove(&task.id());
                    self.shared.stats.record_preemption();
                    debug!(task = %task.label(), "requeued on stop");
                    self.shared.store.push(task);
                }
                PauseOutcome::Finished => {
                    self.shared.stats.record_race_lost();
                    warn!(task = %task.label(), "pause on stop lost the race to completion");
                }
                PauseOutcome::Ineligible => {}
            }
        }

        info!(
            in_flight = self.shared.in_flight.get(),
            "waiting for in-flight tasks to drain"
        );
        self.shared.in_flight.wait_zero();
        self.running.clear();
    }

    #[cfg(test)]
    pub(super) fn running_ids(&self) -> Vec<TaskId> {
        self.running.keys().copied().collect()
    }
}
