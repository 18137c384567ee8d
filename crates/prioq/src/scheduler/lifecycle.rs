use std::sync::Arc;
use std::thread;

use tracing::{debug, info, warn};

use crate::error::PrioqError;
use crate::task::RunOutcome;

use super::event_loop;
use super::Scheduler;

impl Scheduler {
    /// Start the scheduler loop on its own thread. A no-op if already active.
    ///
    /// If a previous loop is still draining after [`Scheduler::stop`], this
    /// blocks until it has exited so two loops never share the store.
    pub fn start(&self) -> Result<(), PrioqError> {
        // The wait for a draining loop happens without the lifecycle lock so
        // `stop` and `is_active` stay responsive meanwhile.
        let mut lifecycle = loop {
            let lifecycle = self.lifecycle.lock();
            if lifecycle.active {
                return Ok(());
            }
            if !self.shared.loop_flag.is_running() {
                break lifecycle;
            }
            drop(lifecycle);
            self.shared.loop_flag.wait_stopped();
        };

        if let Some(previous) = lifecycle.loop_handle.take() {
            if previous.join().is_err() {
                warn!("previous scheduler loop panicked");
            }
        }
        self.shared.mailbox.clear_stop();

        self.shared.loop_flag.set_running();
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(self.shared.config.loop_thread_name())
            .spawn(move || event_loop::run(shared));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.loop_flag.set_stopped();
                return Err(PrioqError::Spawn(e));
            }
        };

        lifecycle.loop_handle = Some(handle);
        lifecycle.active = true;
        // Pick up anything pushed while inactive.
        self.shared.mailbox.wake();
        info!(
            concurrency_limit = self.shared.config.concurrency_limit,
            queued = self.shared.store.len(),
            "scheduler started"
        );
        Ok(())
    }

    /// Request a stop. A no-op if not active.
    ///
    /// Returns immediately; the loop then pauses and requeues every running
    /// pausable task and waits for the remaining work functions to return.
    /// Use [`Scheduler::join`] to wait for that drain.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if !lifecycle.active {
            return;
        }
        lifecycle.active = false;
        self.shared.mailbox.request_stop();
        info!("scheduler stop requested");
    }

    /// Block until the loop has exited after a stop.
    ///
    /// Returns immediately if no loop thread is alive. Called while the
    /// scheduler is active, it waits for some other caller to stop it.
    pub fn join(&self) {
        self.shared.loop_flag.wait_stopped();
        let handle = {
            let mut lifecycle = self.lifecycle.lock();
            // A concurrent restart already reaped the old loop.
            if lifecycle.active {
                None
            } else {
                lifecycle.loop_handle.take()
            }
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("scheduler loop panicked");
            }
        }
    }

    /// Stop and wait for the drain to complete.
    pub fn shutdown(&self) {
        self.stop();
        self.join();
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle.lock().active
    }

    /// Resume every paused task left in the store and wait for it to return.
    /// Tasks that never started are discarded.
    ///
    /// Only called once the loop has exited, so no further pause is requested.
    pub(super) fn finish_paused(&self) {
        let mut resumed = 0usize;
        while let Some(task) = self.shared.store.pop() {
            if !task.is_paused() {
                warn!(task = %task.label(), "discarding queued task that never started");
                continue;
            }
            if task.run(&self.shared) == RunOutcome::Resumed {
                self.shared.stats.record_resume();
                debug!(task = %task.label(), "resumed to finish without a scheduler loop");
                resumed += 1;
            }
        }
        if resumed > 0 {
            info!(resumed, "waiting for paused tasks to finish");
            self.shared.in_flight.wait_zero();
        }
    }
}
