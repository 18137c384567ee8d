use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::SchedulerConfig;
use crate::error::PrioqError;
use crate::signal::{InFlight, LoopFlag, Mailbox};
use crate::stats::{Counters, SchedulerStats};
use crate::store::PriorityStore;
use crate::task::Task;

/// State shared by the scheduler handle, its loop thread and every
/// execution thread it spawns.
pub(crate) struct Shared {
    pub(crate) config: SchedulerConfig,
    pub(crate) store: PriorityStore,
    pub(crate) mailbox: Arc<Mailbox>,
    pub(crate) in_flight: InFlight,
    pub(crate) stats: Counters,
    pub(crate) loop_flag: LoopFlag,
}

pub(super) struct Lifecycle {
    pub(super) active: bool,
    pub(super) loop_handle: Option<std::thread::JoinHandle<()>>,
}

/// The task scheduler. Runs at most `concurrency_limit` work functions at a
/// time, highest priority first, pausing lower-priority pausable work when a
/// strictly higher-priority task is waiting and no slot is free.
///
/// Dropping the scheduler stops it and waits for the drain, then lets any
/// paused task run to completion. Queued tasks that never started are
/// discarded.
pub struct Scheduler {
    pub(super) shared: Arc<Shared>,
    pub(super) lifecycle: Mutex<Lifecycle>,
}

impl Scheduler {
    /// Create an inactive single-worker scheduler.
    pub fn new() -> Self {
        Self::build(SchedulerConfig::default())
    }

    /// Create an inactive scheduler from a validated config.
    pub fn with_config(config: SchedulerConfig) -> Result<Self, PrioqError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SchedulerConfig) -> Self {
        let mailbox = Arc::new(Mailbox::new());
        let shared = Shared {
            config,
            store: PriorityStore::new(Arc::clone(&mailbox)),
            mailbox,
            in_flight: InFlight::new(),
            stats: Counters::default(),
            loop_flag: LoopFlag::new(),
        };
        Self {
            shared: Arc::new(shared),
            lifecycle: Mutex::new(Lifecycle {
                active: false,
                loop_handle: None,
            }),
        }
    }

    /// Enqueue a task. Safe to call before or after [`Scheduler::start`].
    ///
    /// Each task can be pushed once; requeueing after a pause is internal.
    pub fn push(&self, task: Arc<Task>) -> Result<(), PrioqError> {
        task.submit()?;
        self.shared.stats.record_push();
        debug!(task = %task.label(), priority = task.priority(), "task queued");
        self.shared.store.push(task);
        Ok(())
    }

    /// Number of tasks waiting in the store, including paused ones.
    /// Running tasks are not counted.
    pub fn len(&self) -> usize {
        self.shared.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Execution threads currently running a work function.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.get()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Get a snapshot of the scheduler counters.
    pub fn stats(&self) -> SchedulerStats {
        self.shared
            .stats
            .snapshot(self.shared.store.len(), self.shared.in_flight.get())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
        self.finish_paused();
    }
}
