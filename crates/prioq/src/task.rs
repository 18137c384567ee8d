//! Schedulable units of work and their per-task state machine.
//!
//! Every [`Task`] owns one lock + condition variable pair guarding its
//! [`Phase`]. The scheduler loop, the task's execution thread and any
//! [`Task::wait_finished`] callers all coordinate through it:
//!
//! ```text
//! Idle -> Queued -> Running -> Finished
//!                     |  ^
//!      PauseRequested |  | resume
//!                     v  |
//!                    Paused (requeued)
//! ```
//!
//! A pause request resolves to exactly one of `Paused` (the work function
//! reached a checkpoint first) or `Finished` (it returned first).

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::PrioqError;
use crate::pause::PauseHandle;
use crate::scheduler::Shared;
use crate::signal::{InFlight, InFlightGuard};

/// Body of a task. Runs at most once; a paused body continues in place.
pub type Work = Box<dyn FnOnce(&PauseHandle) + Send + 'static>;

/// Unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, used in thread names and logs.
    pub fn short(&self) -> String {
        let mut s = self.0.simple().to_string();
        s.truncate(8);
        s
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Externally visible task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Created but never pushed.
    Idle,
    /// Waiting in the priority store, never started.
    Queued,
    /// Work function is executing (a pending pause request still counts).
    Running,
    /// Suspended at a checkpoint; sits in the store until resumed.
    Paused,
    /// Work function returned (or panicked).
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle,
    Queued,
    Running,
    PauseRequested,
    Paused,
    Finished,
}

impl From<Phase> for TaskState {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Idle => TaskState::Idle,
            Phase::Queued => TaskState::Queued,
            Phase::Running | Phase::PauseRequested => TaskState::Running,
            Phase::Paused => TaskState::Paused,
            Phase::Finished => TaskState::Finished,
        }
    }
}

/// The per-task synchronization primitive.
#[derive(Debug)]
pub(crate) struct Control {
    phase: Mutex<Phase>,
    changed: Condvar,
}

impl Control {
    fn new() -> Self {
        Self {
            phase: Mutex::new(Phase::Idle),
            changed: Condvar::new(),
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    /// Park the calling execution thread if a pause has been requested.
    ///
    /// Returns `true` if the thread was parked and has since been resumed.
    pub(crate) fn checkpoint(&self) -> bool {
        let mut phase = self.phase.lock();
        if *phase != Phase::PauseRequested {
            return false;
        }
        *phase = Phase::Paused;
        self.changed.notify_all();
        while *phase == Phase::Paused {
            self.changed.wait(&mut phase);
        }
        true
    }

    pub(crate) fn pause_requested(&self) -> bool {
        *self.phase.lock() == Phase::PauseRequested
    }

    fn finish(&self) {
        let mut phase = self.phase.lock();
        *phase = Phase::Finished;
        self.changed.notify_all();
    }
}

/// Result of asking a running task to pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PauseOutcome {
    /// The work function is parked at a checkpoint; requeue the task.
    Paused,
    /// The work function returned before observing the request.
    Finished,
    /// The task is not pausable or is not currently running.
    Ineligible,
}

/// What [`Task::run`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    Started,
    Resumed,
    /// The task could not be run; it has been reported finished.
    Failed,
    /// The task was in a state that cannot be run.
    Skipped,
}

/// A unit of schedulable work.
pub struct Task {
    id: TaskId,
    name: Option<String>,
    priority: i64,
    pausable: bool,
    sequence: OnceLock<u64>,
    control: Arc<Control>,
    work: Mutex<Option<Work>>,
}

impl Task {
    /// Create a task. Higher `priority` runs first.
    pub fn new<F>(priority: i64, pausable: bool, work: F) -> Arc<Self>
    where
        F: FnOnce(&PauseHandle) + Send + 'static,
    {
        Arc::new(Self::build(None, priority, pausable, Box::new(work)))
    }

    /// Create a task with a human-readable name for logging.
    pub fn named<F>(name: impl Into<String>, priority: i64, pausable: bool, work: F) -> Arc<Self>
    where
        F: FnOnce(&PauseHandle) + Send + 'static,
    {
        Arc::new(Self::build(Some(name.into()), priority, pausable, Box::new(work)))
    }

    fn build(name: Option<String>, priority: i64, pausable: bool, work: Work) -> Self {
        Self {
            id: TaskId::new(),
            name,
            priority,
            pausable,
            sequence: OnceLock::new(),
            control: Arc::new(Control::new()),
            work: Mutex::new(Some(work)),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn is_pausable(&self) -> bool {
        self.pausable
    }

    pub fn state(&self) -> TaskState {
        self.control.phase().into()
    }

    /// True while the work function is suspended mid-execution.
    pub fn is_paused(&self) -> bool {
        self.control.phase() == Phase::Paused
    }

    /// Block until the work function has returned for the final time.
    pub fn wait_finished(&self) {
        let mut phase = self.control.phase.lock();
        while *phase != Phase::Finished {
            self.control.changed.wait(&mut phase);
        }
    }

    /// Like [`Task::wait_finished`] but gives up after `timeout`.
    ///
    /// Returns `true` if the task finished in time.
    pub fn wait_finished_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut phase = self.control.phase.lock();
        while *phase != Phase::Finished {
            if self.control.changed.wait_until(&mut phase, deadline).timed_out() {
                return *phase == Phase::Finished;
            }
        }
        true
    }

    /// Label used in logs: the name if set, otherwise the short id.
    pub(crate) fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.short())
    }

    /// FIFO tie-break key, fixed at the first push and kept across requeues.
    pub(crate) fn sequence(&self, next: impl FnOnce() -> u64) -> u64 {
        *self.sequence.get_or_init(next)
    }

    /// Move a fresh task into the queued state.
    pub(crate) fn submit(&self) -> Result<(), PrioqError> {
        let mut phase = self.control.phase.lock();
        if *phase != Phase::Idle {
            return Err(PrioqError::AlreadySubmitted(self.id));
        }
        *phase = Phase::Queued;
        Ok(())
    }

    /// Start the task on a new execution thread, or resume it in place if it
    /// was paused.
    pub(crate) fn run(self: &Arc<Self>, shared: &Arc<Shared>) -> RunOutcome {
        let mut phase = self.control.phase.lock();
        match *phase {
            Phase::Paused => {
                shared.in_flight.acquire();
                *phase = Phase::Running;
                self.control.changed.notify_all();
                debug!(task = %self.label(), priority = self.priority, "task resumed");
                RunOutcome::Resumed
            }
            Phase::Queued => {
                *phase = Phase::Running;
                drop(phase);
                self.spawn(shared)
            }
            other => {
                warn!(task = %self.label(), phase = ?other, "refusing to run task");
                RunOutcome::Skipped
            }
        }
    }

    fn spawn(self: &Arc<Self>, shared: &Arc<Shared>) -> RunOutcome {
        let Some(work) = self.work.lock().take() else {
            warn!(task = %self.label(), "task has no work left to run");
            self.complete(shared);
            return RunOutcome::Failed;
        };

        shared.in_flight.acquire();
        let task = Arc::clone(self);
        let thread_shared = Arc::clone(shared);
        let spawned = thread::Builder::new()
            .name(shared.config.task_thread_name(&self.id.short()))
            .spawn(move || task.execute(work, thread_shared));

        match spawned {
            Ok(_) => {
                debug!(task = %self.label(), priority = self.priority, "task started");
                RunOutcome::Started
            }
            Err(e) => {
                error!(task = %self.label(), error = %e, "failed to spawn execution thread");
                self.complete(shared);
                shared.in_flight.release();
                RunOutcome::Failed
            }
        }
    }

    /// Body of the execution thread.
    fn execute(self: Arc<Self>, work: Work, shared: Arc<Shared>) {
        // Declaration order matters: the finish report is dropped (sent)
        // before the in-flight slot is released.
        let _in_flight = InFlightGuard::adopt(&shared.in_flight);
        let _finish = FinishGuard {
            task: &self,
            shared: &shared,
        };
        let handle = PauseHandle::new(self.id, Arc::clone(&self.control));

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| work(&handle))) {
            shared.stats.record_panic();
            warn!(
                task = %self.label(),
                reason = %panic_message(payload.as_ref()),
                "work function panicked"
            );
        }
    }

    /// Mark finished and notify the scheduler loop.
    fn complete(&self, shared: &Shared) {
        self.control.finish();
        shared.stats.record_finished();
        shared.mailbox.report_finished(self.id);
        debug!(task = %self.label(), "task finished");
    }

    /// Ask the running task to park at its next checkpoint.
    ///
    /// Blocks until the work function either parks or returns. An
    /// uncooperative pausable task that never checks blocks the caller
    /// indefinitely.
    pub(crate) fn pause(&self, in_flight: &InFlight) -> PauseOutcome {
        if !self.pausable {
            return PauseOutcome::Ineligible;
        }
        let mut phase = self.control.phase.lock();
        match *phase {
            Phase::Running => {}
            Phase::Finished => return PauseOutcome::Finished,
            _ => return PauseOutcome::Ineligible,
        }

        *phase = Phase::PauseRequested;
        while *phase == Phase::PauseRequested {
            self.control.changed.wait(&mut phase);
        }

        if *phase == Phase::Paused {
            in_flight.release();
            debug!(task = %self.label(), priority = self.priority, "task paused");
            PauseOutcome::Paused
        } else {
            PauseOutcome::Finished
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("pausable", &self.pausable)
            .field("state", &self.state())
            .finish()
    }
}

/// Reports completion when the execution thread leaves the work function,
/// whether it returned or unwound.
struct FinishGuard<'a> {
    task: &'a Task,
    shared: &'a Shared,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.task.complete(self.shared);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
