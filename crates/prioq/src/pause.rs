use std::sync::Arc;

use tracing::debug;

use crate::task::{Control, TaskId};

/// Cooperative pause handle passed to a running work function.
///
/// The scheduler can only suspend a pausable task at a [`PauseHandle::check`]
/// call. Work that never checks runs to completion, and a pause request sent
/// to it blocks the scheduler until it returns.
///
/// # Example
/// ```ignore
/// let task = Task::new(2, true, |pause| {
///     for chunk in chunks {
///         pause.check();
///         process(chunk);
///     }
/// });
/// ```
pub struct PauseHandle {
    task_id: TaskId,
    control: Arc<Control>,
}

impl PauseHandle {
    pub(crate) fn new(task_id: TaskId, control: Arc<Control>) -> Self {
        Self { task_id, control }
    }

    /// Checkpoint. Returns immediately unless a pause has been requested, in
    /// which case the calling thread parks here until the scheduler resumes
    /// the task.
    pub fn check(&self) {
        if self.control.checkpoint() {
            debug!(task = %self.task_id.short(), "checkpoint resumed");
        }
    }

    /// Non-blocking query: true if the scheduler is waiting for this task to
    /// reach a checkpoint. Never parks.
    pub fn pause_requested(&self) -> bool {
        self.control.pause_requested()
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }
}

impl std::fmt::Debug for PauseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PauseHandle")
            .field("task_id", &self.task_id)
            .field("pause_requested", &self.pause_requested())
            .finish()
    }
}
