//! prioq - priority task scheduler with cooperative preemption.
//!
//! Tasks are pushed into a priority store and executed by a single control
//! thread, at most `concurrency_limit` (default 1) at a time. When a strictly
//! higher-priority task is waiting and no slot is free, a lower-priority
//! *pausable* task is asked to park at its next [`PauseHandle::check`]; it is
//! requeued and later resumed on its original thread, from where it stopped.
//!
//! ```ignore
//! use prioq::{Scheduler, Task};
//!
//! let scheduler = Scheduler::new();
//! scheduler.push(Task::new(1, true, |pause| {
//!     for _ in 0..5 {
//!         pause.check();
//!         step();
//!     }
//! }))?;
//! scheduler.start()?;
//! scheduler.push(Task::new(3, false, |_| urgent()))?;
//! // ...
//! scheduler.shutdown();
//! ```

pub mod config;
pub mod error;
pub mod pause;
pub mod scheduler;
pub mod stats;
pub mod task;

mod signal;
mod store;

pub use config::SchedulerConfig;
pub use error::PrioqError;
pub use pause::PauseHandle;
pub use scheduler::Scheduler;
pub use stats::SchedulerStats;
pub use task::{Task, TaskId, TaskState, Work};
