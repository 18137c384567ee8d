//! Priority scheduler with cooperative preemption.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructors, push and accessors
//! - `lifecycle`: idempotent start/stop and the drain join
//! - `event_loop`: the single control thread that starts, preempts and
//!   requeues tasks

mod core;
mod event_loop;
mod lifecycle;

pub use self::core::Scheduler;
pub(crate) use self::core::Shared;
