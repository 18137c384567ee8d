//! Scheduler error types.

use thiserror::Error;

use crate::task::TaskId;

/// Errors surfaced by the scheduler API.
///
/// Failures inside a work function are never reported here; the scheduler
/// treats a panicking body exactly like one that returned.
#[derive(Debug, Error)]
pub enum PrioqError {
    #[error("task {0} was already submitted")]
    AlreadySubmitted(TaskId),

    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),
}
