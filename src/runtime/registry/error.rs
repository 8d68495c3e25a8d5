//! Registry errors.

use thiserror::Error;

use super::task::TaskId;

/// Errors returned to registry callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry has been shut down and accepts no more tasks.
    #[error("task registry is shut down")]
    ShutDown,
}

/// Broken bookkeeping contract. Indicates a bug, never a runtime condition;
/// the registry logs it and panics.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    /// A completion arrived for a task that is not running.
    #[error("task {0} reported completion but is not running")]
    NotRunning(TaskId),

    /// A new task was given an id that is already registered.
    #[error("task id {0} is already registered")]
    DuplicateId(TaskId),
}
