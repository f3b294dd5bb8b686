//! Error types for the DTO editor core.
//!
//! Two families live here. [`WorkerError`] and [`DispatchError`] describe
//! contract violations and infrastructure failures that are returned to the
//! caller immediately. Failures raised by a task's own work are *not* errors
//! of this kind: they are captured by the worker and surfaced in-band as a
//! [`TaskFailure`](crate::worker::TaskFailure).

use crate::worker::{WorkerId, WorkerStatus};

/// The main error type for core operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Worker or manager contract violation.
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
    /// Failed to reach the interactive thread.
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
    /// Thread pool construction or initialization failure.
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] ThreadPoolError),
}

/// Contract violations detected by [`Worker`](crate::Worker) and
/// [`WorkerManager`](crate::WorkerManager).
///
/// These indicate a programming error in the caller, not a runtime condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    /// `run()` was called on a worker that has already left `Idle`.
    #[error("worker {0} has already been started")]
    AlreadyStarted(WorkerId),
    /// A result was requested from a worker that was never started.
    #[error("worker {0} has not been started")]
    NotStarted(WorkerId),
    /// A result was requested before the worker reached a terminal state.
    #[error("worker {id} has not finished (status: {status})")]
    NotFinished {
        /// The worker that was queried.
        id: WorkerId,
        /// Its status at the time of the request.
        status: WorkerStatus,
    },
    /// The id is not tracked by this manager, or its result was already taken.
    #[error("worker {0} is not managed here or its result was already taken")]
    UnknownWorker(WorkerId),
    /// The worker's result slot is empty; the result has been handed out.
    #[error("result of worker {0} was already taken")]
    AlreadyTaken(WorkerId),
}

/// Errors raised when posting work to the interactive thread.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The [`Dispatcher`](crate::Dispatcher) has been dropped.
    #[error("the interactive dispatcher is no longer running")]
    Disconnected,
}

/// Thread pool errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThreadPoolError {
    /// Building the pool failed.
    #[error("failed to create thread pool: {0}")]
    CreationFailed(String),
    /// The executor could not start a job.
    #[error("failed to start background job: {0}")]
    SpawnFailed(String),
}

/// A specialized Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_finished_message_names_status() {
        let err = WorkerError::NotFinished {
            id: WorkerId::from_raw(7),
            status: WorkerStatus::Running,
        };
        assert_eq!(err.to_string(), "worker #7 has not finished (status: running)");
    }

    #[test]
    fn test_core_error_from_worker_error() {
        let err: CoreError = WorkerError::UnknownWorker(WorkerId::from_raw(3)).into();
        assert!(matches!(err, CoreError::Worker(WorkerError::UnknownWorker(_))));
        assert!(err.to_string().starts_with("Worker error:"));
    }
}
