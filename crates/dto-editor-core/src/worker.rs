//! Single-task workers.
//!
//! A [`Worker`] owns exactly one [`Task`] for its whole lifetime and drives it
//! through a small state machine:
//!
//! ```text
//! Idle ──run()──▶ Running ──Task::run returns Ok──▶ Completed
//!                    │
//!                    └──Task::run returns Err / panics──▶ Failed
//! ```
//!
//! `run()` flips the status to `Running` before it returns and hands the task
//! to an [`Executor`]. When the background job finishes, the outcome is stored
//! in the worker's result slot and the status becomes terminal. Retrieval
//! ([`Worker::wait_for_result`]) moves the task back to the caller, or yields
//! a [`TaskFailure`] if the run failed.
//!
//! Every transition emits [`Worker::status_changed`]. Emission is always
//! posted through the worker's [`DispatcherProxy`], so slots run on the
//! interactive thread and never concurrently with it. A terminal notification
//! is posted only after the status is stored, so a slot that sees
//! `Completed` can retrieve the result right away.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use dto_editor_core::{Dispatcher, Task, TaskError, ThreadSpawner, Worker, WorkerStatus};
//!
//! struct Sum(Vec<u64>, u64);
//!
//! impl Task for Sum {
//!     fn run(&mut self) -> Result<(), TaskError> {
//!         self.1 = self.0.iter().sum();
//!         Ok(())
//!     }
//!     fn finalize(&mut self) {}
//! }
//!
//! let dispatcher = Dispatcher::new();
//! let mut worker = Worker::new(Sum(vec![1, 2, 3], 0), Arc::new(ThreadSpawner::default()), dispatcher.proxy());
//! assert_eq!(worker.status(), WorkerStatus::Idle);
//!
//! worker.run().unwrap();
//! let task = worker.wait_for_result().unwrap().ok().unwrap();
//! assert_eq!(task.1, 6);
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::dispatcher::DispatcherProxy;
use crate::error::WorkerError;
use crate::logging::PerfSpan;
use crate::signal::Signal;
use crate::task::{Task, TaskError};
use crate::threadpool::{Executor, Job};

/// Global counter for generating worker IDs.
static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    fn next() -> Self {
        Self(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw u64 value of this worker ID.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a [`Worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkerStatus {
    /// Constructed with its task, not yet started.
    Idle = 0,
    /// `Task::run` is executing on a background thread.
    Running = 1,
    /// `Task::run` returned normally.
    Completed = 2,
    /// `Task::run` returned an error, panicked, or could not be started.
    Failed = 3,
}

impl WorkerStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Completed,
            _ => Self::Failed,
        }
    }

    /// Whether no further transition can occur.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Payload of a status-changed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    /// The worker that changed state.
    pub worker: WorkerId,
    /// Its new status.
    pub status: WorkerStatus,
}

/// A captured task failure.
///
/// The task is returned alongside the error when it is still in a defined
/// state, i.e. when `Task::run` returned `Err` or never started. After a
/// panic the task is dropped and [`task`](Self::task) is `None`.
pub struct TaskFailure<T> {
    error: TaskError,
    task: Option<T>,
}

impl<T> TaskFailure<T> {
    /// The error raised by the run.
    pub fn error(&self) -> &TaskError {
        &self.error
    }

    /// The task, if it is still usable.
    pub fn task(&self) -> Option<&T> {
        self.task.as_ref()
    }

    /// Take the task back, if it is still usable.
    pub fn into_task(self) -> Option<T> {
        self.task
    }

    /// Split into error and task.
    pub fn into_parts(self) -> (TaskError, Option<T>) {
        (self.error, self.task)
    }
}

impl<T> fmt::Debug for TaskFailure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFailure")
            .field("error", &self.error)
            .field("task_returned", &self.task.is_some())
            .finish()
    }
}

impl<T> fmt::Display for TaskFailure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<T> std::error::Error for TaskFailure<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Result of retrieving a task from a terminal worker.
pub type TaskOutcome<T> = Result<T, TaskFailure<T>>;

/// The worker's result slot.
struct Slot<T> {
    task: Option<T>,
    error: Option<TaskError>,
    taken: bool,
}

/// State shared between the worker handle and its background job.
struct Shared<T> {
    id: WorkerId,
    status: AtomicU8,
    slot: Mutex<Slot<T>>,
    finished: Condvar,
    status_changed: Arc<Signal<StatusChange>>,
    dispatcher: DispatcherProxy,
}

impl<T: Task> Shared<T> {
    fn status(&self) -> WorkerStatus {
        WorkerStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Post a status-changed emission to the interactive thread.
    fn notify(&self, status: WorkerStatus) {
        let signal = self.status_changed.clone();
        let change = StatusChange {
            worker: self.id,
            status,
        };
        if self.dispatcher.post(move || signal.emit(change)).is_err() {
            tracing::warn!(
                target: "dto_editor_core::worker",
                worker = %self.id,
                %status,
                "dispatcher gone, status notification dropped"
            );
        }
    }

    /// Body of the background job.
    fn execute(&self) {
        let Some(mut task) = self.slot.lock().task.take() else {
            tracing::error!(target: "dto_editor_core::worker", worker = %self.id, "background job found no task");
            return;
        };

        tracing::debug!(target: "dto_editor_core::worker", worker = %self.id, task = task.name(), "task started");
        let outcome = {
            let _span = PerfSpan::new("task_run");
            panic::catch_unwind(AssertUnwindSafe(|| task.run()))
        };

        match outcome {
            Ok(Ok(())) => self.complete(Some(task), None),
            Ok(Err(error)) => self.complete(Some(task), Some(error)),
            Err(payload) => {
                // The task may be half-updated; it is not handed back.
                drop(task);
                self.complete(None, Some(TaskError::from_panic(payload)));
            }
        }
    }

    /// Store the outcome, publish the terminal status, wake waiters, notify.
    fn complete(&self, task: Option<T>, error: Option<TaskError>) {
        let status = match &error {
            None => WorkerStatus::Completed,
            Some(error) => {
                tracing::warn!(target: "dto_editor_core::worker", worker = %self.id, %error, "task failed");
                WorkerStatus::Failed
            }
        };

        {
            let mut slot = self.slot.lock();
            slot.task = task;
            slot.error = error;
            self.status.store(status as u8, Ordering::Release);
            self.finished.notify_all();
        }

        tracing::debug!(target: "dto_editor_core::worker", worker = %self.id, %status, "worker finished");
        self.notify(status);
    }
}

/// Runs one [`Task`] off the interactive thread and hands it back.
pub struct Worker<T: Task> {
    shared: Arc<Shared<T>>,
    executor: Arc<dyn Executor>,
}

static_assertions::assert_impl_all!(Worker<crate::task::BoxedTask>: Send, Sync);

impl<T: Task> Worker<T> {
    /// Create an idle worker owning `task`.
    ///
    /// `executor` runs the task when [`run`](Self::run) is called; status
    /// notifications are delivered through `dispatcher`.
    pub fn new(task: T, executor: Arc<dyn Executor>, dispatcher: DispatcherProxy) -> Self {
        let id = WorkerId::next();
        tracing::trace!(target: "dto_editor_core::worker", worker = %id, task = task.name(), "worker created");
        Self {
            shared: Arc::new(Shared {
                id,
                status: AtomicU8::new(WorkerStatus::Idle as u8),
                slot: Mutex::new(Slot {
                    task: Some(task),
                    error: None,
                    taken: false,
                }),
                finished: Condvar::new(),
                status_changed: Arc::new(Signal::new()),
                dispatcher,
            }),
            executor,
        }
    }

    /// This worker's identity.
    pub fn id(&self) -> WorkerId {
        self.shared.id
    }

    /// Current status. Never blocks.
    pub fn status(&self) -> WorkerStatus {
        self.shared.status()
    }

    /// Signal emitted on the interactive thread for every status transition.
    pub fn status_changed(&self) -> &Signal<StatusChange> {
        &self.shared.status_changed
    }

    /// Start the task on the executor.
    ///
    /// Valid only while `Idle`. The status is `Running` when this returns,
    /// however long the task itself takes. If the executor cannot start the
    /// job, the worker moves straight on to `Failed`.
    pub fn run(&mut self) -> Result<(), WorkerError> {
        {
            let _slot = self.shared.slot.lock();
            let status = self.shared.status();
            if status != WorkerStatus::Idle {
                tracing::error!(target: "dto_editor_core::worker", worker = %self.id(), %status, "run() called twice");
                return Err(WorkerError::AlreadyStarted(self.id()));
            }
            self.shared
                .status
                .store(WorkerStatus::Running as u8, Ordering::Release);
        }
        self.shared.notify(WorkerStatus::Running);

        let shared = self.shared.clone();
        let job: Job = Box::new(move || shared.execute());
        if let Err(err) = self.executor.execute(job) {
            tracing::error!(
                target: "dto_editor_core::worker",
                worker = %self.id(),
                executor = self.executor.name(),
                error = %err,
                "could not start task"
            );
            // The job was never run, so the task is still in the slot.
            let task = self.shared.slot.lock().task.take();
            self.shared
                .complete(task, Some(TaskError::not_started(err.to_string())));
        }
        Ok(())
    }

    /// Block until the worker is terminal or `timeout` elapses.
    ///
    /// Returns `true` if the worker is terminal. Does not take the result.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        // `None` when the timeout overflows; wait without a deadline then.
        let deadline = Instant::now().checked_add(timeout);
        let mut slot = self.shared.slot.lock();
        loop {
            match self.shared.status() {
                WorkerStatus::Idle => return false,
                WorkerStatus::Running => match deadline {
                    Some(deadline) => {
                        if self.shared.finished.wait_until(&mut slot, deadline).timed_out() {
                            return self.shared.status().is_terminal();
                        }
                    }
                    None => self.shared.finished.wait(&mut slot),
                },
                WorkerStatus::Completed | WorkerStatus::Failed => return true,
            }
        }
    }

    /// Block until the worker is terminal and return the task.
    ///
    /// This is a deliberate blocking point; to stay responsive, poll
    /// [`status`](Self::status) or subscribe to
    /// [`status_changed`](Self::status_changed) instead.
    pub fn wait_for_result(self) -> Result<TaskOutcome<T>, WorkerError> {
        self.wait_terminal()?;
        self.take_outcome()
    }

    /// Block until terminal. Fails for a worker that was never started.
    pub(crate) fn wait_terminal(&self) -> Result<(), WorkerError> {
        let mut slot = self.shared.slot.lock();
        loop {
            match self.shared.status() {
                WorkerStatus::Idle => return Err(WorkerError::NotStarted(self.id())),
                WorkerStatus::Running => self.shared.finished.wait(&mut slot),
                WorkerStatus::Completed | WorkerStatus::Failed => return Ok(()),
            }
        }
    }

    /// Move the outcome out of a terminal worker.
    pub(crate) fn take_outcome(&self) -> Result<TaskOutcome<T>, WorkerError> {
        let mut slot = self.shared.slot.lock();
        let status = self.shared.status();
        match status {
            WorkerStatus::Idle => return Err(WorkerError::NotStarted(self.id())),
            WorkerStatus::Running => {
                return Err(WorkerError::NotFinished {
                    id: self.id(),
                    status,
                });
            }
            WorkerStatus::Completed | WorkerStatus::Failed => {}
        }
        if slot.taken {
            return Err(WorkerError::AlreadyTaken(self.id()));
        }
        slot.taken = true;

        match (slot.error.take(), slot.task.take()) {
            (None, Some(task)) => Ok(Ok(task)),
            (Some(error), task) => Ok(Err(TaskFailure { error, task })),
            (None, None) => Err(WorkerError::AlreadyTaken(self.id())),
        }
    }
}

impl<T: Task> fmt::Debug for Worker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id())
            .field("status", &self.status())
            .field("executor", &self.executor.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::error::ThreadPoolError;
    use crate::threadpool::ThreadSpawner;
    use crossbeam_channel::{Receiver, Sender, bounded};

    /// A task that blocks until released through a channel.
    struct GatedTask {
        gate: Receiver<()>,
        ran: bool,
        fail_with: Option<&'static str>,
        panic: bool,
    }

    impl GatedTask {
        fn new() -> (Self, Sender<()>) {
            let (sender, gate) = bounded(1);
            (
                Self {
                    gate,
                    ran: false,
                    fail_with: None,
                    panic: false,
                },
                sender,
            )
        }
    }

    impl Task for GatedTask {
        fn run(&mut self) -> Result<(), TaskError> {
            let _ = self.gate.recv_timeout(Duration::from_secs(10));
            self.ran = true;
            if self.panic {
                panic!("gated task exploded");
            }
            match self.fail_with {
                Some(message) => Err(TaskError::new(message)),
                None => Ok(()),
            }
        }

        fn finalize(&mut self) {}
    }

    fn spawner() -> Arc<dyn Executor> {
        Arc::new(ThreadSpawner::default())
    }

    #[test]
    fn test_new_worker_is_idle() {
        let dispatcher = Dispatcher::new();
        let (task, _gate) = GatedTask::new();
        let worker = Worker::new(task, spawner(), dispatcher.proxy());
        assert_eq!(worker.status(), WorkerStatus::Idle);
    }

    #[test]
    fn test_run_is_running_before_return() {
        let dispatcher = Dispatcher::new();
        let (task, gate) = GatedTask::new();
        let mut worker = Worker::new(task, spawner(), dispatcher.proxy());

        worker.run().unwrap();
        // The task is blocked on its gate, so nothing else could have moved it on
        assert_eq!(worker.status(), WorkerStatus::Running);

        gate.send(()).unwrap();
        assert!(worker.wait_timeout(Duration::from_secs(5)));
        assert_eq!(worker.status(), WorkerStatus::Completed);
    }

    #[test]
    fn test_wait_timeout_without_deadline() {
        let dispatcher = Dispatcher::new();
        let (task, gate) = GatedTask::new();
        let mut worker = Worker::new(task, spawner(), dispatcher.proxy());
        worker.run().unwrap();

        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            gate.send(()).unwrap();
        });

        assert!(worker.wait_timeout(Duration::MAX));
        assert_eq!(worker.status(), WorkerStatus::Completed);
        releaser.join().unwrap();
    }

    #[test]
    fn test_wait_for_result_returns_same_task() {
        let dispatcher = Dispatcher::new();
        let (task, gate) = GatedTask::new();
        let boxed = Box::new(task);
        let address = &*boxed as *const GatedTask;

        let mut worker = Worker::new(boxed, spawner(), dispatcher.proxy());
        worker.run().unwrap();
        gate.send(()).unwrap();

        let task = worker.wait_for_result().unwrap().ok().unwrap();
        assert_eq!(&*task as *const GatedTask, address);
        assert!(task.ran);
    }

    #[test]
    fn test_error_marks_failed_and_returns_task() {
        let dispatcher = Dispatcher::new();
        let (mut task, gate) = GatedTask::new();
        task.fail_with = Some("cannot parse size");
        let mut worker = Worker::new(task, spawner(), dispatcher.proxy());

        worker.run().unwrap();
        gate.send(()).unwrap();
        assert!(worker.wait_timeout(Duration::from_secs(5)));
        assert_eq!(worker.status(), WorkerStatus::Failed);

        let failure = worker.wait_for_result().unwrap().err().unwrap();
        assert_eq!(failure.error().message(), "cannot parse size");
        assert!(failure.task().is_some_and(|t| t.ran));
    }

    #[test]
    fn test_panic_marks_failed_without_task() {
        let dispatcher = Dispatcher::new();
        let (mut task, gate) = GatedTask::new();
        task.panic = true;
        let mut worker = Worker::new(task, spawner(), dispatcher.proxy());

        worker.run().unwrap();
        gate.send(()).unwrap();

        let failure = worker.wait_for_result().unwrap().err().unwrap();
        assert!(failure.error().is_panic());
        assert_eq!(failure.error().message(), "gated task exploded");
        assert!(failure.into_task().is_none());
    }

    #[test]
    fn test_run_twice_is_rejected() {
        let dispatcher = Dispatcher::new();
        let (task, gate) = GatedTask::new();
        let mut worker = Worker::new(task, spawner(), dispatcher.proxy());
        let id = worker.id();

        worker.run().unwrap();
        assert_eq!(worker.run(), Err(WorkerError::AlreadyStarted(id)));

        gate.send(()).unwrap();
        assert!(worker.wait_timeout(Duration::from_secs(5)));
        assert_eq!(worker.run(), Err(WorkerError::AlreadyStarted(id)));
    }

    #[test]
    fn test_wait_on_idle_worker_is_rejected() {
        let dispatcher = Dispatcher::new();
        let (task, _gate) = GatedTask::new();
        let worker = Worker::new(task, spawner(), dispatcher.proxy());
        let id = worker.id();

        assert!(!worker.wait_timeout(Duration::from_millis(10)));
        assert_eq!(
            worker.wait_for_result().err(),
            Some(WorkerError::NotStarted(id))
        );
    }

    #[test]
    fn test_take_outcome_while_running_is_rejected() {
        let dispatcher = Dispatcher::new();
        let (task, gate) = GatedTask::new();
        let mut worker = Worker::new(task, spawner(), dispatcher.proxy());
        worker.run().unwrap();

        assert!(matches!(
            worker.take_outcome(),
            Err(WorkerError::NotFinished {
                status: WorkerStatus::Running,
                ..
            })
        ));

        gate.send(()).unwrap();
        worker.wait_terminal().unwrap();
        assert!(worker.take_outcome().unwrap().is_ok());
        assert_eq!(
            worker.take_outcome().err(),
            Some(WorkerError::AlreadyTaken(worker.id()))
        );
    }

    #[test]
    fn test_notifications_arrive_in_order_on_interactive_thread() {
        let dispatcher = Dispatcher::new();
        let (task, gate) = GatedTask::new();
        let mut worker = Worker::new(task, spawner(), dispatcher.proxy());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        worker.status_changed().connect(move |change| {
            seen_clone
                .lock()
                .push((change.status, std::thread::current().id()));
        });

        worker.run().unwrap();
        // Queued, not emitted from inside run()
        assert!(seen.lock().is_empty());

        gate.send(()).unwrap();
        assert!(dispatcher.run_until(|| seen.lock().len() == 2, Duration::from_secs(5)));

        let here = std::thread::current().id();
        assert_eq!(
            *seen.lock(),
            vec![(WorkerStatus::Running, here), (WorkerStatus::Completed, here)]
        );

        // Nothing further is delivered
        dispatcher.process_for(Duration::from_millis(20));
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_terminal_status_visible_when_notified() {
        let dispatcher = Dispatcher::new();
        let (task, gate) = GatedTask::new();
        let mut worker = Worker::new(task, spawner(), dispatcher.proxy());
        let worker_status_at_notify = Arc::new(Mutex::new(None));

        // Run the worker from a shared handle so the slot can inspect it
        let shared = worker.shared.clone();
        let seen = worker_status_at_notify.clone();
        worker.status_changed().connect(move |change| {
            if change.status.is_terminal() {
                *seen.lock() = Some(shared.status());
            }
        });

        worker.run().unwrap();
        gate.send(()).unwrap();
        assert!(dispatcher.run_until(
            || worker_status_at_notify.lock().is_some(),
            Duration::from_secs(5)
        ));
        assert_eq!(*worker_status_at_notify.lock(), Some(WorkerStatus::Completed));
    }

    struct RefusingExecutor;

    impl Executor for RefusingExecutor {
        fn execute(&self, _job: Job) -> Result<(), ThreadPoolError> {
            Err(ThreadPoolError::SpawnFailed("no threads left".to_string()))
        }

        fn name(&self) -> &str {
            "refusing"
        }
    }

    #[test]
    fn test_executor_failure_marks_failed() {
        let dispatcher = Dispatcher::new();
        let (task, _gate) = GatedTask::new();
        let mut worker = Worker::new(task, Arc::new(RefusingExecutor), dispatcher.proxy());

        worker.run().unwrap();
        assert_eq!(worker.status(), WorkerStatus::Failed);

        let failure = worker.wait_for_result().unwrap().err().unwrap();
        assert_eq!(failure.error().kind(), crate::task::TaskErrorKind::NotStarted);
        assert!(failure.task().is_some_and(|t| !t.ran));
    }
}
