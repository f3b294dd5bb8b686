//! Registry of in-flight workers.
//!
//! A [`WorkerManager`] starts tasks on fresh [`Worker`]s, keeps every worker
//! until its result is retrieved, and re-broadcasts all status changes on a
//! single signal. The manager lives on the interactive thread; its collection
//! is only touched through `&mut self` there, while background completions
//! touch nothing but their own worker's result slot.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use dto_editor_core::{Dispatcher, Task, TaskError, WorkerManager, WorkerStatus};
//!
//! struct Upper(String);
//!
//! impl Task for Upper {
//!     fn run(&mut self) -> Result<(), TaskError> {
//!         self.0 = self.0.to_uppercase();
//!         Ok(())
//!     }
//!     fn finalize(&mut self) {}
//! }
//!
//! let dispatcher = Dispatcher::new();
//! let mut manager = WorkerManager::<Upper>::builder()
//!     .name("doc-worker")
//!     .build(dispatcher.proxy());
//!
//! let id = manager.start(Upper("text".into())).unwrap();
//! assert_eq!(manager.worker_count(), 1);
//!
//! assert!(dispatcher.run_until(
//!     || manager.status(id) == Some(WorkerStatus::Completed),
//!     Duration::from_secs(5),
//! ));
//! let task = manager.take_result(id).unwrap().ok().unwrap();
//! assert_eq!(task.0, "TEXT");
//! assert_eq!(manager.worker_count(), 0);
//! ```

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use crate::dispatcher::DispatcherProxy;
use crate::error::WorkerError;
use crate::signal::Signal;
use crate::task::{BoxedTask, Task};
use crate::thread_check::ThreadAffinity;
use crate::threadpool::{Executor, ThreadSpawner, ThreadSpawnerConfig};
use crate::worker::{StatusChange, TaskOutcome, Worker, WorkerId, WorkerStatus};

/// Builder for a [`WorkerManager`].
///
/// By default every task runs on its own [`ThreadSpawner`] thread.
#[derive(Default)]
pub struct WorkerManagerBuilder {
    spawner: ThreadSpawnerConfig,
    executor: Option<Arc<dyn Executor>>,
}

impl WorkerManagerBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name prefix of spawned worker threads.
    pub fn name(mut self, name_prefix: impl Into<String>) -> Self {
        self.spawner.name_prefix = name_prefix.into();
        self
    }

    /// Set the stack size of spawned worker threads.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.spawner.stack_size = Some(size);
        self
    }

    /// Run tasks on `executor` instead of dedicated threads.
    ///
    /// Thread name and stack size settings are ignored when an executor is set.
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Build a manager bound to the dispatcher's interactive thread.
    pub fn build<T: Task>(self, dispatcher: DispatcherProxy) -> WorkerManager<T> {
        let executor = match self.executor {
            Some(executor) => executor,
            None => Arc::new(ThreadSpawner::new(self.spawner)),
        };
        WorkerManager::new(dispatcher, executor)
    }
}

impl fmt::Debug for WorkerManagerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerManagerBuilder")
            .field("spawner", &self.spawner)
            .field("executor", &self.executor.as_ref().map(|e| e.name().to_string()))
            .finish()
    }
}

/// Owns every worker started through it until the result is taken.
pub struct WorkerManager<T: Task = BoxedTask> {
    workers: HashMap<WorkerId, Worker<T>>,
    executor: Arc<dyn Executor>,
    dispatcher: DispatcherProxy,
    status_changed: Arc<Signal<StatusChange>>,
    affinity: ThreadAffinity,
}

impl<T: Task> WorkerManager<T> {
    /// Create a manager that runs tasks on `executor`.
    pub fn new(dispatcher: DispatcherProxy, executor: Arc<dyn Executor>) -> Self {
        tracing::debug!(
            target: "dto_editor_core::worker_manager",
            executor = executor.name(),
            "worker manager created"
        );
        Self {
            workers: HashMap::new(),
            executor,
            affinity: ThreadAffinity::for_thread(dispatcher.thread_id()),
            dispatcher,
            status_changed: Arc::new(Signal::new()),
        }
    }

    /// Start configuring a manager.
    pub fn builder() -> WorkerManagerBuilder {
        WorkerManagerBuilder::new()
    }

    /// Start `task` on a new worker and return the worker's id.
    ///
    /// The worker is `Running` (or already terminal) when this returns. There
    /// is no limit on the number of simultaneously running workers.
    pub fn start(&mut self, task: T) -> Result<WorkerId, WorkerError> {
        self.affinity
            .debug_assert_same_thread_with_msg("WorkerManager::start called off the interactive thread");

        let mut worker = Worker::new(task, self.executor.clone(), self.dispatcher.clone());
        let id = worker.id();

        let forward = self.status_changed.clone();
        worker
            .status_changed()
            .connect(move |change| forward.emit(*change));

        worker.run()?;
        self.workers.insert(id, worker);
        tracing::debug!(
            target: "dto_editor_core::worker_manager",
            worker = %id,
            active = self.workers.len(),
            "worker started"
        );
        Ok(id)
    }

    /// Number of workers whose result has not been taken yet.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Whether no workers are held.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Status of a held worker.
    pub fn status(&self, id: WorkerId) -> Option<WorkerStatus> {
        self.workers.get(&id).map(Worker::status)
    }

    /// Borrow a held worker.
    pub fn worker(&self, id: WorkerId) -> Option<&Worker<T>> {
        self.workers.get(&id)
    }

    /// Ids of all held workers, in no particular order.
    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.workers.keys().copied().collect()
    }

    /// Ids of held workers that have reached a terminal state.
    pub fn finished_ids(&self) -> Vec<WorkerId> {
        self.workers
            .iter()
            .filter(|(_, worker)| worker.status().is_terminal())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Signal re-emitting every held worker's status changes.
    ///
    /// Slots run on the interactive thread. Once a terminal status has been
    /// delivered, [`take_result`](Self::take_result) for that worker succeeds.
    pub fn status_changed(&self) -> &Signal<StatusChange> {
        &self.status_changed
    }

    /// Name of the executor running the tasks.
    pub fn executor_name(&self) -> &str {
        self.executor.name()
    }

    /// Take the task back from a terminal worker and forget the worker.
    ///
    /// Fails with [`WorkerError::NotFinished`] while the worker is still
    /// running (the worker stays held), and with
    /// [`WorkerError::UnknownWorker`] for an id that was never started here
    /// or whose result was already taken.
    pub fn take_result(&mut self, id: WorkerId) -> Result<TaskOutcome<T>, WorkerError> {
        self.affinity.debug_assert_same_thread_with_msg(
            "WorkerManager::take_result called off the interactive thread",
        );

        let entry = match self.workers.entry(id) {
            Entry::Occupied(entry) => entry,
            Entry::Vacant(_) => {
                tracing::error!(target: "dto_editor_core::worker_manager", worker = %id, "take_result for unknown worker");
                return Err(WorkerError::UnknownWorker(id));
            }
        };

        let status = entry.get().status();
        if !status.is_terminal() {
            tracing::error!(
                target: "dto_editor_core::worker_manager",
                worker = %id,
                %status,
                "take_result before the worker finished"
            );
            return Err(WorkerError::NotFinished { id, status });
        }

        let outcome = entry.remove().take_outcome();
        tracing::debug!(
            target: "dto_editor_core::worker_manager",
            worker = %id,
            %status,
            active = self.workers.len(),
            "worker result taken"
        );
        outcome
    }

    /// Block until a held worker finishes, then take its result.
    ///
    /// Blocks the interactive thread; prefer reacting to
    /// [`status_changed`](Self::status_changed).
    pub fn wait_for_result(&mut self, id: WorkerId) -> Result<TaskOutcome<T>, WorkerError> {
        match self.workers.get(&id) {
            Some(worker) => worker.wait_terminal()?,
            None => {
                tracing::error!(target: "dto_editor_core::worker_manager", worker = %id, "wait_for_result for unknown worker");
                return Err(WorkerError::UnknownWorker(id));
            }
        }
        self.take_result(id)
    }
}

impl<T: Task> fmt::Debug for WorkerManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerManager")
            .field("workers", &self.workers.len())
            .field("executor", &self.executor.name())
            .finish()
    }
}
