//! Background jobs of the editor.
//!
//! [`JobController`] is how editor code runs a [`Task`] without freezing the
//! interface. Jobs are submitted with a title, run on their own worker, and
//! are collected on the interactive thread once they report a terminal
//! status: completed jobs get their `finalize` phase, failed jobs are
//! reported to the user as error messages.

use std::collections::HashMap;
use std::sync::Arc;

use dto_editor_core::{
    BoxedTask, DispatcherProxy, Task, WorkerError, WorkerId, WorkerManager,
};
use parking_lot::Mutex;

use crate::messages::{Message, MessageHandler};

/// What [`JobController::collect_finished`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectedJobs {
    /// Jobs whose tasks were finalized.
    pub completed: usize,
    /// Jobs reported as failed.
    pub failed: usize,
}

/// Runs editor jobs and finishes them on the interactive thread.
pub struct JobController {
    manager: WorkerManager<BoxedTask>,
    finished: Arc<Mutex<Vec<WorkerId>>>,
    titles: HashMap<WorkerId, String>,
    messages: Arc<dyn MessageHandler>,
}

impl JobController {
    /// Create a controller running each job on a dedicated thread.
    pub fn new(dispatcher: DispatcherProxy, messages: Arc<dyn MessageHandler>) -> Self {
        let manager = WorkerManager::<BoxedTask>::builder()
            .name("dto-job")
            .build(dispatcher);
        Self::with_manager(manager, messages)
    }

    /// Create a controller around an existing manager.
    pub fn with_manager(manager: WorkerManager<BoxedTask>, messages: Arc<dyn MessageHandler>) -> Self {
        let finished = Arc::new(Mutex::new(Vec::new()));
        let finished_clone = finished.clone();
        manager.status_changed().connect(move |change| {
            if change.status.is_terminal() {
                finished_clone.lock().push(change.worker);
            }
        });

        Self {
            manager,
            finished,
            titles: HashMap::new(),
            messages,
        }
    }

    /// Start `task` in the background.
    pub fn submit<T: Task>(&mut self, title: impl Into<String>, task: T) -> Result<WorkerId, WorkerError> {
        let title = title.into();
        let id = self.manager.start(Box::new(task))?;
        tracing::info!(target: "dto_editor::jobs", job = %id, %title, "job submitted");
        self.titles.insert(id, title);
        Ok(id)
    }

    /// Jobs submitted and not yet collected.
    pub fn active_jobs(&self) -> usize {
        self.manager.worker_count()
    }

    /// Jobs that reported completion and wait for [`collect_finished`](Self::collect_finished).
    pub fn ready_jobs(&self) -> usize {
        self.finished.lock().len()
    }

    /// The underlying worker manager.
    pub fn manager(&self) -> &WorkerManager<BoxedTask> {
        &self.manager
    }

    /// Finish every job that has reported a terminal status.
    ///
    /// Must run on the interactive thread: completed tasks are finalized
    /// here.
    pub fn collect_finished(&mut self) -> CollectedJobs {
        let ids: Vec<WorkerId> = std::mem::take(&mut *self.finished.lock());
        let mut collected = CollectedJobs::default();

        for id in ids {
            let title = self
                .titles
                .remove(&id)
                .unwrap_or_else(|| format!("Job {id}"));
            match self.manager.take_result(id) {
                Ok(Ok(mut task)) => {
                    task.finalize();
                    collected.completed += 1;
                    tracing::info!(target: "dto_editor::jobs", job = %id, %title, "job finished");
                }
                Ok(Err(failure)) => {
                    collected.failed += 1;
                    self.messages
                        .send_message(Message::error(title, failure.error().to_string()));
                }
                Err(err) => {
                    tracing::warn!(target: "dto_editor::jobs", job = %id, error = %err, "could not collect job");
                }
            }
        }
        collected
    }
}

impl std::fmt::Debug for JobController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobController")
            .field("active", &self.active_jobs())
            .field("ready", &self.ready_jobs())
            .finish()
    }
}
