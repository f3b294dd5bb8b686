//! The two-phase unit of background work.
//!
//! A [`Task`] is created by the caller, moved into a [`Worker`](crate::Worker),
//! and moved back out once the worker reaches a terminal state:
//!
//! 1. [`Task::run`] executes on a background thread. It must not touch state
//!    owned by the interactive thread.
//! 2. [`Task::finalize`] is called by the caller, on the interactive thread,
//!    after retrieving the task from a completed worker. This is where results
//!    are published into user-interface state.
//!
//! # Example
//!
//! ```
//! use dto_editor_core::{Task, TaskError};
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//!
//! struct CountLines {
//!     text: String,
//!     lines: usize,
//!     published: Arc<Mutex<Option<usize>>>,
//! }
//!
//! impl Task for CountLines {
//!     fn run(&mut self) -> Result<(), TaskError> {
//!         self.lines = self.text.lines().count();
//!         Ok(())
//!     }
//!
//!     fn finalize(&mut self) {
//!         *self.published.lock() = Some(self.lines);
//!     }
//! }
//! ```

use std::any::Any;
use std::fmt;

/// A caller-defined unit of work with a background and an interactive phase.
pub trait Task: Send + 'static {
    /// Execute the work off the interactive thread.
    ///
    /// Returning `Err` or panicking marks the owning worker as failed.
    fn run(&mut self) -> Result<(), TaskError>;

    /// Publish results on the interactive thread after a successful run.
    fn finalize(&mut self);

    /// Name used in log output.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A heap-allocated task, for managers running heterogeneous work.
pub type BoxedTask = Box<dyn Task>;

impl<T: Task + ?Sized> Task for Box<T> {
    fn run(&mut self) -> Result<(), TaskError> {
        (**self).run()
    }

    fn finalize(&mut self) {
        (**self).finalize()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// How a task failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskErrorKind {
    /// `Task::run` returned an error.
    Failed,
    /// `Task::run` panicked.
    Panicked,
    /// The task never started because no background thread was available.
    NotStarted,
}

/// A failure raised while running a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskError {
    kind: TaskErrorKind,
    message: String,
}

impl TaskError {
    /// Create a failure with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: TaskErrorKind::Failed,
            message: message.into(),
        }
    }

    /// Create a failure from any error value.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::new(message)
    }

    /// Build the failure for a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "task panicked".to_string()
        };
        Self {
            kind: TaskErrorKind::Panicked,
            message,
        }
    }

    pub(crate) fn not_started(message: impl Into<String>) -> Self {
        Self {
            kind: TaskErrorKind::NotStarted,
            message: message.into(),
        }
    }

    /// How the task failed.
    pub fn kind(&self) -> TaskErrorKind {
        self.kind
    }

    /// Human-readable description.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the failure was a panic.
    pub fn is_panic(&self) -> bool {
        self.kind == TaskErrorKind::Panicked
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TaskErrorKind::Failed => write!(f, "task failed: {}", self.message),
            TaskErrorKind::Panicked => write!(f, "task panicked: {}", self.message),
            TaskErrorKind::NotStarted => write!(f, "task not started: {}", self.message),
        }
    }
}

impl std::error::Error for TaskError {}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
