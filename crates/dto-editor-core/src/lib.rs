//! Core systems for the DTO editor.
//!
//! This crate provides the background-work plumbing of the editor:
//!
//! - **Dispatcher**: The interactive thread's work queue, reachable from any thread
//! - **Signal/Slot System**: Type-safe notifications with direct or queued delivery
//! - **Executors**: Dedicated-thread spawning and a rayon thread pool
//! - **Task**: The two-phase (`run` off-thread, `finalize` on the interactive thread) unit of work
//! - **Worker**: Runs one task in the background and hands it back
//! - **WorkerManager**: Owns in-flight workers until their results are taken
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use dto_editor_core::{Dispatcher, Task, TaskError, WorkerManager, WorkerStatus};
//!
//! struct AppendText {
//!     items: Vec<String>,
//!     pending: Option<String>,
//! }
//!
//! impl Task for AppendText {
//!     fn run(&mut self) -> Result<(), TaskError> {
//!         // Expensive work happens here, off the interactive thread
//!         self.pending = Some("text".to_string());
//!         Ok(())
//!     }
//!
//!     fn finalize(&mut self) {
//!         self.items.extend(self.pending.take());
//!     }
//! }
//!
//! let dispatcher = Dispatcher::new();
//! let mut manager = WorkerManager::<AppendText>::builder().build(dispatcher.proxy());
//!
//! let id = manager
//!     .start(AppendText { items: Vec::new(), pending: None })
//!     .unwrap();
//!
//! // Keep the interactive thread responsive while the task runs
//! assert!(dispatcher.run_until(
//!     || manager.status(id).is_some_and(WorkerStatus::is_terminal),
//!     Duration::from_secs(5),
//! ));
//!
//! let mut task = manager.take_result(id).unwrap().ok().unwrap();
//! assert!(task.items.is_empty());
//! task.finalize();
//! assert_eq!(task.items, vec!["text".to_string()]);
//! ```

mod dispatcher;
mod error;
pub mod invocation;
pub mod logging;
pub mod signal;
mod task;
pub mod thread_check;
pub mod threadpool;
pub mod worker;
mod worker_manager;

pub use dispatcher::{Dispatcher, DispatcherProxy};
pub use error::{CoreError, DispatchError, Result, ThreadPoolError, WorkerError};
pub use logging::PerfSpan;
pub use signal::{ConnectionId, ConnectionType, Signal};
pub use task::{BoxedTask, Task, TaskError, TaskErrorKind};
pub use thread_check::ThreadAffinity;
pub use threadpool::{
    Executor, Job, ThreadPool, ThreadPoolConfig, ThreadSpawner, ThreadSpawnerConfig,
};
pub use worker::{StatusChange, TaskFailure, TaskOutcome, Worker, WorkerId, WorkerStatus};
pub use worker_manager::{WorkerManager, WorkerManagerBuilder};
