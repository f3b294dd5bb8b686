//! Editor-level services for the DTO editor.
//!
//! Built on [`dto_editor_core`], this crate holds the pieces the editor's
//! views call into:
//!
//! - [`settings`]: injected key-value settings, window/font preferences and
//!   the recent-projects list
//! - [`messages`]: the channel for messages meant for the user
//! - [`jobs`]: background jobs that are finalized on the interactive thread
//! - [`init_tracing`]: log output for the host binary
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use dto_editor::{JobController, SignalMessageHandler};
//! use dto_editor::dto_editor_core::{Dispatcher, Task, TaskError};
//!
//! struct Validate(String);
//!
//! impl Task for Validate {
//!     fn run(&mut self) -> Result<(), TaskError> {
//!         if self.0.is_empty() {
//!             return Err("empty value".into());
//!         }
//!         Ok(())
//!     }
//!     fn finalize(&mut self) {}
//! }
//!
//! let dispatcher = Dispatcher::new();
//! let mut jobs = JobController::new(dispatcher.proxy(), Arc::new(SignalMessageHandler::new()));
//! jobs.submit("Validate name", Validate("name".into())).unwrap();
//!
//! assert!(dispatcher.run_until(|| jobs.ready_jobs() == 1, Duration::from_secs(5)));
//! assert_eq!(jobs.collect_finished().completed, 1);
//! ```

mod error;
pub mod jobs;
pub mod logging;
pub mod messages;
pub mod settings;

pub use error::{EditorError, Result};
pub use jobs::{CollectedJobs, JobController};
pub use logging::init_tracing;
pub use messages::{Message, MessageHandler, MessageSeverity, SignalMessageHandler};
pub use settings::{
    EditorSettings, FontSettings, MemorySettings, SettingsError, SettingsStore, SettingsStoreExt,
    SettingsValue, WindowGeometry,
};

// Re-export the core so hosts need a single dependency
pub use dto_editor_core;
