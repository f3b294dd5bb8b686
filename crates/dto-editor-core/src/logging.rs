//! Logging facilities for the DTO editor core.
//!
//! The core is instrumented with the `tracing` crate. Nothing is printed
//! unless the host installs a subscriber; the `dto-editor` crate provides
//! `init_tracing` for that.
//!
//! Each subsystem logs under its own target so it can be filtered with an
//! env-filter directive such as `dto_editor_core::worker=debug`.

use std::time::Instant;

/// Target names for log filtering.
pub mod targets {
    /// Core crate target.
    pub const CORE: &str = "dto_editor_core";
    /// Interactive-thread dispatcher.
    pub const DISPATCHER: &str = "dto_editor_core::dispatcher";
    /// Signal/slot system.
    pub const SIGNAL: &str = "dto_editor_core::signal";
    /// Executors and thread pool.
    pub const THREADPOOL: &str = "dto_editor_core::threadpool";
    /// Single-task workers.
    pub const WORKER: &str = "dto_editor_core::worker";
    /// Worker registry.
    pub const WORKER_MANAGER: &str = "dto_editor_core::worker_manager";
    /// Performance spans.
    pub const PERF: &str = "dto_editor_core::perf";
}

/// A guard that times an operation.
///
/// The span stays entered until the guard is dropped; the elapsed time is
/// logged at `debug` level under [`targets::PERF`].
///
/// ```
/// use dto_editor_core::logging::PerfSpan;
///
/// let _span = PerfSpan::new("load_project");
/// // ... work ...
/// ```
pub struct PerfSpan {
    operation: &'static str,
    started: Instant,
    _span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    pub fn new(operation: &'static str) -> Self {
        let span = tracing::debug_span!(target: "dto_editor_core::perf", "perf", operation);
        Self {
            operation,
            started: Instant::now(),
            _span: span.entered(),
        }
    }

    /// Time elapsed since the span was created.
    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }
}

impl Drop for PerfSpan {
    fn drop(&mut self) {
        tracing::debug!(
            target: "dto_editor_core::perf",
            operation = self.operation,
            elapsed_us = self.started.elapsed().as_micros() as u64,
            "operation finished"
        );
    }
}
