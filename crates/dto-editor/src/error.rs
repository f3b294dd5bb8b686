//! Error types for the editor services.

use dto_editor_core::{CoreError, WorkerError};

use crate::settings::SettingsError;

/// The main error type for editor operations.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    /// Reading or writing a setting failed.
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
    /// A job could not be started or collected.
    #[error("Job error: {0}")]
    Job(#[from] WorkerError),
    /// Core infrastructure failure.
    #[error("Core error: {0}")]
    Core(#[from] CoreError),
    /// The log filter directive could not be parsed.
    #[error("invalid log filter: {0}")]
    LogFilter(#[from] tracing_subscriber::filter::ParseError),
    /// A global tracing subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    LogInstall(String),
}

/// A specialized Result type for editor operations.
pub type Result<T> = std::result::Result<T, EditorError>;
