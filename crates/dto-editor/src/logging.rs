//! Log output for the editor.
//!
//! Library code only emits `tracing` events. The host binary calls
//! [`init_tracing`] once at startup to print them. The `RUST_LOG` environment
//! variable takes precedence over the default directive, e.g.
//! `RUST_LOG=dto_editor_core::worker=trace,dto_editor=debug`.

use tracing_subscriber::EnvFilter;

use crate::error::{EditorError, Result};

/// Target names for log filtering.
pub mod targets {
    /// Settings store and editor settings.
    pub const SETTINGS: &str = "dto_editor::settings";
    /// User messages.
    pub const MESSAGES: &str = "dto_editor::messages";
    /// Background jobs.
    pub const JOBS: &str = "dto_editor::jobs";
}

/// Default directive when `RUST_LOG` is not set.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Install a formatting subscriber filtered by `RUST_LOG` or `default_directive`.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(default_directive: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .map_err(|err| EditorError::LogInstall(err.to_string()))?;

    tracing::debug!(target: "dto_editor", directive = default_directive, "tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_directive_is_rejected() {
        // Only reached when RUST_LOG is unset; otherwise the env filter wins.
        if std::env::var_os("RUST_LOG").is_none() {
            let err = init_tracing("dto_editor=notalevel").unwrap_err();
            assert!(matches!(err, EditorError::LogFilter(_)));
        }
    }

    #[test]
    fn test_second_init_fails() {
        let first = init_tracing("warn");
        let second = init_tracing("warn");
        // Another test may have installed the subscriber first
        assert!(first.is_ok() || matches!(first, Err(EditorError::LogInstall(_))));
        assert!(matches!(second, Err(EditorError::LogInstall(_))));
    }
}
