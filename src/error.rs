//! Error types and error handling for orchestra.
//!
//! This module defines the error type used throughout the crate, the CLI exit
//! codes, and the deferred error collector used by the hook pipeline.

use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// CLI exit codes.
pub mod exit_code {
    /// Success
    pub const SUCCESS: i32 = 0;
    /// General error
    pub const GENERAL_ERROR: i32 = 1;
    /// Configuration error
    pub const CONFIG_ERROR: i32 = 2;
    /// Unknown service or stack in the selection
    pub const SELECTION_ERROR: i32 = 3;
    /// Include and exclude tokens mixed in one selection
    pub const MIXED_SELECTION: i32 = 4;
    /// A before/after hook failed
    pub const HOOK_ERROR: i32 = 5;
    /// Command line argument error
    pub const CLI_ERROR: i32 = 64;
}

/// Hook phase, used to report which side of a command failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    /// Runs before the wrapped action.
    Before,
    /// Runs after the wrapped action.
    After,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::Before => write!(f, "before"),
            HookPhase::After => write!(f, "after"),
        }
    }
}

/// The main error type for orchestra.
#[derive(Debug, Error)]
pub enum OrchestraError {
    /// Configuration file or manifest is invalid or cannot be loaded.
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A selection token matched neither a service nor a stack.
    #[error("Service or stack {name} not found")]
    UnknownTarget { name: String },

    /// Include and exclude tokens were mixed in one selection.
    #[error("You can't exclude and include services at the same time")]
    MixedSelection,

    /// A stack or service could not be discovered.
    #[error("Discovery error: {message}")]
    Discovery { message: String },

    /// A hook command line exited unsuccessfully.
    #[error("Command {command} exited with error ({phase} hook, {status})")]
    Hook {
        command: String,
        phase: HookPhase,
        status: String,
    },

    /// A program could not be spawned.
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OrchestraError {
    /// Returns the CLI exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            OrchestraError::Config { .. } | OrchestraError::Yaml(_) => exit_code::CONFIG_ERROR,
            OrchestraError::UnknownTarget { .. } => exit_code::SELECTION_ERROR,
            OrchestraError::MixedSelection => exit_code::MIXED_SELECTION,
            OrchestraError::Hook { .. } => exit_code::HOOK_ERROR,
            _ => exit_code::GENERAL_ERROR,
        }
    }

    /// Returns true if the process must stop immediately on this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OrchestraError::Config { .. } | OrchestraError::Yaml(_) | OrchestraError::MixedSelection
        )
    }

    /// Creates a configuration error with a message.
    pub fn config(message: impl Into<String>) -> Self {
        OrchestraError::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a configuration error with a message and source.
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        OrchestraError::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a discovery error.
    pub fn discovery(message: impl Into<String>) -> Self {
        OrchestraError::Discovery {
            message: message.into(),
        }
    }

    /// Creates an unknown target error.
    pub fn unknown_target(name: impl Into<String>) -> Self {
        OrchestraError::UnknownTarget { name: name.into() }
    }

    /// Creates a hook failure error.
    pub fn hook(command: impl Into<String>, phase: HookPhase, status: impl fmt::Display) -> Self {
        OrchestraError::Hook {
            command: command.into(),
            phase,
            status: status.to_string(),
        }
    }

    /// Creates a spawn error.
    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        OrchestraError::Spawn {
            program: program.into(),
            source,
        }
    }
}

/// Result type alias for orchestra operations.
pub type Result<T> = std::result::Result<T, OrchestraError>;

/// Shared sink for errors that must not interrupt the current command.
///
/// Hook failures and per-command failures are recorded here and turned into a
/// non-zero process exit code once the whole command has run.
#[derive(Debug, Clone, Default)]
pub struct ErrorCollector {
    errors: Arc<Mutex<Vec<OrchestraError>>>,
}

impl ErrorCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error.
    pub fn record(&self, error: OrchestraError) {
        tracing::error!(error = %error, "Recorded error");
        self.lock().push(error);
    }

    /// Returns true if any error has been recorded.
    pub fn has_errors(&self) -> bool {
        !self.lock().is_empty()
    }

    /// Returns the number of recorded errors.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes and returns every recorded error.
    pub fn take(&self) -> Vec<OrchestraError> {
        std::mem::take(&mut *self.lock())
    }

    /// Exit code of the first recorded error, or success.
    pub fn exit_code(&self) -> i32 {
        self.lock()
            .first()
            .map(OrchestraError::exit_code)
            .unwrap_or(exit_code::SUCCESS)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<OrchestraError>> {
        // A panicking recorder cannot leave the Vec half-written.
        self.errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_exit_code() {
        assert_eq!(
            OrchestraError::config("invalid yaml").exit_code(),
            exit_code::CONFIG_ERROR
        );
        assert_eq!(
            OrchestraError::unknown_target("api").exit_code(),
            exit_code::SELECTION_ERROR
        );
        assert_eq!(
            OrchestraError::MixedSelection.exit_code(),
            exit_code::MIXED_SELECTION
        );
        assert_eq!(
            OrchestraError::hook("make", HookPhase::Before, "exit status: 2").exit_code(),
            exit_code::HOOK_ERROR
        );
        assert_eq!(
            OrchestraError::discovery("bad stack").exit_code(),
            exit_code::GENERAL_ERROR
        );
    }

    #[test]
    fn test_error_is_fatal() {
        assert!(OrchestraError::config("missing").is_fatal());
        assert!(OrchestraError::MixedSelection.is_fatal());
        assert!(!OrchestraError::unknown_target("api").is_fatal());
        assert!(!OrchestraError::hook("make", HookPhase::After, "exit status: 1").is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = OrchestraError::unknown_target("payments/api");
        assert_eq!(format!("{}", err), "Service or stack payments/api not found");

        let err = OrchestraError::hook("make", HookPhase::Before, "exit status: 2");
        assert_eq!(
            format!("{}", err),
            "Command make exited with error (before hook, exit status: 2)"
        );
    }

    #[test]
    fn test_error_collector() {
        let collector = ErrorCollector::new();
        assert!(!collector.has_errors());
        assert_eq!(collector.exit_code(), exit_code::SUCCESS);

        let shared = collector.clone();
        shared.record(OrchestraError::hook("false", HookPhase::Before, "exit status: 1"));
        shared.record(OrchestraError::config("late"));

        assert!(collector.has_errors());
        assert_eq!(collector.len(), 2);
        assert_eq!(collector.exit_code(), exit_code::HOOK_ERROR);

        let taken = collector.take();
        assert_eq!(taken.len(), 2);
        assert!(collector.is_empty());
    }
}
