//! Error types for dockhand-reconcile.

use std::path::PathBuf;

use thiserror::Error;

use dockhand_core::CoreError;

/// All errors that can arise from a reconciliation pass or a direct action.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Configuration or settings document failure.
    #[error("configuration error: {0}")]
    Core(#[from] CoreError),

    /// A change-status code with no known meaning. Fatal for the pass.
    #[error("unknown operation '{status}' in change line {line:?}")]
    UnknownOperation { status: String, line: String },

    /// A rename or copy line without its second path.
    #[error("malformed change line {line:?}: {reason}")]
    MalformedRecord { line: String, reason: &'static str },

    /// An external command could not be started.
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// An external command exited unsuccessfully.
    #[error("{command} failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A service name that is not a single directory component.
    #[error("invalid service name '{0}'")]
    InvalidService(String),

    /// `Admission::Reject` and another pass holds the gate.
    #[error("a reconciliation pass is already in progress")]
    PassInProgress,
}

/// Convenience constructor for [`ReconcileError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ReconcileError {
    ReconcileError::Io {
        path: path.into(),
        source,
    }
}
