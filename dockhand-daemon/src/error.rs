use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime, its triggers, and the socket client.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Core(#[from] dockhand_core::CoreError),

    #[error("reconcile error: {0}")]
    Reconcile(#[from] dockhand_reconcile::ReconcileError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

impl DaemonError {
    /// `true` when a trigger was turned away because another pass holds the
    /// gate.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            DaemonError::Reconcile(dockhand_reconcile::ReconcileError::PassInProgress)
        )
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
