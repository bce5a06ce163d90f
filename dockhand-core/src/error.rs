//! Error types for dockhand-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or saving dockhand documents.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None` — cannot locate `~/.dockhand/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The daemon configuration file did not exist at the expected path.
    #[error("configuration not found at {path}; run `dockhand init` first")]
    ConfigNotFound { path: PathBuf },

    /// `dockhand init` refused to replace an existing configuration.
    #[error("configuration already exists at {path}; pass --force to overwrite")]
    ConfigExists { path: PathBuf },

    /// No working-copy directory name can be derived from the repository URL.
    #[error("cannot derive a working-copy name from repository '{0}'; expected <...>/<name>.git")]
    InvalidRepository(String),
}

/// Convenience constructor for [`CoreError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
