//! Repository `settings.yml` — optional, lives at the working-copy root.
//!
//! ```yaml
//! start:
//!   - database
//!   - backend
//! ```
//!
//! Only `start` is recognised; other keys are ignored.

use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::types::{ServiceName, SETTINGS_FILE};

/// Settings read from the configuration repository itself.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Settings {
    /// Services to handle first, in this order.
    pub start: Vec<ServiceName>,
}

#[derive(Debug, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    start: Option<Vec<ServiceName>>,
}

impl Settings {
    pub fn new(start: Vec<ServiceName>) -> Self {
        Self { start }
    }

    /// Parse a settings document. An empty document means no settings.
    pub fn from_yaml(contents: &str, path: &Path) -> Result<Self, CoreError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let file: SettingsFile = serde_yaml::from_str(contents).map_err(|e| CoreError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self {
            start: file.start.unwrap_or_default(),
        })
    }

    /// Load `<repo_dir>/settings.yml`; a missing file yields empty settings.
    pub fn load_at(repo_dir: &Path) -> Result<Self, CoreError> {
        let path = repo_dir.join(SETTINGS_FILE);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::from_yaml(&contents, &path),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(io_err(path, err)),
        }
    }
}
