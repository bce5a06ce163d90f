//! Domain types shared by the reconciliation engine, daemon and CLI.
//!
//! A *service* is a top-level directory of the configuration repository; the
//! compose definition inside it is what makes it runtime-manageable.

use std::fmt;

use serde::{Deserialize, Serialize};

/// File name of the compose definition inside a service directory.
pub const COMPOSE_FILE: &str = "docker-compose.yml";

/// File name the externally managed environment file is copied to.
pub const ENV_FILE: &str = ".env";

/// Repository-level settings document, relative to the working-copy root.
pub const SETTINGS_FILE: &str = "settings.yml";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a deployable service (first path segment).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceName(pub String);

impl ServiceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ServiceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ServiceName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// A lifecycle operation queued for one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Up,
    Down,
    Restart,
}

impl Action {
    /// `true` for the actions executed after the working copy is advanced.
    pub fn runs_after_advance(self) -> bool {
        matches!(self, Action::Up | Action::Restart)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Up => write!(f, "up"),
            Action::Down => write!(f, "down"),
            Action::Restart => write!(f, "restart"),
        }
    }
}

/// Status letter of one name-status diff line.
///
/// Rename and copy carry git's similarity score when it was present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
    Renamed(Option<u8>),
    Copied(Option<u8>),
    TypeChanged,
}

impl ChangeStatus {
    /// Parse a status field (`A`, `M`, `D`, `R100`, `C075`, `T`).
    ///
    /// Returns `None` for anything git is not documented to emit in a
    /// name-status listing of two revisions.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut chars = raw.chars();
        let letter = chars.next()?;
        let rest = chars.as_str();
        let score = || -> Option<Option<u8>> {
            if rest.is_empty() {
                Some(None)
            } else {
                rest.parse::<u8>().ok().filter(|s| *s <= 100).map(Some)
            }
        };
        match letter {
            'A' if rest.is_empty() => Some(ChangeStatus::Added),
            'M' if rest.is_empty() => Some(ChangeStatus::Modified),
            'D' if rest.is_empty() => Some(ChangeStatus::Deleted),
            'T' if rest.is_empty() => Some(ChangeStatus::TypeChanged),
            'R' => score().map(ChangeStatus::Renamed),
            'C' => score().map(ChangeStatus::Copied),
            _ => None,
        }
    }

    /// `true` when git reports a second path for this status.
    pub fn has_target(self) -> bool {
        matches!(self, ChangeStatus::Renamed(_) | ChangeStatus::Copied(_))
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeStatus::Added => write!(f, "A"),
            ChangeStatus::Modified => write!(f, "M"),
            ChangeStatus::Deleted => write!(f, "D"),
            ChangeStatus::TypeChanged => write!(f, "T"),
            ChangeStatus::Renamed(Some(score)) => write!(f, "R{score:03}"),
            ChangeStatus::Renamed(None) => write!(f, "R"),
            ChangeStatus::Copied(Some(score)) => write!(f, "C{score:03}"),
            ChangeStatus::Copied(None) => write!(f, "C"),
        }
    }
}

// ---------------------------------------------------------------------------
// Change records
// ---------------------------------------------------------------------------

/// A repository path split into its service and the file inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePath {
    pub service: ServiceName,
    /// Everything after the first `/`.
    pub file: String,
}

impl ServicePath {
    /// Split `svc/file`; `None` for paths with no directory component.
    pub fn split(path: &str) -> Option<Self> {
        let (service, file) = path.split_once('/')?;
        if service.is_empty() {
            return None;
        }
        Some(Self {
            service: ServiceName::from(service),
            file: file.to_owned(),
        })
    }

    pub fn is_compose(&self) -> bool {
        self.file == COMPOSE_FILE
    }
}

/// One parsed line of a name-status listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub status: ChangeStatus,
    /// The changed path (the old path for renames and copies).
    pub path: String,
    /// The new path for renames and copies.
    pub renamed_to: Option<String>,
}

impl ChangeRecord {
    /// Service and file of [`ChangeRecord::path`].
    pub fn source(&self) -> Option<ServicePath> {
        ServicePath::split(&self.path)
    }

    /// Service and file of [`ChangeRecord::renamed_to`], if any.
    pub fn target(&self) -> Option<ServicePath> {
        self.renamed_to.as_deref().and_then(ServicePath::split)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
