//! Version-control collaborator.
//!
//! The controller only depends on [`VersionControl`]; [`GitCli`] drives the
//! `git` executable.

use std::path::Path;

use dockhand_core::Config;

use crate::error::{io_err, ReconcileError};
use crate::exec::run_captured;

/// Commands the controller needs from the version-control client.
pub trait VersionControl: Send + Sync {
    /// `Ok(true)` when `working_copy` exists and answers a status query.
    ///
    /// `Ok(false)` means the directory may be discarded and re-cloned. An
    /// `Err` means the client itself could not run; nothing is discarded.
    fn is_healthy(&self, working_copy: &Path) -> Result<bool, ReconcileError>;

    /// Clone the upstream repository into `working_copy` (which must not exist).
    fn clone_into(&self, working_copy: &Path) -> Result<(), ReconcileError>;

    /// Fetch the upstream revision without touching the working copy.
    fn fetch(&self, working_copy: &Path) -> Result<(), ReconcileError>;

    /// Name-status listing, oldest commit first, from the local revision to
    /// the fetched upstream revision (`status<TAB>path[<TAB>path2]` lines).
    fn pending_changes(&self, working_copy: &Path) -> Result<String, ReconcileError>;

    /// Fast-forward the working copy to the fetched upstream revision.
    fn advance(&self, working_copy: &Path) -> Result<(), ReconcileError>;
}

/// [`VersionControl`] backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
    repository: String,
    branch: String,
}

impl GitCli {
    pub fn new(
        program: impl Into<String>,
        repository: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            repository: repository.into(),
            branch: branch.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.git_command, &config.repository, &config.branch)
    }

    fn upstream(&self) -> String {
        format!("origin/{}", self.branch)
    }
}

impl VersionControl for GitCli {
    fn is_healthy(&self, working_copy: &Path) -> Result<bool, ReconcileError> {
        if !working_copy.is_dir() {
            return Ok(false);
        }
        match run_captured(&self.program, &["status", "--porcelain"], working_copy) {
            Ok(_) => Ok(true),
            Err(err @ ReconcileError::CommandFailed { .. }) => {
                tracing::warn!(
                    path = %working_copy.display(),
                    error = %err,
                    "working copy failed health check",
                );
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    fn clone_into(&self, working_copy: &Path) -> Result<(), ReconcileError> {
        let parent = working_copy
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        let target = working_copy
            .file_name()
            .ok_or_else(|| {
                io_err(
                    working_copy,
                    std::io::Error::other("working copy path has no final component"),
                )
            })?
            .to_string_lossy();
        run_captured(
            &self.program,
            &[
                "clone",
                "--branch",
                &self.branch,
                &self.repository,
                target.as_ref(),
            ],
            parent,
        )?;
        Ok(())
    }

    fn fetch(&self, working_copy: &Path) -> Result<(), ReconcileError> {
        run_captured(&self.program, &["fetch", "origin"], working_copy)?;
        Ok(())
    }

    fn pending_changes(&self, working_copy: &Path) -> Result<String, ReconcileError> {
        let range = format!("{}..{}", self.branch, self.upstream());
        run_captured(
            &self.program,
            &[
                "-c",
                "core.quotePath=false",
                "log",
                "--reverse",
                "--name-status",
                "--format=",
                &range,
            ],
            working_copy,
        )
    }

    fn advance(&self, working_copy: &Path) -> Result<(), ReconcileError> {
        let upstream = self.upstream();
        run_captured(
            &self.program,
            &["merge", "--ff-only", &upstream],
            working_copy,
        )?;
        Ok(())
    }
}
