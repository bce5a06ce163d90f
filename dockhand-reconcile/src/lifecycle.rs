//! Lifecycle Executor — one action, one runtime invocation.
//!
//! A service directory without a compose definition is a no-op, not an
//! error: an earlier step of the same pass may have removed it. Before `up`
//! and `restart` the externally managed `<env_dir>/<service>.env` is copied
//! to `<service>/.env`, or the local copy removed when the source is gone.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use dockhand_core::{Action, ServiceName, COMPOSE_FILE, ENV_FILE};

use crate::compose::ContainerRuntime;
use crate::error::{io_err, ReconcileError};

/// What a single lifecycle call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleOutcome {
    /// The runtime was invoked and exited successfully.
    Applied,
    /// No compose definition on disk; nothing was invoked.
    Skipped,
}

pub struct LifecycleExecutor {
    working_copy: PathBuf,
    env_dir: Option<PathBuf>,
    runtime: Box<dyn ContainerRuntime>,
}

impl LifecycleExecutor {
    pub fn new(
        working_copy: impl Into<PathBuf>,
        env_dir: Option<PathBuf>,
        runtime: Box<dyn ContainerRuntime>,
    ) -> Self {
        Self {
            working_copy: working_copy.into(),
            env_dir,
            runtime,
        }
    }

    pub fn up(&self, service: &ServiceName) -> Result<LifecycleOutcome, ReconcileError> {
        self.execute(service, Action::Up)
    }

    pub fn down(&self, service: &ServiceName) -> Result<LifecycleOutcome, ReconcileError> {
        self.execute(service, Action::Down)
    }

    pub fn restart(&self, service: &ServiceName) -> Result<LifecycleOutcome, ReconcileError> {
        self.execute(service, Action::Restart)
    }

    pub fn execute(
        &self,
        service: &ServiceName,
        action: Action,
    ) -> Result<LifecycleOutcome, ReconcileError> {
        validate_service(service)?;
        let dir = self.working_copy.join(service.as_str());
        if !dir.join(COMPOSE_FILE).is_file() {
            tracing::debug!(%service, %action, "no compose definition; skipping");
            return Ok(LifecycleOutcome::Skipped);
        }

        if action.runs_after_advance() {
            self.sync_env_file(service, &dir)?;
        }

        tracing::info!(%service, %action, "invoking container runtime");
        self.runtime.apply(action, &dir)?;
        Ok(LifecycleOutcome::Applied)
    }

    fn sync_env_file(&self, service: &ServiceName, dir: &Path) -> Result<(), ReconcileError> {
        let Some(env_dir) = &self.env_dir else {
            return Ok(());
        };
        let source = env_dir.join(format!("{service}.env"));
        let target = dir.join(ENV_FILE);

        if source.is_file() {
            std::fs::copy(&source, &target).map_err(|e| io_err(&target, e))?;
            tracing::debug!(%service, source = %source.display(), "environment file synced");
            return Ok(());
        }

        match std::fs::remove_file(&target) {
            Ok(()) => {
                tracing::debug!(%service, "stale environment file removed");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(&target, err)),
        }
    }
}

/// A service name must be exactly one normal path component.
pub fn validate_service(service: &ServiceName) -> Result<(), ReconcileError> {
    let mut components = Path::new(service.as_str()).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !service.as_str().contains('\\') => Ok(()),
        _ => Err(ReconcileError::InvalidService(service.0.clone())),
    }
}
