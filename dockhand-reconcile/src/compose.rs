//! Container-runtime collaborator.

use std::path::Path;

use dockhand_core::{Action, Config};

use crate::error::ReconcileError;
use crate::exec::run_captured;

/// The three lifecycle operations, each scoped to one service directory that
/// holds a compose definition. Implementations must not retry.
pub trait ContainerRuntime: Send + Sync {
    fn up(&self, service_dir: &Path) -> Result<(), ReconcileError>;
    fn down(&self, service_dir: &Path) -> Result<(), ReconcileError>;
    fn restart(&self, service_dir: &Path) -> Result<(), ReconcileError>;

    fn apply(&self, action: Action, service_dir: &Path) -> Result<(), ReconcileError> {
        match action {
            Action::Up => self.up(service_dir),
            Action::Down => self.down(service_dir),
            Action::Restart => self.restart(service_dir),
        }
    }
}

/// [`ContainerRuntime`] backed by a compose command line
/// (`docker-compose`, or `docker compose`).
#[derive(Debug, Clone)]
pub struct ComposeCli {
    program: String,
    leading_args: Vec<String>,
}

impl ComposeCli {
    /// `command` is the program followed by any leading arguments.
    /// An empty command falls back to `docker-compose`.
    pub fn new(command: &[String]) -> Self {
        match command.split_first() {
            Some((program, rest)) => Self {
                program: program.clone(),
                leading_args: rest.to_vec(),
            },
            None => Self {
                program: "docker-compose".to_string(),
                leading_args: Vec::new(),
            },
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.compose_command)
    }

    fn args_for(&self, action: Action) -> Vec<&str> {
        let mut args: Vec<&str> = self.leading_args.iter().map(String::as_str).collect();
        match action {
            Action::Up => args.extend(["up", "-d", "--quiet-pull", "--remove-orphans"]),
            Action::Down => args.extend(["down", "--remove-orphans"]),
            Action::Restart => args.push("restart"),
        }
        args
    }

    fn invoke(&self, action: Action, service_dir: &Path) -> Result<(), ReconcileError> {
        run_captured(&self.program, &self.args_for(action), service_dir)?;
        Ok(())
    }
}

impl ContainerRuntime for ComposeCli {
    fn up(&self, service_dir: &Path) -> Result<(), ReconcileError> {
        self.invoke(Action::Up, service_dir)
    }

    fn down(&self, service_dir: &Path) -> Result<(), ReconcileError> {
        self.invoke(Action::Down, service_dir)
    }

    fn restart(&self, service_dir: &Path) -> Result<(), ReconcileError> {
        self.invoke(Action::Restart, service_dir)
    }
}
