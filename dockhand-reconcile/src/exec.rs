//! Blocking external command invocation shared by the git and compose
//! collaborators.

use std::path::Path;
use std::process::Command;

use crate::error::ReconcileError;

/// Run `program args…` in `cwd`, returning captured stdout on exit status 0.
///
/// Non-zero exits become [`ReconcileError::CommandFailed`] carrying the
/// trimmed stderr (stdout when stderr is empty).
pub(crate) fn run_captured(
    program: &str,
    args: &[&str],
    cwd: &Path,
) -> Result<String, ReconcileError> {
    let label = render(program, args);
    tracing::debug!(command = %label, cwd = %cwd.display(), "running");

    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|source| ReconcileError::Spawn {
            command: label.clone(),
            source,
        })?;

    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let detail = if stderr.is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    } else {
        stderr
    };
    Err(ReconcileError::CommandFailed {
        command: label,
        status: output.status.to_string(),
        stderr: detail,
    })
}

fn render(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
