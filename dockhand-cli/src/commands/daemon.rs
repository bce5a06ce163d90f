//! `dockhand daemon` — background trigger lifecycle.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use dockhand_daemon::paths::socket_path;
use dockhand_daemon::{request_status, request_stop, request_update, start_blocking, DaemonError};

use crate::GlobalArgs;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (control socket + webhook).
    Start(DaemonStartArgs),
    /// Request graceful daemon shutdown over the control socket.
    Stop,
    /// Query daemon runtime status over the control socket.
    Status,
    /// Ask the daemon to run a reconciliation pass now and wait for it.
    Update,
}

#[derive(Args, Debug)]
pub struct DaemonStartArgs {
    /// Log JSON lines instead of human-readable text.
    #[arg(long)]
    pub log_json: bool,
}

pub fn run(command: DaemonCommand, global: &GlobalArgs) -> Result<()> {
    let home = super::home()?;

    match command {
        DaemonCommand::Start(args) => {
            let config = super::load_config(global, &home)?;
            start_blocking(&home, config, args.log_json).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => {
            let payload = match request_status(&home) {
                Ok(status) => status,
                Err(DaemonError::DaemonNotRunning { .. }) => serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                }),
                Err(err) => return Err(err).context("failed to query daemon status"),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to render daemon status JSON")?
            );
        }
        DaemonCommand::Update => {
            let report = request_update(&home).context("daemon update failed")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&report)
                    .context("failed to render pass report JSON")?
            );
        }
    }

    Ok(())
}
