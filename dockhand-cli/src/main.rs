//! dockhand — keep a host's compose services in step with a git repository.
//!
//! # Usage
//!
//! ```text
//! dockhand [--config <path>] [-v] init --repository <url> [--branch <b>] [--token <t>] [--force]
//! dockhand run [--dry-run] [--json]
//! dockhand up|down|restart <service> [--via-daemon]
//! dockhand daemon start [--log-json] | stop | status | update
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, direct::DirectArgs, init::InitArgs, run::RunArgs,
};
use dockhand_core::Action;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "dockhand",
    version,
    about = "Reconcile docker compose services with a git repository",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand.
#[derive(clap::Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Configuration file (default: ~/.dockhand/config.yaml).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a new configuration file.
    Init(InitArgs),

    /// Run one reconciliation pass now.
    Run(RunArgs),

    /// Bring one service up, bypassing the plan.
    Up(DirectArgs),

    /// Tear one service down, bypassing the plan.
    Down(DirectArgs),

    /// Restart one service, bypassing the plan.
    Restart(DirectArgs),

    /// Run or talk to the background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    // The daemon installs its own subscriber.
    if !matches!(cli.command, Commands::Daemon { command: DaemonCommand::Start(_) }) {
        init_tracing(cli.global.verbose);
    }

    match cli.command {
        Commands::Init(args) => args.run(&cli.global),
        Commands::Run(args) => args.run(&cli.global),
        Commands::Up(args) => args.run(&cli.global, Action::Up),
        Commands::Down(args) => args.run(&cli.global, Action::Down),
        Commands::Restart(args) => args.run(&cli.global, Action::Restart),
        Commands::Daemon { command } => commands::daemon::run(command, &cli.global),
    }
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
