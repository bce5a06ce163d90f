//! `dockhand up|down|restart <service>` — one lifecycle action, no plan.

use anyhow::{Context, Result};
use clap::Args;

use dockhand_core::{Action, ServiceName};
use dockhand_daemon::request_action;
use dockhand_reconcile::{pipeline, Controller, Job, JobOutcome, LifecycleOutcome};

use crate::GlobalArgs;

#[derive(Args, Debug)]
pub struct DirectArgs {
    /// Service directory name in the working copy.
    pub service: String,

    /// Ask the running daemon to do it instead of acting in-process.
    #[arg(long)]
    pub via_daemon: bool,
}

impl DirectArgs {
    pub fn run(self, global: &GlobalArgs, action: Action) -> Result<()> {
        let home = super::home()?;

        if self.via_daemon {
            let data = request_action(&home, action, &self.service)
                .with_context(|| format!("daemon failed to {action} '{}'", self.service))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&data).context("failed to render daemon reply")?
            );
            return Ok(());
        }

        let config = super::load_config(global, &home)?;
        let controller =
            Controller::from_config(&config, &home).context("failed to set up controller")?;
        let job = Job::Direct {
            action,
            service: ServiceName::from(self.service.clone()),
        };
        let outcome = pipeline::run(&controller, job, config.admission)
            .with_context(|| format!("{action} '{}' failed", self.service))?;

        if let JobOutcome::Direct(report) = outcome {
            match report.outcome {
                LifecycleOutcome::Applied => println!("✓ {action} {}", report.service),
                LifecycleOutcome::Skipped => println!(
                    "· {} has no compose definition; nothing to {action}",
                    report.service
                ),
            }
        }
        Ok(())
    }
}
