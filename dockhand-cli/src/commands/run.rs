//! `dockhand run` — one reconciliation pass, in-process.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use dockhand_reconcile::{
    pipeline, Controller, Job, JobOutcome, PassKind, PassReport, PlanPreview, ReconciliationPlan,
    StepPhase, StepResult,
};

use crate::GlobalArgs;

/// Arguments for `dockhand run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Fetch and print the plan without executing it or advancing the working copy.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "service")]
    service: String,
    #[tabled(rename = "action")]
    action: String,
    #[tabled(rename = "phase")]
    phase: String,
    #[tabled(rename = "result")]
    result: String,
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "service")]
    service: String,
    #[tabled(rename = "queue")]
    queue: String,
}

impl RunArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let home = super::home()?;
        let config = super::load_config(global, &home)?;
        let controller =
            Controller::from_config(&config, &home).context("failed to set up controller")?;

        let job = if self.dry_run { Job::Preview } else { Job::Pass };
        let outcome = pipeline::run(&controller, job, config.admission)
            .context("reconciliation pass failed")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&outcome).context("failed to serialize outcome")?
            );
        } else {
            match &outcome {
                JobOutcome::Pass(report) => print_report(report),
                JobOutcome::Preview(preview) => print_preview(preview),
                JobOutcome::Direct(_) => {}
            }
        }

        if let JobOutcome::Pass(report) = &outcome {
            if report.failed() > 0 {
                bail!("{} lifecycle step(s) failed", report.failed());
            }
        }
        Ok(())
    }
}

fn print_report(report: &PassReport) {
    let kind = match report.kind {
        PassKind::Initial => "initial bring-up",
        PassKind::Incremental => "incremental",
    };
    println!(
        "{} pass at {} ({} ms): {} applied, {} skipped, {} failed",
        kind.bold(),
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.duration_ms,
        report.applied().to_string().green(),
        report.skipped().to_string().bright_black(),
        colour_failed(report.failed()),
    );

    if report.steps.is_empty() {
        println!("✓ nothing to do");
        return;
    }

    let rows: Vec<StepRow> = report
        .steps
        .iter()
        .map(|step| StepRow {
            service: step.service.to_string(),
            action: step.action.to_string(),
            phase: match step.phase {
                StepPhase::Down => "down".to_string(),
                StepPhase::UpRestart => "up/restart".to_string(),
            },
            result: match &step.result {
                StepResult::Applied => "applied".green().to_string(),
                StepResult::Skipped => "skipped".bright_black().to_string(),
                StepResult::Failed { error } => format!("{} {error}", "failed:".red()),
            },
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn print_preview(preview: &PlanPreview) {
    match preview {
        PlanPreview::NeedsClone => {
            println!("[dry-run] no working copy yet: the next pass clones and brings every service up");
        }
        PlanPreview::Incremental { plan } => print_plan(plan),
    }
}

fn print_plan(plan: &ReconciliationPlan) {
    if plan.is_empty() {
        println!("[dry-run] ✓ up to date");
        return;
    }
    let rows: Vec<PlanRow> = plan
        .order()
        .iter()
        .enumerate()
        .map(|(idx, service)| PlanRow {
            position: idx + 1,
            service: service.to_string(),
            queue: plan
                .queue(service)
                .map(|q| q.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(" → "))
                .unwrap_or_default(),
        })
        .collect();
    println!("[dry-run] {} service(s) to reconcile", plan.order().len());
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn colour_failed(count: usize) -> String {
    if count == 0 {
        count.to_string()
    } else {
        count.to_string().red().bold().to_string()
    }
}
