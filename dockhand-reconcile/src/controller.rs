//! Reconciliation Controller — the two-phase pass.
//!
//! ```text
//! NoRepo → Cloning → UpRestartPass → Idle                       (first bring-up)
//! Repo → Fetching → Diffed → DownPass → Pulling → UpRestartPass → Idle
//! ```
//!
//! `Down` steps run against the working copy *before* it is advanced, so the
//! compose definition being torn down is still on disk. `Up`/`Restart` steps
//! run *after*. Both passes walk services in the sequencer order.
//!
//! Parse and settings errors abort the pass before any runtime invocation.
//! A failing runtime invocation is recorded in the report and the pass moves
//! on to the next step.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use dockhand_core::{Action, Admission, Config, ServiceName, Settings};

use crate::actions::Reconciler;
use crate::compose::{ComposeCli, ContainerRuntime};
use crate::error::{io_err, ReconcileError};
use crate::gate::{PassGate, PassPermit};
use crate::lifecycle::{LifecycleExecutor, LifecycleOutcome};
use crate::parser::parse_changes;
use crate::plan::{PlannedStep, ReconciliationPlan};
use crate::vcs::{GitCli, VersionControl};

// ---------------------------------------------------------------------------
// State & reports
// ---------------------------------------------------------------------------

/// Where the controller currently is in a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassState {
    Idle,
    NoRepo,
    Cloning,
    Fetching,
    Diffed,
    DownPass,
    Pulling,
    UpRestartPass,
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PassState::Idle => "idle",
            PassState::NoRepo => "no_repo",
            PassState::Cloning => "cloning",
            PassState::Fetching => "fetching",
            PassState::Diffed => "diffed",
            PassState::DownPass => "down_pass",
            PassState::Pulling => "pulling",
            PassState::UpRestartPass => "up_restart_pass",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PassKind {
    /// Fresh clone; every service brought up.
    Initial,
    /// Diff-driven pass against an existing working copy.
    Incremental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    Down,
    UpRestart,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StepResult {
    Applied,
    Skipped,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub service: ServiceName,
    pub action: Action,
    pub phase: StepPhase,
    #[serde(flatten)]
    pub result: StepResult,
}

/// Outcome of one complete pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub kind: PassKind,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u128,
    pub plan: ReconciliationPlan,
    pub steps: Vec<StepReport>,
}

impl PassReport {
    pub fn applied(&self) -> usize {
        self.count(|r| matches!(r, StepResult::Applied))
    }

    pub fn skipped(&self) -> usize {
        self.count(|r| matches!(r, StepResult::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|r| matches!(r, StepResult::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&StepResult) -> bool) -> usize {
        self.steps.iter().filter(|s| pred(&s.result)).count()
    }
}

/// What a pass would do, without doing it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanPreview {
    /// No healthy working copy: the next pass clones and brings every
    /// service up.
    NeedsClone,
    Incremental { plan: ReconciliationPlan },
}

/// Outcome of a direct up/down/restart outside the plan machinery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectReport {
    pub service: ServiceName,
    pub action: Action,
    pub outcome: LifecycleOutcome,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Owns the working copy for the duration of a pass.
pub struct Controller {
    working_copy: PathBuf,
    vcs: Box<dyn VersionControl>,
    executor: LifecycleExecutor,
    gate: PassGate,
    state: Mutex<PassState>,
}

impl Controller {
    pub fn new(
        working_copy: impl Into<PathBuf>,
        env_dir: Option<PathBuf>,
        vcs: Box<dyn VersionControl>,
        runtime: Box<dyn ContainerRuntime>,
    ) -> Self {
        let working_copy = working_copy.into();
        Self {
            executor: LifecycleExecutor::new(working_copy.clone(), env_dir, runtime),
            working_copy,
            vcs,
            gate: PassGate::new(),
            state: Mutex::new(PassState::Idle),
        }
    }

    /// Controller driving `git` and the configured compose command.
    pub fn from_config(config: &Config, home: &Path) -> Result<Self, ReconcileError> {
        let working_copy = config.working_copy_at(home)?;
        Ok(Self::new(
            working_copy,
            config.env_dir.clone(),
            Box::new(GitCli::from_config(config)),
            Box::new(ComposeCli::from_config(config)),
        ))
    }

    pub fn working_copy(&self) -> &Path {
        &self.working_copy
    }

    pub fn state(&self) -> PassState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `true` while a pass or direct action holds the gate.
    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    /// Take the gate's permit; pass it to one of the `*_admitted` methods.
    pub fn admit(&self, admission: Admission) -> Result<PassPermit, ReconcileError> {
        self.gate.acquire(admission)
    }

    /// Run one full reconciliation pass.
    pub fn run_pass(&self, admission: Admission) -> Result<PassReport, ReconcileError> {
        let permit = self.admit(admission)?;
        self.run_pass_admitted(permit)
    }

    /// [`Controller::run_pass`] under a permit taken with [`Controller::admit`].
    pub fn run_pass_admitted(&self, permit: PassPermit) -> Result<PassReport, ReconcileError> {
        debug_assert!(self.gate.issued(&permit));
        let _permit = permit;
        let started_at = Utc::now();
        let clock = Instant::now();

        let result = match self.vcs.is_healthy(&self.working_copy) {
            Ok(true) => self.incremental_pass(),
            Ok(false) => self.initial_pass(),
            Err(err) => Err(err),
        };
        self.enter(PassState::Idle);

        let (kind, plan, steps) = result.inspect_err(|err| {
            tracing::error!(error = %err, "reconciliation pass aborted");
        })?;
        let report = PassReport {
            kind,
            started_at,
            duration_ms: clock.elapsed().as_millis(),
            plan,
            steps,
        };
        tracing::info!(
            kind = ?report.kind,
            applied = report.applied(),
            skipped = report.skipped(),
            failed = report.failed(),
            duration_ms = report.duration_ms,
            "reconciliation pass complete",
        );
        Ok(report)
    }

    /// Build the plan a pass would execute, without executing it or
    /// advancing the working copy. Fetches when a working copy exists.
    pub fn preview(&self) -> Result<PlanPreview, ReconcileError> {
        let permit = self.admit(Admission::Queue)?;
        self.preview_admitted(permit)
    }

    pub fn preview_admitted(&self, permit: PassPermit) -> Result<PlanPreview, ReconcileError> {
        debug_assert!(self.gate.issued(&permit));
        let _permit = permit;
        if !self.vcs.is_healthy(&self.working_copy)? {
            return Ok(PlanPreview::NeedsClone);
        }
        let settings = Settings::load_at(&self.working_copy)?;
        self.vcs.fetch(&self.working_copy)?;
        let plan = self.diff_plan(&settings)?;
        Ok(PlanPreview::Incremental { plan })
    }

    /// Run a single lifecycle action directly, bypassing plan and sequencer.
    pub fn direct(
        &self,
        action: Action,
        service: &ServiceName,
        admission: Admission,
    ) -> Result<DirectReport, ReconcileError> {
        let permit = self.admit(admission)?;
        self.direct_admitted(permit, action, service)
    }

    pub fn direct_admitted(
        &self,
        permit: PassPermit,
        action: Action,
        service: &ServiceName,
    ) -> Result<DirectReport, ReconcileError> {
        debug_assert!(self.gate.issued(&permit));
        let _permit = permit;
        let outcome = self.executor.execute(service, action)?;
        Ok(DirectReport {
            service: service.clone(),
            action,
            outcome,
        })
    }

    fn initial_pass(
        &self,
    ) -> Result<(PassKind, ReconciliationPlan, Vec<StepReport>), ReconcileError> {
        self.enter(PassState::NoRepo);
        if self.working_copy.exists() {
            tracing::warn!(
                path = %self.working_copy.display(),
                "discarding unhealthy working copy before re-cloning",
            );
            std::fs::remove_dir_all(&self.working_copy)
                .map_err(|e| io_err(&self.working_copy, e))?;
        }

        self.enter(PassState::Cloning);
        self.vcs.clone_into(&self.working_copy)?;
        let settings = Settings::load_at(&self.working_copy)?;
        let services = list_services(&self.working_copy)?;
        let plan = Reconciler::initial(services).into_plan(&settings);

        self.enter(PassState::UpRestartPass);
        let steps = self.execute_phase(StepPhase::UpRestart, plan.up_restart_steps());
        Ok((PassKind::Initial, plan, steps))
    }

    fn incremental_pass(
        &self,
    ) -> Result<(PassKind, ReconciliationPlan, Vec<StepReport>), ReconcileError> {
        let settings = Settings::load_at(&self.working_copy)?;

        self.enter(PassState::Fetching);
        self.vcs.fetch(&self.working_copy)?;
        let plan = self.diff_plan(&settings)?;
        self.enter(PassState::Diffed);
        tracing::info!(services = plan.order().len(), "plan built");

        self.enter(PassState::DownPass);
        let mut steps = self.execute_phase(StepPhase::Down, plan.down_steps());

        self.enter(PassState::Pulling);
        self.vcs.advance(&self.working_copy)?;

        self.enter(PassState::UpRestartPass);
        steps.extend(self.execute_phase(StepPhase::UpRestart, plan.up_restart_steps()));
        Ok((PassKind::Incremental, plan, steps))
    }

    fn diff_plan(&self, settings: &Settings) -> Result<ReconciliationPlan, ReconcileError> {
        let raw = self.vcs.pending_changes(&self.working_copy)?;
        let reconciler = Reconciler::from_changes(parse_changes(&raw))?;
        Ok(reconciler.into_plan(settings))
    }

    fn execute_phase(
        &self,
        phase: StepPhase,
        steps: impl Iterator<Item = PlannedStep>,
    ) -> Vec<StepReport> {
        steps
            .map(|PlannedStep { service, action }| {
                let result = match self.executor.execute(&service, action) {
                    Ok(LifecycleOutcome::Applied) => StepResult::Applied,
                    Ok(LifecycleOutcome::Skipped) => StepResult::Skipped,
                    Err(err) => {
                        tracing::warn!(%service, %action, error = %err, "lifecycle action failed");
                        StepResult::Failed {
                            error: err.to_string(),
                        }
                    }
                };
                StepReport {
                    service,
                    action,
                    phase,
                    result,
                }
            })
            .collect()
    }

    fn enter(&self, next: PassState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            tracing::debug!(from = %*state, to = %next, "controller state");
            *state = next;
        }
    }
}

/// Top-level directories of the working copy, `.git` excluded, sorted.
pub fn list_services(working_copy: &Path) -> Result<Vec<ServiceName>, ReconcileError> {
    let entries = std::fs::read_dir(working_copy).map_err(|e| io_err(working_copy, e))?;
    let mut services = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(working_copy, e))?;
        let ty = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if ty.is_dir() && name != ".git" {
            services.push(ServiceName::from(name));
        }
    }
    services.sort();
    Ok(services)
}
