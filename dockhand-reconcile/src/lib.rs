//! # dockhand-reconcile
//!
//! Turns upstream commits into an ordered set of container lifecycle actions
//! and executes them around a fast-forward of the local working copy.
//!
//! [`pipeline::run`] is the entrypoint shared by `dockhand run` and the
//! daemon's triggers; [`Controller`] owns the working copy and serializes
//! passes.

pub mod actions;
pub mod compose;
pub mod controller;
pub mod error;
mod exec;
pub mod gate;
pub mod lifecycle;
pub mod parser;
pub mod pipeline;
pub mod plan;
pub mod vcs;

pub use actions::{ActionQueue, Reconciler};
pub use compose::{ComposeCli, ContainerRuntime};
pub use controller::{
    Controller, DirectReport, PassKind, PassReport, PassState, PlanPreview, StepPhase,
    StepReport, StepResult,
};
pub use error::ReconcileError;
pub use gate::{PassGate, PassPermit};
pub use lifecycle::{LifecycleExecutor, LifecycleOutcome};
pub use parser::{parse_changes, parse_line};
pub use pipeline::{Job, JobOutcome};
pub use plan::{PlannedStep, ReconciliationPlan};
pub use vcs::{GitCli, VersionControl};
