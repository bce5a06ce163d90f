//! Shared job entrypoint used by the CLI and the daemon.

use std::fmt;

use serde::Serialize;

use dockhand_core::{Action, Admission, ServiceName};

use crate::controller::{Controller, DirectReport, PassReport, PlanPreview};
use crate::error::ReconcileError;
use crate::gate::PassPermit;

/// Unit of work a trigger asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// A full reconciliation pass.
    Pass,
    /// Build the plan without executing it.
    Preview,
    /// One lifecycle action on one service, outside the plan.
    Direct { action: Action, service: ServiceName },
}

impl Job {
    pub fn direct(action: Action, service: impl Into<ServiceName>) -> Self {
        Job::Direct {
            action,
            service: service.into(),
        }
    }

    /// Admission used to take the gate for this job. Previews always wait.
    pub fn admission(&self, configured: Admission) -> Admission {
        match self {
            Job::Preview => Admission::Queue,
            _ => configured,
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Pass => f.write_str("pass"),
            Job::Preview => f.write_str("preview"),
            Job::Direct { action, service } => write!(f, "{action} {service}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum JobOutcome {
    Pass(PassReport),
    Preview(PlanPreview),
    Direct(DirectReport),
}

/// Run `job` on `controller`, serialized with every other job through the
/// controller's gate.
pub fn run(
    controller: &Controller,
    job: Job,
    admission: Admission,
) -> Result<JobOutcome, ReconcileError> {
    let permit = controller.admit(job.admission(admission))?;
    run_admitted(controller, job, permit)
}

/// [`run`] for a caller that already holds the gate's permit.
pub fn run_admitted(
    controller: &Controller,
    job: Job,
    permit: PassPermit,
) -> Result<JobOutcome, ReconcileError> {
    tracing::debug!(%job, "job admitted");
    match job {
        Job::Pass => controller.run_pass_admitted(permit).map(JobOutcome::Pass),
        Job::Preview => controller.preview_admitted(permit).map(JobOutcome::Preview),
        Job::Direct { action, service } => controller
            .direct_admitted(permit, action, &service)
            .map(JobOutcome::Direct),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_labels() {
        assert_eq!(Job::Pass.to_string(), "pass");
        assert_eq!(Job::direct(Action::Restart, "web").to_string(), "restart web");
    }

    #[test]
    fn preview_always_queues() {
        assert_eq!(Job::Preview.admission(Admission::Reject), Admission::Queue);
        assert_eq!(Job::Pass.admission(Admission::Reject), Admission::Reject);
        assert_eq!(
            Job::direct(Action::Up, "web").admission(Admission::Queue),
            Admission::Queue
        );
    }
}
