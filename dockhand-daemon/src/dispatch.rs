//! Job dispatch shared by the socket server and the webhook.
//!
//! Every job runs on the blocking pool through [`pipeline::run_admitted`];
//! the controller's gate serializes them, so two triggers never interleave.
//! Under `reject` the permit is taken before the trigger is answered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use dockhand_core::Admission;
use dockhand_reconcile::{pipeline, Controller, Job, JobOutcome, PassPermit, PassState};

use crate::error::DaemonError;

/// Counters reported by `status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassStats {
    pub passes_completed: u64,
    pub last_pass_at_unix: u64,
    pub last_error: Option<String>,
}

pub struct DaemonState {
    controller: Arc<Controller>,
    admission: Admission,
    started_at_unix: u64,
    stats: RwLock<PassStats>,
    /// Set while a queued pass waits for the gate.
    pass_pending: Arc<AtomicBool>,
}

impl DaemonState {
    pub fn new(controller: Controller, admission: Admission) -> Arc<Self> {
        Arc::new(Self {
            controller: Arc::new(controller),
            admission,
            started_at_unix: unix_seconds_now(),
            stats: RwLock::new(PassStats::default()),
            pass_pending: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn admission(&self) -> Admission {
        self.admission
    }

    /// Run `job` to completion and record the outcome.
    pub async fn dispatch(&self, job: Job, source: &'static str) -> Result<JobOutcome, DaemonError> {
        tracing::info!(%job, source, "trigger received");
        self.execute(job, source, None).await
    }

    /// Admit `job` and run it in the background.
    ///
    /// Under [`Admission::Reject`] the gate's permit is taken here, so a busy
    /// controller is refused before the trigger is answered. Under
    /// [`Admission::Queue`] the job waits on the gate in its task, and a pass
    /// trigger arriving while another pass is still waiting is folded into
    /// it.
    pub fn admit(self: &Arc<Self>, job: Job, source: &'static str) -> Result<(), DaemonError> {
        let permit = match self.admission {
            Admission::Reject => match self.controller.admit(job.admission(self.admission)) {
                Ok(permit) => Some(permit),
                Err(err) => {
                    tracing::warn!(%job, source, error = %err, "trigger rejected");
                    return Err(err.into());
                }
            },
            Admission::Queue => {
                if job == Job::Pass && self.pass_pending.swap(true, Ordering::SeqCst) {
                    tracing::info!(source, "pass already queued; trigger folded into it");
                    return Ok(());
                }
                None
            }
        };

        tracing::info!(%job, source, "trigger admitted");
        let state = self.clone();
        tokio::spawn(async move {
            match state.execute(job, source, permit).await {
                Ok(outcome) => log_outcome(&outcome, source),
                Err(err) => tracing::debug!(error = %err, "background job finished with error"),
            }
        });
        Ok(())
    }

    /// Whether a queued pass is still waiting for the gate.
    pub fn pass_pending(&self) -> bool {
        self.pass_pending.load(Ordering::SeqCst)
    }

    async fn execute(
        &self,
        job: Job,
        source: &'static str,
        permit: Option<PassPermit>,
    ) -> Result<JobOutcome, DaemonError> {
        let controller = self.controller.clone();
        let admission = job.admission(self.admission);
        let pass_pending = self.pass_pending.clone();
        let label = job.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let permit = match permit {
                Some(permit) => permit,
                None => controller.admit(admission)?,
            };
            // A pass that has the permit fetches everything pushed so far.
            if job == Job::Pass {
                pass_pending.store(false, Ordering::SeqCst);
            }
            pipeline::run_admitted(&controller, job, permit)
        })
        .await
        .map_err(|err| DaemonError::Protocol(format!("{label} job join error: {err}")))?;

        let mut stats = self.stats.write().await;
        match &result {
            Ok(JobOutcome::Pass(_)) => {
                stats.passes_completed += 1;
                stats.last_pass_at_unix = unix_seconds_now();
                stats.last_error = None;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(job = %label, source, error = %err, "job failed");
                stats.last_error = Some(err.to_string());
            }
        }
        drop(stats);

        Ok(result?)
    }

    pub async fn status_payload(&self, socket: &std::path::Path) -> Value {
        let stats = self.stats.read().await.clone();
        let state: PassState = self.controller.state();
        json!({
            "running": true,
            "started_at_unix": self.started_at_unix,
            "passes_completed": stats.passes_completed,
            "last_pass_at_unix": stats.last_pass_at_unix,
            "last_error": stats.last_error,
            "state": state,
            "busy": self.controller.is_busy(),
            "admission": self.admission,
            "working_copy": self.controller.working_copy().display().to_string(),
            "socket": socket.display().to_string(),
        })
    }
}

fn log_outcome(outcome: &JobOutcome, source: &'static str) {
    match outcome {
        JobOutcome::Pass(report) => tracing::info!(
            source,
            applied = report.applied(),
            failed = report.failed(),
            duration_ms = report.duration_ms,
            "triggered pass completed",
        ),
        JobOutcome::Direct(report) => tracing::info!(
            source,
            service = %report.service,
            action = %report.action,
            outcome = ?report.outcome,
            "direct action completed",
        ),
        JobOutcome::Preview(_) => {}
    }
}

pub(crate) fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
