//! Action Reconciler — folds change records into per-service action queues.
//!
//! ## Merge rules
//!
//! For a queue whose last entry is `last` and an incoming `action`:
//!
//! 1. `last == action` → no-op (repeated signals collapse).
//! 2. `Up` → appended.
//! 3. `Down` → the queue becomes exactly `[Down]`.
//! 4. `Restart` → appended only to an empty queue; otherwise dropped, since a
//!    queued up or down reloads the service anyway.
//!
//! Consequently no two adjacent entries are ever equal.

use std::collections::BTreeMap;

use serde::Serialize;

use dockhand_core::{Action, ChangeRecord, ChangeStatus, ServiceName, ServicePath, Settings};

use crate::error::ReconcileError;
use crate::plan::ReconciliationPlan;

// ---------------------------------------------------------------------------
// ActionQueue
// ---------------------------------------------------------------------------

/// Ordered actions for one service. Execution replays the whole queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ActionQueue {
    actions: Vec<Action>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one action according to the merge rules above.
    pub fn merge(&mut self, action: Action) {
        if self.actions.last() == Some(&action) {
            return;
        }
        match action {
            Action::Up => self.actions.push(Action::Up),
            Action::Down => {
                self.actions.clear();
                self.actions.push(Action::Down);
            }
            Action::Restart => {
                if self.actions.is_empty() {
                    self.actions.push(Action::Restart);
                }
            }
        }
    }

    pub fn as_slice(&self) -> &[Action] {
        &self.actions
    }

    pub fn iter(&self) -> impl Iterator<Item = Action> + '_ {
        self.actions.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }
}

impl FromIterator<Action> for ActionQueue {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        let mut queue = ActionQueue::new();
        for action in iter {
            queue.merge(action);
        }
        queue
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Per-pass merge state: one [`ActionQueue`] per touched service.
///
/// Built fresh for every pass and consumed by [`Reconciler::into_plan`].
#[derive(Debug, Default)]
pub struct Reconciler {
    queues: BTreeMap<ServiceName, ActionQueue>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan for a fresh clone: every service gets a single `Up`.
    pub fn initial<I>(services: I) -> Self
    where
        I: IntoIterator<Item = ServiceName>,
    {
        let mut reconciler = Self::new();
        for service in services {
            reconciler.merge(service, Action::Up);
        }
        reconciler
    }

    /// Fold a record stream, stopping at the first error.
    pub fn from_changes<I>(records: I) -> Result<Self, ReconcileError>
    where
        I: IntoIterator<Item = Result<ChangeRecord, ReconcileError>>,
    {
        let mut reconciler = Self::new();
        for record in records {
            reconciler.apply(&record?)?;
        }
        Ok(reconciler)
    }

    /// Merge `action` into the queue of `service`.
    pub fn merge(&mut self, service: ServiceName, action: Action) {
        self.queues.entry(service).or_default().merge(action);
    }

    /// Translate one change record into merges.
    pub fn apply(&mut self, record: &ChangeRecord) -> Result<(), ReconcileError> {
        let Some(source) = record.source() else {
            return Ok(());
        };

        if source.is_compose() {
            return self.apply_compose_change(record, source);
        }

        self.merge(source.service.clone(), Action::Restart);
        if let Some(target) = record.target() {
            if target.service != source.service {
                self.merge_arrival(target);
            }
        }
        Ok(())
    }

    fn apply_compose_change(
        &mut self,
        record: &ChangeRecord,
        source: ServicePath,
    ) -> Result<(), ReconcileError> {
        match record.status {
            ChangeStatus::Added | ChangeStatus::Modified => {
                self.merge(source.service, Action::Up);
            }
            ChangeStatus::Deleted => {
                self.merge(source.service, Action::Down);
            }
            ChangeStatus::Renamed(_) => match record.target() {
                Some(target) if target.service != source.service => {
                    self.merge(source.service, Action::Down);
                    self.merge_arrival(target);
                }
                Some(_) => {
                    tracing::debug!(
                        service = %source.service,
                        "compose definition renamed within its service; nothing to do",
                    );
                }
                None => {
                    self.merge(source.service, Action::Down);
                }
            },
            ChangeStatus::Copied(_) | ChangeStatus::TypeChanged => {
                return Err(ReconcileError::UnknownOperation {
                    status: record.status.to_string(),
                    line: render_record(record),
                });
            }
        }
        Ok(())
    }

    /// A file moved into `target.service`: bring it up if it is now the
    /// compose definition, otherwise restart.
    fn merge_arrival(&mut self, target: ServicePath) {
        let action = if target.is_compose() {
            Action::Up
        } else {
            Action::Restart
        };
        self.merge(target.service, action);
    }

    pub fn queue(&self, service: &ServiceName) -> Option<&ActionQueue> {
        self.queues.get(service)
    }

    pub fn is_empty(&self) -> bool {
        self.queues.values().all(ActionQueue::is_empty)
    }

    /// Drop empty queues and order services with `settings`.
    pub fn into_plan(self, settings: &Settings) -> ReconciliationPlan {
        let queues = self
            .queues
            .into_iter()
            .filter(|(_, queue)| !queue.is_empty())
            .collect();
        ReconciliationPlan::new(queues, settings)
    }
}

fn render_record(record: &ChangeRecord) -> String {
    match &record.renamed_to {
        Some(target) => format!("{}\t{}\t{}", record.status, record.path, target),
        None => format!("{}\t{}", record.status, record.path),
    }
}
