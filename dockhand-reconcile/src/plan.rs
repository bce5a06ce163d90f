//! Reconciliation plan and Service Sequencer.
//!
//! Order: every service named in `settings.start` that has pending actions,
//! in listed order, then the remaining services in ascending lexical order.
//! The same order drives the down pass and the up/restart pass.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use dockhand_core::{Action, ServiceName, Settings};

use crate::actions::ActionQueue;

/// One queued action, tagged with its service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    pub service: ServiceName,
    pub action: Action,
}

/// Final per-service queues plus the order to walk them in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationPlan {
    queues: BTreeMap<ServiceName, ActionQueue>,
    order: Vec<ServiceName>,
}

impl ReconciliationPlan {
    pub fn new(queues: BTreeMap<ServiceName, ActionQueue>, settings: &Settings) -> Self {
        let order = order_services(queues.keys(), settings);
        Self { queues, order }
    }

    pub fn order(&self) -> &[ServiceName] {
        &self.order
    }

    pub fn queue(&self, service: &ServiceName) -> Option<&ActionQueue> {
        self.queues.get(service)
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Every queued action in service order, queue order within a service.
    pub fn steps(&self) -> impl Iterator<Item = PlannedStep> + '_ {
        self.order.iter().flat_map(move |service| {
            self.queues
                .get(service)
                .into_iter()
                .flat_map(ActionQueue::iter)
                .map(move |action| PlannedStep {
                    service: service.clone(),
                    action,
                })
        })
    }

    /// Steps run against the working copy before it is advanced.
    pub fn down_steps(&self) -> impl Iterator<Item = PlannedStep> + '_ {
        self.steps().filter(|step| step.action == Action::Down)
    }

    /// Steps run against the working copy after it is advanced.
    pub fn up_restart_steps(&self) -> impl Iterator<Item = PlannedStep> + '_ {
        self.steps().filter(|step| step.action.runs_after_advance())
    }
}

/// Service Sequencer. Duplicate `start` entries are emitted once.
pub fn order_services<'a, I>(services: I, settings: &Settings) -> Vec<ServiceName>
where
    I: IntoIterator<Item = &'a ServiceName>,
{
    let mut remaining: BTreeSet<&ServiceName> = services.into_iter().collect();
    let mut order = Vec::with_capacity(remaining.len());
    for service in &settings.start {
        if remaining.remove(service) {
            order.push(service.clone());
        }
    }
    order.extend(remaining.into_iter().cloned());
    order
}
