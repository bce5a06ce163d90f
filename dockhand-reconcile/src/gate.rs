//! Single-permit gate: at most one pass or direct action in flight.
//!
//! Permits are owned, so a trigger can take one before it answers and hand
//! it to the thread that runs the job.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use dockhand_core::Admission;

use crate::error::ReconcileError;

#[derive(Debug, Default)]
struct Slot {
    held: Mutex<bool>,
    released: Condvar,
}

impl Slot {
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Default)]
pub struct PassGate {
    slot: Arc<Slot>,
}

/// Held for the duration of a pass; released on drop, including on unwind.
#[derive(Debug)]
pub struct PassPermit {
    slot: Arc<Slot>,
}

impl Drop for PassPermit {
    fn drop(&mut self) {
        *self.slot.lock() = false;
        self.slot.released.notify_one();
    }
}

impl PassGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Queue` blocks until the permit is free; `Reject` fails with
    /// [`ReconcileError::PassInProgress`] instead of waiting.
    pub fn acquire(&self, admission: Admission) -> Result<PassPermit, ReconcileError> {
        let mut held = self.slot.lock();
        match admission {
            Admission::Queue => {
                while *held {
                    held = self
                        .slot
                        .released
                        .wait(held)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
            Admission::Reject if *held => return Err(ReconcileError::PassInProgress),
            Admission::Reject => {}
        }
        *held = true;
        Ok(PassPermit {
            slot: self.slot.clone(),
        })
    }

    pub fn is_busy(&self) -> bool {
        *self.slot.lock()
    }

    /// `true` when `permit` was handed out by this gate.
    pub fn issued(&self, permit: &PassPermit) -> bool {
        Arc::ptr_eq(&self.slot, &permit.slot)
    }
}
