//! Global run slot
//!
//! At most one run is active at a time, whatever its scope. The slot holds the
//! active job id and its cancellation token; the guard frees it on drop.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct ActiveRun {
    job_id: Uuid,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
pub struct RunSlot {
    active: Mutex<Option<ActiveRun>>,
}

impl RunSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        // The slot only holds plain data; a poisoned lock is still consistent
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the slot for `job_id`; `Err` carries the active job id
    pub fn try_acquire(self: &Arc<Self>, job_id: Uuid) -> Result<RunGuard, Uuid> {
        let mut active = self.lock();
        if let Some(run) = active.as_ref() {
            return Err(run.job_id);
        }

        let cancel = CancellationToken::new();
        *active = Some(ActiveRun {
            job_id,
            cancel: cancel.clone(),
        });

        Ok(RunGuard {
            slot: Arc::clone(self),
            job_id,
            cancel,
        })
    }

    /// Job id of the active run
    pub fn active(&self) -> Option<Uuid> {
        self.lock().as_ref().map(|run| run.job_id)
    }

    /// Signal cancellation; false when `job_id` is not the active run
    pub fn cancel(&self, job_id: Uuid) -> bool {
        match self.lock().as_ref() {
            Some(run) if run.job_id == job_id => {
                run.cancel.cancel();
                true
            }
            _ => false,
        }
    }
}

/// Holds the slot for the lifetime of one run
#[derive(Debug)]
pub struct RunGuard {
    slot: Arc<RunSlot>,
    job_id: Uuid,
    cancel: CancellationToken,
}

impl RunGuard {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut active = self.slot.lock();
        if active.as_ref().is_some_and(|run| run.job_id == self.job_id) {
            *active = None;
        }
    }
}
