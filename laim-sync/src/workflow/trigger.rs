//! Trigger surface
//!
//! [`SyncService`] validates a requested scope, claims the global run slot,
//! persists the running job and spawns the run in the background. Callers get
//! the job id immediately and poll history for progress.
//!
//! The interval trigger is a plain timer that requests an `all` run; a tick
//! that finds a run active is skipped.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::orchestrator::SyncEngine;
use super::run_slot::RunSlot;
use crate::db::StoreError;
use crate::models::{RecordError, SourceKind, SourceOutcome, SyncJob, SyncScope, SyncStatus};
use crate::sources::SourceError;

/// Trigger errors
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Sync run {0} is already active")]
    RunActive(Uuid),

    /// Scope names no configured source
    #[error("No configured source for scope {0}")]
    NotConfigured(String),

    #[error("Sync job {0} not found")]
    NotFound(Uuid),

    #[error("Sync job {job_id} is already {status:?}")]
    AlreadyTerminal { job_id: Uuid, status: SyncStatus },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Entry point for manual and timed runs
#[derive(Clone)]
pub struct SyncService {
    engine: Arc<SyncEngine>,
    slot: Arc<RunSlot>,
    last_error: Arc<RwLock<Option<String>>>,
    /// Task of the most recently started run
    run_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SyncService {
    pub fn new(engine: SyncEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            slot: RunSlot::new(),
            last_error: Arc::new(RwLock::new(None)),
            run_task: Arc::new(Mutex::new(None)),
        }
    }

    pub fn configured(&self) -> Vec<SourceKind> {
        self.engine.configured()
    }

    /// Job id of the active run
    pub fn active(&self) -> Option<Uuid> {
        self.slot.active()
    }

    /// Summary of the most recent run that did not succeed
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    /// Start a run; returns the persisted running job
    pub async fn start(&self, scope: SyncScope) -> Result<SyncJob, TriggerError> {
        let requested = scope.requested(&self.engine.configured());
        if requested.is_empty() {
            return Err(TriggerError::NotConfigured(scope.to_string()));
        }

        let job = SyncJob::new(scope, &requested);
        let guard = self
            .slot
            .try_acquire(job.id)
            .map_err(TriggerError::RunActive)?;

        // Dropping the guard on error frees the slot
        self.engine.history().append(&job).await?;

        let engine = Arc::clone(&self.engine);
        let last_error = Arc::clone(&self.last_error);
        let running = job.clone();
        let task = tokio::spawn(async move {
            let cancel = guard.cancel_token();
            let finished = engine.run(running, cancel).await;

            if finished.status != SyncStatus::Succeeded {
                let summary = format!(
                    "sync job {} finished {}: {} record error(s), failed sources: {}",
                    finished.id,
                    finished.status.as_str(),
                    finished.totals.errored,
                    failed_sources(&finished)
                );
                *last_error.write().await = Some(summary);
            }
            drop(guard);
        });
        *self.run_task.lock().await = Some(task);

        Ok(job)
    }

    /// Cancel the active run and wait until its final state is written
    pub async fn shutdown(&self) {
        if let Some(active) = self.slot.active() {
            info!(job_id = %active, "Cancelling active sync run");
            self.slot.cancel(active);
        }

        let task = self.run_task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "Sync run task ended abnormally");
            }
        }
    }

    /// Current state of a job
    pub async fn status(&self, job_id: Uuid) -> Result<SyncJob, TriggerError> {
        self.engine
            .history()
            .get(job_id)
            .await?
            .ok_or(TriggerError::NotFound(job_id))
    }

    /// Signal cancellation of the active run
    pub async fn cancel(&self, job_id: Uuid) -> Result<(), TriggerError> {
        if self.slot.cancel(job_id) {
            info!(job_id = %job_id, "Cancellation requested");
            return Ok(());
        }

        let job = self.status(job_id).await?;
        Err(TriggerError::AlreadyTerminal {
            job_id,
            status: job.status,
        })
    }

    /// Newest jobs first
    pub async fn history(&self, limit: usize) -> Result<Vec<SyncJob>, TriggerError> {
        Ok(self.engine.history().list(limit).await?)
    }

    /// Authenticate against one source
    pub async fn test_source(&self, kind: SourceKind) -> Result<(), TriggerError> {
        if !self.engine.configured().contains(&kind) {
            return Err(TriggerError::NotConfigured(kind.to_string()));
        }
        Ok(self.engine.test_connection(kind).await?)
    }

    /// Close out jobs left `running` by a previous process
    ///
    /// Call once at startup, before any run is started.
    pub async fn recover_interrupted(&self, scan_limit: usize) -> Result<usize, TriggerError> {
        let mut recovered = 0;
        for mut job in self.engine.history().list(scan_limit).await? {
            if job.is_terminal() || Some(job.id) == self.slot.active() {
                continue;
            }

            job.cancelled = true;
            job.errors.push(RecordError {
                record: "run".to_string(),
                message: "interrupted by service restart".to_string(),
            });
            if job.finalize().is_ok() {
                self.engine.history().append(&job).await?;
                warn!(job_id = %job.id, status = job.status.as_str(), "Closed interrupted sync job");
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}

fn failed_sources(job: &SyncJob) -> String {
    let failed: Vec<&str> = job
        .sources
        .iter()
        .filter(|(_, report)| matches!(report.outcome, SourceOutcome::Failed { .. }))
        .map(|(kind, _)| kind.as_str())
        .collect();
    if failed.is_empty() {
        "none".to_string()
    } else {
        failed.join(", ")
    }
}

/// Request an `all` run every `interval` until `shutdown` fires
///
/// The first run happens one interval after startup.
pub fn spawn_interval_trigger(
    service: SyncService,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(first) = tokio::time::Instant::now().checked_add(interval) else {
            error!(interval_secs = interval.as_secs(), "Interval trigger not started, interval out of range");
            return;
        };
        let mut ticker = tokio::time::interval_at(first, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(interval_secs = interval.as_secs(), "Interval trigger started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Interval trigger stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match service.start(SyncScope::All).await {
                Ok(job) => info!(job_id = %job.id, "Scheduled sync started"),
                Err(TriggerError::RunActive(active)) => {
                    info!(active_job = %active, "Scheduled sync skipped, run already active")
                }
                Err(TriggerError::NotConfigured(_)) => debug!("Scheduled sync skipped, no source configured"),
                Err(e) => error!(error = %e, "Scheduled sync failed to start"),
            }
        }
    })
}
