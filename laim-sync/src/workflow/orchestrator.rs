//! Sync run orchestration
//!
//! One run, start to finish:
//! 1. Fetch every requested source concurrently (one task per source)
//! 2. Barrier: wait until each source has completed or failed
//! 3. Normalize each source's payloads
//! 4. Reconcile all records in one pass
//! 5. Commit record by record: dedup → classify → upsert
//! 6. Finalize the job and write it to history
//!
//! Cancellation aborts in-flight fetches and is checked before every commit.
//! A run never returns an error to its caller: the job record is the error
//! channel.

use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::job_tracker::JobTracker;
use crate::db::{InventoryStore, JobHistoryStore};
use crate::models::{DeviceRecord, SourceKind, SyncJob};
use crate::services::{deduplicator, normalizer, Classifier, ReconciledRecord, Reconciler, UpsertEngine};
use crate::sources::{Credentials, FetchConstraints, RawPayload, SourceClient, SourceError};

/// A client paired with the credentials it authenticates with
#[derive(Clone)]
pub struct SourceHandle {
    pub client: Arc<dyn SourceClient>,
    pub credentials: Credentials,
}

/// Runs the reconciliation pipeline
pub struct SyncEngine {
    inventory: Arc<dyn InventoryStore>,
    history: Arc<dyn JobHistoryStore>,
    sources: HashMap<SourceKind, SourceHandle>,
    reconciler: Reconciler,
    classifier: Classifier,
    max_record_errors_logged: usize,
}

impl SyncEngine {
    pub fn new(
        inventory: Arc<dyn InventoryStore>,
        history: Arc<dyn JobHistoryStore>,
        reconciler: Reconciler,
        classifier: Classifier,
    ) -> Self {
        Self {
            inventory,
            history,
            sources: HashMap::new(),
            reconciler,
            classifier,
            max_record_errors_logged: 100,
        }
    }

    /// Register a source client
    pub fn with_source(mut self, client: Arc<dyn SourceClient>, credentials: Credentials) -> Self {
        self.sources.insert(client.kind(), SourceHandle { client, credentials });
        self
    }

    pub fn with_max_record_errors_logged(mut self, max: usize) -> Self {
        self.max_record_errors_logged = max;
        self
    }

    /// Sources with a registered client, in stable order
    pub fn configured(&self) -> Vec<SourceKind> {
        let mut kinds: Vec<SourceKind> = self.sources.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn history(&self) -> &Arc<dyn JobHistoryStore> {
        &self.history
    }

    /// Authenticate against one source without fetching
    pub async fn test_connection(&self, kind: SourceKind) -> Result<(), SourceError> {
        let handle = self
            .sources
            .get(&kind)
            .ok_or_else(|| SourceError::NotConfigured(kind.to_string()))?;
        handle.client.test_connection(&handle.credentials).await
    }

    /// Execute one run for an already-persisted running job
    pub async fn run(&self, job: SyncJob, cancel: CancellationToken) -> SyncJob {
        let started = Instant::now();
        let job_id = job.id;
        info!(job_id = %job_id, scope = %job.scope, "Sync run started");

        let mut tracker = JobTracker::new(job, self.max_record_errors_logged);

        let records = self.fetch_all(&mut tracker, &cancel).await;
        if cancel.is_cancelled() {
            tracker.mark_cancelled();
        }

        // Progress snapshot so status polls see per-source outcomes
        self.persist(tracker.job()).await;

        if !tracker.is_cancelled() {
            let reconciled = self.reconciler.reconcile(records);
            info!(job_id = %job_id, devices = reconciled.len(), "Reconciled devices");
            self.commit(&mut tracker, &reconciled, &cancel).await;
        }

        let job = tracker.finalize();
        self.persist(&job).await;

        info!(
            job_id = %job_id,
            status = job.status.as_str(),
            fetched = job.totals.fetched,
            created = job.totals.created,
            updated = job.totals.updated,
            unchanged = job.totals.unchanged,
            skipped = job.totals.skipped,
            errored = job.totals.errored,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sync run finished"
        );

        job
    }

    /// Fetch and normalize every requested source; returns all usable records
    async fn fetch_all(&self, tracker: &mut JobTracker, cancel: &CancellationToken) -> Vec<DeviceRecord> {
        let job_id = tracker.job().id;

        let fetches = tracker.requested().into_iter().map(|kind| {
            let handle = self.sources.get(&kind).cloned();
            let constraints = FetchConstraints::new(cancel.clone());
            async move {
                let started = Instant::now();
                let result = match handle {
                    Some(handle) => handle.client.fetch(&handle.credentials, &constraints).await,
                    None => Err(SourceError::NotConfigured(kind.to_string())),
                };
                (kind, result, started.elapsed())
            }
        });

        // Barrier: nothing is merged until every source has settled
        let results: Vec<(SourceKind, Result<Vec<RawPayload>, SourceError>, std::time::Duration)> =
            join_all(fetches).await;

        let mut records = Vec::new();
        for (kind, result, elapsed) in results {
            match result {
                Ok(payloads) => {
                    let fetched = payloads.len() as u64;
                    let (normalized, skipped) = normalizer::normalize_all(payloads, Utc::now());
                    info!(
                        job_id = %job_id,
                        source = %kind,
                        fetched,
                        skipped = skipped.len(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Source fetched"
                    );
                    tracker.source_ok(kind, fetched, skipped.len() as u64);
                    records.extend(normalized);
                }
                Err(e) => {
                    warn!(
                        job_id = %job_id,
                        source = %kind,
                        error = %e,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Source failed"
                    );
                    tracker.source_failed(kind, e.to_string());
                }
            }
        }

        records
    }

    async fn commit(&self, tracker: &mut JobTracker, reconciled: &[ReconciledRecord], cancel: &CancellationToken) {
        let engine = UpsertEngine::new(self.inventory.as_ref(), &self.classifier);

        for entry in reconciled {
            if cancel.is_cancelled() {
                info!(job_id = %tracker.job().id, "Cancellation observed, stopping commit");
                tracker.mark_cancelled();
                break;
            }

            let label = entry.record.label();
            let result = match deduplicator::resolve(self.inventory.as_ref(), &entry.record).await {
                Ok(decision) => engine.apply(entry, decision, Utc::now()).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(outcome) => tracker.record_written(&entry.contributors, &outcome),
                Err(e) => tracker.record_failed(&entry.contributors, label, e.to_string()),
            }
        }
    }

    async fn persist(&self, job: &SyncJob) {
        if let Err(e) = self.history.append(job).await {
            warn!(job_id = %job.id, error = %e, "Failed to write job history");
        }
    }
}
