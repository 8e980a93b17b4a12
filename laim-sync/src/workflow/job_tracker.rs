//! Run bookkeeping
//!
//! Owns the [`SyncJob`] for one run and aggregates per-source and per-record
//! outcomes into it. Counters of a merged record are attributed to every
//! contributing source; totals count the record once.

use tracing::{error, warn};

use crate::models::{RecordError, SourceKind, SourceOutcome, SyncCounters, SyncJob};
use crate::services::UpsertOutcome;

/// Error list entry for job-level (not record-level) events
const RUN_RECORD: &str = "run";

pub struct JobTracker {
    job: SyncJob,
    max_errors_logged: usize,
}

impl JobTracker {
    pub fn new(job: SyncJob, max_errors_logged: usize) -> Self {
        Self { job, max_errors_logged }
    }

    pub fn job(&self) -> &SyncJob {
        &self.job
    }

    /// Sources this run requested
    pub fn requested(&self) -> Vec<SourceKind> {
        self.job.sources.keys().copied().collect()
    }

    /// Fetch and normalization finished for a source
    pub fn source_ok(&mut self, kind: SourceKind, fetched: u64, skipped: u64) {
        if let Some(report) = self.job.sources.get_mut(&kind) {
            report.outcome = SourceOutcome::Ok;
            report.counters.fetched += fetched;
            report.counters.skipped += skipped;
        }
        self.job.totals.fetched += fetched;
        self.job.totals.skipped += skipped;
    }

    pub fn source_failed(&mut self, kind: SourceKind, reason: impl Into<String>) {
        if let Some(report) = self.job.sources.get_mut(&kind) {
            report.outcome = SourceOutcome::Failed { reason: reason.into() };
        }
    }

    /// A reconciled record was written
    pub fn record_written(&mut self, contributors: &[SourceKind], outcome: &UpsertOutcome) {
        let bump = |counters: &mut SyncCounters| match outcome {
            UpsertOutcome::Created(_) => counters.created += 1,
            UpsertOutcome::Updated(_) => counters.updated += 1,
            UpsertOutcome::Unchanged(_) => counters.unchanged += 1,
        };
        self.for_contributors(contributors, bump);
    }

    /// A reconciled record could not be written
    pub fn record_failed(&mut self, contributors: &[SourceKind], record: String, message: String) {
        error!(job_id = %self.job.id, record = %record, error = %message, "Record write failed");
        self.for_contributors(contributors, |counters| counters.errored += 1);
        self.push_error(record, message);
    }

    /// Cancellation observed; commit stops here
    pub fn mark_cancelled(&mut self) {
        if !self.job.cancelled {
            self.job.cancelled = true;
            self.job.errors.push(RecordError {
                record: RUN_RECORD.to_string(),
                message: "run cancelled".to_string(),
            });
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.job.cancelled
    }

    /// Freeze the job and derive its terminal status
    ///
    /// A job handed in already terminal is returned untouched.
    pub fn finalize(mut self) -> SyncJob {
        if let Err(e) = self.job.finalize() {
            warn!(job_id = %e.job_id, status = ?e.status, "Job was already finalized");
        }
        self.job
    }

    fn for_contributors<F>(&mut self, contributors: &[SourceKind], mut bump: F)
    where
        F: FnMut(&mut SyncCounters),
    {
        for kind in contributors {
            if let Some(report) = self.job.sources.get_mut(kind) {
                bump(&mut report.counters);
            }
        }
        bump(&mut self.job.totals);
    }

    fn push_error(&mut self, record: String, message: String) {
        // Job-level entries do not count against the cap
        let record_errors = self.job.errors.iter().filter(|e| e.record != RUN_RECORD).count();
        if record_errors < self.max_errors_logged {
            self.job.errors.push(RecordError { record, message });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InventoryItem, SourceTag, SyncScope, SyncStatus};

    fn tracker(max_errors: usize) -> JobTracker {
        JobTracker::new(
            SyncJob::new(SyncScope::All, &[SourceKind::Netdisco, SourceKind::Librenms]),
            max_errors,
        )
    }

    fn item() -> InventoryItem {
        InventoryItem {
            id: 1,
            hostname: "sw1".into(),
            serial_number: None,
            mac_address: None,
            ip_address: None,
            model: None,
            vendor: None,
            firmware_version: None,
            asset_tag: None,
            room_location: None,
            sub_location: None,
            notes: None,
            item_type: None,
            source: SourceTag::Merged,
            source_id: None,
            last_synced_at: None,
            is_deleted: false,
        }
    }

    #[test]
    fn test_merged_record_counts_for_each_contributor_once_in_totals() {
        let mut tracker = tracker(10);
        tracker.source_ok(SourceKind::Netdisco, 3, 1);
        tracker.source_ok(SourceKind::Librenms, 2, 0);
        tracker.record_written(
            &[SourceKind::Librenms, SourceKind::Netdisco],
            &UpsertOutcome::Created(item()),
        );

        let job = tracker.job();
        assert_eq!(job.totals.fetched, 5);
        assert_eq!(job.totals.skipped, 1);
        assert_eq!(job.totals.created, 1);
        assert_eq!(job.sources[&SourceKind::Netdisco].counters.created, 1);
        assert_eq!(job.sources[&SourceKind::Librenms].counters.created, 1);
    }

    #[test]
    fn test_error_list_is_capped_but_counted() {
        let mut tracker = tracker(2);
        tracker.source_ok(SourceKind::Netdisco, 3, 0);
        tracker.source_ok(SourceKind::Librenms, 0, 0);
        for i in 0..3 {
            tracker.record_failed(&[SourceKind::Netdisco], format!("r{}", i), "constraint".into());
        }

        let job = tracker.finalize();
        assert_eq!(job.errors.len(), 2);
        assert_eq!(job.totals.errored, 3);
        assert_eq!(job.status, SyncStatus::Partial);
    }

    #[test]
    fn test_cancel_before_commit_fails_job() {
        let mut tracker = tracker(10);
        tracker.source_ok(SourceKind::Netdisco, 1, 0);
        tracker.mark_cancelled();
        tracker.mark_cancelled();

        let job = tracker.finalize();
        assert_eq!(job.status, SyncStatus::Failed);
        assert_eq!(job.errors.len(), 1);
        assert_eq!(job.errors[0].message, "run cancelled");
    }

    #[test]
    fn test_skips_alone_do_not_make_partial() {
        let mut tracker = tracker(10);
        tracker.source_ok(SourceKind::Netdisco, 4, 4);
        tracker.source_ok(SourceKind::Librenms, 0, 0);

        assert_eq!(tracker.finalize().status, SyncStatus::Succeeded);
    }
}
