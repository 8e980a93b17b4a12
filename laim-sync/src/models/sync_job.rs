//! Sync job state machine
//!
//! A job is created `running` and moves exactly once to `succeeded`,
//! `partial` or `failed`. The terminal status is derived from the aggregated
//! per-source outcomes and record errors, never set directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::device::SourceKind;

/// Which sources a run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SyncScope {
    All,
    Source(SourceKind),
}

impl SyncScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncScope::All => "all",
            SyncScope::Source(kind) => kind.as_str(),
        }
    }

    /// Sources this scope requests, restricted to the configured ones
    pub fn requested(&self, configured: &[SourceKind]) -> Vec<SourceKind> {
        match self {
            SyncScope::All => configured.to_vec(),
            SyncScope::Source(kind) => configured.iter().copied().filter(|k| k == kind).collect(),
        }
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(SyncScope::All)
        } else {
            s.parse::<SourceKind>().map(SyncScope::Source)
        }
    }
}

impl TryFrom<String> for SyncScope {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SyncScope> for String {
    fn from(scope: SyncScope) -> Self {
        scope.as_str().to_string()
    }
}

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Running,
    Succeeded,
    Partial,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Running => "running",
            SyncStatus::Succeeded => "succeeded",
            SyncStatus::Partial => "partial",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SyncStatus::Running)
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SyncStatus::Running),
            "succeeded" => Ok(SyncStatus::Succeeded),
            "partial" => Ok(SyncStatus::Partial),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(format!("unknown sync status: {}", other)),
        }
    }
}

/// Outcome of one source's fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SourceOutcome {
    /// Still fetching
    Pending,
    Ok,
    Failed { reason: String },
}

/// Per-source and total counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounters {
    /// Raw payloads returned by the source
    pub fetched: u64,
    pub created: u64,
    /// Matched items whose sync-owned fields changed
    pub updated: u64,
    /// Matched items with no field change (`last_synced_at` refreshed only)
    pub unchanged: u64,
    /// Payloads the normalizer rejected
    pub skipped: u64,
    /// Records whose write failed
    pub errored: u64,
}

/// One source's section of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub outcome: SourceOutcome,
    pub counters: SyncCounters,
}

/// Record-level error entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    /// Identity of the failing record
    pub record: String,
    pub message: String,
}

/// Attempt to finalize a job twice
#[derive(Debug, Error, PartialEq, Eq)]
#[error("job {job_id} is already {status:?}")]
pub struct AlreadyFinalized {
    pub job_id: Uuid,
    pub status: SyncStatus,
}

/// One execution of the reconciliation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: Uuid,
    pub scope: SyncScope,
    pub status: SyncStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub sources: BTreeMap<SourceKind, SourceReport>,
    pub totals: SyncCounters,
    pub errors: Vec<RecordError>,
    /// Set when the run was cancelled externally
    #[serde(default)]
    pub cancelled: bool,
}

impl SyncJob {
    /// Create a running job for the requested sources
    pub fn new(scope: SyncScope, requested: &[SourceKind]) -> Self {
        let sources = requested
            .iter()
            .map(|kind| {
                (
                    *kind,
                    SourceReport {
                        outcome: SourceOutcome::Pending,
                        counters: SyncCounters::default(),
                    },
                )
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            scope,
            status: SyncStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            sources,
            totals: SyncCounters::default(),
            errors: Vec::new(),
            cancelled: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Derive the terminal status and freeze the job
    ///
    /// Sources still pending are recorded as failed.
    pub fn finalize(&mut self) -> Result<SyncStatus, AlreadyFinalized> {
        if self.is_terminal() {
            return Err(AlreadyFinalized {
                job_id: self.id,
                status: self.status,
            });
        }

        for report in self.sources.values_mut() {
            if report.outcome == SourceOutcome::Pending {
                report.outcome = SourceOutcome::Failed {
                    reason: if self.cancelled {
                        "cancelled".to_string()
                    } else {
                        "did not complete".to_string()
                    },
                };
            }
        }

        let any_failed = self
            .sources
            .values()
            .any(|r| matches!(r.outcome, SourceOutcome::Failed { .. }));
        let all_failed = self
            .sources
            .values()
            .all(|r| matches!(r.outcome, SourceOutcome::Failed { .. }));
        let committed = self.totals.created + self.totals.updated + self.totals.unchanged;

        let status = if all_failed {
            SyncStatus::Failed
        } else if self.cancelled {
            if committed == 0 {
                SyncStatus::Failed
            } else {
                SyncStatus::Partial
            }
        } else if any_failed || !self.errors.is_empty() {
            SyncStatus::Partial
        } else {
            SyncStatus::Succeeded
        };

        self.status = status;
        self.finished_at = Some(Utc::now());
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> SyncJob {
        SyncJob::new(SyncScope::All, &[SourceKind::Netdisco, SourceKind::Librenms])
    }

    fn set(job: &mut SyncJob, kind: SourceKind, outcome: SourceOutcome) {
        job.sources.get_mut(&kind).unwrap().outcome = outcome;
    }

    fn failed(reason: &str) -> SourceOutcome {
        SourceOutcome::Failed { reason: reason.into() }
    }

    #[test]
    fn test_all_ok_is_succeeded() {
        let mut job = job();
        set(&mut job, SourceKind::Netdisco, SourceOutcome::Ok);
        set(&mut job, SourceKind::Librenms, SourceOutcome::Ok);

        assert_eq!(job.finalize().unwrap(), SyncStatus::Succeeded);
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_one_source_failed_is_partial() {
        let mut job = job();
        set(&mut job, SourceKind::Netdisco, failed("auth"));
        set(&mut job, SourceKind::Librenms, SourceOutcome::Ok);

        assert_eq!(job.finalize().unwrap(), SyncStatus::Partial);
    }

    #[test]
    fn test_every_source_failed_is_failed() {
        let mut job = job();
        set(&mut job, SourceKind::Netdisco, failed("auth"));
        set(&mut job, SourceKind::Librenms, failed("timeout"));

        assert_eq!(job.finalize().unwrap(), SyncStatus::Failed);
    }

    #[test]
    fn test_record_error_is_partial() {
        let mut job = job();
        set(&mut job, SourceKind::Netdisco, SourceOutcome::Ok);
        set(&mut job, SourceKind::Librenms, SourceOutcome::Ok);
        job.errors.push(RecordError {
            record: "sw1".into(),
            message: "constraint".into(),
        });

        assert_eq!(job.finalize().unwrap(), SyncStatus::Partial);
    }

    #[test]
    fn test_cancelled_before_commit_is_failed() {
        let mut job = job();
        set(&mut job, SourceKind::Netdisco, SourceOutcome::Ok);
        job.cancelled = true;

        assert_eq!(job.finalize().unwrap(), SyncStatus::Failed);
        assert_eq!(job.sources[&SourceKind::Librenms].outcome, failed("cancelled"));
    }

    #[test]
    fn test_cancelled_after_commit_is_partial() {
        let mut job = job();
        set(&mut job, SourceKind::Netdisco, SourceOutcome::Ok);
        set(&mut job, SourceKind::Librenms, SourceOutcome::Ok);
        job.totals.created = 3;
        job.cancelled = true;

        assert_eq!(job.finalize().unwrap(), SyncStatus::Partial);
    }

    #[test]
    fn test_terminal_state_is_immutable() {
        let mut job = job();
        set(&mut job, SourceKind::Netdisco, SourceOutcome::Ok);
        set(&mut job, SourceKind::Librenms, SourceOutcome::Ok);
        job.finalize().unwrap();

        let err = job.finalize().unwrap_err();
        assert_eq!(err.status, SyncStatus::Succeeded);
    }

    #[test]
    fn test_scope_requested_sources() {
        let configured = [SourceKind::Netdisco, SourceKind::Librenms];
        assert_eq!(SyncScope::All.requested(&configured), configured.to_vec());
        assert_eq!(
            SyncScope::Source(SourceKind::Librenms).requested(&configured),
            vec![SourceKind::Librenms]
        );
        assert!(SyncScope::Source(SourceKind::Librenms)
            .requested(&[SourceKind::Netdisco])
            .is_empty());
    }

    #[test]
    fn test_job_json_shape() {
        let job = SyncJob::new(SyncScope::Source(SourceKind::Netdisco), &[SourceKind::Netdisco]);
        let json = serde_json::to_value(&job).unwrap();

        assert_eq!(json["scope"], "netdisco");
        assert_eq!(json["status"], "running");
        assert_eq!(json["sources"]["netdisco"]["outcome"]["state"], "pending");
    }
}
