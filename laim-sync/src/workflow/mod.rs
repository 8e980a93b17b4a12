//! Run lifecycle
//!
//! - `orchestrator`: one run end to end (fetch, reconcile, commit)
//! - `job_tracker`: counters and error list for the running job
//! - `run_slot`: the single-active-run guard
//! - `trigger`: manual and interval entry points

pub mod job_tracker;
pub mod orchestrator;
pub mod run_slot;
pub mod trigger;

pub use job_tracker::JobTracker;
pub use orchestrator::{SourceHandle, SyncEngine};
pub use run_slot::{RunGuard, RunSlot};
pub use trigger::{spawn_interval_trigger, SyncService, TriggerError};
