//! Reconciliation pipeline stages
//!
//! normalizer → reconciler → deduplicator → classifier → upsert_engine

pub mod classifier;
pub mod deduplicator;
pub mod normalizer;
pub mod reconciler;
pub mod upsert_engine;

pub use classifier::{default_rules, Classifier, ClassifierRule};
pub use deduplicator::{DedupDecision, MatchKey};
pub use normalizer::{normalize, normalize_all, SkipRecord};
pub use reconciler::{ReconciledRecord, Reconciler};
pub use upsert_engine::{UpsertEngine, UpsertOutcome};
