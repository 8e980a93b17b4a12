//! Cross-source reconciliation
//!
//! Groups the run's device records that describe the same physical device and
//! folds each group into one record.
//!
//! **Grouping:** records sharing a serial number or a MAC address end up in
//! the same group (transitively). Records carrying neither are grouped by
//! exact `(hostname, ip_address)` and never join an identity group.
//!
//! **Merge:** members are ordered by source priority (then input order); each
//! field takes the first non-empty value in that order.

use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::models::{DeviceRecord, SourceKind, SourceTag};

/// One physical device as seen by every contributing source
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledRecord {
    pub record: DeviceRecord,
    /// `merged` when two or more distinct sources contributed
    pub tag: SourceTag,
    /// Distinct contributing sources, highest priority first
    pub contributors: Vec<SourceKind>,
}

/// Merges records using an explicit source priority order
#[derive(Debug, Clone)]
pub struct Reconciler {
    /// Highest priority first
    priority: Vec<SourceKind>,
}

impl Reconciler {
    /// Sources missing from `priority` rank below every listed one
    pub fn new(priority: Vec<SourceKind>) -> Self {
        Self { priority }
    }

    fn rank(&self, kind: SourceKind) -> usize {
        self.priority
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(self.priority.len())
    }

    /// Group and merge, preserving first-appearance order of groups
    pub fn reconcile(&self, records: Vec<DeviceRecord>) -> Vec<ReconciledRecord> {
        let groups = group_indices(&records);

        let mut slots: Vec<Option<DeviceRecord>> = records.into_iter().map(Some).collect();
        let mut output = Vec::with_capacity(groups.len());

        for mut members in groups {
            members.sort_by_key(|&i| {
                let rank = slots[i].as_ref().map_or(usize::MAX, |r| self.rank(r.source));
                (rank, i)
            });
            let ordered: Vec<DeviceRecord> = members.iter().filter_map(|&i| slots[i].take()).collect();
            if let Some(merged) = self.merge(ordered) {
                output.push(merged);
            }
        }

        output
    }

    fn merge(&self, ordered: Vec<DeviceRecord>) -> Option<ReconciledRecord> {
        let mut contributors: Vec<SourceKind> = Vec::new();
        for record in &ordered {
            if !contributors.contains(&record.source) {
                contributors.push(record.source);
            }
        }

        let mut iter = ordered.into_iter();
        let mut merged = iter.next()?;
        for other in iter {
            fill(&mut merged.hostname, other.hostname);
            fill(&mut merged.serial_number, other.serial_number);
            fill(&mut merged.mac_address, other.mac_address);
            fill(&mut merged.ip_address, other.ip_address);
            fill(&mut merged.model, other.model);
            fill(&mut merged.vendor, other.vendor);
            fill(&mut merged.firmware_version, other.firmware_version);
            if other.fetched_at > merged.fetched_at {
                merged.fetched_at = other.fetched_at;
            }
        }

        let tag = if contributors.len() >= 2 {
            debug!(
                device = %merged.label(),
                sources = ?contributors,
                "Merged device across sources"
            );
            SourceTag::Merged
        } else {
            SourceTag::Source(merged.source)
        };

        Some(ReconciledRecord {
            record: merged,
            tag,
            contributors,
        })
    }
}

/// Take `candidate` only when nothing with higher priority supplied a value
fn fill<T>(target: &mut Option<T>, candidate: Option<T>) {
    if target.is_none() {
        *target = candidate;
    }
}

/// Partition record indices into identity groups, ordered by first member
fn group_indices(records: &[DeviceRecord]) -> Vec<Vec<usize>> {
    let mut sets = DisjointSet::new(records.len());
    let mut by_serial: HashMap<&str, usize> = HashMap::new();
    let mut by_mac: HashMap<&str, usize> = HashMap::new();
    let mut by_host_ip: HashMap<(&str, Option<&str>), usize> = HashMap::new();

    for (i, record) in records.iter().enumerate() {
        if record.has_identity() {
            if let Some(serial) = record.serial_number.as_deref() {
                let first = *by_serial.entry(serial).or_insert(i);
                sets.union(first, i);
            }
            if let Some(mac) = record.mac_address.as_ref() {
                let first = *by_mac.entry(mac.as_str()).or_insert(i);
                sets.union(first, i);
            }
        } else {
            let key = (record.display_name(), record.ip_address.as_deref());
            let first = *by_host_ip.entry(key).or_insert(i);
            sets.union(first, i);
        }
    }

    let mut order: Vec<usize> = Vec::new();
    let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut seen: BTreeSet<usize> = BTreeSet::new();
    for i in 0..records.len() {
        let root = sets.find(i);
        if seen.insert(root) {
            order.push(root);
        }
        members.entry(root).or_default().push(i);
    }

    order
        .into_iter()
        .filter_map(|root| members.remove(&root))
        .collect()
}

/// Union-find over record indices
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Lower index stays root so group order follows input order
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
        }
    }
}
