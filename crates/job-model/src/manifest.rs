//! Run manifest: the durable progress checkpoint.
//!
//! The manifest maps record id to [`JobRecord`]. It is the single source
//! of truth for which records are done; persistence (atomic replace) is
//! handled by the record store.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::failure::FailureReason;
use crate::record::{JobRecord, JobStatus};

pub const MANIFEST_VERSION: &str = "1.0";

/// Persisted status of every record seen by a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub version: String,

    /// Last write (RFC 3339).
    pub updated_at: String,

    pub records: BTreeMap<String, JobRecord>,
}

/// Record counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub pending: usize,
    pub in_progress: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl StatusSummary {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.succeeded + self.failed
    }
}

/// Which failed records a requeue pass moves back to pending.
#[derive(Debug, Clone, Default)]
pub struct RequeueFilter {
    /// Only these reason codes (all codes when empty).
    pub codes: Vec<String>,

    /// Only these ids (all ids when empty).
    pub ids: HashSet<String>,
}

impl RequeueFilter {
    fn matches(&self, record: &JobRecord) -> bool {
        let code_ok = self.codes.is_empty()
            || record
                .last_error
                .as_ref()
                .map(|reason| self.codes.iter().any(|c| c == reason.code()))
                .unwrap_or(false);
        let id_ok = self.ids.is_empty() || self.ids.contains(&record.id);
        code_ok && id_ok
    }
}

impl Default for RunManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl RunManifest {
    pub fn new() -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            updated_at: rendermill_common::now_rfc3339(),
            records: BTreeMap::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&JobRecord> {
        self.records.get(id)
    }

    pub fn status_of(&self, id: &str) -> Option<JobStatus> {
        self.records.get(id).map(|r| r.status)
    }

    /// Entry for `id`, created as pending on first sight.
    pub fn entry(&mut self, id: &str, row: usize) -> &mut JobRecord {
        let record = self
            .records
            .entry(id.to_string())
            .or_insert_with(|| JobRecord::pending(id, row));
        record.row = row;
        record
    }

    pub fn summary(&self) -> StatusSummary {
        let mut summary = StatusSummary::default();
        for record in self.records.values() {
            match record.status {
                JobStatus::Pending => summary.pending += 1,
                JobStatus::InProgress => summary.in_progress += 1,
                JobStatus::Succeeded => summary.succeeded += 1,
                JobStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }

    /// Failed records with their reasons, in row order.
    pub fn failures(&self) -> Vec<(&JobRecord, Option<&FailureReason>)> {
        let mut failed: Vec<_> = self
            .records
            .values()
            .filter(|r| r.status == JobStatus::Failed)
            .map(|r| (r, r.last_error.as_ref()))
            .collect();
        failed.sort_by_key(|(r, _)| r.row);
        failed
    }

    /// Explicit retry pass. Returns the ids moved back to pending.
    pub fn requeue_failed(&mut self, filter: &RequeueFilter) -> Vec<String> {
        let mut requeued = vec![];
        for record in self.records.values_mut() {
            if record.status == JobStatus::Failed && filter.matches(record) && record.requeue() {
                requeued.push(record.id.clone());
            }
        }
        requeued
    }

    /// Combine partition manifests. Later manifests win on id collisions.
    pub fn merge<'a>(manifests: impl IntoIterator<Item = &'a RunManifest>) -> RunManifest {
        let mut merged = RunManifest::new();
        for manifest in manifests {
            for (id, record) in &manifest.records {
                merged.records.insert(id.clone(), record.clone());
            }
        }
        merged
    }

    pub fn touch(&mut self) {
        self.updated_at = rendermill_common::now_rfc3339();
    }
}
