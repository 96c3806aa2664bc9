//! Input records and per-record job state.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::failure::FailureReason;

/// One row of the input dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Stable identifier (id column value, or the 1-based row number).
    pub id: String,

    /// 1-based position in the input dataset.
    pub row: usize,

    /// Column name to cell value.
    pub fields: BTreeMap<String, String>,
}

impl RawRecord {
    /// Non-empty, trimmed value for a column.
    pub fn field(&self, column: &str) -> Option<&str> {
        self.fields
            .get(column)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Render status of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// Persisted state of one record, keyed by id in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,

    /// 1-based input row the record was last seen at.
    pub row: usize,

    pub status: JobStatus,

    /// Retries spent on the most recent processing of this record.
    #[serde(default)]
    pub retry_count: u32,

    /// Engine invocations across all runs.
    #[serde(default)]
    pub attempts: u32,

    #[serde(default)]
    pub last_error: Option<FailureReason>,

    #[serde(default)]
    pub output_path: Option<PathBuf>,

    /// Last status change (RFC 3339).
    pub updated_at: String,
}

impl JobRecord {
    /// A fresh record that has never been attempted.
    pub fn pending(id: impl Into<String>, row: usize) -> Self {
        Self {
            id: id.into(),
            row,
            status: JobStatus::Pending,
            retry_count: 0,
            attempts: 0,
            last_error: None,
            output_path: None,
            updated_at: rendermill_common::now_rfc3339(),
        }
    }

    pub fn mark_in_progress(&mut self) {
        self.status = JobStatus::InProgress;
        self.retry_count = 0;
        self.touch();
    }

    pub fn mark_succeeded(&mut self, output_path: PathBuf) {
        self.status = JobStatus::Succeeded;
        self.last_error = None;
        self.output_path = Some(output_path);
        self.touch();
    }

    pub fn mark_failed(&mut self, reason: FailureReason) {
        self.status = JobStatus::Failed;
        self.last_error = Some(reason);
        self.output_path = None;
        self.touch();
    }

    /// Move a failed record back to pending. Returns false for any
    /// other status; there is no silent transition out of `Failed`.
    pub fn requeue(&mut self) -> bool {
        if self.status != JobStatus::Failed {
            return false;
        }
        self.status = JobStatus::Pending;
        self.retry_count = 0;
        self.touch();
        true
    }

    fn touch(&mut self) {
        self.updated_at = rendermill_common::now_rfc3339();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_trims_and_hides_blank_cells() {
        let mut fields = BTreeMap::new();
        fields.insert("company".to_string(), "  Acme ".to_string());
        fields.insert("logo".to_string(), "   ".to_string());
        let record = RawRecord {
            id: "1".into(),
            row: 1,
            fields,
        };
        assert_eq!(record.field("company"), Some("Acme"));
        assert_eq!(record.field("logo"), None);
        assert_eq!(record.field("missing"), None);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut job = JobRecord::pending("7", 7);
        job.mark_in_progress();
        assert_eq!(job.status, JobStatus::InProgress);

        job.mark_failed(FailureReason::Timeout { after_secs: 5 });
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.output_path.is_none());

        assert!(job.requeue());
        assert_eq!(job.status, JobStatus::Pending);
        // Still carries the previous reason for inspection.
        assert!(job.last_error.is_some());

        job.mark_succeeded(PathBuf::from("render/7.mp4"));
        assert_eq!(job.status, JobStatus::Succeeded);
        assert!(job.last_error.is_none());
        assert!(!job.requeue());
    }

    #[test]
    fn test_legacy_entries_default_counters() {
        let json = r#"{"id":"3","row":3,"status":"failed","updated_at":"2026-01-01T00:00:00Z"}"#;
        let job: JobRecord = serde_json::from_str(json).unwrap();
        assert_eq!(job.attempts, 0);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.status, JobStatus::Failed);
    }
}
