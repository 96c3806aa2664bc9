//! Run report emitted at the end of every batch run.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::failure::FailureReason;

/// How the run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every selected record was processed.
    Completed,

    /// The operator stopped the run between records.
    Interrupted,

    /// A run-level failure stopped processing.
    Aborted { reason: String },
}

/// A record that failed during this run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRecord {
    pub id: String,
    pub row: usize,
    pub attempts: u32,
    pub reason: FailureReason,
}

/// A record rendered during this run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SucceededRecord {
    pub id: String,
    pub output_path: PathBuf,
}

/// Operator-facing summary of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: String,
    pub finished_at: String,
    pub duration_secs: f64,
    pub outcome: RunOutcome,

    /// Records selected for this run (after range and partition filters).
    pub selected: usize,

    pub succeeded: usize,
    pub failed: usize,

    /// Already succeeded in the manifest; never re-rendered.
    pub skipped: usize,

    /// Failed in an earlier run and not requeued.
    pub previously_failed: usize,

    /// Left unprocessed because the run stopped early.
    pub not_attempted: usize,

    /// Total engine invocations.
    pub render_attempts: u32,

    pub failures: Vec<FailedRecord>,
    pub outputs: Vec<SucceededRecord>,
}

impl RunReport {
    /// Failure counts per reason code.
    pub fn failures_by_code(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(failure.reason.code()).or_insert(0) += 1;
        }
        counts
    }

    /// Records of this selection that are failed at the end of the run,
    /// whether they failed now or in an earlier run and were not requeued.
    pub fn outstanding_failures(&self) -> usize {
        self.failed + self.previously_failed
    }

    /// Whether the run finished within the accepted failure budget.
    pub fn is_acceptable(&self, accepted_failures: usize) -> bool {
        self.outcome == RunOutcome::Completed && self.outstanding_failures() <= accepted_failures
    }

    /// Human-readable summary for the terminal.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let outcome = match &self.outcome {
            RunOutcome::Completed => "completed".to_string(),
            RunOutcome::Interrupted => "interrupted".to_string(),
            RunOutcome::Aborted { reason } => format!("ABORTED ({reason})"),
        };
        let _ = writeln!(out, "Run {outcome}");
        let _ = writeln!(
            out,
            "  Duration: {}",
            rendermill_common::format_duration_secs(self.duration_secs)
        );
        let _ = writeln!(out, "  Selected: {}", self.selected);
        let _ = writeln!(out, "  Succeeded: {}", self.succeeded);
        let _ = writeln!(out, "  Failed: {}", self.failed);
        let _ = writeln!(out, "  Skipped (already succeeded): {}", self.skipped);
        if self.previously_failed > 0 {
            let _ = writeln!(
                out,
                "  Previously failed (not requeued): {}",
                self.previously_failed
            );
        }
        if self.not_attempted > 0 {
            let _ = writeln!(out, "  Not attempted: {}", self.not_attempted);
        }
        let _ = writeln!(out, "  Render attempts: {}", self.render_attempts);

        if !self.failures.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Failures:");
            for (code, count) in self.failures_by_code() {
                let _ = writeln!(out, "  {code}: {count}");
            }
            for failure in &self.failures {
                let _ = writeln!(
                    out,
                    "  - {} (row {}, {} attempt(s)): {}",
                    failure.id, failure.row, failure.attempts, failure.reason
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: RunOutcome, failures: Vec<FailedRecord>) -> RunReport {
        RunReport {
            started_at: "2026-01-01T00:00:00Z".into(),
            finished_at: "2026-01-01T01:00:00Z".into(),
            duration_secs: 3600.0,
            outcome,
            selected: 5,
            succeeded: 5 - failures.len(),
            failed: failures.len(),
            skipped: 0,
            previously_failed: 0,
            not_attempted: 0,
            render_attempts: 5,
            failures,
            outputs: vec![],
        }
    }

    fn failed(id: &str, reason: FailureReason) -> FailedRecord {
        FailedRecord {
            id: id.into(),
            row: id.parse().unwrap_or(0),
            attempts: 1,
            reason,
        }
    }

    #[test]
    fn test_acceptance_threshold() {
        let one_failure = report(
            RunOutcome::Completed,
            vec![failed("3", FailureReason::Timeout { after_secs: 1 })],
        );
        assert!(!one_failure.is_acceptable(0));
        assert!(one_failure.is_acceptable(1));

        let aborted = report(
            RunOutcome::Aborted {
                reason: "ceiling".into(),
            },
            vec![],
        );
        assert!(!aborted.is_acceptable(100));
    }

    #[test]
    fn test_earlier_failures_count_against_the_budget() {
        let mut rerun = report(RunOutcome::Completed, vec![]);
        rerun.succeeded = 4;
        rerun.previously_failed = 1;
        assert_eq!(rerun.outstanding_failures(), 1);
        assert!(!rerun.is_acceptable(0));
        assert!(rerun.is_acceptable(1));
    }

    #[test]
    fn test_summary_groups_failures_by_code() {
        let r = report(
            RunOutcome::Completed,
            vec![
                failed("1", FailureReason::Timeout { after_secs: 1 }),
                failed("2", FailureReason::Timeout { after_secs: 1 }),
                failed(
                    "3",
                    FailureReason::InvalidOutput {
                        detail: "too small".into(),
                    },
                ),
            ],
        );
        let by_code = r.failures_by_code();
        assert_eq!(by_code["timeout"], 2);
        assert_eq!(by_code["invalid_output"], 1);

        let text = r.render_summary();
        assert!(text.contains("Run completed"));
        assert!(text.contains("Failed: 3"));
        assert!(text.contains("invalid_output: 1"));
    }
}
