//! Per-record failure reasons.
//!
//! Failures are data, not errors: they are recorded in the manifest and
//! surfaced in the run report, never raised mid-run.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Why a record (or a single attempt at it) failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum FailureReason {
    /// The record could not be mapped onto the slot map.
    Resolution { detail: String },

    /// The render exceeded its timeout and the engine was killed.
    Timeout { after_secs: u64 },

    /// The engine process failed or exited unexpectedly.
    EngineCrash { detail: String },

    /// The template could not accept this job's variables.
    ProjectState { detail: String },

    /// The engine reported success but no file appeared.
    OutputNotProduced { expected: PathBuf },

    /// A file was produced but failed validation.
    InvalidOutput { detail: String },
}

impl FailureReason {
    /// Stable reason code used in reports and filters.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Resolution { .. } => "resolution",
            Self::Timeout { .. } => "timeout",
            Self::EngineCrash { .. } => "engine_crash",
            Self::ProjectState { .. } => "project_state",
            Self::OutputNotProduced { .. } => "output_not_produced",
            Self::InvalidOutput { .. } => "invalid_output",
        }
    }

    /// Timeouts and crashes indicate the engine itself is unhealthy.
    pub fn is_engine_level(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::EngineCrash { .. })
    }

    /// All known reason codes, for CLI validation.
    pub const CODES: [&'static str; 6] = [
        "resolution",
        "timeout",
        "engine_crash",
        "project_state",
        "output_not_produced",
        "invalid_output",
    ];
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolution { detail } => write!(f, "resolution: {detail}"),
            Self::Timeout { after_secs } => write!(f, "timeout: no result after {after_secs}s"),
            Self::EngineCrash { detail } => write!(f, "engine_crash: {detail}"),
            Self::ProjectState { detail } => write!(f, "project_state: {detail}"),
            Self::OutputNotProduced { expected } => {
                write!(f, "output_not_produced: {}", expected.display())
            }
            Self::InvalidOutput { detail } => write!(f, "invalid_output: {detail}"),
        }
    }
}
