//! Render driver abstraction.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use rendermill_common::RendermillResult;
use rendermill_job_model::{FailureReason, ResolvedJobSpec};

/// A finished render, moved to its final location.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub output_path: PathBuf,
    pub elapsed: Duration,
}

/// Why a single render attempt failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderFailure {
    #[error("render did not finish within {0:?}")]
    Timeout(Duration),

    #[error("engine crashed: {0}")]
    EngineCrash(String),

    #[error("project state error: {0}")]
    ProjectState(String),

    #[error("engine reported success but no output was produced at {}", .0.display())]
    OutputNotProduced(PathBuf),
}

impl RenderFailure {
    /// Whether the engine must be restarted before the next job.
    pub fn poisons_engine(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::EngineCrash(_))
    }
}

impl From<RenderFailure> for FailureReason {
    fn from(failure: RenderFailure) -> Self {
        match failure {
            RenderFailure::Timeout(after) => FailureReason::Timeout {
                after_secs: after.as_secs(),
            },
            RenderFailure::EngineCrash(detail) => FailureReason::EngineCrash { detail },
            RenderFailure::ProjectState(detail) => FailureReason::ProjectState { detail },
            RenderFailure::OutputNotProduced(expected) => {
                FailureReason::OutputNotProduced { expected }
            }
        }
    }
}

/// Drives one external rendering engine, one job at a time.
///
/// Implementations own the engine process. After a [`RenderFailure`] for
/// which [`RenderFailure::poisons_engine`] is true, callers must
/// [`restart`](RenderDriver::restart) before the next `render`.
#[async_trait]
pub trait RenderDriver: Send {
    /// Render one job, bounded by `timeout`.
    async fn render(
        &mut self,
        spec: &ResolvedJobSpec,
        timeout: Duration,
    ) -> Result<RenderOutput, RenderFailure>;

    /// Fully terminate the engine and bring up a clean instance. An error
    /// means the engine cannot be recovered.
    async fn restart(&mut self) -> RendermillResult<()>;

    /// Terminate the engine at the end of a run.
    async fn shutdown(&mut self);

    /// Check if this driver's engine is available on the system.
    fn is_available(&self) -> bool;

    /// Driver name.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_mapping_and_restart_need() {
        let timeout = RenderFailure::Timeout(Duration::from_secs(90));
        assert!(timeout.poisons_engine());
        assert_eq!(
            FailureReason::from(timeout),
            FailureReason::Timeout { after_secs: 90 }
        );

        let state = RenderFailure::ProjectState("No comp was found".into());
        assert!(!state.poisons_engine());
        assert_eq!(FailureReason::from(state).code(), "project_state");

        let missing = RenderFailure::OutputNotProduced(PathBuf::from("render/1.mp4"));
        assert!(!missing.poisons_engine());
        assert_eq!(FailureReason::from(missing).code(), "output_not_produced");
    }
}
