//! Retry and backoff policy.

use std::time::Duration;

use rendermill_common::config::{BackoffConfig, RetryConfig};
use rendermill_job_model::FailureReason;

/// Pause schedule between records after engine-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    None,
    Linear { step: Duration },
    Exponential { base: Duration, max: Duration },
}

impl From<BackoffConfig> for BackoffStrategy {
    fn from(config: BackoffConfig) -> Self {
        match config {
            BackoffConfig::None => Self::None,
            BackoffConfig::Linear { step_secs } => Self::Linear {
                step: Duration::from_secs(step_secs),
            },
            BackoffConfig::Exponential {
                base_secs,
                max_secs,
            } => Self::Exponential {
                base: Duration::from_secs(base_secs),
                max: Duration::from_secs(max_secs),
            },
        }
    }
}

/// How failures are retried, escalated, and eventually turned into a run
/// abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries per record after the first attempt.
    pub max_retries: u32,

    /// Pause between attempts of the same record.
    pub retry_delay: Duration,

    pub backoff: BackoffStrategy,

    /// Consecutive engine-failed records tolerated before aborting.
    pub failure_ceiling: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            backoff: config.backoff.into(),
            failure_ceiling: config.failure_ceiling,
        }
    }
}

impl RetryPolicy {
    /// Total render attempts allowed for one record.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Structural and input failures cannot change on retry.
    pub fn is_retryable(&self, reason: &FailureReason) -> bool {
        match reason {
            FailureReason::Timeout { .. }
            | FailureReason::EngineCrash { .. }
            | FailureReason::OutputNotProduced { .. }
            | FailureReason::InvalidOutput { .. } => true,
            FailureReason::ProjectState { .. } | FailureReason::Resolution { .. } => false,
        }
    }

    /// A hung or crashed engine cannot serve the next job.
    pub fn requires_restart(&self, reason: &FailureReason) -> bool {
        reason.is_engine_level()
    }

    pub fn counts_toward_ceiling(&self, reason: &FailureReason) -> bool {
        reason.is_engine_level()
    }

    /// Pause before the next record after `consecutive` engine-failed
    /// records.
    pub fn backoff_delay(&self, consecutive: u32) -> Duration {
        if consecutive == 0 {
            return Duration::ZERO;
        }
        match self.backoff {
            BackoffStrategy::None => Duration::ZERO,
            BackoffStrategy::Linear { step } => step.saturating_mul(consecutive),
            BackoffStrategy::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(consecutive - 1);
                base.saturating_mul(factor).min(max)
            }
        }
    }

    pub fn ceiling_exceeded(&self, consecutive: u32) -> bool {
        consecutive > self.failure_ceiling
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn all_reasons() -> Vec<FailureReason> {
        vec![
            FailureReason::Resolution { detail: "x".into() },
            FailureReason::Timeout { after_secs: 1 },
            FailureReason::EngineCrash { detail: "x".into() },
            FailureReason::ProjectState { detail: "x".into() },
            FailureReason::OutputNotProduced {
                expected: PathBuf::from("1.mp4"),
            },
            FailureReason::InvalidOutput { detail: "x".into() },
        ]
    }

    #[test]
    fn test_retry_and_restart_eligibility() {
        let policy = RetryPolicy::default();
        let retryable: Vec<_> = all_reasons()
            .into_iter()
            .filter(|r| policy.is_retryable(r))
            .map(|r| r.code())
            .collect();
        assert_eq!(
            retryable,
            vec!["timeout", "engine_crash", "output_not_produced", "invalid_output"]
        );

        let restarts: Vec<_> = all_reasons()
            .into_iter()
            .filter(|r| policy.requires_restart(r))
            .map(|r| r.code())
            .collect();
        assert_eq!(restarts, vec!["timeout", "engine_crash"]);
    }

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.retry_delay, Duration::from_secs(10));
        assert_eq!(policy.backoff_delay(0), Duration::ZERO);
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(30));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(60));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(120));
        assert_eq!(policy.backoff_delay(10), Duration::from_secs(600));
        assert!(!policy.ceiling_exceeded(3));
        assert!(policy.ceiling_exceeded(4));
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy {
            backoff: BackoffStrategy::Linear {
                step: Duration::from_secs(15),
            },
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(45));
    }

    proptest! {
        #[test]
        fn backoff_never_shrinks_and_respects_max(
            base in 0u64..120,
            max in 0u64..3600,
            n in 0u32..64,
        ) {
            let policy = RetryPolicy {
                backoff: BackoffStrategy::Exponential {
                    base: Duration::from_secs(base),
                    max: Duration::from_secs(max),
                },
                ..RetryPolicy::default()
            };
            let current = policy.backoff_delay(n);
            let next = policy.backoff_delay(n + 1);
            prop_assert!(next >= current);
            prop_assert!(next <= Duration::from_secs(max));
        }
    }
}
