//! Run timing utilities.
//!
//! A run is anchored to a monotonic epoch captured when the batch starts.
//! Wall-clock timestamps are only used for operator-facing output
//! (manifest `updated_at`, report start/finish).

use std::time::Instant;

use chrono::{DateTime, Utc};

/// A clock anchored to the moment a batch run started.
#[derive(Debug, Clone)]
pub struct RunClock {
    /// The instant the run started.
    epoch: Instant,

    /// Wall-clock time at epoch.
    started_at: DateTime<Utc>,
}

impl RunClock {
    /// Create a new run clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Seconds elapsed since the run started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock start time (RFC 3339).
    pub fn started_at(&self) -> String {
        self.started_at.to_rfc3339()
    }

    /// The underlying epoch instant.
    pub fn epoch(&self) -> Instant {
        self.epoch
    }
}

/// Current wall-clock time as RFC 3339, used for persisted timestamps.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Format a duration in seconds as `1h 02m 03s` for operator summaries.
pub fn format_duration_secs(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_elapsed() {
        let clock = RunClock::start();
        assert!(clock.elapsed_secs() < 1.0);
        assert!(clock.epoch() <= Instant::now());
    }

    #[test]
    fn test_started_at_is_rfc3339() {
        let clock = RunClock::start();
        assert!(DateTime::parse_from_rfc3339(&clock.started_at()).is_ok());
        assert!(DateTime::parse_from_rfc3339(&now_rfc3339()).is_ok());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration_secs(4.2), "4s");
        assert_eq!(format_duration_secs(125.0), "2m 05s");
        assert_eq!(format_duration_secs(3723.0), "1h 02m 03s");
        assert_eq!(format_duration_secs(-3.0), "0s");
    }
}
