//! Output validation.
//!
//! Checks run in order and stop at the first failure: the file exists,
//! it is larger than the minimum size, its duration is within tolerance
//! (when known), and its container is readable.

use std::fmt;
use std::path::{Path, PathBuf};

use rendermill_common::config::ValidationConfig;
use rendermill_job_model::FailureReason;
use rendermill_render_engine::MediaProbe;

/// What a rendered file must satisfy.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputExpectations {
    pub min_bytes: u64,
    pub expected_duration_secs: Option<f64>,
    pub duration_tolerance_secs: f64,
}

impl OutputExpectations {
    pub fn new(config: &ValidationConfig, expected_duration_secs: Option<f64>) -> Self {
        Self {
            min_bytes: config.min_bytes,
            expected_duration_secs,
            duration_tolerance_secs: config.duration_tolerance_secs,
        }
    }
}

/// Why a rendered file was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidReason {
    Missing { path: PathBuf },
    TooSmall { bytes: u64, min_bytes: u64 },
    DurationOutOfRange { actual: f64, expected: f64, tolerance: f64 },
    Unreadable { detail: String },
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { path } => write!(f, "output missing at {}", path.display()),
            Self::TooSmall { bytes, min_bytes } => {
                write!(f, "output is {bytes} bytes, minimum is {min_bytes}")
            }
            Self::DurationOutOfRange {
                actual,
                expected,
                tolerance,
            } => write!(
                f,
                "duration {actual:.2}s outside {expected:.2}s ± {tolerance:.2}s"
            ),
            Self::Unreadable { detail } => write!(f, "unreadable container: {detail}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Valid,
    Invalid { reason: InvalidReason },
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Failure reason for an invalid result.
    pub fn failure(&self) -> Option<FailureReason> {
        match self {
            Self::Valid => None,
            Self::Invalid { reason } => Some(FailureReason::InvalidOutput {
                detail: reason.to_string(),
            }),
        }
    }
}

fn invalid(reason: InvalidReason) -> Validation {
    Validation::Invalid { reason }
}

/// Validate a rendered file. Without a probe only existence and size are
/// checked.
pub fn validate(
    path: &Path,
    expectations: &OutputExpectations,
    probe: Option<&dyn MediaProbe>,
) -> Validation {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => {
            return invalid(InvalidReason::Missing {
                path: path.to_path_buf(),
            })
        }
    };

    if metadata.len() < expectations.min_bytes {
        return invalid(InvalidReason::TooSmall {
            bytes: metadata.len(),
            min_bytes: expectations.min_bytes,
        });
    }

    let Some(probe) = probe else {
        return Validation::Valid;
    };

    let info = match probe.probe(path) {
        Ok(info) => info,
        Err(e) => {
            return invalid(InvalidReason::Unreadable {
                detail: e.to_string(),
            })
        }
    };

    if let Some(expected) = expectations.expected_duration_secs {
        let Some(actual) = info.duration_secs else {
            return invalid(InvalidReason::Unreadable {
                detail: "container reports no duration".to_string(),
            });
        };
        if (actual - expected).abs() > expectations.duration_tolerance_secs {
            return invalid(InvalidReason::DurationOutOfRange {
                actual,
                expected,
                tolerance: expectations.duration_tolerance_secs,
            });
        }
    }

    if info.video_streams == 0 {
        return invalid(InvalidReason::Unreadable {
            detail: "no video stream".to_string(),
        });
    }

    Validation::Valid
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendermill_common::error::{RendermillError, RendermillResult};
    use rendermill_render_engine::MediaInfo;

    struct FixedProbe(RendermillResult<MediaInfo>);

    impl MediaProbe for FixedProbe {
        fn probe(&self, _path: &Path) -> RendermillResult<MediaInfo> {
            match &self.0 {
                Ok(info) => Ok(info.clone()),
                Err(e) => Err(RendermillError::probe(e.to_string())),
            }
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn video(duration: Option<f64>) -> FixedProbe {
        FixedProbe(Ok(MediaInfo {
            duration_secs: duration,
            video_streams: 1,
            audio_streams: 1,
        }))
    }

    fn expectations(expected: Option<f64>) -> OutputExpectations {
        OutputExpectations {
            min_bytes: 1024,
            expected_duration_secs: expected,
            duration_tolerance_secs: 1.0,
        }
    }

    fn file(dir: &Path, bytes: usize) -> PathBuf {
        let path = dir.join("out.mp4");
        std::fs::write(&path, vec![0u8; bytes]).unwrap();
        path
    }

    #[test]
    fn test_missing_and_empty_files_are_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let missing = validate(&dir.path().join("none.mp4"), &expectations(None), None);
        assert!(matches!(
            missing,
            Validation::Invalid {
                reason: InvalidReason::Missing { .. }
            }
        ));

        let empty = validate(&file(dir.path(), 0), &expectations(None), None);
        assert_eq!(
            empty,
            Validation::Invalid {
                reason: InvalidReason::TooSmall {
                    bytes: 0,
                    min_bytes: 1024
                }
            }
        );
        assert_eq!(empty.failure().unwrap().code(), "invalid_output");
    }

    #[test]
    fn test_size_only_without_probe() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(dir.path(), 4096);
        assert!(validate(&path, &expectations(Some(30.0)), None).is_valid());
    }

    #[test]
    fn test_duration_tolerance() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(dir.path(), 4096);

        let probe = video(Some(30.4));
        assert!(validate(&path, &expectations(Some(30.0)), Some(&probe)).is_valid());

        let short = video(Some(12.0));
        let result = validate(&path, &expectations(Some(30.0)), Some(&short));
        assert!(matches!(
            result,
            Validation::Invalid {
                reason: InvalidReason::DurationOutOfRange { .. }
            }
        ));

        let unknown = video(None);
        assert!(!validate(&path, &expectations(Some(30.0)), Some(&unknown)).is_valid());
        assert!(validate(&path, &expectations(None), Some(&unknown)).is_valid());
    }

    #[test]
    fn test_unreadable_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(dir.path(), 4096);
        let probe = FixedProbe(Err(RendermillError::probe("moov atom not found")));
        let result = validate(&path, &expectations(None), Some(&probe));
        match result {
            Validation::Invalid {
                reason: InvalidReason::Unreadable { detail },
            } => assert!(detail.contains("moov atom not found")),
            other => panic!("expected unreadable, got {other:?}"),
        }
    }

    #[test]
    fn test_size_checked_before_probe() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(dir.path(), 10);
        let probe = FixedProbe(Err(RendermillError::probe("never called")));
        assert!(matches!(
            validate(&path, &expectations(None), Some(&probe)),
            Validation::Invalid {
                reason: InvalidReason::TooSmall { .. }
            }
        ));
    }
}
