//! Media probing for rendered outputs.

use std::path::Path;
use std::process::Command;

use rendermill_common::error::{RendermillError, RendermillResult};
use serde::Deserialize;

/// What a probe could read from a media file.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    /// Container duration, when the container reports one.
    pub duration_secs: Option<f64>,

    /// Number of video streams.
    pub video_streams: usize,

    /// Number of audio streams.
    pub audio_streams: usize,
}

/// Inspects a media container.
///
/// An `Err` means the file is not a readable media container.
pub trait MediaProbe: Send + Sync {
    fn probe(&self, path: &Path) -> RendermillResult<MediaInfo>;

    /// Probe name.
    fn name(&self) -> &str;
}

/// `ffprobe`-backed probe.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: String,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        crate::command::command_exists(&self.program)
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

#[derive(Debug, Deserialize)]
struct ProbeDocument {
    #[serde(default)]
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
}

impl MediaProbe for FfprobeProbe {
    fn probe(&self, path: &Path) -> RendermillResult<MediaInfo> {
        let output = Command::new(&self.program)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration:stream=codec_type",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .map_err(|e| RendermillError::probe(format!("Failed to start {}: {e}", self.program)))?;

        if !output.status.success() {
            return Err(RendermillError::probe(format!(
                "{} could not read {}: {}",
                self.program,
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }

    fn name(&self) -> &str {
        &self.program
    }
}

fn parse_probe_output(raw: &str) -> RendermillResult<MediaInfo> {
    let document: ProbeDocument = serde_json::from_str(raw)
        .map_err(|e| RendermillError::probe(format!("Unparseable probe output: {e}")))?;

    let duration_secs = document
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0);
    let count = |kind: &str| {
        document
            .streams
            .iter()
            .filter(|s| s.codec_type.as_deref() == Some(kind))
            .count()
    };

    let info = MediaInfo {
        duration_secs,
        video_streams: count("video"),
        audio_streams: count("audio"),
    };
    if info.video_streams == 0 && info.audio_streams == 0 {
        return Err(RendermillError::probe("No audio or video streams found"));
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output() {
        let raw = r#"{
            "streams": [ { "codec_type": "video" }, { "codec_type": "audio" } ],
            "format": { "duration": "30.033333" }
        }"#;
        let info = parse_probe_output(raw).unwrap();
        assert_eq!(info.video_streams, 1);
        assert_eq!(info.audio_streams, 1);
        assert!((info.duration_secs.unwrap() - 30.0333).abs() < 1e-3);
    }

    #[test]
    fn test_parse_probe_output_without_streams_is_unreadable() {
        assert!(parse_probe_output(r#"{ "format": {} }"#).is_err());
        assert!(parse_probe_output("not json").is_err());
    }

    #[test]
    fn test_missing_duration_is_none() {
        let raw = r#"{ "streams": [ { "codec_type": "video" } ], "format": { "duration": "N/A" } }"#;
        assert_eq!(parse_probe_output(raw).unwrap().duration_secs, None);
    }
}
