//! Run configuration.
//!
//! Every section carries `#[serde(default)]` so a config file only needs
//! the keys it wants to change. CLI flags are applied on top by the binary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RendermillError, RendermillResult};

/// Global run configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// How the external rendering engine is driven.
    pub engine: EngineConfig,

    /// Output validation thresholds.
    pub validation: ValidationConfig,

    /// Retry, backoff, and abort thresholds.
    pub retry: RetryConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// A program invocation with argument templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Render engine control settings.
///
/// Argument templates may reference `{project}`, `{composition}`,
/// `{output}`, `{id}` and `{bindings}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Program invoked once per render.
    pub render_program: String,

    /// Arguments for the render program.
    pub render_args: Vec<String>,

    /// Optional long-running engine process owned by the driver.
    pub launch: Option<CommandSpec>,

    /// Command that exits successfully once the engine accepts work.
    pub ready_probe: Option<CommandSpec>,

    /// How long to poll `ready_probe` after a launch.
    pub ready_timeout_secs: u64,

    /// Process patterns terminated on every engine restart.
    pub helper_process_patterns: Vec<String>,

    /// Cache directories cleared on every engine restart.
    pub cache_dirs: Vec<PathBuf>,

    /// Case-insensitive stderr fragments that mark a project state error.
    pub project_error_patterns: Vec<String>,

    /// Directory receiving rendered files.
    pub output_dir: PathBuf,

    /// Final output file name; `{id}` is replaced by the record id.
    pub output_pattern: String,
}

/// Output validation thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Smallest acceptable output file, in bytes.
    pub min_bytes: u64,

    /// Allowed deviation from the expected duration, in seconds.
    pub duration_tolerance_secs: f64,

    /// Whether to inspect the container with a media probe.
    pub probe: bool,

    /// Probe program (ffprobe-compatible).
    pub probe_program: String,
}

/// Backoff schedule applied between records after engine-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffConfig {
    None,
    Linear { step_secs: u64 },
    Exponential { base_secs: u64, max_secs: u64 },
}

/// Retry and abort settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries per record after the first attempt.
    pub max_retries: u32,

    /// Per-render timeout.
    pub render_timeout_secs: u64,

    /// Pause between attempts of the same record.
    pub retry_delay_secs: u64,

    /// Escalating pause between records after engine-level failures.
    pub backoff: BackoffConfig,

    /// Consecutive engine-failed records tolerated before the run aborts.
    pub failure_ceiling: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "rendermill=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path (appended to).
    pub file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            render_program: "aerender".to_string(),
            render_args: [
                "-project",
                "{project}",
                "-comp",
                "{composition}",
                "-output",
                "{output}",
                "-v",
                "ERRORS_AND_PROGRESS",
                "-close",
                "DO_NOT_SAVE_CHANGES",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            launch: None,
            ready_probe: None,
            ready_timeout_secs: 90,
            helper_process_patterns: vec![],
            cache_dirs: vec![],
            project_error_patterns: vec![
                "no comp was found".to_string(),
                "unable to find layer".to_string(),
                "project is missing".to_string(),
            ],
            output_dir: PathBuf::from("render"),
            output_pattern: "{id}.mp4".to_string(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_bytes: 1024,
            duration_tolerance_secs: 1.0,
            probe: true,
            probe_program: "ffprobe".to_string(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::Exponential {
            base_secs: 30,
            max_secs: 600,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            render_timeout_secs: 160 * 60,
            retry_delay_secs: 10,
            backoff: BackoffConfig::default(),
            failure_ceiling: 3,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl RunConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path. Errors are not swallowed.
    pub fn load_from(path: &Path) -> RendermillResult<Self> {
        if !path.exists() {
            return Err(RendermillError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            RendermillError::config(format!("Invalid config {}: {e}", path.display()))
        })
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("rendermill").join("config.json")
}
