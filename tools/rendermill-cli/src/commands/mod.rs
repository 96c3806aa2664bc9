pub mod check;
pub mod requeue;
pub mod run;
pub mod status;
pub mod validate;

use std::path::Path;

use rendermill_common::config::RunConfig;

/// Explicit config files must load; the default location falls back to
/// built-in defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<RunConfig> {
    match path {
        Some(path) => RunConfig::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {e}", path.display())),
        None => Ok(RunConfig::load()),
    }
}
