//! Variable injection.
//!
//! Templates reference fixed placeholder files. Before each render every
//! placeholder is rewritten from the job spec: media values are copied
//! over it, text values are written into it, and slots with no value have
//! their placeholder removed. A job therefore never inherits a value from
//! the previous one.

use std::path::{Path, PathBuf};

use rendermill_job_model::{BindingValue, ResolvedJobSpec};
use serde_json::json;

/// Errors from rewriting placeholders.
#[derive(Debug, thiserror::Error)]
pub enum InjectError {
    #[error("placeholder directory for slot '{slot}' does not exist: {}", dir.display())]
    MissingPlaceholderDir { slot: String, dir: PathBuf },

    #[error("failed to write placeholder for slot '{slot}' at {}: {source}", path.display())]
    Write {
        slot: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write bindings file {}: {source}", path.display())]
    Bindings {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Rewrite every placeholder-backed binding. Returns the number of
/// placeholders touched.
pub fn apply_placeholders(spec: &ResolvedJobSpec) -> Result<usize, InjectError> {
    let mut touched = 0;
    for binding in &spec.bindings {
        let Some(placeholder) = &binding.placeholder else {
            continue;
        };
        let write_error = |source| InjectError::Write {
            slot: binding.slot.clone(),
            path: placeholder.clone(),
            source,
        };

        if let Some(dir) = placeholder.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !dir.is_dir() {
                return Err(InjectError::MissingPlaceholderDir {
                    slot: binding.slot.clone(),
                    dir: dir.to_path_buf(),
                });
            }
        }

        match &binding.value {
            Some(BindingValue::Media(source)) => {
                replace_with(placeholder, |tmp| std::fs::copy(source, tmp).map(|_| ()))
                    .map_err(write_error)?;
            }
            Some(BindingValue::Text(text)) => {
                replace_with(placeholder, |tmp| std::fs::write(tmp, text.as_bytes()))
                    .map_err(write_error)?;
            }
            None => match std::fs::remove_file(placeholder) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(write_error(e)),
            },
        }
        tracing::debug!(
            id = %spec.id,
            slot = %binding.slot,
            placeholder = %placeholder.display(),
            has_value = binding.value.is_some(),
            "Placeholder rewritten"
        );
        touched += 1;
    }
    Ok(touched)
}

/// Write the per-job bindings document read by scripted engines.
pub fn write_bindings_file(spec: &ResolvedJobSpec, path: &Path) -> Result<(), InjectError> {
    let bindings_error = |source| InjectError::Bindings {
        path: path.to_path_buf(),
        source,
    };
    let document = json!({
        "id": spec.id,
        "row": spec.row,
        "variant": spec.variant,
        "project": spec.project,
        "composition": spec.composition,
        "values": spec.values(),
    });
    let payload = serde_json::to_vec_pretty(&document)
        .map_err(|e| bindings_error(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    replace_with(path, |tmp| std::fs::write(tmp, &payload)).map_err(bindings_error)
}

/// Produce `target` through a sibling temporary file and a rename, so the
/// engine never reads a half-written placeholder.
fn replace_with(
    target: &Path,
    write: impl FnOnce(&Path) -> std::io::Result<()>,
) -> std::io::Result<()> {
    let mut tmp_name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".swap");
    let tmp = target.with_file_name(tmp_name);

    if let Err(e) = write(&tmp) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, target).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        e
    })
}
