//! Manifest persistence.
//!
//! Writes go to a temporary file in the manifest's directory, are synced,
//! then renamed over the manifest. A reader (or a resumed run) therefore
//! sees either the previous manifest or the new one, never a torn write.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use rendermill_job_model::{RunManifest, RunReport};
use serde::Serialize;

use crate::StoreError;

/// Load the manifest at `path`.
///
/// A missing manifest yields an empty one. An unreadable or corrupt
/// manifest is moved aside and also yields an empty one; loading never
/// fails the run.
pub fn load_manifest(path: impl AsRef<Path>) -> RunManifest {
    let path = path.as_ref();
    if !path.exists() {
        tracing::info!(path = %path.display(), "No manifest found, starting fresh");
        return RunManifest::new();
    }

    match read_manifest(path) {
        Ok(manifest) => {
            tracing::info!(
                path = %path.display(),
                records = manifest.records.len(),
                "Manifest loaded"
            );
            manifest
        }
        Err(e) => {
            let aside = aside_path(path);
            tracing::warn!(
                path = %path.display(),
                moved_to = %aside.display(),
                error = %e,
                "Manifest unreadable, moving it aside and starting fresh"
            );
            if let Err(rename_err) = std::fs::rename(path, &aside) {
                tracing::warn!(error = %rename_err, "Failed to move unreadable manifest aside");
            }
            RunManifest::new()
        }
    }
}

/// Read the manifest at `path` without recovering from errors. Used by
/// inspection commands that must not move a manifest aside.
pub fn read_manifest(path: impl AsRef<Path>) -> Result<RunManifest, StoreError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Atomically replace the manifest at `path`.
pub fn persist_manifest(manifest: &RunManifest, path: impl AsRef<Path>) -> Result<(), StoreError> {
    let path = path.as_ref();
    write_json_atomic(manifest, path)?;
    tracing::debug!(path = %path.display(), records = manifest.records.len(), "Manifest persisted");
    Ok(())
}

/// Atomically write the run report at `path`.
pub fn persist_report(report: &RunReport, path: impl AsRef<Path>) -> Result<(), StoreError> {
    let path = path.as_ref();
    write_json_atomic(report, path)?;
    tracing::info!(path = %path.display(), "Run report written");
    Ok(())
}

fn write_json_atomic<T: Serialize>(value: &T, path: &Path) -> Result<(), StoreError> {
    let io_error = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }

    let payload = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp_path = temp_path(path);
    let write_result = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&payload)?;
        file.sync_all()?;
        Ok(())
    })();
    if let Err(e) = write_result {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(io_error(e));
    }

    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        io_error(e)
    })
}

/// Exclusive ownership of a manifest for the duration of a run.
///
/// Removed on drop.
#[derive(Debug)]
pub struct ManifestLock {
    path: PathBuf,
}

impl ManifestLock {
    /// Create `<manifest>.lock`. Fails if another run holds it unless
    /// `force` is set, in which case the existing lock is replaced.
    pub fn acquire(manifest_path: impl AsRef<Path>, force: bool) -> Result<Self, StoreError> {
        let path = lock_path(manifest_path.as_ref());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        if force && path.exists() {
            tracing::warn!(path = %path.display(), "Removing existing manifest lock");
            std::fs::remove_file(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = std::fs::read_to_string(&path)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_else(|_| "unknown holder".to_string());
                return Err(StoreError::Locked { path, holder });
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let holder = format!(
            "pid {} since {}",
            std::process::id(),
            rendermill_common::now_rfc3339()
        );
        file.write_all(holder.as_bytes())
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ManifestLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Default report location next to a manifest.
pub fn report_path_for(manifest_path: &Path) -> PathBuf {
    with_suffix(manifest_path, ".report.json")
}

fn lock_path(manifest_path: &Path) -> PathBuf {
    with_suffix(manifest_path, ".lock")
}

fn temp_path(manifest_path: &Path) -> PathBuf {
    with_suffix(manifest_path, &format!(".tmp-{}", std::process::id()))
}

fn aside_path(manifest_path: &Path) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
    with_suffix(manifest_path, &format!(".corrupt-{stamp}"))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendermill_job_model::{FailureReason, JobStatus};

    #[test]
    fn test_missing_manifest_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = load_manifest(dir.path().join("absent.json"));
        assert!(manifest.records.is_empty());
    }

    #[test]
    fn test_persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("manifest.json");

        let mut manifest = RunManifest::new();
        manifest
            .entry("a", 1)
            .mark_succeeded(PathBuf::from("render/a.mp4"));
        manifest
            .entry("b", 2)
            .mark_failed(FailureReason::Timeout { after_secs: 3 });
        persist_manifest(&manifest, &path).unwrap();

        let loaded = load_manifest(&path);
        assert_eq!(loaded.status_of("a"), Some(JobStatus::Succeeded));
        assert_eq!(loaded.status_of("b"), Some(JobStatus::Failed));

        // No temporary files are left behind.
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_read_manifest_is_strict() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        assert!(matches!(read_manifest(&path), Err(StoreError::Io { .. })));

        std::fs::write(&path, "{ truncated").unwrap();
        assert!(matches!(read_manifest(&path), Err(StoreError::Json { .. })));
        assert!(path.exists());
    }

    #[test]
    fn test_corrupt_manifest_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, "{ truncated").unwrap();

        let manifest = load_manifest(&path);
        assert!(manifest.records.is_empty());
        assert!(!path.exists());
        let moved = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().contains(".corrupt-"));
        assert!(moved);
    }

    #[test]
    fn test_lock_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");

        let lock = ManifestLock::acquire(&manifest, false).unwrap();
        assert!(lock.path().exists());
        assert!(matches!(
            ManifestLock::acquire(&manifest, false),
            Err(StoreError::Locked { .. })
        ));

        drop(lock);
        let again = ManifestLock::acquire(&manifest, false).unwrap();
        let forced = {
            std::mem::forget(again);
            ManifestLock::acquire(&manifest, true)
        };
        assert!(forced.is_ok());
    }

    #[test]
    fn test_sidecar_paths() {
        let manifest = PathBuf::from("/runs/manifest.json");
        assert_eq!(
            report_path_for(&manifest),
            PathBuf::from("/runs/manifest.json.report.json")
        );
        assert_eq!(lock_path(&manifest), PathBuf::from("/runs/manifest.json.lock"));
    }
}
