//! Explicit retry pass over failed records.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use rendermill_job_model::{FailureReason, RequeueFilter};
use rendermill_record_store::{persist_manifest, read_manifest, ManifestLock};

pub fn run(
    manifest_path: PathBuf,
    codes: Vec<String>,
    ids: Vec<String>,
    force: bool,
) -> anyhow::Result<ExitCode> {
    if let Some(unknown) = codes
        .iter()
        .find(|code| !FailureReason::CODES.contains(&code.as_str()))
    {
        anyhow::bail!(
            "Unknown reason code '{unknown}'; expected one of: {}",
            FailureReason::CODES.join(", ")
        );
    }

    let _lock = ManifestLock::acquire(&manifest_path, force)?;
    let mut manifest = read_manifest(&manifest_path)
        .with_context(|| format!("Failed to read manifest {}", manifest_path.display()))?;

    let requeued = manifest.requeue_failed(&RequeueFilter {
        codes,
        ids: ids.into_iter().collect(),
    });
    if requeued.is_empty() {
        println!("No failed records matched; manifest unchanged.");
        return Ok(ExitCode::SUCCESS);
    }

    manifest.touch();
    persist_manifest(&manifest, &manifest_path)?;

    println!("Requeued {} record(s):", requeued.len());
    for id in &requeued {
        println!("  - {id}");
    }
    Ok(ExitCode::SUCCESS)
}
