//! Summarise run manifests.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use rendermill_job_model::{JobStatus, RunManifest};
use rendermill_record_store::read_manifest;

pub fn run(paths: Vec<PathBuf>) -> anyhow::Result<ExitCode> {
    let mut manifests = Vec::with_capacity(paths.len());
    for path in &paths {
        let manifest = read_manifest(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        manifests.push(manifest);
    }
    let merged = RunManifest::merge(&manifests);
    let summary = merged.summary();

    if paths.len() == 1 {
        println!("Manifest: {}", paths[0].display());
    } else {
        println!("Manifests: {} (merged)", paths.len());
    }
    println!("  Records: {}", summary.total());
    println!("  Succeeded: {}", summary.succeeded);
    println!("  Failed: {}", summary.failed);
    println!("  Pending: {}", summary.pending);
    if summary.in_progress > 0 {
        println!("  In progress (interrupted): {}", summary.in_progress);
        for record in merged
            .records
            .values()
            .filter(|r| r.status == JobStatus::InProgress)
        {
            println!("    - {} (row {})", record.id, record.row);
        }
    }

    let failures = merged.failures();
    if !failures.is_empty() {
        println!("\nFailed records:");
        for (record, reason) in failures {
            let reason = reason
                .map(ToString::to_string)
                .unwrap_or_else(|| "no reason recorded".to_string());
            println!(
                "  - {} (row {}, {} attempt(s)): {reason}",
                record.id, record.row, record.attempts
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}
