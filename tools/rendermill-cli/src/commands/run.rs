//! Run a batch.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Context;
use rendermill_common::config::RunConfig;
use rendermill_job_model::TemplateSlotMap;
use rendermill_orchestrator::{BatchOrchestrator, BatchSettings};
use rendermill_record_store::{
    persist_report, report_path_for, select_records, Dataset, ManifestLock, Partition, RowRange,
};
use rendermill_render_engine::{CommandEngine, FfprobeProbe, RenderDriver};

pub struct RunArgs {
    pub input: PathBuf,
    pub slots: PathBuf,
    pub manifest: PathBuf,
    pub max_retries: Option<u32>,
    pub timeout: Option<u64>,
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub partition: Option<String>,
    pub start_delay: u64,
    pub retry_failed: bool,
    pub accept_failures: usize,
    pub report: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub no_probe: bool,
    pub force: bool,
}

pub async fn run(mut config: RunConfig, args: RunArgs) -> anyhow::Result<ExitCode> {
    if let Some(max_retries) = args.max_retries {
        config.retry.max_retries = max_retries;
    }
    if let Some(timeout) = args.timeout {
        config.retry.render_timeout_secs = timeout;
    }
    if let Some(output_dir) = args.output_dir {
        config.engine.output_dir = output_dir;
    }
    if args.no_probe {
        config.validation.probe = false;
    }

    let slot_map = TemplateSlotMap::load(&args.slots)
        .map_err(|e| anyhow::anyhow!("Failed to load slot map: {e}"))?;
    let dataset = Dataset::load(&args.input, slot_map.id_column.as_deref())?;
    dataset.validate_schema(&slot_map)?;

    let partition = args
        .partition
        .as_deref()
        .map(str::parse::<Partition>)
        .transpose()?;
    let manifest_path = match partition {
        Some(partition) => partition.manifest_path(&args.manifest),
        None => args.manifest.clone(),
    };
    let records = select_records(
        &dataset.records,
        RowRange {
            start: args.start,
            end: args.end,
        },
        partition,
    );

    let _lock = ManifestLock::acquire(&manifest_path, args.force)?;

    println!("Rendermill batch run");
    println!("  Input: {} ({} records)", args.input.display(), dataset.records.len());
    println!("  Selected: {}", records.len());
    if let Some(partition) = partition {
        println!("  Partition: {}/{}", partition.index, partition.count);
    }
    println!("  Manifest: {}", manifest_path.display());
    println!("  Output: {}", config.engine.output_dir.display());
    println!(
        "  Retries: {}, timeout: {}s",
        config.retry.max_retries, config.retry.render_timeout_secs
    );
    println!();

    let engine = CommandEngine::new(config.engine.clone());
    if !engine.is_available() {
        tracing::warn!(
            program = %config.engine.render_program,
            "Render program not found on PATH; renders will fail"
        );
    }

    let mut settings = BatchSettings::from_config(&config);
    settings.start_delay = Duration::from_secs(args.start_delay);
    settings.retry_failed = args.retry_failed;

    let mut orchestrator = BatchOrchestrator::new(engine, settings, &manifest_path);
    if config.validation.probe {
        orchestrator =
            orchestrator.with_probe(Box::new(FfprobeProbe::new(&config.validation.probe_program)));
    }

    let stop = orchestrator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nStopping after the current record. Press Ctrl+C again to exit now.");
            stop.store(true, Ordering::SeqCst);
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Exiting immediately; the manifest lock may need --force.");
                std::process::exit(130);
            }
        }
    });

    let report = orchestrator.run(&records, &slot_map).await?;

    let report_path = args
        .report
        .unwrap_or_else(|| report_path_for(&manifest_path));
    persist_report(&report, &report_path)
        .with_context(|| format!("Failed to write report {}", report_path.display()))?;

    println!();
    print!("{}", report.render_summary());
    println!();
    println!("Report: {}", report_path.display());

    if report.is_acceptable(args.accept_failures) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
