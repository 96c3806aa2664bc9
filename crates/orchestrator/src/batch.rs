//! Batch orchestration.
//!
//! Per record: `Pending → InProgress → {Succeeded | Failed}`. The manifest
//! is persisted after every record, so an interruption loses at most the
//! record in flight. Records already `Succeeded` are never rendered again;
//! `Failed` records stay failed until explicitly requeued.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rendermill_common::config::{RunConfig, ValidationConfig};
use rendermill_common::error::RendermillError;
use rendermill_common::{now_rfc3339, RunClock};
use rendermill_job_model::{
    FailedRecord, FailureReason, JobStatus, RawRecord, RequeueFilter, ResolvedJobSpec,
    RunManifest, RunOutcome, RunReport, SucceededRecord, TemplateSlotMap,
};
use rendermill_record_store::{load_manifest, persist_manifest, StoreError};
use rendermill_render_engine::{MediaProbe, RenderDriver};

use crate::policy::RetryPolicy;
use crate::resolver::resolve;
use crate::validator::{validate, OutputExpectations};

/// Run-level failures. Per-record failures never surface here.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Failed to persist manifest {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
}

/// Settings for one batch run.
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub policy: RetryPolicy,

    /// Per-render timeout.
    pub render_timeout: Duration,

    pub validation: ValidationConfig,

    /// Pause before the first render.
    pub start_delay: Duration,

    /// Requeue failed records of the selection before starting.
    pub retry_failed: bool,
}

impl BatchSettings {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            policy: RetryPolicy::from(&config.retry),
            render_timeout: Duration::from_secs(config.retry.render_timeout_secs),
            validation: config.validation.clone(),
            start_delay: Duration::ZERO,
            retry_failed: false,
        }
    }
}

/// Result of working one record to a terminal state.
struct RecordOutcome {
    result: Result<PathBuf, FailureReason>,
    attempts: u32,

    /// Set when the engine could not be restarted after the last attempt.
    engine_lost: Option<RendermillError>,
}

#[derive(Default)]
struct Tally {
    succeeded: usize,
    failed: usize,
    skipped: usize,
    previously_failed: usize,
    failures: Vec<FailedRecord>,
    outputs: Vec<SucceededRecord>,
}

/// Drives every selected record through one render driver, serially.
pub struct BatchOrchestrator<D: RenderDriver> {
    driver: D,
    settings: BatchSettings,
    probe: Option<Box<dyn MediaProbe>>,
    manifest_path: PathBuf,
    stop_flag: Arc<AtomicBool>,
    render_attempts: u32,
}

impl<D: RenderDriver> BatchOrchestrator<D> {
    pub fn new(driver: D, settings: BatchSettings, manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            driver,
            settings,
            probe: None,
            manifest_path: manifest_path.into(),
            stop_flag: Arc::new(AtomicBool::new(false)),
            render_attempts: 0,
        }
    }

    /// Inspect outputs with `probe` in addition to the size checks.
    pub fn with_probe(mut self, probe: Box<dyn MediaProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Use an externally owned stop flag.
    pub fn with_stop_handle(mut self, stop_flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = stop_flag;
        self
    }

    /// Setting this flag stops the run after the record in flight.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_flag)
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Run the batch over `records` (already range/partition filtered, in
    /// input order). The engine is shut down when the run ends, however it
    /// ends.
    pub async fn run(
        &mut self,
        records: &[RawRecord],
        slot_map: &TemplateSlotMap,
    ) -> Result<RunReport, RunError> {
        let result = self.run_records(records, slot_map).await;
        self.driver.shutdown().await;
        result
    }

    async fn run_records(
        &mut self,
        records: &[RawRecord],
        slot_map: &TemplateSlotMap,
    ) -> Result<RunReport, RunError> {
        let clock = RunClock::start();
        self.render_attempts = 0;

        let mut manifest = load_manifest(&self.manifest_path);
        if self.settings.retry_failed && !records.is_empty() {
            let requeued = manifest.requeue_failed(&RequeueFilter {
                codes: vec![],
                ids: records.iter().map(|r| r.id.clone()).collect(),
            });
            if !requeued.is_empty() {
                tracing::info!(count = requeued.len(), "Requeued failed records");
            }
        }
        for record in records {
            manifest.entry(&record.id, record.row);
        }
        self.persist(&mut manifest)?;

        tracing::info!(
            selected = records.len(),
            driver = self.driver.name(),
            manifest = %self.manifest_path.display(),
            max_retries = self.settings.policy.max_retries,
            timeout_secs = self.settings.render_timeout.as_secs(),
            "Starting batch run"
        );

        let expectations =
            OutputExpectations::new(&self.settings.validation, slot_map.expected_duration_secs);
        let mut tally = Tally::default();
        let mut outcome = RunOutcome::Completed;
        let mut stopped_at = None;
        let mut consecutive_engine_failures = 0u32;
        let mut rendered_any = false;

        for (index, record) in records.iter().enumerate() {
            match manifest.status_of(&record.id) {
                Some(JobStatus::Succeeded) => {
                    tracing::debug!(id = %record.id, "Already succeeded, skipping");
                    tally.skipped += 1;
                    continue;
                }
                Some(JobStatus::Failed) => {
                    tracing::debug!(id = %record.id, "Failed in an earlier run, skipping");
                    tally.previously_failed += 1;
                    continue;
                }
                _ => {}
            }

            if self.stop_flag.load(Ordering::SeqCst) {
                tracing::info!(id = %record.id, "Stop requested, ending run");
                outcome = RunOutcome::Interrupted;
                stopped_at = Some(index);
                break;
            }

            let spec = match resolve(record, slot_map) {
                Ok(spec) => spec,
                Err(e) => {
                    tracing::warn!(
                        id = %record.id,
                        row = record.row,
                        error = %e,
                        "Record cannot be resolved"
                    );
                    self.finish_record(&mut manifest, record, Err(e.into()), 0, &mut tally)?;
                    continue;
                }
            };

            if !rendered_any && !self.settings.start_delay.is_zero() {
                tracing::info!(
                    delay_secs = self.settings.start_delay.as_secs(),
                    "Waiting before first render"
                );
                tokio::time::sleep(self.settings.start_delay).await;
            }
            rendered_any = true;

            if consecutive_engine_failures > 0 {
                let delay = self.settings.policy.backoff_delay(consecutive_engine_failures);
                if !delay.is_zero() {
                    tracing::warn!(
                        consecutive = consecutive_engine_failures,
                        delay_secs = delay.as_secs(),
                        "Backing off after engine failures"
                    );
                    tokio::time::sleep(delay).await;
                }
            }

            manifest.entry(&record.id, record.row).mark_in_progress();
            self.persist(&mut manifest)?;

            let record_outcome = self.process(&spec, &expectations, &mut manifest).await;
            let engine_failure = matches!(
                &record_outcome.result,
                Err(reason) if self.settings.policy.counts_toward_ceiling(reason)
            );
            let engine_lost = record_outcome.engine_lost;
            self.finish_record(
                &mut manifest,
                record,
                record_outcome.result,
                record_outcome.attempts,
                &mut tally,
            )?;

            if engine_failure {
                consecutive_engine_failures += 1;
            } else {
                consecutive_engine_failures = 0;
            }

            if let Some(error) = engine_lost {
                tracing::error!(
                    error = %error,
                    "Render engine could not be restarted, aborting run"
                );
                outcome = RunOutcome::Aborted {
                    reason: format!("engine restart failed: {error}"),
                };
                stopped_at = Some(index + 1);
                break;
            }

            if self.settings.policy.ceiling_exceeded(consecutive_engine_failures) {
                tracing::error!(
                    consecutive = consecutive_engine_failures,
                    ceiling = self.settings.policy.failure_ceiling,
                    "Consecutive engine failures exceeded ceiling, aborting run"
                );
                outcome = RunOutcome::Aborted {
                    reason: format!(
                        "{consecutive_engine_failures} consecutive records failed with engine errors (ceiling {})",
                        self.settings.policy.failure_ceiling
                    ),
                };
                stopped_at = Some(index + 1);
                break;
            }
        }

        let not_attempted = stopped_at
            .map(|start| {
                records[start..]
                    .iter()
                    .filter(|r| {
                        !matches!(
                            manifest.status_of(&r.id),
                            Some(JobStatus::Succeeded | JobStatus::Failed)
                        )
                    })
                    .count()
            })
            .unwrap_or(0);

        let report = RunReport {
            started_at: clock.started_at(),
            finished_at: now_rfc3339(),
            duration_secs: clock.elapsed_secs(),
            outcome,
            selected: records.len(),
            succeeded: tally.succeeded,
            failed: tally.failed,
            skipped: tally.skipped,
            previously_failed: tally.previously_failed,
            not_attempted,
            render_attempts: self.render_attempts,
            failures: tally.failures,
            outputs: tally.outputs,
        };

        tracing::info!(
            outcome = ?report.outcome,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            not_attempted = report.not_attempted,
            duration_secs = report.duration_secs,
            "Batch run finished"
        );
        Ok(report)
    }

    /// Render, validate, and retry one record until it reaches a terminal
    /// state.
    async fn process(
        &mut self,
        spec: &ResolvedJobSpec,
        expectations: &OutputExpectations,
        manifest: &mut RunManifest,
    ) -> RecordOutcome {
        let max_attempts = self.settings.policy.max_attempts();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.render_attempts += 1;
            {
                let entry = manifest.entry(&spec.id, spec.row);
                entry.attempts += 1;
                entry.retry_count = attempt - 1;
            }

            tracing::info!(id = %spec.id, attempt, max_attempts, "Rendering record");
            let reason = match self.driver.render(spec, self.settings.render_timeout).await {
                Ok(output) => {
                    let validation =
                        validate(&output.output_path, expectations, self.probe.as_deref());
                    match validation.failure() {
                        None => {
                            return RecordOutcome {
                                result: Ok(output.output_path),
                                attempts: attempt,
                                engine_lost: None,
                            };
                        }
                        Some(reason) => {
                            set_aside_invalid_output(&output.output_path);
                            reason
                        }
                    }
                }
                Err(failure) => FailureReason::from(failure),
            };

            tracing::warn!(
                id = %spec.id,
                attempt,
                code = reason.code(),
                error = %reason,
                "Render attempt failed"
            );

            if self.settings.policy.requires_restart(&reason) {
                if let Err(error) = self.driver.restart().await {
                    return RecordOutcome {
                        result: Err(reason),
                        attempts: attempt,
                        engine_lost: Some(error),
                    };
                }
            }

            if !self.settings.policy.is_retryable(&reason) || attempt >= max_attempts {
                return RecordOutcome {
                    result: Err(reason),
                    attempts: attempt,
                    engine_lost: None,
                };
            }

            if !self.settings.policy.retry_delay.is_zero() {
                tokio::time::sleep(self.settings.policy.retry_delay).await;
            }
        }
    }

    fn finish_record(
        &self,
        manifest: &mut RunManifest,
        record: &RawRecord,
        result: Result<PathBuf, FailureReason>,
        attempts: u32,
        tally: &mut Tally,
    ) -> Result<(), RunError> {
        let entry = manifest.entry(&record.id, record.row);
        match result {
            Ok(output_path) => {
                tracing::info!(
                    id = %record.id,
                    output = %output_path.display(),
                    "Record succeeded"
                );
                entry.mark_succeeded(output_path.clone());
                tally.succeeded += 1;
                tally.outputs.push(SucceededRecord {
                    id: record.id.clone(),
                    output_path,
                });
            }
            Err(reason) => {
                tracing::warn!(
                    id = %record.id,
                    attempts,
                    code = reason.code(),
                    "Record failed"
                );
                entry.mark_failed(reason.clone());
                tally.failed += 1;
                tally.failures.push(FailedRecord {
                    id: record.id.clone(),
                    row: record.row,
                    attempts,
                    reason,
                });
            }
        }
        self.persist(manifest)
    }

    fn persist(&self, manifest: &mut RunManifest) -> Result<(), RunError> {
        manifest.touch();
        persist_manifest(manifest, &self.manifest_path).map_err(|source| {
            tracing::error!(error = %source, "Manifest could not be persisted, aborting run");
            RunError::Persist {
                path: self.manifest_path.clone(),
                source,
            }
        })
    }
}

/// Keep a rejected output for inspection without leaving it at the final
/// path, where it could be mistaken for a good render.
fn set_aside_invalid_output(path: &Path) {
    if !path.exists() {
        return;
    }
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".invalid");
    let aside = path.with_file_name(name);
    if let Err(e) = std::fs::rename(path, &aside) {
        tracing::warn!(path = %path.display(), error = %e, "Failed to set invalid output aside");
    }
}
