//! Command-driven render engine.
//!
//! Renders by invoking a command-line renderer (`aerender` by default)
//! once per job. Optionally owns a long-running engine process that is
//! launched on first use, polled for readiness, and torn down on restart.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rendermill_common::config::{CommandSpec, EngineConfig};
use rendermill_common::error::{RendermillError, RendermillResult};
use rendermill_job_model::ResolvedJobSpec;
use tokio::process::{Child, Command};

use crate::command::{
    command_exists, match_project_error, output_tail, references_project, run_bounded,
    sanitize_id, TemplateVars, OUTPUT_TAIL_LINES,
};
use crate::driver::{RenderDriver, RenderFailure, RenderOutput};
use crate::inject::{apply_placeholders, write_bindings_file};

const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);
const READY_PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const KILL_GRACE: Duration = Duration::from_secs(10);
const HELPER_KILL_TIMEOUT: Duration = Duration::from_secs(10);

/// Directory under the output dir that receives in-progress renders.
pub const STAGING_DIR: &str = ".staging";

/// Render driver backed by external commands.
pub struct CommandEngine {
    config: EngineConfig,

    /// Long-running engine process, when `launch` is configured.
    engine: Option<Child>,

    /// Project the running engine was launched with.
    engine_project: Option<PathBuf>,
}

impl CommandEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            engine: None,
            engine_project: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Final location of the output for record `id`.
    pub fn output_path_for(&self, id: &str) -> PathBuf {
        self.config
            .output_dir
            .join(self.config.output_pattern.replace("{id}", &sanitize_id(id)))
    }

    /// Where the engine writes the output for record `id` while rendering.
    pub fn staging_path_for(&self, id: &str) -> PathBuf {
        let ext = Path::new(&self.config.output_pattern)
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mp4".to_string());
        self.staging_dir().join(format!("{}.{ext}", sanitize_id(id)))
    }

    fn bindings_path_for(&self, id: &str) -> PathBuf {
        self.staging_dir()
            .join(format!("{}.bindings.json", sanitize_id(id)))
    }

    fn staging_dir(&self) -> PathBuf {
        self.config.output_dir.join(STAGING_DIR)
    }

    /// Whether the owned engine process is currently alive.
    pub fn is_running(&mut self) -> bool {
        match self.engine.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Make sure the owned engine process is up with `project` open.
    async fn ensure_launched(&mut self, project: &Path) -> RendermillResult<()> {
        let Some(launch) = self.config.launch.clone() else {
            return Ok(());
        };

        if let Some(child) = self.engine.as_mut() {
            match child.try_wait() {
                Ok(None) => {
                    let same_project = self.engine_project.as_deref() == Some(project);
                    if same_project || !references_project(&launch) {
                        return Ok(());
                    }
                    tracing::info!(
                        project = %project.display(),
                        "Switching template project, relaunching engine"
                    );
                    self.terminate_engine().await;
                }
                Ok(Some(status)) => {
                    self.engine = None;
                    return Err(RendermillError::engine(format!(
                        "engine process exited unexpectedly ({})",
                        describe_status(status)
                    )));
                }
                Err(e) => {
                    return Err(RendermillError::engine(format!(
                        "failed to query engine process: {e}"
                    )));
                }
            }
        }

        self.launch(&launch, project).await
    }

    async fn launch(&mut self, launch: &CommandSpec, project: &Path) -> RendermillResult<()> {
        let vars = TemplateVars {
            project: Some(project),
            ..TemplateVars::default()
        };
        let args = vars.expand_all(&launch.args);

        let child = Command::new(&launch.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RendermillError::engine(format!("Failed to launch {}: {e}", launch.program))
            })?;

        tracing::info!(
            pid = child.id(),
            program = %launch.program,
            project = %project.display(),
            "Engine process launched"
        );
        self.engine = Some(child);
        self.engine_project = Some(project.to_path_buf());
        self.wait_ready().await
    }

    /// Poll the readiness probe until it succeeds or `ready_timeout_secs`
    /// elapses.
    async fn wait_ready(&mut self) -> RendermillResult<()> {
        let Some(probe) = self.config.ready_probe.clone() else {
            return Ok(());
        };
        let started = Instant::now();
        let deadline = started + Duration::from_secs(self.config.ready_timeout_secs);

        loop {
            if let Some(child) = self.engine.as_mut() {
                if let Ok(Some(status)) = child.try_wait() {
                    self.engine = None;
                    return Err(RendermillError::engine(format!(
                        "engine process exited during startup ({})",
                        describe_status(status)
                    )));
                }
            }

            match run_bounded(&probe.program, &probe.args, READY_PROBE_TIMEOUT).await {
                Ok(Some(output)) if output.status.success() => {
                    tracing::info!(
                        waited_secs = started.elapsed().as_secs_f64(),
                        "Engine ready"
                    );
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(RendermillError::engine(format!(
                        "Failed to run readiness probe {}: {e}",
                        probe.program
                    )));
                }
            }

            if Instant::now() >= deadline {
                return Err(RendermillError::engine(format!(
                    "engine not ready after {}s",
                    self.config.ready_timeout_secs
                )));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Kill and reap the owned engine process.
    async fn terminate_engine(&mut self) {
        let Some(mut child) = self.engine.take() else {
            return;
        };
        let pid = child.id();
        if let Err(e) = child.start_kill() {
            tracing::debug!(pid, error = %e, "Engine process already gone");
        }
        match tokio::time::timeout(KILL_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(pid, status = %describe_status(status), "Engine process terminated")
            }
            Ok(Err(e)) => tracing::warn!(pid, error = %e, "Failed to reap engine process"),
            Err(_) => tracing::warn!(pid, "Engine process did not exit after kill"),
        }
    }

    /// Terminate helper processes the engine leaves behind.
    async fn kill_helpers(&self) {
        for pattern in &self.config.helper_process_patterns {
            let args = ["-TERM".to_string(), "-f".to_string(), pattern.clone()];
            match run_bounded("pkill", &args, HELPER_KILL_TIMEOUT).await {
                // pkill exits 1 when nothing matched.
                Ok(Some(output)) => tracing::debug!(
                    pattern = %pattern,
                    matched = output.status.success(),
                    "Helper processes signalled"
                ),
                Ok(None) => tracing::warn!(pattern = %pattern, "pkill timed out"),
                Err(e) => tracing::warn!(pattern = %pattern, error = %e, "Failed to run pkill"),
            }
        }
    }

    /// Empty every configured cache directory, keeping the directory.
    fn clear_caches(&self) {
        for dir in &self.config.cache_dirs {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "Cannot read cache directory");
                    continue;
                }
            };

            let mut removed = 0usize;
            for entry in entries.flatten() {
                let path = entry.path();
                let result = if path.is_dir() {
                    std::fs::remove_dir_all(&path)
                } else {
                    std::fs::remove_file(&path)
                };
                match result {
                    Ok(()) => removed += 1,
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to clear cache entry"
                        )
                    }
                }
            }
            tracing::info!(dir = %dir.display(), removed, "Cache directory cleared");
        }
    }
}

#[async_trait]
impl RenderDriver for CommandEngine {
    async fn render(
        &mut self,
        spec: &ResolvedJobSpec,
        timeout: Duration,
    ) -> Result<RenderOutput, RenderFailure> {
        let started = Instant::now();

        if !spec.project.is_file() {
            return Err(RenderFailure::ProjectState(format!(
                "template project not found: {}",
                spec.project.display()
            )));
        }

        self.ensure_launched(&spec.project)
            .await
            .map_err(|e| RenderFailure::EngineCrash(e.to_string()))?;

        let staging = self.staging_path_for(&spec.id);
        let output = self.output_path_for(&spec.id);
        let bindings = self.bindings_path_for(&spec.id);

        std::fs::create_dir_all(self.staging_dir()).map_err(|e| {
            RenderFailure::EngineCrash(format!("cannot create staging directory: {e}"))
        })?;
        // A partial file from an earlier attempt must never count as output.
        remove_if_exists(&staging)
            .map_err(|e| RenderFailure::EngineCrash(format!("cannot clear stale output: {e}")))?;

        apply_placeholders(spec).map_err(|e| RenderFailure::ProjectState(e.to_string()))?;
        write_bindings_file(spec, &bindings)
            .map_err(|e| RenderFailure::EngineCrash(e.to_string()))?;

        let vars = TemplateVars {
            project: Some(&spec.project),
            composition: Some(&spec.composition),
            output: Some(&staging),
            id: Some(&spec.id),
            bindings: Some(&bindings),
        };
        let args = vars.expand_all(&self.config.render_args);
        let program = self.config.render_program.clone();

        tracing::info!(
            id = %spec.id,
            variant = %spec.variant,
            program = %program,
            timeout_secs = timeout.as_secs(),
            "Render started"
        );
        let result = run_bounded(&program, &args, timeout).await;
        let _ = std::fs::remove_file(&bindings);

        let finished = match result {
            Ok(Some(finished)) => finished,
            Ok(None) => {
                tracing::warn!(
                    id = %spec.id,
                    timeout_secs = timeout.as_secs(),
                    "Render timed out, process killed"
                );
                let _ = std::fs::remove_file(&staging);
                return Err(RenderFailure::Timeout(timeout));
            }
            Err(e) => {
                return Err(RenderFailure::EngineCrash(format!(
                    "failed to start {program}: {e}"
                )));
            }
        };

        if !finished.status.success() {
            let tail = output_tail(&finished, OUTPUT_TAIL_LINES);
            let _ = std::fs::remove_file(&staging);
            tracing::warn!(
                id = %spec.id,
                status = %describe_status(finished.status),
                output_tail = %tail,
                "Render command failed"
            );
            if let Some(pattern) =
                match_project_error(&finished, &self.config.project_error_patterns)
            {
                return Err(RenderFailure::ProjectState(format!("{pattern}: {tail}")));
            }
            return Err(RenderFailure::EngineCrash(format!(
                "{program} exited with {}: {tail}",
                describe_status(finished.status)
            )));
        }

        if !staging.is_file() {
            tracing::warn!(
                id = %spec.id,
                staging = %staging.display(),
                "Render produced no output"
            );
            return Err(RenderFailure::OutputNotProduced(output));
        }

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RenderFailure::EngineCrash(format!("cannot create output directory: {e}"))
            })?;
        }
        move_file(&staging, &output).map_err(|e| {
            RenderFailure::EngineCrash(format!(
                "cannot move output into place at {}: {e}",
                output.display()
            ))
        })?;

        let elapsed = started.elapsed();
        tracing::info!(
            id = %spec.id,
            output = %output.display(),
            elapsed_secs = elapsed.as_secs_f64(),
            "Render finished"
        );
        Ok(RenderOutput {
            output_path: output,
            elapsed,
        })
    }

    async fn restart(&mut self) -> RendermillResult<()> {
        tracing::warn!(engine = %self.config.render_program, "Restarting render engine");
        let project = self.engine_project.take();

        self.terminate_engine().await;
        self.kill_helpers().await;
        self.clear_caches();

        match (self.config.launch.clone(), project) {
            (Some(launch), Some(project)) => self.launch(&launch, &project).await?,
            // Nothing launched yet; the next render launches on demand.
            (Some(_), None) => {}
            (None, _) => self.wait_ready().await?,
        }

        tracing::info!("Render engine restarted");
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.terminate_engine().await;
        self.engine_project = None;
    }

    fn is_available(&self) -> bool {
        command_exists(&self.config.render_program)
            && self
                .config
                .launch
                .as_ref()
                .map_or(true, |launch| command_exists(&launch.program))
    }

    fn name(&self) -> &str {
        &self.config.render_program
    }
}

fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => status.to_string(),
    }
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Rename, falling back to copy and delete across filesystems.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}
