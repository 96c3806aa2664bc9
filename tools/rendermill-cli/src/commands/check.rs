//! Check that the render toolchain is installed.

use std::process::ExitCode;

use rendermill_common::config::RunConfig;
use rendermill_render_engine::command::command_exists;
use rendermill_render_engine::{CommandEngine, FfprobeProbe, MediaProbe, RenderDriver};

pub fn run(config: &RunConfig) -> anyhow::Result<ExitCode> {
    println!("Rendermill System Check");
    println!("{}", "=".repeat(50));

    let mut all_required_ok = true;
    let mut report = |label: &str, program: &str, required: bool| {
        if command_exists(program) {
            println!("[OK] {label}: {program}");
        } else if required {
            println!("[MISSING] {label}: {program}");
            all_required_ok = false;
        } else {
            println!("[WARN] {label}: {program} not found");
        }
    };

    let engine = CommandEngine::new(config.engine.clone());
    report("Render program", engine.name(), true);
    if let Some(launch) = &config.engine.launch {
        report("Engine launcher", &launch.program, true);
    }
    if let Some(probe) = &config.engine.ready_probe {
        report("Readiness probe", &probe.program, true);
    }
    if !config.engine.helper_process_patterns.is_empty() {
        report("Helper cleanup", "pkill", false);
    }
    if config.validation.probe {
        let probe = FfprobeProbe::new(&config.validation.probe_program);
        report("Media probe", probe.name(), true);
    } else {
        println!("[SKIP] Media probe disabled; outputs are checked by size only");
    }

    println!();
    println!("Output directory: {}", config.engine.output_dir.display());
    for dir in &config.engine.cache_dirs {
        println!("Cache directory cleared on restart: {}", dir.display());
    }

    println!();
    if all_required_ok {
        println!("All required tools are available. Rendermill is ready.");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("Some required tools are missing. See above.");
        Ok(ExitCode::FAILURE)
    }
}
