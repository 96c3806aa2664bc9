//! Rendermill CLI: batch-render personalised videos through an external
//! rendering engine.
//!
//! Usage:
//!   rendermill run --input <CSV> --slots <JSON> --manifest <PATH>
//!                                  Render every pending record
//!   rendermill validate --input <CSV> --slots <JSON>
//!                                  Check the dataset without rendering
//!   rendermill status <MANIFEST>... Summarise one or more manifests
//!   rendermill requeue --manifest <PATH>
//!                                  Move failed records back to pending
//!   rendermill check               Check the engine toolchain

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "rendermill",
    about = "Resumable batch rendering of templated videos",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit structured JSON logs
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/rendermill/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render every pending record of a dataset
    Run {
        /// Input dataset (CSV with a header row)
        #[arg(short, long)]
        input: PathBuf,

        /// Template slot map
        #[arg(short, long)]
        slots: PathBuf,

        /// Run manifest (created if missing)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Retries per record after the first attempt
        #[arg(long)]
        max_retries: Option<u32>,

        /// Per-render timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// First row to render (1-based, inclusive)
        #[arg(long)]
        start: Option<usize>,

        /// Last row to render (1-based, inclusive)
        #[arg(long)]
        end: Option<usize>,

        /// Render only the k-th of n disjoint slices, e.g. 2/4
        #[arg(long)]
        partition: Option<String>,

        /// Seconds to wait before the first render
        #[arg(long, default_value = "0")]
        start_delay: u64,

        /// Requeue records that failed in earlier runs
        #[arg(long)]
        retry_failed: bool,

        /// Failed records tolerated before exiting non-zero
        #[arg(long, default_value = "0")]
        accept_failures: usize,

        /// Report path (defaults to <manifest>.report.json)
        #[arg(long)]
        report: Option<PathBuf>,

        /// Override the output directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Skip container probing; only check existence and size
        #[arg(long)]
        no_probe: bool,

        /// Replace a stale manifest lock
        #[arg(long)]
        force: bool,
    },

    /// Check a dataset against the slot map without rendering
    Validate {
        /// Input dataset (CSV with a header row)
        #[arg(short, long)]
        input: PathBuf,

        /// Template slot map
        #[arg(short, long)]
        slots: PathBuf,
    },

    /// Summarise one or more run manifests
    Status {
        /// Manifest files (partition manifests are merged)
        #[arg(required = true)]
        manifests: Vec<PathBuf>,
    },

    /// Move failed records back to pending
    Requeue {
        /// Run manifest
        #[arg(short, long)]
        manifest: PathBuf,

        /// Only records failed with this reason code (repeatable)
        #[arg(long = "code")]
        codes: Vec<String>,

        /// Only these record ids (repeatable)
        #[arg(long = "id")]
        ids: Vec<String>,

        /// Replace a stale manifest lock
        #[arg(long)]
        force: bool,
    },

    /// Check that the render toolchain is installed
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = commands::load_config(cli.config.as_deref())?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    rendermill_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Run {
            input,
            slots,
            manifest,
            max_retries,
            timeout,
            start,
            end,
            partition,
            start_delay,
            retry_failed,
            accept_failures,
            report,
            output_dir,
            no_probe,
            force,
        } => {
            commands::run::run(
                config,
                commands::run::RunArgs {
                    input,
                    slots,
                    manifest,
                    max_retries,
                    timeout,
                    start,
                    end,
                    partition,
                    start_delay,
                    retry_failed,
                    accept_failures,
                    report,
                    output_dir,
                    no_probe,
                    force,
                },
            )
            .await
        }
        Commands::Validate { input, slots } => commands::validate::run(input, slots),
        Commands::Status { manifests } => commands::status::run(manifests),
        Commands::Requeue {
            manifest,
            codes,
            ids,
            force,
        } => commands::requeue::run(manifest, codes, ids, force),
        Commands::Check => commands::check::run(&config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_arguments() {
        let cli = Cli::try_parse_from([
            "rendermill",
            "run",
            "--input",
            "records.csv",
            "--slots",
            "slots.json",
            "--manifest",
            "manifest.json",
            "--max-retries",
            "4",
            "--timeout",
            "600",
            "--partition",
            "2/3",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                max_retries,
                timeout,
                partition,
                accept_failures,
                start_delay,
                retry_failed,
                ..
            } => {
                assert_eq!(max_retries, Some(4));
                assert_eq!(timeout, Some(600));
                assert_eq!(partition.as_deref(), Some("2/3"));
                assert_eq!(accept_failures, 0);
                assert_eq!(start_delay, 0);
                assert!(!retry_failed);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_status_requires_a_manifest() {
        assert!(Cli::try_parse_from(["rendermill", "status"]).is_err());
        assert!(Cli::try_parse_from(["rendermill", "status", "a.json", "b.json"]).is_ok());
    }
}
