use std::io;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use dirsum::config::{Cli, Mode, RunConfig};
use dirsum::hash::{HashComputer, HashRegistry, ScanEngine, VerifyEngine};
use dirsum::logging;

// Exit codes
const EXIT_OK: u8 = 0;
const EXIT_FAILURES: u8 = 1;
const EXIT_SETUP: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let flag_level = cli.log_level.clone();
    let config = RunConfig::from_cli(cli);

    // The config file may carry the filter, so logging waits for it
    let level = match &config {
        Ok(config) => config.log_level.clone(),
        Err(_) => flag_level,
    };
    logging::init_tracing(level.as_deref());

    match config.map_err(anyhow::Error::from).and_then(run) {
        Ok(true) => ExitCode::from(EXIT_OK),
        Ok(false) => ExitCode::from(EXIT_FAILURES),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(EXIT_SETUP)
        }
    }
}

/// Returns whether the run finished without mismatches or per-file errors
fn run(config: RunConfig) -> Result<bool> {
    tracing::debug!(
        mode = ?config.mode,
        algorithm = %config.algorithm,
        workers = config.workers,
        "resolved configuration"
    );

    let provider = HashRegistry::resolve(&config.algorithm, config.key.as_deref())?;
    let computer = HashComputer::new(provider);

    match config.mode {
        Mode::Generate => {
            let stats = ScanEngine::new(computer)
                .with_workers(config.workers)
                .with_format(config.format)
                .with_flush_every(config.flush_every)
                .with_path_style(config.path_style)
                .with_progress(config.progress)
                .with_best_effort(config.best_effort)
                .scan_directory(&config.dir, config.list.as_deref())
                .with_context(|| format!("generating checksums for {}", config.dir.display()))?;

            if stats.files_failed > 0 {
                eprintln!("{} file(s) could not be hashed", stats.files_failed);
            }
            Ok(stats.is_success())
        }
        Mode::Verify => {
            let list = config
                .list
                .as_deref()
                .context("--list is required with --verify")?;

            let report = VerifyEngine::new(computer)
                .with_workers(config.workers)
                .with_format(config.format)
                .with_strategy(config.strategy)
                .with_verbose(config.verbose)
                .with_progress(config.progress)
                .with_report_new(config.report_new)
                .verify(&config.dir, list, io::stdout())
                .with_context(|| format!("verifying {} against {}", config.dir.display(), list.display()))?;

            Ok(report.is_success())
        }
    }
}
