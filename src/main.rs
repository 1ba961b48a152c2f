//! cep-export - Parallel CSV Export of CEP Records
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use cep_export::config::{CliArgs, ExportConfig, LogFormat};
use cep_export::progress::{print_header, print_summary, ProgressReporter};
use cep_export::{Exporter, RocksStore};
use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();

    setup_logging(&args.log_level, args.log_format)?;

    let config = ExportConfig::from_args(args).context("Invalid configuration")?;

    if config.show_progress {
        print_header(
            &config.db_path,
            &config.prefix,
            config.worker_count,
            &config.output_path(),
        );
    }

    let store = RocksStore::open_readonly(&config.db_path)
        .with_context(|| format!("Failed to open store at {}", config.db_path.display()))?;

    info!(
        path = %config.db_path.display(),
        estimated_keys = store.approx_key_count(),
        "Store opened"
    );

    let progress = if config.show_progress {
        ProgressReporter::new()
    } else {
        ProgressReporter::hidden()
    };
    progress.set_status("Scanning keys...");

    let reporter = progress.clone();
    let exporter = Exporter::new(&store, config)
        .context("Failed to initialize exporter")?
        .on_progress(move |p| reporter.update(p));

    // Setup signal handler for graceful shutdown
    let shutdown_flag = exporter.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let result = exporter.export();
    progress.finish_and_clear();
    let report = result.context("Export failed")?;

    print_summary(&report);

    if !report.completed {
        info!("Export was interrupted before completion");
    }

    Ok(())
}

fn setup_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(format!("cep_export={},warn", level))
        .with_context(|| format!("Invalid log level '{}'", level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }

    Ok(())
}
