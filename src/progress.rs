//! Progress reporting for the exporter
//!
//! Provides real-time progress display using indicatif progress bars.

use crate::export::{ExportProgress, ExportReport};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

/// Progress reporter that displays export status
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        if let Ok(spinner) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            bar.set_style(spinner.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }

        bar.enable_steady_tick(std::time::Duration::from_millis(100));

        Self { bar }
    }

    /// A reporter that draws nothing
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Update the progress display
    pub fn update(&self, progress: &ExportProgress) {
        let msg = format!(
            "Keys: {} | Rows: {} | Skipped: {} | Rate: {:.0}/s",
            format_number(progress.keys_observed),
            format_number(progress.rows_written),
            format_number(progress.records_skipped),
            progress.rows_per_second(),
        );

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the export results
pub fn print_summary(report: &ExportReport) {
    let duration_secs = report.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        report.rows_written as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    if report.completed {
        println!("{}", style("Export Complete").green().bold());
    } else {
        println!("{}", style("Export Interrupted").yellow().bold());
    }
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Rows:").bold(), format_number(report.rows_written));
    println!("  {} {}", style("Keys:").bold(), format_number(report.keys_observed));
    if report.records_skipped > 0 {
        println!(
            "  {} {}",
            style("Skipped:").yellow().bold(),
            format_number(report.records_skipped)
        );
    }
    println!(
        "  {} {:.1}s ({:.0} rows/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    println!(
        "  {} keys {} / rows {}",
        style("Queue peaks:").bold(),
        report.key_queue_peak,
        report.row_queue_peak
    );
    if let Some(path) = &report.output_path {
        match std::fs::metadata(path) {
            Ok(meta) => println!(
                "  {} {} ({})",
                style("Output:").bold(),
                path.display(),
                format_size(meta.len(), BINARY)
            ),
            Err(_) => println!("  {} {}", style("Output:").bold(), path.display()),
        }
    }
    println!();
}

/// Print a header at the start of the export
pub fn print_header(db_path: &Path, prefix: &str, workers: usize, output: &Path) {
    println!();
    println!(
        "{} {}",
        style("cep-export").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Source:").bold(), db_path.display());
    println!("  {} {}", style("Prefix:").bold(), prefix);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Output:").bold(), output.display());
    println!();
}
