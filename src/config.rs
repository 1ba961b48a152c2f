//! Configuration types for cep-export
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros, with environment fallbacks
//! - Runtime configuration with validation
//! - Pipeline tunables (worker count, queue capacity, lookup mode, ordering)

use crate::error::ConfigError;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Minimum queue capacity
const MIN_QUEUE_CAPACITY: usize = 1;

/// Default capacity for both pipeline queues
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Default key prefix for CEP records
pub const DEFAULT_PREFIX: &str = "cep:";

/// Export CEP records from RocksDB to CSV
#[derive(Parser, Debug, Clone)]
#[command(
    name = "cep-export",
    version,
    about = "Export CEP records from RocksDB to CSV",
    long_about = "Reads every record stored under a key prefix and writes one CSV row per \
                  decodable record.\n\n\
                  Keys are iterated from a single snapshot, values are decoded by a pool of \
                  worker threads and a single writer thread serializes the rows.",
    after_help = "EXAMPLES:\n    \
        cep-export --db-path ./data\n    \
        cep-export --db-path ./data -w 8 --queue-capacity 5000\n    \
        cep-export --db-path ./data --order key -o exports --file-name ceps.csv\n    \
        DB_PATH=./data LOG_FORMAT=text cep-export"
)]
pub struct CliArgs {
    /// RocksDB database directory
    #[arg(long, env = "DB_PATH", default_value = "./data", value_name = "DIR")]
    pub db_path: PathBuf,

    /// Key prefix selecting the records to export
    #[arg(long, env = "EXPORT_PREFIX", default_value = DEFAULT_PREFIX, value_name = "PREFIX")]
    pub prefix: String,

    /// Output directory (created if absent)
    #[arg(short, long, env = "EXPORT_OUTPUT_DIR", default_value = "tmp", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Output file name inside the output directory
    #[arg(long, env = "EXPORT_FILE_NAME", default_value = "ceps.csv", value_name = "NAME")]
    pub file_name: String,

    /// Number of decode worker threads
    #[arg(
        short = 'w',
        long,
        env = "EXPORT_WORKERS",
        default_value_t = default_workers(),
        value_name = "NUM"
    )]
    pub workers: usize,

    /// Capacity of the key and row queues (controls memory usage)
    #[arg(
        long,
        env = "EXPORT_QUEUE_CAPACITY",
        default_value_t = DEFAULT_QUEUE_CAPACITY,
        value_name = "NUM"
    )]
    pub queue_capacity: usize,

    /// How workers acquire read views for lookups
    #[arg(long, env = "EXPORT_LOOKUP", value_enum, default_value_t = LookupMode::PerKey)]
    pub lookup: LookupMode,

    /// Row order in the output file
    #[arg(long, env = "EXPORT_ORDER", value_enum, default_value_t = OutputOrder::Arrival)]
    pub order: OutputOrder,

    /// Log level filter (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", value_name = "LEVEL")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

fn default_workers() -> usize {
    num_cpus::get()
}

/// Read view acquisition strategy for worker lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LookupMode {
    /// Open a fresh view for every lookup
    PerKey,
    /// Each worker opens one view and reuses it
    PerWorker,
}

/// Output row order
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputOrder {
    /// Rows are written as workers finish them
    Arrival,
    /// Rows are reordered to match ascending key order
    Key,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per event
    Json,
    /// Human-readable lines
    Text,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// RocksDB directory
    pub db_path: PathBuf,

    /// Key prefix (stripped from the first column)
    pub prefix: String,

    /// Output directory
    pub output_dir: PathBuf,

    /// Output file name
    pub file_name: String,

    /// Number of decode workers
    pub worker_count: usize,

    /// Capacity of each pipeline queue
    pub queue_capacity: usize,

    /// Read view strategy for lookups
    pub lookup: LookupMode,

    /// Output row order
    pub order: OutputOrder,

    /// Show progress indicator
    pub show_progress: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data"),
            prefix: DEFAULT_PREFIX.to_string(),
            output_dir: PathBuf::from("tmp"),
            file_name: "ceps.csv".to_string(),
            worker_count: default_workers(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            lookup: LookupMode::PerKey,
            order: OutputOrder::Arrival,
            show_progress: false,
        }
    }
}

impl ExportConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let config = Self {
            db_path: args.db_path,
            prefix: args.prefix,
            output_dir: args.output_dir,
            file_name: args.file_name,
            worker_count: args.workers,
            queue_capacity: args.queue_capacity,
            lookup: args.lookup,
            order: args.order,
            show_progress: !args.quiet,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check pipeline limits
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 || self.worker_count > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: self.worker_count,
                max: MAX_WORKERS,
            });
        }

        if self.queue_capacity < MIN_QUEUE_CAPACITY {
            return Err(ConfigError::InvalidQueueCapacity {
                capacity: self.queue_capacity,
                min: MIN_QUEUE_CAPACITY,
            });
        }

        if self.prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }

        if self.file_name.is_empty() || self.file_name.contains(['/', '\\']) {
            return Err(ConfigError::InvalidOutputPath {
                path: self.output_path(),
                reason: "File name must be a single non-empty path component".to_string(),
            });
        }

        Ok(())
    }

    /// Full path of the output file
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.file_name)
    }
}
