//! Error types for cep-export
//!
//! This module defines the error hierarchy for the export pipeline:
//! - Store errors (opening RocksDB, snapshot reads, iteration)
//! - Configuration and CLI errors
//! - Per-record errors (absorbed by workers, never fatal)
//! - Thread errors (spawn failures, panics)
//!
//! Fatal conditions surface through [`ExportError`]. [`RecordError`] is only
//! ever logged and counted.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for an export run
#[derive(Error, Debug)]
pub enum ExportError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Output directory or file could not be created
    #[error("Failed to prepare output '{}': {}", .path.display(), .source)]
    Setup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot could not be opened or the key iterator failed
    #[error("Key iteration failed: {0}")]
    Iteration(#[source] StoreError),

    /// A worker could not open its read view
    #[error("Worker {id} could not open a read view: {source}")]
    ReadView {
        id: usize,
        #[source]
        source: StoreError,
    },

    /// Serializing a row to the sink failed
    #[error("Failed to write row {row}: {source}")]
    Write {
        row: u64,
        #[source]
        source: csv::Error,
    },

    /// Finalizing the sink failed
    #[error("Failed to flush output: {0}")]
    Flush(#[source] std::io::Error),

    /// Thread errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Store access errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// RocksDB operation failed
    #[error("RocksDB error: {0}")]
    Rocks(#[from] rocksdb::Error),

    /// Database directory does not exist
    #[error("Database not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Generic store failure (used by non-RocksDB stores)
    #[error("{0}")]
    Other(String),
}

/// Result type alias for StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid queue capacity
    #[error("Invalid queue capacity {capacity}: must be at least {min}")]
    InvalidQueueCapacity { capacity: usize, min: usize },

    /// Export prefix must select something
    #[error("Export prefix must not be empty")]
    EmptyPrefix,

    /// Output path error
    #[error("Invalid output path '{}': {}", .path.display(), .reason)]
    InvalidOutputPath { path: PathBuf, reason: String },
}

/// Why a single key produced no row
#[derive(Error, Debug)]
pub enum RecordError {
    /// Key vanished between iteration and lookup
    #[error("no value stored for key")]
    Missing,

    /// Point lookup failed
    #[error("lookup failed: {0}")]
    Lookup(#[from] StoreError),

    /// Value is not a JSON object
    #[error("malformed value: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Key does not carry the export prefix
    #[error("key is outside the export prefix")]
    OutsidePrefix,
}

/// Thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Thread panicked
    #[error("Thread '{thread}' panicked: {message}")]
    Panicked { thread: String, message: String },

    /// Thread could not be spawned
    #[error("Failed to spawn thread '{thread}': {reason}")]
    SpawnFailed { thread: String, reason: String },
}

/// Result type alias for export operations
pub type Result<T> = std::result::Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_context() {
        let err = ExportError::Setup {
            path: PathBuf::from("tmp/ceps.csv"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "Failed to prepare output 'tmp/ceps.csv': denied");

        let err = ConfigError::InvalidWorkerCount { count: 0, max: 512 };
        assert_eq!(
            err.to_string(),
            "Invalid worker count 0: must be between 1 and 512"
        );
    }

    #[test]
    fn test_iteration_error_keeps_source() {
        use std::error::Error as _;

        let err = ExportError::Iteration(StoreError::Other("disk gone".into()));
        assert_eq!(err.source().map(|s| s.to_string()), Some("disk gone".into()));
    }
}
