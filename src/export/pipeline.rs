//! Export coordinator - wires and runs the pipeline
//!
//! The coordinator is responsible for:
//! - Preparing the output file
//! - Creating the key and row queues
//! - Spawning the writer, the decode workers and the key iterator
//! - Joining every spawned thread, on every exit path
//! - Reporting the first fatal error, or the final statistics
//!
//! All stages run as scoped threads borrowing the store, so no thread can
//! outlive [`Exporter::export`].

use crate::config::{ExportConfig, OutputOrder};
use crate::error::{ExportError, Result, WorkerError};
use crate::export::iterator::{IteratorOutcome, KeyIterator};
use crate::export::queue::{queue, reorder_window, KeyTask, RowMessage};
use crate::export::worker::{DecodeWorker, WorkerOutcome};
use crate::export::writer::{RecordWriter, WriterOutcome};
use crate::store::KvStore;
use parking_lot::Mutex;
use std::any::Any;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Progress callback invoked from the writer thread
pub type ProgressCallback<'a> = Box<dyn Fn(&ExportProgress) + Send + Sync + 'a>;

/// Live counters shared by all stages
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Keys emitted by the iterator
    pub keys_emitted: AtomicU64,

    /// Rows serialized by the writer
    pub rows_written: AtomicU64,

    /// Keys dropped by workers
    pub records_skipped: AtomicU64,
}

/// Holds the first fatal error of a run
///
/// Recording an error also raises the shutdown flag so upstream stages stop
/// producing work nobody will write.
pub struct FirstError {
    slot: Mutex<Option<ExportError>>,
    shutdown: Arc<AtomicBool>,
}

impl FirstError {
    pub fn new(shutdown: Arc<AtomicBool>) -> Self {
        Self {
            slot: Mutex::new(None),
            shutdown,
        }
    }

    /// Keep `err` if no fatal error was recorded yet
    pub fn record(&self, err: ExportError) {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            error!(error = %err, "Export failed, stopping pipeline");
            *slot = Some(err);
        } else {
            warn!(error = %err, "Additional export failure");
        }
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Whether a fatal error was recorded
    pub fn is_set(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Take the recorded error
    pub fn take(&self) -> Option<ExportError> {
        self.slot.lock().take()
    }
}

/// Progress information for display
#[derive(Debug, Clone)]
pub struct ExportProgress {
    /// Keys emitted by the iterator so far
    pub keys_observed: u64,

    /// Rows written so far
    pub rows_written: u64,

    /// Keys skipped so far
    pub records_skipped: u64,

    /// Elapsed time
    pub elapsed: Duration,
}

impl ExportProgress {
    /// Snapshot the live counters
    pub fn from_stats(stats: &PipelineStats, elapsed: Duration) -> Self {
        Self {
            keys_observed: stats.keys_emitted.load(Ordering::Relaxed),
            rows_written: stats.rows_written.load(Ordering::Relaxed),
            records_skipped: stats.records_skipped.load(Ordering::Relaxed),
            elapsed,
        }
    }

    /// Calculate rows per second rate
    pub fn rows_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.rows_written as f64 / secs
        } else {
            0.0
        }
    }
}

/// Result of a completed export
#[derive(Debug, Clone)]
pub struct ExportReport {
    /// Rows actually written to the output
    pub rows_written: u64,

    /// Keys under the prefix seen by the iterator
    pub keys_observed: u64,

    /// Keys dropped because lookup or decoding failed
    pub records_skipped: u64,

    /// Deepest key queue occupancy observed
    pub key_queue_peak: usize,

    /// Deepest row queue occupancy observed
    pub row_queue_peak: usize,

    /// Most rows held back for key ordering at once
    pub reorder_peak: usize,

    /// Time taken for the export
    pub duration: Duration,

    /// Whether every key was processed (vs interrupted)
    pub completed: bool,

    /// Output file, when exporting to a file
    pub output_path: Option<PathBuf>,
}

/// What each stage reported after being joined
#[derive(Debug, Default)]
struct StageOutcomes {
    iterator: IteratorOutcome,
    workers: WorkerOutcome,
    writer: WriterOutcome,
}

/// Coordinates a parallel export
pub struct Exporter<'s, S: KvStore> {
    /// Store to read from
    store: &'s S,

    /// Configuration
    config: ExportConfig,

    /// Shutdown signal
    shutdown: Arc<AtomicBool>,

    /// Optional progress reporting
    progress: Option<ProgressCallback<'s>>,
}

impl<'s, S: KvStore> Exporter<'s, S> {
    /// Create a new exporter over `store`
    pub fn new(store: &'s S, config: ExportConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            store,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            progress: None,
        })
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Invoke `callback` periodically with live progress
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ExportProgress) + Send + Sync + 's,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Export to `<output_dir>/<file_name>`, creating the directory if needed
    pub fn export(self) -> Result<ExportReport> {
        let output_dir = &self.config.output_dir;
        fs::create_dir_all(output_dir).map_err(|source| ExportError::Setup {
            path: output_dir.clone(),
            source,
        })?;

        let path = self.config.output_path();
        let file = File::create(&path).map_err(|source| ExportError::Setup {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), "Writing CSV");

        let mut report = self.export_to(file)?;
        report.output_path = Some(path);
        Ok(report)
    }

    /// Export to an arbitrary sink
    pub fn export_to<W: Write + Send>(self, sink: W) -> Result<ExportReport> {
        let start = Instant::now();
        let stats = PipelineStats::default();
        let errors = FirstError::new(Arc::clone(&self.shutdown));

        let (key_tx, key_rx, key_stats) = queue::<KeyTask>(self.config.queue_capacity);
        let (row_tx, row_rx, row_stats) = queue::<RowMessage>(self.config.queue_capacity);

        info!(
            prefix = %self.config.prefix,
            workers = self.config.worker_count,
            queue_capacity = self.config.queue_capacity,
            lookup = ?self.config.lookup,
            order = ?self.config.order,
            "Starting export"
        );

        let prefix = self.config.prefix.as_bytes();

        // Key order holds rows back until their turn; bound how many
        let (window_gate, window_release) = match self.config.order {
            OutputOrder::Key => {
                let (gate, release) = reorder_window(self.config.queue_capacity);
                (Some(gate), Some(release))
            }
            OutputOrder::Arrival => (None, None),
        };

        let outcomes = thread::scope(|scope| {
            let mut outcomes = StageOutcomes::default();

            let writer = RecordWriter::new(sink, self.config.order, &stats, &errors, start)
                .with_progress(self.progress.as_deref())
                .with_window(window_release);
            let writer_handle =
                match spawn_stage(scope, "export-writer".to_string(), move || writer.run(row_rx)) {
                    Ok(handle) => handle,
                    Err(e) => {
                        errors.record(e.into());
                        return outcomes;
                    }
                };

            let mut workers = Vec::with_capacity(self.config.worker_count);
            for id in 0..self.config.worker_count {
                let worker = DecodeWorker {
                    id,
                    store: self.store,
                    prefix,
                    lookup: self.config.lookup,
                    order: self.config.order,
                    shutdown: &self.shutdown,
                    stats: &stats,
                    errors: &errors,
                };
                let keys = key_rx.clone();
                let rows = row_tx.clone();

                match spawn_stage(scope, format!("export-worker-{}", id), move || {
                    worker.run(keys, rows)
                }) {
                    Ok(handle) => workers.push(handle),
                    Err(e) => {
                        errors.record(e.into());
                        break;
                    }
                }
            }

            // Only stage threads may hold queue ends from here on
            drop(key_rx);
            drop(row_tx);

            let iterator_handle = if errors.is_set() {
                drop(key_tx);
                None
            } else {
                let iterator = KeyIterator {
                    store: self.store,
                    prefix,
                    shutdown: &self.shutdown,
                    stats: &stats,
                    errors: &errors,
                };
                match spawn_stage(scope, "export-keys".to_string(), move || {
                    iterator.run(key_tx, window_gate)
                }) {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        errors.record(e.into());
                        None
                    }
                }
            };

            if let Some(handle) = iterator_handle {
                match join_stage(handle) {
                    Ok(outcome) => outcomes.iterator = outcome,
                    Err(e) => errors.record(e.into()),
                }
            }

            for handle in workers {
                match join_stage(handle) {
                    Ok(outcome) => {
                        outcomes.workers.rows += outcome.rows;
                        outcomes.workers.skipped += outcome.skipped;
                    }
                    Err(e) => errors.record(e.into()),
                }
            }

            match join_stage(writer_handle) {
                Ok(outcome) => outcomes.writer = outcome,
                Err(e) => errors.record(e.into()),
            }

            outcomes
        });

        if let Some(err) = errors.take() {
            return Err(err);
        }

        let completed = outcomes.iterator.exhausted
            && outcomes.workers.processed() == outcomes.iterator.emitted;

        let report = ExportReport {
            rows_written: outcomes.writer.rows_written,
            keys_observed: outcomes.iterator.emitted,
            records_skipped: outcomes.workers.skipped,
            key_queue_peak: key_stats.high_water(),
            row_queue_peak: row_stats.high_water(),
            reorder_peak: outcomes.writer.reorder_peak,
            duration: start.elapsed(),
            completed,
            output_path: None,
        };

        if completed {
            info!(
                rows_written = report.rows_written,
                keys_observed = report.keys_observed,
                skipped = report.records_skipped,
                duration_ms = report.duration.as_millis() as u64,
                "Export completed"
            );
        } else {
            warn!(
                rows_written = report.rows_written,
                keys_observed = report.keys_observed,
                "Export interrupted before completion"
            );
        }

        Ok(report)
    }
}

/// Spawn a named stage thread inside `scope`
fn spawn_stage<'scope, 'env, T, F>(
    scope: &'scope Scope<'scope, 'env>,
    name: String,
    f: F,
) -> std::result::Result<ScopedJoinHandle<'scope, T>, WorkerError>
where
    F: FnOnce() -> T + Send + 'scope,
    T: Send + 'scope,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn_scoped(scope, f)
        .map_err(|e| WorkerError::SpawnFailed {
            thread: name,
            reason: e.to_string(),
        })
}

/// Wait for a stage thread, turning a panic into an error
fn join_stage<T>(handle: ScopedJoinHandle<'_, T>) -> std::result::Result<T, WorkerError> {
    let thread = handle.thread().name().unwrap_or("export").to_string();
    handle.join().map_err(|payload| WorkerError::Panicked {
        thread,
        message: panic_message(payload.as_ref()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn config(workers: usize, capacity: usize) -> ExportConfig {
        ExportConfig {
            worker_count: workers,
            queue_capacity: capacity,
            ..ExportConfig::default()
        }
    }

    #[test]
    fn test_export_progress_rates() {
        let progress = ExportProgress {
            keys_observed: 12_000,
            rows_written: 10_000,
            records_skipped: 5,
            elapsed: Duration::from_secs(10),
        };

        assert!((progress.rows_per_second() - 1000.0).abs() < 0.1);

        let idle = ExportProgress {
            elapsed: Duration::ZERO,
            ..progress
        };
        assert_eq!(idle.rows_per_second(), 0.0);
    }

    #[test]
    fn test_first_error_wins_and_raises_shutdown() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let errors = FirstError::new(Arc::clone(&shutdown));

        errors.record(ExportError::Flush(std::io::Error::other("first")));
        errors.record(ExportError::Flush(std::io::Error::other("second")));

        assert!(shutdown.load(Ordering::SeqCst));
        assert!(errors.is_set());
        let err = errors.take().unwrap();
        assert!(err.to_string().contains("first"));
        assert!(errors.take().is_none());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let store = MemoryStore::new();
        assert!(matches!(
            Exporter::new(&store, config(0, 10)),
            Err(ExportError::Config(_))
        ));
    }

    #[test]
    fn test_export_to_counts_rows_not_keys() {
        let store: MemoryStore = [
            ("cep:1", r#"{"uf":"SP"}"#),
            ("cep:2", "{broken"),
            ("cep:3", r#"{"uf":"MG"}"#),
            ("logradouro:1", r#"{"uf":"XX"}"#),
        ]
        .into_iter()
        .collect();

        let mut sink = Vec::new();
        let report = Exporter::new(&store, config(3, 2))
            .unwrap()
            .export_to(&mut sink)
            .unwrap();

        assert_eq!(report.rows_written, 2);
        assert_eq!(report.keys_observed, 3);
        assert_eq!(report.records_skipped, 1);
        assert!(report.completed);
        assert!(report.key_queue_peak <= 2);
        assert!(report.row_queue_peak <= 2);

        let mut lines: Vec<&str> = std::str::from_utf8(&sink).unwrap().lines().collect();
        lines.sort();
        assert_eq!(lines, vec!["1,,,,,,,,SP", "3,,,,,,,,MG"]);
    }

    #[test]
    fn test_cancelled_before_start_reports_incomplete() {
        let store: MemoryStore = (0..100)
            .map(|i| (format!("cep:{:05}", i), "{}".to_string()))
            .collect();

        let exporter = Exporter::new(&store, config(2, 4)).unwrap();
        exporter.shutdown_flag().store(true, Ordering::SeqCst);

        let report = exporter.export_to(std::io::sink()).unwrap();
        assert!(!report.completed);
        assert_eq!(report.rows_written, 0);
    }
}
