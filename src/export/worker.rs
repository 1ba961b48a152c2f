//! Decode worker logic
//!
//! Each worker:
//! - Pulls keys from the key queue until it is closed and drained
//! - Looks up the value through a read view
//! - Decodes the JSON object and projects it into a row
//! - Pushes the row into the row queue
//!
//! A key that cannot be looked up or decoded is logged and skipped; it
//! never aborts the export.

use crate::config::{LookupMode, OutputOrder};
use crate::error::{ExportError, RecordError};
use crate::export::pipeline::{FirstError, PipelineStats};
use crate::export::queue::{KeyTask, QueueReceiver, QueueSender, RowMessage};
use crate::export::record::{build_row, Row};
use crate::store::{KvStore, ReadView};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Counts collected by one worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerOutcome {
    /// Rows pushed into the row queue
    pub rows: u64,

    /// Keys dropped because of lookup or decode failures
    pub skipped: u64,
}

impl WorkerOutcome {
    /// Keys this worker finished with, either way
    pub fn processed(&self) -> u64 {
        self.rows + self.skipped
    }
}

/// A decode worker
pub struct DecodeWorker<'a, S: KvStore> {
    pub(crate) id: usize,
    pub(crate) store: &'a S,
    pub(crate) prefix: &'a [u8],
    pub(crate) lookup: LookupMode,
    pub(crate) order: OutputOrder,
    pub(crate) shutdown: &'a AtomicBool,
    pub(crate) stats: &'a PipelineStats,
    pub(crate) errors: &'a FirstError,
}

impl<S: KvStore> DecodeWorker<'_, S> {
    /// Main worker loop
    pub fn run(
        self,
        keys: QueueReceiver<KeyTask>,
        rows: QueueSender<RowMessage>,
    ) -> WorkerOutcome {
        debug!(worker = self.id, "Worker starting");

        let _guard = PanicGuard(self.shutdown);

        let mut outcome = WorkerOutcome::default();

        let shared_view = match self.lookup {
            LookupMode::PerKey => None,
            LookupMode::PerWorker => match self.store.read_view() {
                Ok(view) => Some(view),
                Err(e) => {
                    self.errors.record(ExportError::ReadView {
                        id: self.id,
                        source: e,
                    });
                    return outcome;
                }
            },
        };

        while !self.shutdown.load(Ordering::Relaxed) {
            let Some(task) = keys.recv() else {
                break;
            };

            let result = match &shared_view {
                Some(view) => self.process(view, &task),
                None => self.process_with_own_view(&task),
            };

            let row = match result {
                Ok(row) => Some(row),
                Err(e) => {
                    warn!(
                        worker = self.id,
                        key = %String::from_utf8_lossy(&task.key),
                        error = %e,
                        "Skipping record"
                    );
                    outcome.skipped += 1;
                    self.stats.records_skipped.fetch_add(1, Ordering::Relaxed);
                    None
                }
            };

            // Tombstones only matter to the reordering writer
            if row.is_none() && self.order == OutputOrder::Arrival {
                continue;
            }

            let produced = row.is_some();
            if rows.send(RowMessage { seq: task.seq, row }).is_err() {
                debug!(worker = self.id, "Row queue closed, worker stopping");
                break;
            }
            if produced {
                outcome.rows += 1;
            }
        }

        debug!(
            worker = self.id,
            rows = outcome.rows,
            skipped = outcome.skipped,
            "Worker finished"
        );
        outcome
    }

    /// Look up and project one key through a view opened for it alone
    fn process_with_own_view(&self, task: &KeyTask) -> Result<Row, RecordError> {
        let view = self.store.read_view()?;
        self.process(&view, task)
    }

    /// Look up and project one key
    fn process<V: ReadView>(&self, view: &V, task: &KeyTask) -> Result<Row, RecordError> {
        let value = view.get(&task.key)?.ok_or(RecordError::Missing)?;
        build_row(self.prefix, &task.key, &value)
    }
}

/// Raises the shutdown flag if the worker unwinds
///
/// A key taken by a panicking worker never reaches the writer, so the rest
/// of the pipeline has to stop instead of waiting for it.
struct PanicGuard<'a>(&'a AtomicBool);

impl Drop for PanicGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::queue::queue;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn run_worker(
        store: &MemoryStore,
        order: OutputOrder,
        keys: &[&str],
    ) -> (WorkerOutcome, Vec<RowMessage>) {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = PipelineStats::default();
        let errors = FirstError::new(Arc::clone(&shutdown));
        let (key_tx, key_rx, _) = queue(16);
        let (row_tx, row_rx, _) = queue(16);

        for (seq, key) in keys.iter().enumerate() {
            key_tx
                .send(KeyTask {
                    seq: seq as u64,
                    key: key.as_bytes().to_vec(),
                })
                .unwrap();
        }
        drop(key_tx);

        let outcome = DecodeWorker {
            id: 0,
            store,
            prefix: b"cep:",
            lookup: LookupMode::PerKey,
            order,
            shutdown: &shutdown,
            stats: &stats,
            errors: &errors,
        }
        .run(key_rx, row_tx);

        assert_eq!(stats.records_skipped.load(Ordering::Relaxed), outcome.skipped);
        (outcome, row_rx.collect())
    }

    fn test_store() -> MemoryStore {
        [
            ("cep:1", r#"{"uf":"SP"}"#),
            ("cep:2", "not json"),
            ("cep:3", r#"{"uf":"RJ"}"#),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_skips_bad_records_and_continues() {
        let store = test_store();
        let (outcome, messages) =
            run_worker(&store, OutputOrder::Arrival, &["cep:1", "cep:2", "cep:3", "cep:4"]);

        assert_eq!(
            outcome,
            WorkerOutcome {
                rows: 2,
                skipped: 2
            }
        );
        assert_eq!(outcome.processed(), 4);

        let codes: Vec<&str> = messages
            .iter()
            .map(|m| m.row.as_ref().unwrap().code())
            .collect();
        assert_eq!(codes, vec!["1", "3"]);
    }

    #[test]
    fn test_key_order_sends_tombstones() {
        let store = test_store();
        let (_, messages) = run_worker(&store, OutputOrder::Key, &["cep:1", "cep:2", "cep:3"]);

        let seqs: Vec<(u64, bool)> = messages.iter().map(|m| (m.seq, m.row.is_some())).collect();
        assert_eq!(seqs, vec![(0, true), (1, false), (2, true)]);
    }

    #[test]
    fn test_rows_counted_only_when_delivered() {
        let store = test_store();
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = PipelineStats::default();
        let errors = FirstError::new(Arc::clone(&shutdown));
        let (key_tx, key_rx, _) = queue(4);
        let (row_tx, row_rx, _) = queue::<RowMessage>(4);

        key_tx
            .send(KeyTask {
                seq: 0,
                key: b"cep:1".to_vec(),
            })
            .unwrap();
        drop(key_tx);
        drop(row_rx);

        let outcome = DecodeWorker {
            id: 0,
            store: &store,
            prefix: b"cep:",
            lookup: LookupMode::PerKey,
            order: OutputOrder::Arrival,
            shutdown: &shutdown,
            stats: &stats,
            errors: &errors,
        }
        .run(key_rx, row_tx);

        assert_eq!(
            outcome,
            WorkerOutcome {
                rows: 0,
                skipped: 0
            }
        );
    }

    #[test]
    fn test_panic_raises_shutdown() {
        let shutdown = AtomicBool::new(false);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = PanicGuard(&shutdown);
            panic!("lookup exploded");
        }));

        assert!(result.is_err());
        assert!(shutdown.load(Ordering::SeqCst));

        let calm = AtomicBool::new(false);
        drop(PanicGuard(&calm));
        assert!(!calm.load(Ordering::SeqCst));
    }
}
