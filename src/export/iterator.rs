//! Key iterator - the single producer of the pipeline
//!
//! Opens one read view, seeks to the export prefix and pushes every
//! matching key, in ascending byte order, into the key queue. Failures here
//! mean the store itself is unreadable, so they abort the export.

use crate::error::ExportError;
use crate::export::pipeline::{FirstError, PipelineStats};
use crate::export::queue::{KeyTask, QueueSender, WindowGate};
use crate::store::{KvStore, ReadView};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// How the iterator finished
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IteratorOutcome {
    /// Keys pushed into the key queue
    pub emitted: u64,

    /// Whether every key under the prefix was emitted
    pub exhausted: bool,
}

/// Producer stage
pub struct KeyIterator<'a, S: KvStore> {
    pub(crate) store: &'a S,
    pub(crate) prefix: &'a [u8],
    pub(crate) shutdown: &'a AtomicBool,
    pub(crate) stats: &'a PipelineStats,
    pub(crate) errors: &'a FirstError,
}

impl<S: KvStore> KeyIterator<'_, S> {
    /// Emit keys until the prefix is exhausted, cancellation is requested,
    /// the store fails, or no worker is left to receive them.
    ///
    /// With a `window`, a slot is taken before each key is emitted. The key
    /// queue closes when `keys` is dropped on return.
    pub fn run(self, keys: QueueSender<KeyTask>, window: Option<WindowGate>) -> IteratorOutcome {
        let mut outcome = IteratorOutcome::default();

        let view = match self.store.read_view() {
            Ok(view) => view,
            Err(e) => {
                self.errors.record(ExportError::Iteration(e));
                return outcome;
            }
        };

        for result in view.scan_prefix(self.prefix) {
            if self.shutdown.load(Ordering::Relaxed) {
                debug!(emitted = outcome.emitted, "Key iterator cancelled");
                return outcome;
            }

            let key = match result {
                Ok(key) => key,
                Err(e) => {
                    self.errors.record(ExportError::Iteration(e));
                    return outcome;
                }
            };

            if let Some(gate) = &window {
                if !gate.acquire(self.shutdown) {
                    debug!(
                        emitted = outcome.emitted,
                        "Reorder window closed, key iterator stopping"
                    );
                    return outcome;
                }
            }

            let task = KeyTask {
                seq: outcome.emitted,
                key,
            };

            if keys.send(task).is_err() {
                debug!(emitted = outcome.emitted, "No workers left, key iterator stopping");
                return outcome;
            }

            outcome.emitted += 1;
            self.stats.keys_emitted.fetch_add(1, Ordering::Relaxed);
        }

        outcome.exhausted = true;
        debug!(emitted = outcome.emitted, "Key iterator finished");
        outcome
    }
}
