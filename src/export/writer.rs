//! Record writer - the single consumer of the pipeline
//!
//! The only component that touches the output sink. Rows are serialized as
//! CSV without a header. The writer always drains the row queue to the end:
//! after the first write failure it records the error, requests shutdown
//! and discards whatever still arrives, so no worker is ever left blocked
//! on a full queue. Once the sink has failed it is never written to or
//! flushed again.

use crate::config::OutputOrder;
use crate::error::ExportError;
use crate::export::pipeline::{ExportProgress, FirstError, PipelineStats};
use crate::export::queue::{QueueReceiver, RowMessage, WindowRelease};
use crate::export::record::Row;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::debug;

/// Rows written between progress callbacks
pub const PROGRESS_INTERVAL: u64 = 10_000;

/// Counts collected by the writer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterOutcome {
    /// Rows serialized to the sink
    pub rows_written: u64,

    /// Rows drained after a write failure without being written
    pub rows_discarded: u64,

    /// Most messages held in the reorder buffer at once
    pub reorder_peak: usize,
}

/// Sink adapter that stops forwarding I/O after the first error
///
/// The csv writer keeps unflushed bytes in its own buffer and retries them
/// on every later flush (including its `Drop`). Behind this guard those
/// retries fail without reaching the real sink.
struct SinkGuard<W> {
    inner: W,
    failed: bool,
}

impl<W: Write> SinkGuard<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            failed: false,
        }
    }

    fn check(&self) -> io::Result<()> {
        if self.failed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "output sink failed earlier",
            ));
        }
        Ok(())
    }

    fn note<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if let Err(e) = &result {
            if e.kind() != io::ErrorKind::Interrupted {
                self.failed = true;
            }
        }
        result
    }
}

impl<W: Write> Write for SinkGuard<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check()?;
        let result = self.inner.write(buf);
        self.note(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check()?;
        let result = self.inner.flush();
        self.note(result)
    }
}

/// Consumer stage
pub struct RecordWriter<'a, W: Write> {
    csv: csv::Writer<SinkGuard<W>>,
    order: OutputOrder,
    stats: &'a PipelineStats,
    errors: &'a FirstError,
    progress: Option<&'a (dyn Fn(&ExportProgress) + Send + Sync + 'a)>,
    start: Instant,
    outcome: WriterOutcome,
    failed: bool,

    /// Reorder buffer for key-ordered output
    pending: BTreeMap<u64, Option<Row>>,
    next_seq: u64,
    window: Option<WindowRelease>,
}

impl<'a, W: Write> RecordWriter<'a, W> {
    /// Create a writer over `sink`
    pub fn new(
        sink: W,
        order: OutputOrder,
        stats: &'a PipelineStats,
        errors: &'a FirstError,
        start: Instant,
    ) -> Self {
        let csv = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(SinkGuard::new(sink));

        Self {
            csv,
            order,
            stats,
            errors,
            progress: None,
            start,
            outcome: WriterOutcome::default(),
            failed: false,
            pending: BTreeMap::new(),
            next_seq: 0,
            window: None,
        }
    }

    /// Report progress through `callback`
    pub fn with_progress(
        mut self,
        callback: Option<&'a (dyn Fn(&ExportProgress) + Send + Sync + 'a)>,
    ) -> Self {
        self.progress = callback;
        self
    }

    /// Give a reorder window slot back for every released sequence number
    pub fn with_window(mut self, window: Option<WindowRelease>) -> Self {
        self.window = window;
        self
    }

    /// Drain the row queue, then finalize the sink
    pub fn run(mut self, rows: QueueReceiver<RowMessage>) -> WriterOutcome {
        for message in rows {
            match self.order {
                OutputOrder::Arrival => {
                    if let Some(row) = message.row {
                        self.write_row(row);
                    }
                }
                OutputOrder::Key => self.reorder(message),
            }
        }

        // Gaps are left behind when the pipeline stops early
        if !self.pending.is_empty() {
            debug!(
                buffered = self.pending.len(),
                next_seq = self.next_seq,
                "Writing rows buffered behind missing sequence numbers"
            );
            let pending = std::mem::take(&mut self.pending);
            for row in pending.into_values().flatten() {
                self.write_row(row);
            }
        }

        self.finish()
    }

    /// Buffer a message and release every row that is next in key order
    fn reorder(&mut self, message: RowMessage) {
        self.pending.insert(message.seq, message.row);
        self.outcome.reorder_peak = self.outcome.reorder_peak.max(self.pending.len());

        while let Some(row) = self.pending.remove(&self.next_seq) {
            self.next_seq += 1;
            if let Some(window) = &self.window {
                window.release();
            }
            if let Some(row) = row {
                self.write_row(row);
            }
        }
    }

    fn write_row(&mut self, row: Row) {
        if self.failed {
            self.outcome.rows_discarded += 1;
            return;
        }

        match self.csv.write_record(row.columns()) {
            Ok(()) => {
                self.outcome.rows_written += 1;
                self.stats.rows_written.fetch_add(1, Ordering::Relaxed);

                if self.outcome.rows_written % PROGRESS_INTERVAL == 0 {
                    self.report_progress();
                }
            }
            Err(e) => {
                self.failed = true;
                self.outcome.rows_discarded += 1;
                self.errors.record(ExportError::Write {
                    row: self.outcome.rows_written + 1,
                    source: e,
                });
            }
        }
    }

    fn report_progress(&self) {
        if let Some(callback) = self.progress {
            callback(&ExportProgress::from_stats(self.stats, self.start.elapsed()));
        }
    }

    /// Flush the sink exactly once, unless it already failed
    fn finish(self) -> WriterOutcome {
        self.report_progress();

        let outcome = self.outcome;
        if self.failed {
            debug!("Sink failed earlier, skipping final flush");
        } else if let Err(e) = self.csv.into_inner() {
            self.errors.record(ExportError::Flush(e.into_error()));
        }

        debug!(
            rows_written = outcome.rows_written,
            rows_discarded = outcome.rows_discarded,
            "Writer finished"
        );
        outcome
    }
}
