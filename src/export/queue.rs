//! Bounded pipeline queues
//!
//! Thin wrappers over crossbeam bounded channels that keep statistics,
//! including the deepest occupancy observed. Senders block when the queue
//! is full (backpressure); a queue closes when its last sender is dropped.

use crate::export::record::Row;
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How often a blocked window acquire re-checks the shutdown flag
const WINDOW_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A key emitted by the iterator, tagged with its emission order
#[derive(Debug, Clone)]
pub struct KeyTask {
    /// Emission sequence number (0-based)
    pub seq: u64,

    /// Full key, prefix included
    pub key: Vec<u8>,
}

/// Worker output for one key
///
/// `row` is `None` for a skipped key; those tombstones are only sent when
/// the writer restores key order.
#[derive(Debug, Clone)]
pub struct RowMessage {
    /// Sequence number of the originating key
    pub seq: u64,

    /// Projected row
    pub row: Option<Row>,
}

/// Statistics for a queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total items enqueued
    pub enqueued: AtomicU64,

    /// Total items dequeued
    pub dequeued: AtomicU64,

    /// Deepest occupancy observed after a send
    pub high_water: AtomicUsize,
}

impl QueueStats {
    /// Get queue throughput (dequeued items)
    pub fn throughput(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }

    /// Get the deepest occupancy observed
    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::Relaxed)
    }
}

/// Create a bounded queue with the specified capacity
pub fn queue<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>, Arc<QueueStats>) {
    let (sender, receiver) = bounded(capacity);
    let stats = Arc::new(QueueStats::default());

    (
        QueueSender {
            sender,
            stats: Arc::clone(&stats),
        },
        QueueReceiver {
            receiver,
            stats: Arc::clone(&stats),
        },
        stats,
    )
}

/// Handle for sending items to a queue
pub struct QueueSender<T> {
    sender: Sender<T>,
    stats: Arc<QueueStats>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<T> QueueSender<T> {
    /// Send an item, blocking while the queue is full
    ///
    /// Returns the item back if every receiver is gone.
    pub fn send(&self, item: T) -> Result<(), T> {
        self.sender.send(item).map_err(|e| e.into_inner())?;
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        self.stats
            .high_water
            .fetch_max(self.sender.len(), Ordering::Relaxed);
        Ok(())
    }

    /// Queue capacity
    pub fn capacity(&self) -> usize {
        self.sender.capacity().unwrap_or(usize::MAX)
    }
}

/// Handle for receiving items from a queue
pub struct QueueReceiver<T> {
    receiver: Receiver<T>,
    stats: Arc<QueueStats>,
}

impl<T> Clone for QueueReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<T> QueueReceiver<T> {
    /// Receive an item
    ///
    /// Blocks until an item is available. Returns `None` once the queue is
    /// closed and drained.
    pub fn recv(&self) -> Option<T> {
        match self.receiver.recv() {
            Ok(item) => {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                Some(item)
            }
            Err(_) => None,
        }
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Get current queue length
    pub fn len(&self) -> usize {
        self.receiver.len()
    }
}

impl<T> Iterator for QueueReceiver<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.recv()
    }
}

/// Create a window of `capacity` outstanding sequence numbers
///
/// The iterator takes a slot before emitting a key and the reordering
/// writer gives it back once that sequence number is released, so at most
/// `capacity` rows can ever wait in the reorder buffer.
pub fn reorder_window(capacity: usize) -> (WindowGate, WindowRelease) {
    let (sender, receiver) = bounded(capacity);
    (WindowGate { sender }, WindowRelease { receiver })
}

/// Producer side of a reorder window
pub struct WindowGate {
    sender: Sender<()>,
}

impl WindowGate {
    /// Take a slot, waiting while the window is full
    ///
    /// Returns `false` if shutdown was requested or the writer is gone.
    pub fn acquire(&self, shutdown: &AtomicBool) -> bool {
        loop {
            match self.sender.send_timeout((), WINDOW_POLL_INTERVAL) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(())) => {
                    if shutdown.load(Ordering::Relaxed) {
                        return false;
                    }
                }
                Err(SendTimeoutError::Disconnected(())) => return false,
            }
        }
    }

    /// Slots currently taken
    pub fn outstanding(&self) -> usize {
        self.sender.len()
    }
}

/// Writer side of a reorder window
pub struct WindowRelease {
    receiver: Receiver<()>,
}

impl WindowRelease {
    /// Give back one slot
    pub fn release(&self) {
        let _ = self.receiver.try_recv();
    }
}
