//! Parallel export pipeline
//!
//! Three stages connected by two bounded queues:
//!
//! ```text
//! ┌──────────────┐   keys    ┌──────────────┐   rows    ┌──────────────┐
//! │ KeyIterator  │ ───────▶  │ DecodeWorker │ ───────▶  │ RecordWriter │
//! │ (1 thread)   │  bounded  │ (N threads)  │  bounded  │ (1 thread)   │
//! └──────────────┘           └──────────────┘           └──────────────┘
//! ```
//!
//! Each queue closes when its last sender is dropped, which is how every
//! downstream stage learns that no more work is coming.

pub mod iterator;
pub mod pipeline;
pub mod queue;
pub mod record;
pub mod worker;
pub mod writer;

pub use pipeline::{ExportProgress, ExportReport, Exporter};
pub use record::{Row, FIELDS};
