//! cep-export - Parallel CSV Export of CEP Records
//!
//! Reads every `cep:`-prefixed record from a RocksDB store and writes it as
//! one CSV row. Lookups and JSON decoding are spread across a pool of worker
//! threads while a single writer owns the output file.
//!
//! # Features
//!
//! - **Consistent Reads**: Keys and values are read through RocksDB
//!   snapshots, so concurrent writers never produce torn output.
//!
//! - **Bounded Memory**: Both pipeline queues are bounded; a slow writer
//!   applies backpressure all the way to the key iterator.
//!
//! - **Fault Tolerant**: A record that cannot be read or decoded is logged
//!   and skipped. Store and output failures stop the export cleanly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         RocksDB store                            │
//! └──────────────┬──────────────────────────────────┬───────────────┘
//!                │ prefix scan                      │ point lookups
//!                ▼                                  │
//!       ┌──────────────────┐                        │
//!       │   Key Iterator   │                        │
//!       └────────┬─────────┘                        │
//!                │ key queue (bounded)              │
//!                ▼                                  ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Decode Workers                              │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐     │
//! │  │Worker 1 │  │Worker 2 │  │Worker 3 │  ...    │Worker N │     │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘     │
//! └───────┼────────────┼────────────┼────────────────────┼──────────┘
//!         └────────────┴─────┬──────┴────────────────────┘
//!                            │ row queue (bounded)
//!                            ▼
//!                  ┌──────────────────┐
//!                  │  Record Writer   │
//!                  └────────┬─────────┘
//!                           ▼
//!                    ┌──────────────┐
//!                    │ tmp/ceps.csv │
//!                    └──────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Export with defaults
//! cep-export --db-path ./data
//!
//! # Key-ordered output with 16 workers
//! cep-export --db-path ./data -w 16 --order key -o /srv/exports
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod progress;
pub mod store;

pub use config::{ExportConfig, LookupMode, OutputOrder};
pub use error::{ExportError, Result};
pub use export::{ExportProgress, ExportReport, Exporter, Row};
pub use store::{KvStore, MemoryStore, ReadView, RocksStore};
