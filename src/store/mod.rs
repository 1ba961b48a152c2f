//! Key-value store access
//!
//! The export pipeline only ever reads. It needs two things from a store:
//!
//! - **Read views**: a consistent snapshot opened with [`KvStore::read_view`],
//!   offering prefix iteration in ascending byte order and point lookups.
//! - **Concurrent views**: several threads may each hold their own view at
//!   the same time.
//!
//! # Module Structure
//!
//! - `rocks`: RocksDB-backed store used by the CLI
//! - `memory`: in-memory store for tests and benchmarks

pub mod memory;
pub mod rocks;

pub use memory::{MemoryStore, MemoryView};
pub use rocks::{RocksStore, RocksView};

use crate::error::StoreResult;

/// Iterator over keys yielded by [`ReadView::scan_prefix`]
pub type KeyIter<'v> = Box<dyn Iterator<Item = StoreResult<Vec<u8>>> + 'v>;

/// A consistent read-only view over a store
pub trait ReadView {
    /// Point lookup. `Ok(None)` when the key is absent.
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Keys starting with `prefix`, in ascending byte order
    fn scan_prefix<'v>(&'v self, prefix: &[u8]) -> KeyIter<'v>;
}

/// An ordered key-value store that can hand out read views
pub trait KvStore: Send + Sync {
    /// View type; released when dropped
    type View<'a>: ReadView
    where
        Self: 'a;

    /// Open a new read view
    fn read_view(&self) -> StoreResult<Self::View<'_>>;
}
