//! In-memory store
//!
//! A `BTreeMap` behind a copy-on-write `Arc`. Opening a view clones the
//! `Arc`, so views are immutable snapshots and never block writers.

use crate::error::StoreResult;
use crate::store::{KeyIter, KvStore, ReadView};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

/// Ordered in-memory key-value store
#[derive(Default)]
pub struct MemoryStore {
    map: RwLock<Arc<Map>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value
    pub fn put(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        let mut guard = self.map.write();
        Arc::make_mut(&mut guard).insert(key.into(), value.into());
    }

    /// Remove a key, returning its value
    pub fn delete(&self, key: &[u8]) -> Option<Vec<u8>> {
        let mut guard = self.map.write();
        Arc::make_mut(&mut guard).remove(key)
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for MemoryStore
where
    K: Into<Vec<u8>>,
    V: Into<Vec<u8>>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map: Map = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            map: RwLock::new(Arc::new(map)),
        }
    }
}

impl KvStore for MemoryStore {
    type View<'a> = MemoryView;

    fn read_view(&self) -> StoreResult<MemoryView> {
        Ok(MemoryView {
            map: Arc::clone(&self.map.read()),
        })
    }
}

/// Immutable snapshot of a [`MemoryStore`]
pub struct MemoryView {
    map: Arc<Map>,
}

impl ReadView for MemoryView {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.map.get(key).cloned())
    }

    fn scan_prefix<'v>(&'v self, prefix: &[u8]) -> KeyIter<'v> {
        let prefix_bytes = prefix.to_vec();

        let iter = self
            .map
            .range(prefix.to_vec()..)
            .take_while(move |(key, _)| key.starts_with(&prefix_bytes))
            .map(|(key, _)| -> StoreResult<Vec<u8>> { Ok(key.clone()) });

        Box::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_prefix() {
        let store: MemoryStore = [
            ("cep:2", "b"),
            ("cep:1", "a"),
            ("cidade:1", "c"),
            ("ce", "d"),
        ]
        .into_iter()
        .collect();

        let view = store.read_view().unwrap();
        let keys: Vec<Vec<u8>> = view.scan_prefix(b"cep:").map(|k| k.unwrap()).collect();
        assert_eq!(keys, vec![b"cep:1".to_vec(), b"cep:2".to_vec()]);
    }

    #[test]
    fn test_view_is_a_snapshot() {
        let store = MemoryStore::new();
        store.put("cep:1", "a");

        let view = store.read_view().unwrap();
        store.put("cep:2", "b");
        store.delete(b"cep:1");

        assert_eq!(view.get(b"cep:1").unwrap(), Some(b"a".to_vec()));
        assert_eq!(view.get(b"cep:2").unwrap(), None);
        assert_eq!(store.len(), 1);
    }
}
