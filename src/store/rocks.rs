//! RocksDB-backed store
//!
//! Records live in the default column family as `<prefix><code>` keys with
//! JSON values. Read views are RocksDB snapshots, so each view sees the
//! database as it was when the view was opened.

use crate::error::{StoreError, StoreResult};
use crate::store::{KeyIter, KvStore, ReadView};
use rocksdb::{Direction, IteratorMode, Options, Snapshot, DB};
use std::path::Path;

/// Database options shared by read-only and read-write opens
fn get_db_options() -> Options {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.increase_parallelism(num_cpus::get() as i32);
    opts
}

/// RocksDB handle
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create a database for writing
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = DB::open(&get_db_options(), path)?;
        Ok(Self { db })
    }

    /// Open an existing database for read-only access
    pub fn open_readonly<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }

        let db = DB::open_for_read_only(&get_db_options(), path, false)?;
        Ok(Self { db })
    }

    /// Store a raw value
    pub fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.db.put(key, value)?;
        Ok(())
    }

    /// Store a JSON record under `<prefix><code>`
    pub fn put_record(
        &self,
        prefix: &str,
        code: &str,
        record: &serde_json::Value,
    ) -> StoreResult<()> {
        let key = format!("{}{}", prefix, code);
        let value = serde_json::to_vec(record).map_err(|e| StoreError::Other(e.to_string()))?;
        self.put(key.as_bytes(), &value)
    }

    /// Flush memtables to disk
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Get approximate key count (fast, but not exact)
    pub fn approx_key_count(&self) -> u64 {
        self.db
            .property_int_value("rocksdb.estimate-num-keys")
            .unwrap_or(None)
            .unwrap_or(0)
    }
}

impl KvStore for RocksStore {
    type View<'a> = RocksView<'a>;

    fn read_view(&self) -> StoreResult<RocksView<'_>> {
        Ok(RocksView {
            snapshot: self.db.snapshot(),
        })
    }
}

/// Snapshot view over a [`RocksStore`]
pub struct RocksView<'a> {
    snapshot: Snapshot<'a>,
}

impl ReadView for RocksView<'_> {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.snapshot.get(key)?)
    }

    fn scan_prefix<'v>(&'v self, prefix: &[u8]) -> KeyIter<'v> {
        let prefix_bytes = prefix.to_vec();

        let iter = self
            .snapshot
            .iterator(IteratorMode::From(prefix, Direction::Forward))
            .take_while(move |result| match result {
                Ok((key, _)) => key.starts_with(&prefix_bytes),
                Err(_) => true,
            })
            .map(|result| -> StoreResult<Vec<u8>> {
                let (key, _) = result?;
                Ok(key.into_vec())
            });

        Box::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn create_test_store() -> (tempfile::TempDir, RocksStore) {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(dir.path().join("data")).unwrap();

        store
            .put_record("cep:", "01000000", &json!({"bairro": "Centro"}))
            .unwrap();
        store
            .put_record("cep:", "02000000", &json!({"bairro": "Bom Retiro"}))
            .unwrap();
        store.put(b"cidade:3550308", b"{}").unwrap();
        store.put(b"ceq:0", b"{}").unwrap();

        (dir, store)
    }

    #[test]
    fn test_scan_prefix_is_ordered_and_bounded() {
        let (_dir, store) = create_test_store();
        let view = store.read_view().unwrap();

        let keys: Vec<Vec<u8>> = view
            .scan_prefix(b"cep:")
            .collect::<StoreResult<_>>()
            .unwrap();

        assert_eq!(keys, vec![b"cep:01000000".to_vec(), b"cep:02000000".to_vec()]);
    }

    #[test]
    fn test_point_lookup() {
        let (_dir, store) = create_test_store();
        let view = store.read_view().unwrap();

        let value = view.get(b"cep:01000000").unwrap().unwrap();
        let decoded: serde_json::Value = serde_json::from_slice(&value).unwrap();
        assert_eq!(decoded["bairro"], "Centro");

        assert!(view.get(b"cep:99999999").unwrap().is_none());
    }

    #[test]
    fn test_view_is_a_snapshot() {
        let (_dir, store) = create_test_store();
        let view = store.read_view().unwrap();

        store.put(b"cep:03000000", b"{}").unwrap();

        assert_eq!(view.scan_prefix(b"cep:").count(), 2);
        assert!(view.get(b"cep:03000000").unwrap().is_none());
        assert_eq!(store.read_view().unwrap().scan_prefix(b"cep:").count(), 3);
    }

    #[test]
    fn test_open_readonly_missing_directory() {
        let dir = tempdir().unwrap();
        let result = RocksStore::open_readonly(dir.path().join("nope"));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_open_readonly_sees_flushed_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data");
        {
            let store = RocksStore::open(&path).unwrap();
            store.put(b"cep:1", b"{}").unwrap();
            store.flush().unwrap();
        }

        let store = RocksStore::open_readonly(&path).unwrap();
        let view = store.read_view().unwrap();
        assert_eq!(view.scan_prefix(b"cep:").count(), 1);
    }
}
