//! Key-value store contract and backends.
//!
//! The CRDT containers and the head set only need point reads and writes,
//! prefix scans and an atomic multi-key batch. Backends are shared across
//! every logical key, so all methods take `&self`.

use crate::error::StoreError;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A single operation inside a [`WriteBatch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// A group of writes applied atomically: either all of them land or none.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        WriteBatch { ops: Vec::new() }
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Delete { key: key.into() });
        self
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Storage backend consumed by the CRDT core.
///
/// A missing key is `Ok(None)`, never an error.
pub trait Datastore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    fn has(&self, key: &[u8]) -> Result<bool, StoreError>;

    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    /// All entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Apply every operation of the batch atomically.
    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

/// Shared handle to a datastore, injected into containers and clocks.
pub type DatastoreRef = Arc<dyn Datastore>;

/// In-memory ordered datastore.
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        MemoryDatastore {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Convenience constructor returning a shareable handle.
    pub fn shared() -> DatastoreRef {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Datastore for MemoryDatastore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn has(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.entries.read().contains_key(key))
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let entries = self.entries.read();
        Ok(entries
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        // Single write guard for the whole batch.
        let mut entries = self.entries.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => {
                    entries.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(feature = "sled")]
pub use sled_backend::SledDatastore;

#[cfg(feature = "sled")]
mod sled_backend {
    use super::{BatchOp, Datastore, WriteBatch};
    use crate::error::StoreError;

    /// Persistent datastore backed by a sled tree.
    pub struct SledDatastore {
        tree: sled::Tree,
    }

    impl SledDatastore {
        pub fn new(tree: sled::Tree) -> Self {
            SledDatastore { tree }
        }

        pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
            let db = sled::open(path)?;
            Ok(SledDatastore::new(db.open_tree("mcrdt")?))
        }

        pub fn temporary() -> Result<Self, StoreError> {
            let db = sled::Config::new().temporary(true).open()?;
            Ok(SledDatastore::new(db.open_tree("mcrdt")?))
        }
    }

    impl Datastore for SledDatastore {
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
            Ok(self.tree.get(key)?.map(|v| v.to_vec()))
        }

        fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
            self.tree.insert(key, value)?;
            Ok(())
        }

        fn has(&self, key: &[u8]) -> Result<bool, StoreError> {
            Ok(self.tree.contains_key(key)?)
        }

        fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
            self.tree.remove(key)?;
            Ok(())
        }

        fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
            self.tree
                .scan_prefix(prefix)
                .map(|item| -> Result<(Vec<u8>, Vec<u8>), StoreError> {
                    let (k, v) = item?;
                    Ok((k.to_vec(), v.to_vec()))
                })
                .collect()
        }

        fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
            let mut sled_batch = sled::Batch::default();
            for op in batch.into_ops() {
                match op {
                    BatchOp::Put { key, value } => sled_batch.insert(key, value),
                    BatchOp::Delete { key } => sled_batch.remove(key),
                }
            }
            self.tree.apply_batch(sled_batch)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_is_none() {
        let store = MemoryDatastore::new();
        assert_eq!(store.get(b"nope").unwrap(), None);
        assert!(!store.has(b"nope").unwrap());
    }

    #[test]
    fn test_put_get_delete() {
        let store = MemoryDatastore::new();
        store.put(b"a", b"1").unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        store.delete(b"a").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_scan_prefix_is_bounded_and_ordered() {
        let store = MemoryDatastore::new();
        store.put(b"/doc/f/b", b"2").unwrap();
        store.put(b"/doc/f/a", b"1").unwrap();
        store.put(b"/doc/g/a", b"3").unwrap();
        store.put(b"/doc/e", b"0").unwrap();

        let found = store.scan_prefix(b"/doc/f/").unwrap();
        assert_eq!(
            found,
            vec![
                (b"/doc/f/a".to_vec(), b"1".to_vec()),
                (b"/doc/f/b".to_vec(), b"2".to_vec()),
            ]
        );
    }

    #[test]
    fn test_write_batch_applies_all_ops() {
        let store = MemoryDatastore::new();
        store.put(b"old", b"x").unwrap();

        let mut batch = WriteBatch::new();
        batch.delete(b"old".to_vec()).put(b"new".to_vec(), b"y".to_vec());
        assert_eq!(batch.len(), 2);
        store.write_batch(batch).unwrap();

        assert!(!store.has(b"old").unwrap());
        assert_eq!(store.get(b"new").unwrap(), Some(b"y".to_vec()));
    }

    #[cfg(feature = "sled")]
    #[test]
    fn test_sled_backend_batch_and_scan() {
        let store = SledDatastore::temporary().unwrap();
        store.put(b"/p/a", b"1").unwrap();

        let mut batch = WriteBatch::new();
        batch.delete(b"/p/a".to_vec()).put(b"/p/b".to_vec(), b"2".to_vec());
        store.write_batch(batch).unwrap();

        assert_eq!(
            store.scan_prefix(b"/p/").unwrap(),
            vec![(b"/p/b".to_vec(), b"2".to_vec())]
        );
    }
}
