//! Block storage trait and implementations.
//!
//! Blocks are immutable once put. Backends only move raw bytes; decoding and
//! CID verification happen in the provided [`Blockstore::get`].

use crate::error::{MerkleError, Result};
use crate::node::DagNode;
use mcrdt_core::{Cid, DatastoreRef, StoreError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Content-addressed storage for DAG nodes.
pub trait Blockstore: Send + Sync {
    fn put_raw(&self, cid: &Cid, bytes: &[u8]) -> std::result::Result<(), StoreError>;

    fn get_raw(&self, cid: &Cid) -> std::result::Result<Option<Vec<u8>>, StoreError>;

    fn has_raw(&self, cid: &Cid) -> std::result::Result<bool, StoreError>;

    /// Store a node under its CID.
    fn put(&self, node: &DagNode) -> Result<()> {
        let bytes = node.to_bytes()?;
        self.put_raw(&node.cid(), &bytes)
            .map_err(|e| MerkleError::block("put", node.cid(), e))
    }

    /// Fetch and verify a node. A missing block is an error here; use
    /// [`Blockstore::has`] to check.
    fn get(&self, cid: &Cid) -> Result<DagNode> {
        let bytes = self
            .get_raw(cid)
            .map_err(|e| MerkleError::block("get", *cid, e))?
            .ok_or(MerkleError::BlockNotFound(*cid))?;
        DagNode::from_bytes_verified(*cid, &bytes)
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        self.has_raw(cid).map_err(|e| MerkleError::block("has", *cid, e))
    }
}

/// Shared handle to a block store.
pub type BlockstoreRef = Arc<dyn Blockstore>;

/// In-memory block store.
#[derive(Debug, Default)]
pub struct MemoryBlockstore {
    blocks: RwLock<HashMap<Cid, Vec<u8>>>,
}

impl MemoryBlockstore {
    pub fn new() -> Self {
        MemoryBlockstore::default()
    }

    pub fn shared() -> BlockstoreRef {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }
}

impl Blockstore for MemoryBlockstore {
    fn put_raw(&self, cid: &Cid, bytes: &[u8]) -> std::result::Result<(), StoreError> {
        self.blocks.write().entry(*cid).or_insert_with(|| bytes.to_vec());
        Ok(())
    }

    fn get_raw(&self, cid: &Cid) -> std::result::Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blocks.read().get(cid).cloned())
    }

    fn has_raw(&self, cid: &Cid) -> std::result::Result<bool, StoreError> {
        Ok(self.blocks.read().contains_key(cid))
    }
}

/// Block store layered over a key-value datastore, under `/blocks/<cid>`.
pub struct DatastoreBlockstore {
    store: DatastoreRef,
}

impl DatastoreBlockstore {
    pub fn new(store: DatastoreRef) -> Self {
        DatastoreBlockstore { store }
    }

    fn key(cid: &Cid) -> Vec<u8> {
        format!("/blocks/{}", cid).into_bytes()
    }
}

impl Blockstore for DatastoreBlockstore {
    fn put_raw(&self, cid: &Cid, bytes: &[u8]) -> std::result::Result<(), StoreError> {
        self.store.put(&Self::key(cid), bytes)
    }

    fn get_raw(&self, cid: &Cid) -> std::result::Result<Option<Vec<u8>>, StoreError> {
        self.store.get(&Self::key(cid))
    }

    fn has_raw(&self, cid: &Cid) -> std::result::Result<bool, StoreError> {
        self.store.has(&Self::key(cid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeBuilder;
    use mcrdt_core::{CidHasher, MemoryDatastore};

    fn node(payload: &[u8]) -> DagNode {
        NodeBuilder::new().with_payload(payload.to_vec()).build().unwrap()
    }

    fn roundtrip(store: &dyn Blockstore) {
        let n = node(b"delta");
        assert!(!store.has(&n.cid()).unwrap());
        store.put(&n).unwrap();
        assert!(store.has(&n.cid()).unwrap());
        assert_eq!(store.get(&n.cid()).unwrap(), n);
    }

    #[test]
    fn test_memory_blockstore() {
        let store = MemoryBlockstore::new();
        roundtrip(&store);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_datastore_blockstore() {
        roundtrip(&DatastoreBlockstore::new(MemoryDatastore::shared()));
    }

    #[test]
    fn test_missing_block() {
        let store = MemoryBlockstore::new();
        let cid = CidHasher::hash(b"missing");
        assert!(matches!(store.get(&cid), Err(MerkleError::BlockNotFound(c)) if c == cid));
    }

    #[test]
    fn test_tampered_block_rejected() {
        let store = MemoryBlockstore::new();
        let n = node(b"delta");
        store.put_raw(&n.cid(), &node(b"forged").to_bytes().unwrap()).unwrap();
        assert!(matches!(store.get(&n.cid()), Err(MerkleError::CidMismatch { .. })));
    }
}
