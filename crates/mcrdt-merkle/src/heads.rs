//! Persisted head set of one key's Merkle clock.
//!
//! Each head is a `<namespace>/<cid> -> varint(height)` entry in the head
//! store. The namespace is the key's [`HeadStoreKey`] without a CID.

use crate::error::{MerkleError, Result};
use mcrdt_core::priority::{decode_uvarint, encode_uvarint};
use mcrdt_core::{Cid, CoreError, DatastoreRef, HeadStoreKey, WriteBatch};
use tracing::trace;

pub struct HeadSet {
    store: DatastoreRef,
    namespace: HeadStoreKey,
}

impl HeadSet {
    pub fn new(store: DatastoreRef, namespace: HeadStoreKey) -> Self {
        HeadSet {
            store,
            namespace: HeadStoreKey {
                cid: None,
                ..namespace
            },
        }
    }

    pub fn namespace(&self) -> &HeadStoreKey {
        &self.namespace
    }

    fn key(&self, cid: Cid) -> Vec<u8> {
        self.namespace.with_cid(cid).to_bytes()
    }

    /// Whether `cid` is a head, and its height when it is.
    pub fn is_head(&self, cid: &Cid) -> Result<(bool, u64)> {
        let key = self.key(*cid);
        match self.store.get(&key).map_err(|e| MerkleError::head_store("get", &key, e))? {
            Some(bytes) => Ok((true, decode_uvarint(&key, &bytes)?)),
            None => Ok((false, 0)),
        }
    }

    pub fn add(&self, cid: Cid, height: u64) -> Result<()> {
        trace!(namespace = %self.namespace, cid = %cid.short(), height, "adding head");
        let key = self.key(cid);
        self.store
            .put(&key, &encode_uvarint(height))
            .map_err(|e| MerkleError::head_store("put", &key, e))
    }

    /// Atomically swap `old` for `new`.
    pub fn replace(&self, old: Cid, new: Cid, height: u64) -> Result<()> {
        trace!(
            namespace = %self.namespace,
            old = %old.short(),
            new = %new.short(),
            height,
            "replacing head"
        );
        let new_key = self.key(new);
        let mut batch = WriteBatch::new();
        batch.delete(self.key(old)).put(new_key.clone(), encode_uvarint(height));
        self.store
            .write_batch(batch)
            .map_err(|e| MerkleError::head_store("replace", &new_key, e))
    }

    /// Heads in CID byte order, with the greatest height among them.
    pub fn list(&self) -> Result<(Vec<Cid>, u64)> {
        let prefix = self.namespace.prefix();
        let entries = self
            .store
            .scan_prefix(&prefix)
            .map_err(|e| MerkleError::head_store("scan", &prefix, e))?;

        let mut heads = Vec::with_capacity(entries.len());
        let mut max_height = 0;
        for (key, value) in entries {
            let cid = HeadStoreKey::from_bytes(&key)?
                .cid
                .ok_or_else(|| CoreError::InvalidKey(String::from_utf8_lossy(&key).into_owned()))?;
            max_height = max_height.max(decode_uvarint(&key, &value)?);
            heads.push(cid);
        }
        heads.sort();
        Ok((heads, max_height))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.list()?.0.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
