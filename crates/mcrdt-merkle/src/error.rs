//! Error types for the Merkle clock.

use mcrdt_core::{Cid, CoreError, StoreError};
use thiserror::Error;

/// Errors raised while building, persisting or walking DAG nodes.
#[derive(Error, Debug)]
pub enum MerkleError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A put/get/has against the block store failed.
    #[error("block store {op} failed for {cid}: {source}")]
    Block {
        op: &'static str,
        cid: Cid,
        #[source]
        source: StoreError,
    },

    /// A read or write against the head store failed.
    #[error("head store {op} failed for {key}: {source}")]
    HeadStore {
        op: &'static str,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("block {0} not found")]
    BlockNotFound(Cid),

    #[error("corrupt block {cid}: {reason}")]
    CorruptBlock { cid: Cid, reason: String },

    /// Fetched bytes hash to a different CID than the one requested.
    #[error("block {expected} failed verification: content hashes to {actual}")]
    CidMismatch { expected: Cid, actual: Cid },

    #[error("merging delta of node {cid} failed: {source}")]
    MergingDelta {
        cid: Cid,
        #[source]
        source: CoreError,
    },

    #[error("DAG walk exceeded the limit of {0} nodes")]
    WalkLimitExceeded(usize),

    #[error("DAG walk cancelled after merging {merged} nodes")]
    Cancelled { merged: usize },

    #[error("{crdt} cannot save a {value} value")]
    UnsupportedValue {
        crdt: &'static str,
        value: &'static str,
    },

    #[error("unsupported CRDT: {0}")]
    UnsupportedCrdt(String),
}

impl MerkleError {
    pub(crate) fn block(op: &'static str, cid: Cid, source: StoreError) -> Self {
        MerkleError::Block { op, cid, source }
    }

    pub(crate) fn head_store(op: &'static str, key: &[u8], source: StoreError) -> Self {
        MerkleError::HeadStore {
            op,
            key: String::from_utf8_lossy(key).into_owned(),
            source,
        }
    }

    /// Whether repeating the call may succeed. Merges are idempotent, so a
    /// retried walk or write is always safe; only transient failures qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            MerkleError::Block { .. } | MerkleError::HeadStore { .. } => true,
            MerkleError::BlockNotFound(_) | MerkleError::Cancelled { .. } => true,
            MerkleError::Core(e) | MerkleError::MergingDelta { source: e, .. } => e.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MerkleError>;

#[cfg(test)]
mod tests {
    use super::*;
    use mcrdt_core::CidHasher;

    #[test]
    fn test_store_failures_are_retryable() {
        let cid = CidHasher::hash(b"node");
        assert!(MerkleError::block("put", cid, StoreError::Backend("disk full".into())).is_retryable());
        assert!(MerkleError::head_store("get", b"/doc/f", StoreError::Backend("io".into())).is_retryable());
    }

    #[test]
    fn test_corruption_is_fatal() {
        let cid = CidHasher::hash(b"node");
        assert!(!MerkleError::CidMismatch {
            expected: cid,
            actual: CidHasher::hash(b"other"),
        }
        .is_retryable());
        assert!(!MerkleError::MergingDelta {
            cid,
            source: CoreError::NegativeValue("-1".into()),
        }
        .is_retryable());
        assert!(!MerkleError::Core(CoreError::InvalidKey("/x".into())).is_retryable());
    }

    #[test]
    fn test_error_messages_carry_context() {
        let cid = CidHasher::hash(b"node");
        let err = MerkleError::block("get", cid, StoreError::Backend("io".into()));
        assert!(err.to_string().contains(&cid.to_hex()));
    }
}
