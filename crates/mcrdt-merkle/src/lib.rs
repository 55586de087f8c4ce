//! # mcrdt-merkle
//!
//! Merkle clocks ordering the deltas of the `mcrdt-core` containers.
//!
//! This crate provides:
//! - Content-addressed DAG nodes and block storage
//! - The persisted head set of each key
//! - The Merkle clock: local writes, remote node processing and DAG sync
//! - Node lookup and commit history
//! - Field-level Merkle CRDTs with an explicit factory
//!
//! ## Example
//!
//! ```rust
//! use mcrdt_core::{CollectionSchemaVersionKey, DataStoreKey};
//! use mcrdt_merkle::{MerkleLwwRegister, Stores};
//!
//! let stores = Stores::in_memory();
//! let name = MerkleLwwRegister::new(
//!     &stores,
//!     &CollectionSchemaVersionKey::new("schema-v1", 1),
//!     DataStoreKey::new(1, "bae-1", "name"),
//!     "name",
//! );
//!
//! let first = name.set("test").unwrap();
//! let second = name.set("test2").unwrap();
//!
//! // The second write superseded the first head
//! let snapshot = name.clock().snapshot().unwrap();
//! assert_eq!(snapshot.heads, vec![second.cid()]);
//! assert_ne!(first.cid(), second.cid());
//! assert_eq!(name.value().unwrap(), Some(b"test2".to_vec()));
//! ```

mod clock;
mod config;
mod crdt;
mod error;
mod getter;
mod heads;
mod node;
mod store;

pub use clock::{CancelToken, ClockLocks, HeadSnapshot, MerkleClock, SyncReport};
pub use config::{ClockConfig, ClockConfigBuilder};
pub use crdt::{
    new_field_crdt, CounterAmount, FieldValue, MerkleCompositeDag, MerkleCounter, MerkleCrdt, MerkleLwwRegister, Stores,
};
pub use error::{MerkleError, Result};
pub use getter::{BlockstoreNodeGetter, NodeGetter};
pub use heads::HeadSet;
pub use node::{DagNode, NodeBuilder};
pub use store::{Blockstore, BlockstoreRef, DatastoreBlockstore, MemoryBlockstore};
