//! # mcrdt-core
//!
//! Delta-state CRDT containers for the Merkle-clock replication core.
//!
//! This crate provides:
//! - Content identifiers and named DAG links
//! - The key-value store contract, with in-memory and sled backends
//! - LWW register, grow-only and PN counters, and the composite DAG CRDT
//! - The `CrdtDelta` wire enum and its deterministic binary encoding
//!
//! Containers never mutate stored state except through `merge`; local
//! mutations only produce deltas.
//!
//! ## Example
//!
//! ```rust
//! use mcrdt_core::{CollectionSchemaVersionKey, DataStoreKey, LwwRegister, MemoryDatastore, ReplicatedData};
//!
//! let store = MemoryDatastore::shared();
//! let reg = LwwRegister::new(
//!     store,
//!     &CollectionSchemaVersionKey::new("schema-v1", 1),
//!     DataStoreKey::new(1, "bae-1", "name"),
//!     "name",
//! );
//!
//! let delta = reg.set("John").unwrap();
//! assert_eq!(reg.value().unwrap(), None);
//!
//! reg.merge(&delta, "event-1").unwrap();
//! assert_eq!(reg.value().unwrap(), Some(b"John".to_vec()));
//! ```

pub mod base;
pub mod cid;
pub mod composite;
pub mod counter;
pub mod delta;
pub mod error;
pub mod key;
pub mod lwwreg;
pub mod priority;
pub mod replicated;
pub mod store;

pub use base::DocumentStatus;
pub use cid::{Cid, CidHasher, DagLink, HEAD_LINK_NAME};
pub use composite::{CompositeDag, CompositeDagDelta};
pub use counter::{Counter, CounterDelta, Incrementable, NumericKind};
pub use delta::CrdtDelta;
pub use error::{CoreError, StoreError};
pub use key::{CollectionSchemaVersionKey, DataStoreKey, HeadStoreKey, InstanceType, COMPOSITE_NAMESPACE};
pub use lwwreg::{LwwRegDelta, LwwRegister};
pub use replicated::{CType, Delta, ReplicatedData};
pub use store::{BatchOp, Datastore, DatastoreRef, MemoryDatastore, WriteBatch};

#[cfg(feature = "sled")]
pub use store::SledDatastore;
