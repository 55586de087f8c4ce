//! Field-level Merkle CRDTs and their factory.
//!
//! A Merkle CRDT pairs a container with the clock that orders its deltas.
//! All stores are handed in explicitly through [`Stores`]; there is no
//! process-wide registry.

use crate::clock::{CancelToken, ClockLocks, HeadSnapshot, MerkleClock, SyncReport};
use crate::config::ClockConfig;
use crate::error::{MerkleError, Result};
use crate::getter::NodeGetter;
use crate::node::DagNode;
use crate::store::{BlockstoreRef, MemoryBlockstore};
use mcrdt_core::{
    CType, Cid, CollectionSchemaVersionKey, CompositeDag, Counter, CrdtDelta, DagLink, DataStoreKey, DatastoreRef,
    DocumentStatus, HeadStoreKey, Incrementable, LwwRegister, MemoryDatastore, NumericKind, ReplicatedData,
};

/// Store handles shared by every Merkle CRDT of a replica.
#[derive(Clone)]
pub struct Stores {
    pub datastore: DatastoreRef,
    pub headstore: DatastoreRef,
    pub blockstore: BlockstoreRef,
    pub locks: ClockLocks,
    pub config: ClockConfig,
}

impl Stores {
    pub fn new(datastore: DatastoreRef, headstore: DatastoreRef, blockstore: BlockstoreRef) -> Self {
        Stores {
            datastore,
            headstore,
            blockstore,
            locks: ClockLocks::new(),
            config: ClockConfig::default(),
        }
    }

    /// Fresh in-memory stores.
    pub fn in_memory() -> Self {
        Self::new(MemoryDatastore::shared(), MemoryDatastore::shared(), MemoryBlockstore::shared())
    }

    pub fn with_config(mut self, config: ClockConfig) -> Self {
        self.config = config;
        self
    }

    fn clock<C: ReplicatedData>(&self, crdt: C) -> MerkleClock<C> {
        MerkleClock::new(self.headstore.clone(), self.blockstore.clone(), crdt)
            .with_locks(self.locks.clone())
            .with_config(self.config.clone())
    }
}

/// A value handed to [`MerkleCrdt::save`].
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Bytes(Vec<u8>),
    Int(i64),
    Float(f64),
    /// Composite document update over the given field heads.
    Patch { data: Vec<u8>, links: Vec<DagLink> },
    /// Composite document deletion.
    Delete { links: Vec<DagLink> },
}

impl FieldValue {
    fn kind(&self) -> &'static str {
        match self {
            FieldValue::Bytes(_) => "bytes",
            FieldValue::Int(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Patch { .. } => "patch",
            FieldValue::Delete { .. } => "delete",
        }
    }
}

/// Type-erased Merkle CRDT, as returned by [`new_field_crdt`].
pub trait MerkleCrdt: Send + Sync {
    fn ctype(&self) -> CType;

    fn head_store_key(&self) -> HeadStoreKey;

    fn heads(&self) -> Result<HeadSnapshot>;

    /// Produce a delta from `value`, then persist and merge it.
    fn save(&self, value: FieldValue) -> Result<DagNode>;

    /// Merge a node received from a peer. See [`MerkleClock::process_node`].
    fn process_node(&self, node: &DagNode, root: Cid, root_priority: u64, delta: CrdtDelta) -> Result<Vec<Cid>>;

    fn sync(&self, root: Cid, getter: &dyn NodeGetter, cancel: &CancelToken) -> Result<SyncReport>;
}

fn process_typed<C: ReplicatedData>(
    clock: &MerkleClock<C>,
    node: &DagNode,
    root: Cid,
    root_priority: u64,
    delta: CrdtDelta,
) -> Result<Vec<Cid>> {
    let delta = C::Delta::try_from(delta).map_err(|source| MerkleError::MergingDelta { cid: node.cid(), source })?;
    clock.process_node(node, root, root_priority, delta)
}

pub struct MerkleLwwRegister {
    clock: MerkleClock<LwwRegister>,
}

impl MerkleLwwRegister {
    pub fn new(
        stores: &Stores,
        schema_version_key: &CollectionSchemaVersionKey,
        key: DataStoreKey,
        field_name: impl Into<String>,
    ) -> Self {
        let reg = LwwRegister::new(stores.datastore.clone(), schema_version_key, key, field_name);
        MerkleLwwRegister {
            clock: stores.clock(reg),
        }
    }

    pub fn set(&self, value: impl Into<Vec<u8>>) -> Result<DagNode> {
        let delta = self.clock.crdt().set(value)?;
        self.clock.add_dag_node(delta)
    }

    pub fn value(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.clock.crdt().value()?)
    }

    pub fn clock(&self) -> &MerkleClock<LwwRegister> {
        &self.clock
    }
}

impl MerkleCrdt for MerkleLwwRegister {
    fn ctype(&self) -> CType {
        CType::LwwRegister
    }

    fn head_store_key(&self) -> HeadStoreKey {
        self.clock.crdt().head_store_key()
    }

    fn heads(&self) -> Result<HeadSnapshot> {
        self.clock.snapshot()
    }

    fn save(&self, value: FieldValue) -> Result<DagNode> {
        match value {
            FieldValue::Bytes(bytes) => self.set(bytes),
            other => Err(MerkleError::UnsupportedValue {
                crdt: "lww register",
                value: other.kind(),
            }),
        }
    }

    fn process_node(&self, node: &DagNode, root: Cid, root_priority: u64, delta: CrdtDelta) -> Result<Vec<Cid>> {
        process_typed(&self.clock, node, root, root_priority, delta)
    }

    fn sync(&self, root: Cid, getter: &dyn NodeGetter, cancel: &CancelToken) -> Result<SyncReport> {
        self.clock.sync(root, getter, cancel)
    }
}

/// Numeric kinds a [`FieldValue`] can be saved into.
pub trait CounterAmount: Incrementable {
    /// `None` when the value is of another kind or does not convert exactly.
    fn from_field_value(value: &FieldValue) -> Option<Self>;
}

impl CounterAmount for i64 {
    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl CounterAmount for f32 {
    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Float(v) => {
                let amount = *v as f32;
                (f64::from(amount) == *v).then_some(amount)
            }
            FieldValue::Int(v) => {
                let amount = *v as f32;
                (amount as i128 == i128::from(*v)).then_some(amount)
            }
            _ => None,
        }
    }
}

impl CounterAmount for f64 {
    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => {
                let amount = *v as f64;
                (amount as i128 == i128::from(*v)).then_some(amount)
            }
            _ => None,
        }
    }
}

pub struct MerkleCounter<T: CounterAmount> {
    clock: MerkleClock<Counter<T>>,
}

impl<T: CounterAmount> MerkleCounter<T> {
    pub fn new(
        stores: &Stores,
        schema_version_key: &CollectionSchemaVersionKey,
        key: DataStoreKey,
        field_name: impl Into<String>,
        allow_decrement: bool,
    ) -> Self {
        let counter = Counter::new(stores.datastore.clone(), schema_version_key, key, field_name, allow_decrement);
        MerkleCounter {
            clock: stores.clock(counter),
        }
    }

    pub fn increment(&self, amount: T) -> Result<DagNode> {
        let delta = self.clock.crdt().increment(amount)?;
        self.clock.add_dag_node(delta)
    }

    pub fn value(&self) -> Result<T> {
        Ok(self.clock.crdt().value()?)
    }

    pub fn clock(&self) -> &MerkleClock<Counter<T>> {
        &self.clock
    }
}

impl<T: CounterAmount> MerkleCrdt for MerkleCounter<T> {
    fn ctype(&self) -> CType {
        self.clock.crdt().ctype()
    }

    fn head_store_key(&self) -> HeadStoreKey {
        self.clock.crdt().head_store_key()
    }

    fn heads(&self) -> Result<HeadSnapshot> {
        self.clock.snapshot()
    }

    fn save(&self, value: FieldValue) -> Result<DagNode> {
        let amount = T::from_field_value(&value).ok_or(MerkleError::UnsupportedValue {
            crdt: "counter",
            value: value.kind(),
        })?;
        self.increment(amount)
    }

    fn process_node(&self, node: &DagNode, root: Cid, root_priority: u64, delta: CrdtDelta) -> Result<Vec<Cid>> {
        process_typed(&self.clock, node, root, root_priority, delta)
    }

    fn sync(&self, root: Cid, getter: &dyn NodeGetter, cancel: &CancelToken) -> Result<SyncReport> {
        self.clock.sync(root, getter, cancel)
    }
}

pub struct MerkleCompositeDag {
    clock: MerkleClock<CompositeDag>,
}

impl MerkleCompositeDag {
    pub fn new(stores: &Stores, schema_version_key: &CollectionSchemaVersionKey, key: DataStoreKey) -> Self {
        let dag = CompositeDag::new(stores.datastore.clone(), schema_version_key, key);
        MerkleCompositeDag {
            clock: stores.clock(dag),
        }
    }

    pub fn set(&self, patch: impl Into<Vec<u8>>, links: Vec<DagLink>) -> Result<DagNode> {
        let delta = self.clock.crdt().set(patch, links)?;
        self.clock.add_dag_node(delta)
    }

    pub fn delete(&self, links: Vec<DagLink>) -> Result<DagNode> {
        let delta = self.clock.crdt().delete(links)?;
        self.clock.add_dag_node(delta)
    }

    pub fn status(&self) -> Result<Option<DocumentStatus>> {
        Ok(self.clock.crdt().status()?)
    }

    pub fn clock(&self) -> &MerkleClock<CompositeDag> {
        &self.clock
    }
}

impl MerkleCrdt for MerkleCompositeDag {
    fn ctype(&self) -> CType {
        CType::Composite
    }

    fn head_store_key(&self) -> HeadStoreKey {
        self.clock.crdt().head_store_key()
    }

    fn heads(&self) -> Result<HeadSnapshot> {
        self.clock.snapshot()
    }

    fn save(&self, value: FieldValue) -> Result<DagNode> {
        match value {
            FieldValue::Patch { data, links } => self.set(data, links),
            FieldValue::Delete { links } => self.delete(links),
            other => Err(MerkleError::UnsupportedValue {
                crdt: "composite",
                value: other.kind(),
            }),
        }
    }

    fn process_node(&self, node: &DagNode, root: Cid, root_priority: u64, delta: CrdtDelta) -> Result<Vec<Cid>> {
        process_typed(&self.clock, node, root, root_priority, delta)
    }

    fn sync(&self, root: Cid, getter: &dyn NodeGetter, cancel: &CancelToken) -> Result<SyncReport> {
        self.clock.sync(root, getter, cancel)
    }
}

/// Build the Merkle CRDT for a field of type `ctype`.
///
/// Counters need the numeric kind of the field; other types ignore it.
pub fn new_field_crdt(
    stores: &Stores,
    ctype: CType,
    kind: Option<NumericKind>,
    schema_version_key: &CollectionSchemaVersionKey,
    key: DataStoreKey,
    field_name: &str,
) -> Result<Box<dyn MerkleCrdt>> {
    let allow_decrement = ctype == CType::PnCounter;
    let crdt: Box<dyn MerkleCrdt> = match (ctype, kind) {
        (CType::LwwRegister, _) => Box::new(MerkleLwwRegister::new(stores, schema_version_key, key, field_name)),
        (CType::Composite, _) => Box::new(MerkleCompositeDag::new(stores, schema_version_key, key)),
        (CType::PCounter | CType::PnCounter, Some(NumericKind::Int)) => Box::new(MerkleCounter::<i64>::new(
            stores,
            schema_version_key,
            key,
            field_name,
            allow_decrement,
        )),
        (CType::PCounter | CType::PnCounter, Some(NumericKind::Float32)) => Box::new(MerkleCounter::<f32>::new(
            stores,
            schema_version_key,
            key,
            field_name,
            allow_decrement,
        )),
        (CType::PCounter | CType::PnCounter, Some(NumericKind::Float64)) => Box::new(MerkleCounter::<f64>::new(
            stores,
            schema_version_key,
            key,
            field_name,
            allow_decrement,
        )),
        (CType::PCounter | CType::PnCounter, None) => {
            return Err(MerkleError::UnsupportedCrdt(format!(
                "counter field {} has no numeric kind",
                field_name
            )))
        }
    };
    Ok(crdt)
}
