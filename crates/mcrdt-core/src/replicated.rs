//! The delta and replicated-data contracts.
//!
//! Every container only ever changes stored state through
//! [`ReplicatedData::merge`]. Local writers call the container's mutation
//! method to *produce* a delta, and that delta is merged through the same path
//! a remote delta takes. `merge` must be:
//!  - Commutative: merge(merge(s, a), b) = merge(merge(s, b), a)
//!  - Associative over any grouping of a delta set
//!  - Idempotent: merge(merge(s, a), a) = merge(s, a)

use crate::cid::DagLink;
use crate::delta::CrdtDelta;
use crate::error::{CoreError, Result};
use crate::key::HeadStoreKey;
use std::fmt;

/// An immutable state mutation. The priority is the only field assigned after
/// construction, once, when the delta is attached to a DAG node.
pub trait Delta: Clone + fmt::Debug + Send + Sync {
    fn priority(&self) -> u64;

    fn set_priority(&mut self, priority: u64);

    /// Named sub-links the DAG node must carry besides its head links.
    fn links(&self) -> &[DagLink] {
        &[]
    }
}

/// A CRDT state container bound to one logical key.
pub trait ReplicatedData: Send + Sync {
    type Delta: Delta + Into<CrdtDelta> + TryFrom<CrdtDelta, Error = CoreError>;

    fn ctype(&self) -> CType;

    /// Namespace of the heads of this key's Merkle clock.
    fn head_store_key(&self) -> HeadStoreKey;

    /// Fold `delta` into stored state. `id` identifies the event carrying the
    /// delta (the hex CID of its node).
    fn merge(&self, delta: &Self::Delta, id: &str) -> Result<()>;

    /// Merge a delta decoded off the wire, checking its kind first.
    fn merge_any(&self, delta: CrdtDelta, id: &str) -> Result<()> {
        let delta = Self::Delta::try_from(delta)?;
        self.merge(&delta, id)
    }
}

/// CRDT type byte carried in field descriptions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CType {
    LwwRegister = 1,
    Composite = 3,
    PCounter = 4,
    PnCounter = 5,
}

impl CType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for CType {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(CType::LwwRegister),
            3 => Ok(CType::Composite),
            4 => Ok(CType::PCounter),
            5 => Ok(CType::PnCounter),
            other => Err(CoreError::UnknownCType(other)),
        }
    }
}
