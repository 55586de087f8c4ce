//! Last-Write-Wins (LWW) Register CRDT
//!
//! The register retains the value carrying the highest priority. Priorities
//! are causal heights, so a value written after observing another always
//! wins. Concurrent writes at the same height are resolved by the merge id
//! of the event: the greater id wins, on every replica.

use crate::base::{decode_value, encode_value, read_raw};
use crate::delta::CrdtDelta;
use crate::error::{CoreError, Result};
use crate::key::{CollectionSchemaVersionKey, DataStoreKey, HeadStoreKey};
use crate::priority::{encode_priority, get_priority};
use crate::replicated::{CType, Delta, ReplicatedData};
use crate::store::{DatastoreRef, WriteBatch};
use serde::{Deserialize, Serialize};

/// A single write to an LWW register.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LwwRegDelta {
    pub doc_id: Vec<u8>,
    pub field_name: String,
    pub priority: u64,
    pub schema_version_id: String,
    pub data: Vec<u8>,
}

impl Delta for LwwRegDelta {
    fn priority(&self) -> u64 {
        self.priority
    }

    fn set_priority(&mut self, priority: u64) {
        self.priority = priority;
    }
}

impl From<LwwRegDelta> for CrdtDelta {
    fn from(delta: LwwRegDelta) -> Self {
        CrdtDelta::LwwRegister(delta)
    }
}

impl TryFrom<CrdtDelta> for LwwRegDelta {
    type Error = CoreError;

    fn try_from(delta: CrdtDelta) -> Result<Self> {
        match delta {
            CrdtDelta::LwwRegister(d) => Ok(d),
            other => Err(CoreError::TypeMismatch {
                expected: "lww register",
                found: other.kind_name(),
            }),
        }
    }
}

/// What the value slot holds: the value and the id of the event that wrote it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct StoredRegister {
    value: Vec<u8>,
    writer: String,
}

/// A Last-Write-Wins register stored under one field key.
pub struct LwwRegister {
    store: DatastoreRef,
    key: DataStoreKey,
    schema_version_id: String,
    field_name: String,
}

impl LwwRegister {
    pub fn new(
        store: DatastoreRef,
        schema_version_key: &CollectionSchemaVersionKey,
        key: DataStoreKey,
        field_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            key,
            schema_version_id: schema_version_key.schema_version_id.clone(),
            field_name: field_name.into(),
        }
    }

    /// Produce a delta writing `value`. Stored state is not touched.
    pub fn set(&self, value: impl Into<Vec<u8>>) -> Result<LwwRegDelta> {
        let priority = self.priority()? + 1;
        Ok(LwwRegDelta {
            doc_id: self.key.doc_id.as_bytes().to_vec(),
            field_name: self.field_name.clone(),
            priority,
            schema_version_id: self.schema_version_id.clone(),
            data: value.into(),
        })
    }

    /// Current value, if anything has been merged.
    pub fn value(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.stored()?.map(|s| s.value))
    }

    /// Priority of the current value, 0 when empty.
    pub fn priority(&self) -> Result<u64> {
        get_priority(self.store.as_ref(), &self.key)
    }

    pub fn key(&self) -> &DataStoreKey {
        &self.key
    }

    fn stored(&self) -> Result<Option<StoredRegister>> {
        let value_key = self.key.with_value_flag().to_bytes();
        match read_raw(self.store.as_ref(), &value_key)? {
            Some(bytes) => Ok(Some(decode_value(&value_key, &bytes)?)),
            None => Ok(None),
        }
    }

    fn set_value(&self, value: &[u8], priority: u64, id: &str) -> Result<()> {
        let current_priority = self.priority()?;
        if priority < current_priority {
            return Ok(());
        }
        if priority == current_priority {
            if let Some(current) = self.stored()? {
                if current.writer.as_str() >= id {
                    return Ok(());
                }
            }
        }

        let stored = StoredRegister {
            value: value.to_vec(),
            writer: id.to_string(),
        };
        let value_key = self.key.with_value_flag().to_bytes();
        let prio_key = self.key.with_priority_flag().to_bytes();

        let mut batch = WriteBatch::new();
        batch
            .put(value_key.clone(), encode_value("register value", &stored)?)
            .put(prio_key, encode_priority(priority));
        self.store
            .write_batch(batch)
            .map_err(|e| CoreError::store("put", &value_key, e))
    }
}

impl ReplicatedData for LwwRegister {
    type Delta = LwwRegDelta;

    fn ctype(&self) -> CType {
        CType::LwwRegister
    }

    fn head_store_key(&self) -> HeadStoreKey {
        self.key.to_head_store_key()
    }

    fn merge(&self, delta: &LwwRegDelta, id: &str) -> Result<()> {
        self.set_value(&delta.data, delta.priority, id)
    }
}
