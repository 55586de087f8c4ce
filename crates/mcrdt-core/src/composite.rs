//! Composite DAG CRDT.
//!
//! A composite delta describes a whole-document update. Its node links to the
//! current head of every field clock the update touched, threading the field
//! DAGs into one document-level history. Merging only records priority and
//! document status; field values are merged by their own containers.

use crate::base::{read_raw, DocumentStatus};
use crate::cid::DagLink;
use crate::delta::CrdtDelta;
use crate::error::{CoreError, Result};
use crate::key::{CollectionSchemaVersionKey, DataStoreKey, HeadStoreKey, COMPOSITE_NAMESPACE};
use crate::priority::{encode_priority, get_priority};
use crate::replicated::{CType, Delta, ReplicatedData};
use crate::store::{DatastoreRef, WriteBatch};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeDagDelta {
    pub doc_id: Vec<u8>,
    pub field_name: String,
    pub priority: u64,
    pub schema_version_id: String,
    pub status: DocumentStatus,
    /// Opaque document patch.
    pub data: Vec<u8>,
    /// Links to the current head of each constituent field.
    pub sub_dag_links: Vec<DagLink>,
}

impl Delta for CompositeDagDelta {
    fn priority(&self) -> u64 {
        self.priority
    }

    fn set_priority(&mut self, priority: u64) {
        self.priority = priority;
    }

    fn links(&self) -> &[DagLink] {
        &self.sub_dag_links
    }
}

impl From<CompositeDagDelta> for CrdtDelta {
    fn from(delta: CompositeDagDelta) -> Self {
        CrdtDelta::Composite(delta)
    }
}

impl TryFrom<CrdtDelta> for CompositeDagDelta {
    type Error = CoreError;

    fn try_from(delta: CrdtDelta) -> Result<Self> {
        match delta {
            CrdtDelta::Composite(d) => Ok(d),
            other => Err(CoreError::TypeMismatch {
                expected: "composite",
                found: other.kind_name(),
            }),
        }
    }
}

pub struct CompositeDag {
    store: DatastoreRef,
    key: DataStoreKey,
    schema_version_id: String,
}

impl CompositeDag {
    /// The field id of `key` is replaced with the composite namespace.
    pub fn new(store: DatastoreRef, schema_version_key: &CollectionSchemaVersionKey, key: DataStoreKey) -> Self {
        Self {
            store,
            key: key.with_field_id(COMPOSITE_NAMESPACE),
            schema_version_id: schema_version_key.schema_version_id.clone(),
        }
    }

    /// Produce a delta recording `patch` over the given field heads.
    pub fn set(&self, patch: impl Into<Vec<u8>>, sub_dag_links: Vec<DagLink>) -> Result<CompositeDagDelta> {
        self.delta(patch.into(), sub_dag_links, DocumentStatus::Active)
    }

    /// Produce a delta marking the document deleted.
    pub fn delete(&self, sub_dag_links: Vec<DagLink>) -> Result<CompositeDagDelta> {
        self.delta(Vec::new(), sub_dag_links, DocumentStatus::Deleted)
    }

    fn delta(&self, data: Vec<u8>, mut sub_dag_links: Vec<DagLink>, status: DocumentStatus) -> Result<CompositeDagDelta> {
        sub_dag_links.sort_by(|a, b| a.cid.cmp(&b.cid).then_with(|| a.name.cmp(&b.name)));
        Ok(CompositeDagDelta {
            doc_id: self.key.doc_id.as_bytes().to_vec(),
            field_name: String::new(),
            priority: self.priority()? + 1,
            schema_version_id: self.schema_version_id.clone(),
            status,
            data,
            sub_dag_links,
        })
    }

    pub fn priority(&self) -> Result<u64> {
        get_priority(self.store.as_ref(), &self.key)
    }

    /// Document status, `None` before any composite delta was merged.
    pub fn status(&self) -> Result<Option<DocumentStatus>> {
        let pk = self.key.to_primary_key().to_bytes();
        match read_raw(self.store.as_ref(), &pk)? {
            Some(bytes) => Ok(Some(DocumentStatus::from_marker(&pk, &bytes)?)),
            None => Ok(None),
        }
    }

    pub fn key(&self) -> &DataStoreKey {
        &self.key
    }
}

impl ReplicatedData for CompositeDag {
    type Delta = CompositeDagDelta;

    fn ctype(&self) -> CType {
        CType::Composite
    }

    fn head_store_key(&self) -> HeadStoreKey {
        self.key.to_head_store_key()
    }

    fn merge(&self, delta: &CompositeDagDelta, _id: &str) -> Result<()> {
        let pk = self.key.to_primary_key().to_bytes();
        let mut batch = WriteBatch::new();

        // Deletion is sticky, whatever order the deltas arrive in.
        let current = self.status()?;
        if current != Some(DocumentStatus::Deleted) {
            batch.put(pk.clone(), vec![delta.status.marker()]);
        }
        if delta.priority > self.priority()? {
            batch.put(self.key.with_priority_flag().to_bytes(), encode_priority(delta.priority));
        }
        if batch.is_empty() {
            return Ok(());
        }
        self.store
            .write_batch(batch)
            .map_err(|e| CoreError::store("put", &pk, e))
    }
}
