//! Key-space types.
//!
//! A logical key is a single field of a single document in a collection.
//! Its value and priority live in the datastore under [`DataStoreKey`]
//! renderings; its heads live in the headstore under [`HeadStoreKey`].

use crate::cid::Cid;
use crate::error::{CoreError, Result};
use std::fmt;
use std::str::FromStr;

/// Field id used by the composite (whole-document) CRDT.
pub const COMPOSITE_NAMESPACE: &str = "C";

/// Segment used by primary keys.
const PRIMARY_KEY: &str = "pk";

/// Which slot of a logical key an entry occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InstanceType {
    Value,
    Priority,
    /// Applied-event markers, used to make counter merges idempotent.
    Event,
}

impl InstanceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceType::Value => "v",
            InstanceType::Priority => "p",
            InstanceType::Event => "e",
        }
    }
}

/// Key of a value in the datastore: `/<collection>/<instance>/<doc>/<field>`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DataStoreKey {
    pub collection_root_id: u32,
    pub instance_type: Option<InstanceType>,
    pub doc_id: String,
    pub field_id: String,
}

impl DataStoreKey {
    pub fn new(collection_root_id: u32, doc_id: impl Into<String>, field_id: impl Into<String>) -> Self {
        DataStoreKey {
            collection_root_id,
            instance_type: None,
            doc_id: doc_id.into(),
            field_id: field_id.into(),
        }
    }

    pub fn with_instance(&self, instance_type: InstanceType) -> Self {
        let mut key = self.clone();
        key.instance_type = Some(instance_type);
        key
    }

    pub fn with_value_flag(&self) -> Self {
        self.with_instance(InstanceType::Value)
    }

    pub fn with_priority_flag(&self) -> Self {
        self.with_instance(InstanceType::Priority)
    }

    pub fn with_field_id(&self, field_id: impl Into<String>) -> Self {
        let mut key = self.clone();
        key.field_id = field_id.into();
        key
    }

    /// Key of the applied-event marker for merge id `id`.
    pub fn event_key(&self, id: &str) -> Vec<u8> {
        let mut bytes = self.with_instance(InstanceType::Event).to_bytes();
        bytes.push(b'/');
        bytes.extend_from_slice(id.as_bytes());
        bytes
    }

    pub fn to_head_store_key(&self) -> HeadStoreKey {
        HeadStoreKey {
            doc_id: self.doc_id.clone(),
            field_id: self.field_id.clone(),
            cid: None,
        }
    }

    pub fn to_primary_key(&self) -> PrimaryDataStoreKey {
        PrimaryDataStoreKey {
            collection_root_id: self.collection_root_id,
            doc_id: self.doc_id.clone(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for DataStoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.collection_root_id != 0 {
            write!(f, "/{}", self.collection_root_id)?;
        }
        if let Some(instance) = self.instance_type {
            write!(f, "/{}", instance.as_str())?;
        }
        if !self.doc_id.is_empty() {
            write!(f, "/{}", self.doc_id)?;
        }
        if !self.field_id.is_empty() {
            write!(f, "/{}", self.field_id)?;
        }
        Ok(())
    }
}

/// Key holding the document status marker: `/<collection>/pk/<doc>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PrimaryDataStoreKey {
    pub collection_root_id: u32,
    pub doc_id: String,
}

impl PrimaryDataStoreKey {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for PrimaryDataStoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.collection_root_id != 0 {
            write!(f, "/{}", self.collection_root_id)?;
        }
        write!(f, "/{}", PRIMARY_KEY)?;
        if !self.doc_id.is_empty() {
            write!(f, "/{}", self.doc_id)?;
        }
        Ok(())
    }
}

/// Key of a head entry: `/<doc>/<field>/<cid>`.
///
/// Without a CID it renders the namespace holding every head of the key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HeadStoreKey {
    pub doc_id: String,
    pub field_id: String,
    pub cid: Option<Cid>,
}

impl HeadStoreKey {
    pub fn new(doc_id: impl Into<String>, field_id: impl Into<String>) -> Self {
        HeadStoreKey {
            doc_id: doc_id.into(),
            field_id: field_id.into(),
            cid: None,
        }
    }

    pub fn with_cid(&self, cid: Cid) -> Self {
        let mut key = self.clone();
        key.cid = Some(cid);
        key
    }

    /// Prefix under which every head of this namespace is stored.
    pub fn prefix(&self) -> Vec<u8> {
        format!("/{}/{}/", self.doc_id, self.field_id).into_bytes()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let s = std::str::from_utf8(bytes)
            .map_err(|_| CoreError::InvalidKey(String::from_utf8_lossy(bytes).into_owned()))?;
        s.parse()
    }
}

impl fmt::Display for HeadStoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.doc_id, self.field_id)?;
        if let Some(cid) = &self.cid {
            write!(f, "/{}", cid)?;
        }
        Ok(())
    }
}

impl FromStr for HeadStoreKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CoreError::InvalidKey(s.to_string());
        let rest = s.strip_prefix('/').ok_or_else(invalid)?;
        let parts: Vec<&str> = rest.split('/').collect();
        match parts.as_slice() {
            [doc, field] if !doc.is_empty() && !field.is_empty() => Ok(HeadStoreKey::new(*doc, *field)),
            [doc, field, cid] if !doc.is_empty() && !field.is_empty() => {
                let cid = Cid::from_hex(cid).ok_or_else(invalid)?;
                Ok(HeadStoreKey::new(*doc, *field).with_cid(cid))
            }
            _ => Err(invalid()),
        }
    }
}

/// Identifies the schema version a collection was using at commit time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CollectionSchemaVersionKey {
    pub schema_version_id: String,
    pub collection_id: u32,
}

impl CollectionSchemaVersionKey {
    pub fn new(schema_version_id: impl Into<String>, collection_id: u32) -> Self {
        CollectionSchemaVersionKey {
            schema_version_id: schema_version_id.into(),
            collection_id,
        }
    }
}

impl fmt::Display for CollectionSchemaVersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/collection/version/{}/{}", self.schema_version_id, self.collection_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid::CidHasher;

    #[test]
    fn test_datastore_key_rendering() {
        let key = DataStoreKey::new(1, "bae-123", "2");
        assert_eq!(key.to_string(), "/1/bae-123/2");
        assert_eq!(key.with_value_flag().to_string(), "/1/v/bae-123/2");
        assert_eq!(key.with_priority_flag().to_string(), "/1/p/bae-123/2");
        assert_eq!(key.event_key("abc"), b"/1/e/bae-123/2/abc".to_vec());
    }

    #[test]
    fn test_primary_key() {
        let key = DataStoreKey::new(3, "doc", "1");
        assert_eq!(key.to_primary_key().to_string(), "/3/pk/doc");
    }

    #[test]
    fn test_head_store_key_roundtrip() {
        let cid = CidHasher::hash(b"node");
        let key = HeadStoreKey::new("doc", "1").with_cid(cid);
        let parsed = HeadStoreKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(parsed, key);
        assert!(key.to_bytes().starts_with(&key.prefix()));
    }

    #[test]
    fn test_head_store_key_rejects_unknown_shapes() {
        assert!(matches!("doc/1".parse::<HeadStoreKey>(), Err(CoreError::InvalidKey(_))));
        assert!(matches!("/doc".parse::<HeadStoreKey>(), Err(CoreError::InvalidKey(_))));
        assert!(matches!("/doc/1/not-a-cid".parse::<HeadStoreKey>(), Err(CoreError::InvalidKey(_))));
        assert!(matches!("/a/b/c/d".parse::<HeadStoreKey>(), Err(CoreError::InvalidKey(_))));
    }

    #[test]
    fn test_head_namespace_from_datastore_key() {
        let key = DataStoreKey::new(1, "doc", COMPOSITE_NAMESPACE);
        assert_eq!(key.to_head_store_key().to_string(), "/doc/C");
    }
}
