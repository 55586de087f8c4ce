//! Helpers shared by the containers: stored-value codec and document status.

use crate::error::{CoreError, Result};
use crate::store::Datastore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Encode a stored value with the same binary encoding used for deltas.
pub fn encode_value<T: Serialize>(what: &'static str, value: &T) -> Result<Vec<u8>> {
    postcard::to_stdvec(value).map_err(|e| CoreError::Encode {
        what,
        reason: e.to_string(),
    })
}

/// Decode stored bytes. Failure means the store holds bytes we never wrote.
pub fn decode_value<T: DeserializeOwned>(key: &[u8], bytes: &[u8]) -> Result<T> {
    postcard::from_bytes(bytes).map_err(|e| CoreError::corrupt(key, e))
}

pub(crate) fn read_raw(store: &dyn Datastore, key: &[u8]) -> Result<Option<Vec<u8>>> {
    store.get(key).map_err(|e| CoreError::store("get", key, e))
}

pub(crate) fn has_raw(store: &dyn Datastore, key: &[u8]) -> Result<bool> {
    store.has(key).map_err(|e| CoreError::store("has", key, e))
}

/// Status of a document as recorded by its composite CRDT.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentStatus {
    #[default]
    Active,
    Deleted,
}

impl DocumentStatus {
    pub const ACTIVE_MARKER: u8 = 0x01;
    pub const DELETED_MARKER: u8 = 0x02;

    pub fn marker(self) -> u8 {
        match self {
            DocumentStatus::Active => Self::ACTIVE_MARKER,
            DocumentStatus::Deleted => Self::DELETED_MARKER,
        }
    }

    pub fn from_marker(key: &[u8], bytes: &[u8]) -> Result<Self> {
        match bytes {
            [Self::ACTIVE_MARKER] => Ok(DocumentStatus::Active),
            [Self::DELETED_MARKER] => Ok(DocumentStatus::Deleted),
            _ => Err(CoreError::corrupt(key, "unknown document status marker")),
        }
    }

    pub fn is_deleted(self) -> bool {
        self == DocumentStatus::Deleted
    }
}
