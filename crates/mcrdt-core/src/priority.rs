//! Varint encoding of priorities and heights.
//!
//! Heights are stored as a bare unsigned varint. Priorities in a container's
//! priority slot are stored as `priority + 1`, so that an encoded zero can
//! never be confused with "never written".

use crate::error::{CoreError, Result};
use crate::key::DataStoreKey;
use crate::store::Datastore;
use unsigned_varint::{decode as varint_decode, encode as varint_encode};

pub fn encode_uvarint(value: u64) -> Vec<u8> {
    let mut buf = varint_encode::u64_buffer();
    varint_encode::u64(value, &mut buf).to_vec()
}

/// Decode a varint occupying the whole of `bytes`. `key` is only used for
/// error context.
pub fn decode_uvarint(key: &[u8], bytes: &[u8]) -> Result<u64> {
    let (value, rest) = varint_decode::u64(bytes).map_err(|e| CoreError::corrupt(key, e))?;
    if !rest.is_empty() {
        return Err(CoreError::corrupt(key, "trailing bytes after varint"));
    }
    Ok(value)
}

pub fn encode_priority(priority: u64) -> Vec<u8> {
    encode_uvarint(priority.saturating_add(1))
}

/// Read the last applied priority of `key`, or 0 when nothing has been merged.
pub fn get_priority(store: &dyn Datastore, key: &DataStoreKey) -> Result<u64> {
    let prio_key = key.with_priority_flag().to_bytes();
    let stored = store
        .get(&prio_key)
        .map_err(|e| CoreError::store("get", &prio_key, e))?;
    match stored {
        None => Ok(0),
        Some(bytes) => {
            let raw = decode_uvarint(&prio_key, &bytes)?;
            if raw == 0 {
                return Err(CoreError::corrupt(&prio_key, "zero is reserved for absent priority"));
            }
            Ok(raw - 1)
        }
    }
}
