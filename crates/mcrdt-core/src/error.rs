//! Error types for the CRDT core.

use thiserror::Error;

/// Failure reported by a key-value backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),

    #[cfg(feature = "sled")]
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
}

/// Errors that can occur while producing or merging deltas.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A get/put/has against the key-value store failed.
    #[error("store {op} failed for key {key}: {source}")]
    Store {
        op: &'static str,
        key: String,
        #[source]
        source: StoreError,
    },

    /// Stored bytes could not be decoded. Indicates on-disk corruption.
    #[error("corrupt value at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("failed to encode {what}: {reason}")]
    Encode { what: &'static str, reason: String },

    #[error("type mismatch: expected {expected} delta, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("negative value {0} is not allowed on a grow-only counter")]
    NegativeValue(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("unknown CRDT type byte: {0}")]
    UnknownCType(u8),
}

impl CoreError {
    pub(crate) fn store(op: &'static str, key: &[u8], source: StoreError) -> Self {
        CoreError::Store {
            op,
            key: String::from_utf8_lossy(key).into_owned(),
            source,
        }
    }

    pub(crate) fn corrupt(key: &[u8], reason: impl ToString) -> Self {
        CoreError::Corrupt {
            key: String::from_utf8_lossy(key).into_owned(),
            reason: reason.to_string(),
        }
    }

    /// Only store I/O failures are worth retrying; everything else is either
    /// corruption or a semantic error that will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Store { .. })
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
