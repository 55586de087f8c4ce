//! Content identifiers and named DAG links.
//!
//! A [`Cid`] is the SHA-256 digest of a block's canonical encoding. Ordering
//! is plain byte order, which is what head listings are sorted by.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 32-byte SHA-256 content identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Cid([u8; 32]);

impl Cid {
    /// Create a CID from raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Cid(bytes)
    }

    /// Get the underlying digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 64 {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex_str = std::str::from_utf8(chunk).ok()?;
            bytes[i] = u8::from_str_radix(hex_str, 16).ok()?;
        }
        Some(Cid(bytes))
    }

    /// Truncated display (first 8 chars).
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Incremental hasher producing a [`Cid`].
pub struct CidHasher {
    inner: Sha256,
}

impl CidHasher {
    pub fn new() -> Self {
        CidHasher {
            inner: Sha256::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Feed a length-prefixed byte string, so adjacent fields cannot alias.
    pub fn update_framed(&mut self, data: &[u8]) {
        self.inner.update((data.len() as u64).to_le_bytes());
        self.inner.update(data);
    }

    pub fn finalize(self) -> Cid {
        let result = self.inner.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&result);
        Cid(bytes)
    }

    /// Hash data directly.
    pub fn hash(data: &[u8]) -> Cid {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize()
    }
}

impl Default for CidHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// A named link from one DAG node to another.
///
/// Head links are named [`HEAD_LINK_NAME`]; composite deltas link to the
/// current head of each field under the field's name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DagLink {
    pub name: String,
    pub cid: Cid,
}

/// Name given to links pointing at a previous head.
pub const HEAD_LINK_NAME: &str = "head";

impl DagLink {
    pub fn new(name: impl Into<String>, cid: Cid) -> Self {
        DagLink {
            name: name.into(),
            cid,
        }
    }

    pub fn head(cid: Cid) -> Self {
        DagLink::new(HEAD_LINK_NAME, cid)
    }

    pub fn is_head(&self) -> bool {
        self.name == HEAD_LINK_NAME
    }
}
