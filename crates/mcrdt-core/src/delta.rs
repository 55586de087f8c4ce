//! Tagged union over every delta kind, and its binary codec.
//!
//! Node payloads hold an encoded [`CrdtDelta`]. The encoding is postcard:
//! fields in declaration order, varint integers, no maps, so byte-identical
//! logical deltas always produce byte-identical blocks.

use crate::cid::DagLink;
use crate::composite::CompositeDagDelta;
use crate::counter::CounterDelta;
use crate::error::{CoreError, Result};
use crate::lwwreg::LwwRegDelta;
use crate::replicated::Delta;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrdtDelta {
    LwwRegister(LwwRegDelta),
    Counter(CounterDelta),
    Composite(CompositeDagDelta),
}

impl CrdtDelta {
    pub fn kind_name(&self) -> &'static str {
        match self {
            CrdtDelta::LwwRegister(_) => "lww register",
            CrdtDelta::Counter(_) => "counter",
            CrdtDelta::Composite(_) => "composite",
        }
    }

    pub fn doc_id(&self) -> &[u8] {
        match self {
            CrdtDelta::LwwRegister(d) => &d.doc_id,
            CrdtDelta::Counter(d) => &d.doc_id,
            CrdtDelta::Composite(d) => &d.doc_id,
        }
    }

    pub fn field_name(&self) -> &str {
        match self {
            CrdtDelta::LwwRegister(d) => &d.field_name,
            CrdtDelta::Counter(d) => &d.field_name,
            CrdtDelta::Composite(d) => &d.field_name,
        }
    }

    pub fn schema_version_id(&self) -> &str {
        match self {
            CrdtDelta::LwwRegister(d) => &d.schema_version_id,
            CrdtDelta::Counter(d) => &d.schema_version_id,
            CrdtDelta::Composite(d) => &d.schema_version_id,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        postcard::to_stdvec(self).map_err(|e| CoreError::Encode {
            what: "delta",
            reason: e.to_string(),
        })
    }

    /// Decode a node payload. `context` names the block for error reporting.
    pub fn decode(context: &str, bytes: &[u8]) -> Result<Self> {
        postcard::from_bytes(bytes).map_err(|e| CoreError::Corrupt {
            key: context.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Delta for CrdtDelta {
    fn priority(&self) -> u64 {
        match self {
            CrdtDelta::LwwRegister(d) => d.priority(),
            CrdtDelta::Counter(d) => d.priority(),
            CrdtDelta::Composite(d) => d.priority(),
        }
    }

    fn set_priority(&mut self, priority: u64) {
        match self {
            CrdtDelta::LwwRegister(d) => d.set_priority(priority),
            CrdtDelta::Counter(d) => d.set_priority(priority),
            CrdtDelta::Composite(d) => d.set_priority(priority),
        }
    }

    fn links(&self) -> &[DagLink] {
        match self {
            CrdtDelta::Composite(d) => d.links(),
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::DocumentStatus;
    use crate::cid::CidHasher;

    fn samples() -> Vec<CrdtDelta> {
        vec![
            CrdtDelta::LwwRegister(LwwRegDelta {
                doc_id: b"bae-1".to_vec(),
                field_name: "name".into(),
                priority: 3,
                schema_version_id: "sv".into(),
                data: b"John".to_vec(),
            }),
            CrdtDelta::Counter(CounterDelta {
                doc_id: b"bae-1".to_vec(),
                field_name: "points".into(),
                priority: 9,
                nonce: 1234567,
                schema_version_id: "sv".into(),
                data: vec![20],
            }),
            CrdtDelta::Composite(CompositeDagDelta {
                doc_id: b"bae-1".to_vec(),
                field_name: String::new(),
                priority: 2,
                schema_version_id: "sv".into(),
                status: DocumentStatus::Deleted,
                data: b"{}".to_vec(),
                sub_dag_links: vec![DagLink::new("name", CidHasher::hash(b"n"))],
            }),
        ]
    }

    #[test]
    fn test_roundtrip_every_kind() {
        for delta in samples() {
            let bytes = delta.encode().unwrap();
            assert_eq!(CrdtDelta::decode("block", &bytes).unwrap(), delta);
        }
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = samples();
        let b = samples();
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.encode().unwrap(), y.encode().unwrap());
        }
    }

    #[test]
    fn test_nonce_changes_encoding() {
        let mut deltas = samples();
        let base = deltas[1].encode().unwrap();
        if let CrdtDelta::Counter(d) = &mut deltas[1] {
            d.nonce += 1;
        }
        assert_ne!(deltas[1].encode().unwrap(), base);
    }

    #[test]
    fn test_decode_garbage_is_corrupt() {
        let err = CrdtDelta::decode("block", &[0x07, 0x01]).unwrap_err();
        assert!(matches!(err, CoreError::Corrupt { .. }));
    }

    #[test]
    fn test_priority_and_links_dispatch() {
        let mut deltas = samples();
        deltas[0].set_priority(42);
        assert_eq!(deltas[0].priority(), 42);
        assert!(deltas[0].links().is_empty());
        assert_eq!(deltas[2].links().len(), 1);
        assert_eq!(deltas[1].field_name(), "points");
        assert_eq!(deltas[2].kind_name(), "composite");
    }
}
