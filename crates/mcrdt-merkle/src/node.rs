//! DAG node definition, builder and codec.
//!
//! Each node in a key's Merkle clock contains:
//! - The encoded delta it carries
//! - A `"head"` link per head it superseded, followed by any named sub-links
//!   (composite deltas link to the heads of their fields)
//!
//! The CID is the hash of the node's canonical encoding, so a node is fully
//! described by its bytes and can be verified against the CID it was
//! requested under.

use crate::error::{MerkleError, Result};
use mcrdt_core::{Cid, CidHasher, CoreError, CrdtDelta, DagLink, Delta};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct RawNodeRef<'a> {
    payload: &'a [u8],
    links: &'a [DagLink],
}

#[derive(Deserialize)]
struct RawNode {
    payload: Vec<u8>,
    links: Vec<DagLink>,
}

/// An immutable, content-addressed node of a Merkle clock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DagNode {
    cid: Cid,
    payload: Vec<u8>,
    links: Vec<DagLink>,
}

impl DagNode {
    /// Build the node for `delta` on top of `heads`.
    ///
    /// The delta's priority must already be stamped. Head links and sub-links
    /// are each ordered by CID, so the same delta over the same heads always
    /// yields the same block.
    pub fn from_delta(delta: &CrdtDelta, heads: &[Cid]) -> Result<DagNode> {
        let mut heads = heads.to_vec();
        heads.sort();
        let mut sub_links = delta.links().to_vec();
        sub_links.sort_by(|a, b| a.cid.cmp(&b.cid).then_with(|| a.name.cmp(&b.name)));

        NodeBuilder::new()
            .with_payload(delta.encode()?)
            .with_heads(&heads)
            .with_links(sub_links)
            .build()
    }

    pub fn cid(&self) -> Cid {
        self.cid
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn links(&self) -> &[DagLink] {
        &self.links
    }

    /// CIDs of the heads this node superseded.
    pub fn head_links(&self) -> impl Iterator<Item = Cid> + '_ {
        self.links.iter().filter(|l| l.is_head()).map(|l| l.cid)
    }

    /// Named links that are not head links.
    pub fn sub_links(&self) -> impl Iterator<Item = &DagLink> + '_ {
        self.links.iter().filter(|l| !l.is_head())
    }

    /// A node without head links is the first event of its key.
    pub fn is_leaf(&self) -> bool {
        !self.links.iter().any(DagLink::is_head)
    }

    /// Decode the carried delta.
    pub fn delta(&self) -> Result<CrdtDelta> {
        Ok(CrdtDelta::decode(&self.cid.to_hex(), &self.payload)?)
    }

    /// Canonical encoding; the CID is the hash of these bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(&self.payload, &self.links)
    }

    /// Decode a node, deriving its CID from the bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<DagNode> {
        let cid = CidHasher::hash(bytes);
        let raw: RawNode = postcard::from_bytes(bytes).map_err(|e| MerkleError::CorruptBlock {
            cid,
            reason: e.to_string(),
        })?;
        Ok(DagNode {
            cid,
            payload: raw.payload,
            links: raw.links,
        })
    }

    /// Decode a node fetched under `expected`, rejecting tampered content.
    pub fn from_bytes_verified(expected: Cid, bytes: &[u8]) -> Result<DagNode> {
        let node = Self::from_bytes(bytes)?;
        if node.cid != expected {
            return Err(MerkleError::CidMismatch {
                expected,
                actual: node.cid,
            });
        }
        Ok(node)
    }
}

fn encode(payload: &[u8], links: &[DagLink]) -> Result<Vec<u8>> {
    postcard::to_stdvec(&RawNodeRef { payload, links }).map_err(|e| {
        MerkleError::Core(CoreError::Encode {
            what: "dag node",
            reason: e.to_string(),
        })
    })
}

/// Builder for creating DAG nodes.
#[derive(Clone, Debug, Default)]
pub struct NodeBuilder {
    payload: Vec<u8>,
    links: Vec<DagLink>,
}

impl NodeBuilder {
    pub fn new() -> Self {
        NodeBuilder::default()
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// Add a `"head"` link.
    pub fn with_head(mut self, cid: Cid) -> Self {
        self.links.push(DagLink::head(cid));
        self
    }

    pub fn with_heads(mut self, heads: &[Cid]) -> Self {
        self.links.extend(heads.iter().copied().map(DagLink::head));
        self
    }

    pub fn with_link(mut self, link: DagLink) -> Self {
        self.links.push(link);
        self
    }

    pub fn with_links(mut self, links: impl IntoIterator<Item = DagLink>) -> Self {
        self.links.extend(links);
        self
    }

    /// Build the node, computing its CID.
    pub fn build(self) -> Result<DagNode> {
        let bytes = encode(&self.payload, &self.links)?;
        Ok(DagNode {
            cid: CidHasher::hash(&bytes),
            payload: self.payload,
            links: self.links,
        })
    }
}
