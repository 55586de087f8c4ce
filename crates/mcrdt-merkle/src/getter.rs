//! Node lookup for DAG walks and history queries.

use crate::error::Result;
use crate::node::DagNode;
use crate::store::BlockstoreRef;
use mcrdt_core::{Cid, CrdtDelta, Delta};
use std::collections::{BinaryHeap, HashSet};

/// Fetches DAG nodes together with their decoded delta.
pub trait NodeGetter: Send + Sync {
    fn get_delta(&self, cid: &Cid) -> Result<(DagNode, CrdtDelta)>;

    fn get_priority(&self, cid: &Cid) -> Result<u64> {
        Ok(self.get_delta(cid)?.1.priority())
    }

    /// One result per requested CID, in request order.
    fn get_deltas(&self, cids: &[Cid]) -> Vec<Result<(DagNode, CrdtDelta)>> {
        cids.iter().map(|cid| self.get_delta(cid)).collect()
    }

    /// Up to `limit` commits reachable from `head` through head links,
    /// highest priority first. Equal priorities are ordered by CID.
    fn history(&self, head: &Cid, limit: usize) -> Result<Vec<(DagNode, CrdtDelta)>> {
        let mut commits = Vec::new();
        if limit == 0 {
            return Ok(commits);
        }

        let mut seen = HashSet::from([*head]);
        let mut frontier = BinaryHeap::new();
        let (node, delta) = self.get_delta(head)?;
        frontier.push(Commit(delta.priority(), node, delta));

        while let Some(Commit(_, node, delta)) = frontier.pop() {
            for parent in node.head_links() {
                if seen.insert(parent) {
                    let (parent_node, parent_delta) = self.get_delta(&parent)?;
                    frontier.push(Commit(parent_delta.priority(), parent_node, parent_delta));
                }
            }
            commits.push((node, delta));
            if commits.len() == limit {
                break;
            }
        }
        Ok(commits)
    }
}

/// Heap entry ordered by priority, then CID.
struct Commit(u64, DagNode, CrdtDelta);

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0 && self.1.cid() == other.1.cid()
    }
}

impl Eq for Commit {}

impl PartialOrd for Commit {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Commit {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0).then_with(|| self.1.cid().cmp(&other.1.cid()))
    }
}

/// Node getter reading straight from a block store.
#[derive(Clone)]
pub struct BlockstoreNodeGetter {
    blocks: BlockstoreRef,
}

impl BlockstoreNodeGetter {
    pub fn new(blocks: BlockstoreRef) -> Self {
        BlockstoreNodeGetter { blocks }
    }
}

impl NodeGetter for BlockstoreNodeGetter {
    fn get_delta(&self, cid: &Cid) -> Result<(DagNode, CrdtDelta)> {
        let node = self.blocks.get(cid)?;
        let delta = node.delta()?;
        Ok((node, delta))
    }
}
