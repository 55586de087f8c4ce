//! The Merkle clock of one logical key.
//!
//! The clock drives a CRDT container: every local delta is stamped with the
//! next height, wrapped in a DAG node linking the current heads, persisted,
//! merged and recorded as the new head. Remote nodes go through
//! [`MerkleClock::process_node`], which merges the delta and classifies the
//! node's head links against the local head set:
//!
//! - a link to a current head is replaced by the root (same-lineage advance)
//! - a link to a known, superseded node adds the root as a new head
//! - a link to an unknown node is returned so the caller can fetch it
//!
//! Named sub-links (composite deltas) point into other keys' clocks and take
//! no part in head bookkeeping.

use crate::config::ClockConfig;
use crate::error::{MerkleError, Result};
use crate::getter::NodeGetter;
use crate::heads::HeadSet;
use crate::node::DagNode;
use crate::store::BlockstoreRef;
use mcrdt_core::{Cid, CrdtDelta, DatastoreRef, Delta, HeadStoreKey, ReplicatedData};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Cooperative cancellation flag for DAG walks.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Per-namespace locks serialising head-set read-modify-write cycles.
///
/// Clocks built for the same key must share one `ClockLocks` for local
/// writers to form a single chain.
#[derive(Clone, Default)]
pub struct ClockLocks {
    locks: Arc<Mutex<HashMap<HeadStoreKey, Arc<Mutex<()>>>>>,
}

impl ClockLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn for_namespace(&self, namespace: &HeadStoreKey) -> Arc<Mutex<()>> {
        self.locks.lock().entry(namespace.clone()).or_default().clone()
    }
}

/// Heads observed at one point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeadSnapshot {
    pub heads: Vec<Cid>,
    pub max_height: u64,
}

/// Outcome of a [`MerkleClock::sync`] walk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncReport {
    pub root: Cid,
    /// The root was already in the block store; nothing was merged.
    pub already_known: bool,
    pub nodes_merged: usize,
    pub heads: Vec<Cid>,
    pub max_height: u64,
}

pub struct MerkleClock<C: ReplicatedData> {
    heads: HeadSet,
    blocks: BlockstoreRef,
    crdt: C,
    locks: ClockLocks,
    config: ClockConfig,
}

impl<C: ReplicatedData> MerkleClock<C> {
    pub fn new(headstore: DatastoreRef, blocks: BlockstoreRef, crdt: C) -> Self {
        let namespace = crdt.head_store_key();
        MerkleClock {
            heads: HeadSet::new(headstore, namespace),
            blocks,
            crdt,
            locks: ClockLocks::new(),
            config: ClockConfig::default(),
        }
    }

    pub fn with_locks(mut self, locks: ClockLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_config(mut self, config: ClockConfig) -> Self {
        self.config = config;
        self
    }

    pub fn crdt(&self) -> &C {
        &self.crdt
    }

    pub fn head_set(&self) -> &HeadSet {
        &self.heads
    }

    pub fn blocks(&self) -> &BlockstoreRef {
        &self.blocks
    }

    pub fn snapshot(&self) -> Result<HeadSnapshot> {
        let (heads, max_height) = self.heads.list()?;
        Ok(HeadSnapshot { heads, max_height })
    }

    /// Stamp, persist and merge a locally produced delta on top of the
    /// current heads. Returns the new node, which becomes the sole head of
    /// its branch.
    pub fn add_dag_node(&self, delta: C::Delta) -> Result<DagNode> {
        let lock = self.locks.for_namespace(self.heads.namespace());
        let _guard = lock.lock();
        let snapshot = self.snapshot()?;
        self.add_locked(&snapshot, delta)
    }

    /// Like [`add_dag_node`](Self::add_dag_node), but builds on a head
    /// snapshot taken earlier, as a concurrent writer would.
    pub fn add_dag_node_from(&self, snapshot: &HeadSnapshot, delta: C::Delta) -> Result<DagNode> {
        let lock = self.locks.for_namespace(self.heads.namespace());
        let _guard = lock.lock();
        self.add_locked(snapshot, delta)
    }

    fn add_locked(&self, snapshot: &HeadSnapshot, mut delta: C::Delta) -> Result<DagNode> {
        let priority = snapshot.max_height + 1;
        delta.set_priority(priority);

        let wire: CrdtDelta = delta.clone().into();
        let node = DagNode::from_delta(&wire, &snapshot.heads)?;

        // The block must be durable before any head can point at it.
        self.blocks.put(&node)?;
        self.merge(&node, &delta)?;
        let unknown = self.update_heads(&node, node.cid(), priority)?;
        if !unknown.is_empty() {
            debug!(
                namespace = %self.heads.namespace(),
                missing = unknown.len(),
                "local node links heads missing from the block store"
            );
        }

        debug!(
            namespace = %self.heads.namespace(),
            cid = %node.cid().short(),
            priority,
            parents = snapshot.heads.len(),
            "added DAG node"
        );
        Ok(node)
    }

    /// Merge a node received from a peer.
    ///
    /// `root` is the node the current walk started from and `root_priority`
    /// its height; heads superseded anywhere along the walk are replaced by
    /// the root. The delta is merged under the node's own CID. Returns the
    /// head links not yet known locally.
    pub fn process_node(&self, node: &DagNode, root: Cid, root_priority: u64, delta: C::Delta) -> Result<Vec<Cid>> {
        let lock = self.locks.for_namespace(self.heads.namespace());
        let _guard = lock.lock();
        self.process_locked(node, root, root_priority, &delta)
    }

    fn process_locked(&self, node: &DagNode, root: Cid, root_priority: u64, delta: &C::Delta) -> Result<Vec<Cid>> {
        self.merge(node, delta)?;
        if !self.blocks.has(&node.cid())? {
            self.blocks.put(node)?;
        }
        let unknown = self.update_heads(node, root, root_priority)?;
        debug!(
            namespace = %self.heads.namespace(),
            cid = %node.cid().short(),
            root = %root.short(),
            priority = delta.priority(),
            unknown = unknown.len(),
            "processed DAG node"
        );
        Ok(unknown)
    }

    fn merge(&self, node: &DagNode, delta: &C::Delta) -> Result<()> {
        self.crdt
            .merge(delta, &node.cid().to_hex())
            .map_err(|source| MerkleError::MergingDelta { cid: node.cid(), source })
    }

    fn update_heads(&self, node: &DagNode, root: Cid, root_priority: u64) -> Result<Vec<Cid>> {
        if node.is_leaf() {
            self.heads.add(root, root_priority)?;
            return Ok(Vec::new());
        }

        let mut unknown = Vec::new();
        for child in node.head_links() {
            let (is_head, _) = self.heads.is_head(&child)?;
            if is_head {
                trace!(child = %child.short(), "link is a head");
                self.heads.replace(child, root, root_priority)?;
                continue;
            }

            if self.blocks.has(&child)? {
                trace!(child = %child.short(), "link is a known ancestor");
                self.heads.add(root, root_priority)?;
                continue;
            }

            trace!(child = %child.short(), "link is unknown");
            unknown.push(child);
        }
        Ok(unknown)
    }

    /// Pull every node reachable from `root` that is missing locally and
    /// merge it.
    ///
    /// The walk first fetches the missing part of the DAG breadth-first,
    /// checking `cancel` between fetches. It then merges the fetched nodes
    /// oldest first, each as the root of its own step, so a head always
    /// names a stored block and the root block is persisted last. A root
    /// already in the block store means a previous walk completed.
    pub fn sync(&self, root: Cid, getter: &dyn NodeGetter, cancel: &CancelToken) -> Result<SyncReport> {
        if self.blocks.has(&root)? {
            let (heads, max_height) = self.heads.list()?;
            return Ok(SyncReport {
                root,
                already_known: true,
                nodes_merged: 0,
                heads,
                max_height,
            });
        }

        let mut plan = self.fetch_missing(root, getter, cancel)?;
        plan.sort_by_key(|(_, delta)| delta.priority());

        if cancel.is_cancelled() {
            warn!(root = %root.short(), "sync cancelled before merging");
            return Err(MerkleError::Cancelled { merged: 0 });
        }

        let lock = self.locks.for_namespace(self.heads.namespace());
        let _guard = lock.lock();
        for (node, delta) in &plan {
            self.process_locked(node, node.cid(), delta.priority(), delta)?;
        }

        let (heads, max_height) = self.heads.list()?;
        info!(
            namespace = %self.heads.namespace(),
            root = %root.short(),
            merged = plan.len(),
            heads = heads.len(),
            "sync complete"
        );
        Ok(SyncReport {
            root,
            already_known: false,
            nodes_merged: plan.len(),
            heads,
            max_height,
        })
    }

    /// Breadth-first fetch of the nodes reachable from `root` that the block
    /// store lacks. The root is always the first entry.
    fn fetch_missing(&self, root: Cid, getter: &dyn NodeGetter, cancel: &CancelToken) -> Result<Vec<(DagNode, C::Delta)>> {
        let mut queue = VecDeque::from([root]);
        let mut visited = HashSet::from([root]);
        let mut fetched = Vec::new();

        while let Some(cid) = queue.pop_front() {
            if cancel.is_cancelled() {
                warn!(root = %root.short(), fetched = fetched.len(), "sync cancelled");
                return Err(MerkleError::Cancelled { merged: 0 });
            }
            if fetched.len() >= self.config.max_walk_nodes {
                return Err(MerkleError::WalkLimitExceeded(self.config.max_walk_nodes));
            }

            let (node, wire) = getter.get_delta(&cid)?;
            if self.config.verify_blocks && node.cid() != cid {
                return Err(MerkleError::CidMismatch {
                    expected: cid,
                    actual: node.cid(),
                });
            }
            let delta = C::Delta::try_from(wire).map_err(|source| MerkleError::MergingDelta { cid, source })?;

            for child in node.head_links() {
                if !visited.contains(&child) && !self.blocks.has(&child)? {
                    visited.insert(child);
                    queue.push_back(child);
                }
            }
            fetched.push((node, delta));
        }
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBlockstore;
    use mcrdt_core::{CollectionSchemaVersionKey, DataStoreKey, LwwRegDelta, LwwRegister, MemoryDatastore};

    fn clock() -> MerkleClock<LwwRegister> {
        let reg = LwwRegister::new(
            MemoryDatastore::shared(),
            &CollectionSchemaVersionKey::new("schema-v1", 1),
            DataStoreKey::new(1, "doc", "name"),
            "name",
        );
        MerkleClock::new(MemoryDatastore::shared(), MemoryBlockstore::shared(), reg)
    }

    #[test]
    fn test_first_write_is_single_head() {
        let clock = clock();
        let node = clock.add_dag_node(clock.crdt().set("test").unwrap()).unwrap();

        let snapshot = clock.snapshot().unwrap();
        assert_eq!(snapshot.heads, vec![node.cid()]);
        assert_eq!(snapshot.max_height, 1);
        assert!(clock.blocks().has(&node.cid()).unwrap());
    }

    #[test]
    fn test_priority_is_stamped_from_heads() {
        let clock = clock();
        for i in 1..=3u64 {
            let node = clock.add_dag_node(clock.crdt().set(format!("v{}", i)).unwrap()).unwrap();
            assert_eq!(node.delta().unwrap().priority(), i);
        }
    }

    #[test]
    fn test_process_node_returns_unknown_links() {
        let source = clock();
        let first = source.add_dag_node(source.crdt().set("a").unwrap()).unwrap();
        let second = source.add_dag_node(source.crdt().set("b").unwrap()).unwrap();

        let target = clock();
        let delta = LwwRegDelta::try_from(second.delta().unwrap()).unwrap();
        let unknown = target.process_node(&second, second.cid(), 2, delta).unwrap();

        assert_eq!(unknown, vec![first.cid()]);
        assert_eq!(target.crdt().value().unwrap(), Some(b"b".to_vec()));
        assert!(target.head_set().is_empty().unwrap());
    }

    #[test]
    fn test_cancelled_sync_changes_nothing() {
        let source = clock();
        let node = source.add_dag_node(source.crdt().set("a").unwrap()).unwrap();
        let getter = crate::getter::BlockstoreNodeGetter::new(source.blocks().clone());

        let target = clock();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = target.sync(node.cid(), &getter, &cancel).unwrap_err();

        assert!(matches!(err, MerkleError::Cancelled { .. }));
        assert!(err.is_retryable());
        assert!(!target.blocks().has(&node.cid()).unwrap());
        assert_eq!(target.crdt().value().unwrap(), None);
    }
}
