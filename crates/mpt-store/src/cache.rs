//! Write-through node cache with transactional commit/undo.

use std::{cell::RefCell, collections::HashMap, fmt, sync::Arc};

use revm_primitives::{keccak256, B256};
use tracing::debug;

use crate::{
    error::Error,
    node::{Node, NodeRef},
    store::NodeStore,
};

/// A cached node: its canonical encoding and whether it still needs to be
/// persisted.
#[derive(Clone, Debug)]
pub(crate) struct CacheEntry {
    pub(crate) rlp: Vec<u8>,
    pub(crate) dirty: bool,
}

/// In-memory map from digest to encoded node, write-through to a shared
/// backing store.
///
/// Reads load through on a miss and are cached clean; writes stay dirty
/// until [`commit`](NodeCache::commit) persists them or
/// [`undo`](NodeCache::undo) discards them. Interior mutability keeps the
/// read path `&self`; the cache is single-threaded by design.
pub(crate) struct NodeCache {
    store: Arc<dyn NodeStore>,
    nodes: RefCell<HashMap<B256, CacheEntry>>,
}

impl NodeCache {
    pub(crate) fn new(store: Arc<dyn NodeStore>) -> Self {
        Self { store, nodes: RefCell::new(HashMap::new()) }
    }

    /// Encodes a node and returns the reference its parent should embed:
    /// encodings shorter than 32 bytes stay inline, anything else is
    /// cached dirty under its digest. Idempotent on identical encodings.
    pub(crate) fn put(&self, node: &Node) -> NodeRef {
        let rlp = node.rlp_encoded();
        if rlp.len() < 32 {
            return NodeRef::Bytes(rlp);
        }
        let digest = keccak256(&rlp);
        self.nodes
            .borrow_mut()
            .entry(digest)
            .or_insert(CacheEntry { rlp, dirty: true });
        NodeRef::Digest(digest)
    }

    /// Decodes the node stored under `digest`, loading it from the backing
    /// store on a cache miss. An unresolvable digest is corruption.
    pub(crate) fn get(&self, digest: &B256) -> Result<Node, Error> {
        if let Some(entry) = self.nodes.borrow().get(digest) {
            return Node::decode(&entry.rlp);
        }
        let rlp = self
            .store
            .get(digest)?
            .ok_or(Error::DanglingReference(*digest))?;
        let node = Node::decode(&rlp)?;
        self.nodes.borrow_mut().insert(*digest, CacheEntry { rlp, dirty: false });
        Ok(node)
    }

    /// Whether `digest` resolves in the cache or the backing store.
    pub(crate) fn contains(&self, digest: &B256) -> bool {
        self.nodes.borrow().contains_key(digest)
            || matches!(self.store.get(digest), Ok(Some(_)))
    }

    /// Drops the entry stored under `digest`, if present.
    pub(crate) fn remove(&self, digest: &B256) {
        self.nodes.borrow_mut().remove(digest);
    }

    /// Persists every dirty entry to the backing store and clears its
    /// flag. Returns the number of nodes written.
    pub(crate) fn commit(&self) -> Result<usize, Error> {
        let mut nodes = self.nodes.borrow_mut();
        let mut written = 0;
        for (digest, entry) in nodes.iter_mut() {
            if entry.dirty {
                self.store.put(*digest, entry.rlp.clone())?;
                entry.dirty = false;
                written += 1;
            }
        }
        if written > 0 {
            debug!(written, "committed dirty trie nodes");
        }
        Ok(written)
    }

    /// Discards every dirty entry. Returns the number dropped.
    pub(crate) fn undo(&self) -> usize {
        let mut nodes = self.nodes.borrow_mut();
        let before = nodes.len();
        nodes.retain(|_, entry| !entry.dirty);
        let dropped = before - nodes.len();
        if dropped > 0 {
            debug!(dropped, "discarded uncommitted trie nodes");
        }
        dropped
    }

    /// Snapshot of the cached digests.
    pub(crate) fn cached_digests(&self) -> Vec<B256> {
        self.nodes.borrow().keys().copied().collect()
    }

    /// Copy of the entry stored under `digest`, if cached.
    #[cfg(test)]
    pub(crate) fn entry(&self, digest: &B256) -> Option<CacheEntry> {
        self.nodes.borrow().get(digest).cloned()
    }

    /// Number of cached entries.
    pub(crate) fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub(crate) fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }
}

impl Clone for NodeCache {
    /// Deep copy of the cached entries; the backing store stays shared.
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            nodes: RefCell::new(self.nodes.borrow().clone()),
        }
    }
}

impl fmt::Debug for NodeCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeCache")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
