//! Cache-backed Merkle Patricia Trie over a persistent node store.
//!
//! The trie maps arbitrary-length byte keys to arbitrary-length byte
//! values and reduces any key/value set to a single 32-byte Keccak-256
//! root digest, independent of insertion order. Mutations rebuild the
//! touched path bottom-up through the node cache; nothing reaches the
//! backing store until [`Trie::sync`], and [`Trie::undo`] rolls back to
//! the last synced root.

use std::{collections::HashSet, sync::Arc};

use revm_primitives::{b256, hex, keccak256, B256};
use tracing::{info, trace};

use crate::{
    cache::NodeCache,
    error::Error,
    hp::{lcp, to_nibs, Nibbles},
    iter::TrieIterator,
    node::{Node, NodeRef},
    store::NodeStore,
};

/// Root hash of an empty trie.
///
/// This is the Keccak-256 of the RLP-encoding of the empty string (""),
/// which is the canonical encoding of an empty node.
pub const EMPTY_ROOT: B256 =
    b256!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421");

/// A persistent, authenticated byte-key/byte-value mapping.
///
/// Single-writer: neither the trie nor its cache is safe for concurrent
/// mutation. Callers needing shared access must serialize externally.
#[derive(Clone, Debug)]
pub struct Trie {
    root: NodeRef,
    prev_root: NodeRef,
    cache: NodeCache,
}

impl Trie {
    /// Creates an empty trie over `store`.
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self { root: NodeRef::Empty, prev_root: NodeRef::Empty, cache: NodeCache::new(store) }
    }

    /// Opens a trie rooted at an existing `root` hash. The empty-trie hash
    /// opens an empty trie.
    pub fn with_root(store: Arc<dyn NodeStore>, root: B256) -> Self {
        let root = ref_for(root);
        Self { root: root.clone(), prev_root: root, cache: NodeCache::new(store) }
    }

    /// Reference to the current root node.
    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    /// Root recorded by the last [`sync`](Self::sync); the target of
    /// [`undo`](Self::undo).
    pub fn prev_root(&self) -> &NodeRef {
        &self.prev_root
    }

    /// 32-byte root digest; [`EMPTY_ROOT`] for an empty trie.
    pub fn root_hash(&self) -> B256 {
        match &self.root {
            NodeRef::Empty => EMPTY_ROOT,
            NodeRef::Bytes(rlp) => keccak256(rlp),
            NodeRef::Digest(digest) => *digest,
        }
    }

    /// Switches the working root. The empty-trie hash selects the empty
    /// trie.
    pub fn set_root(&mut self, root: B256) {
        self.root = ref_for(root);
    }

    /// Looks up `key`, returning its value or `None` when unset.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let nibs = to_nibs(key);
        self.get_at(&self.root, &nibs)
    }

    /// Inserts or replaces `key`. An empty `value` deletes the key.
    pub fn update(&mut self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        if value.is_empty() {
            return self.delete(key);
        }
        let nibs = to_nibs(key);
        let new_root = self.insert_at(&self.root, &nibs, value)?;
        self.root = new_root;
        trace!(key = %hex::encode(key), root = %self.root_hash(), "trie key updated");
        Ok(())
    }

    /// Removes `key` from the trie; an absent key leaves the root
    /// untouched.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), Error> {
        let nibs = to_nibs(key);
        let new_root = self.delete_at(&self.root, &nibs)?;
        self.root = new_root;
        trace!(key = %hex::encode(key), root = %self.root_hash(), "trie key deleted");
        Ok(())
    }

    /// Persists dirty cache entries to the backing store and advances the
    /// rollback point. Returns the number of nodes written.
    pub fn sync(&mut self) -> Result<usize, Error> {
        let written = self.cache.commit()?;
        self.prev_root = self.root.clone();
        Ok(written)
    }

    /// Discards uncommitted cache entries and restores the root recorded
    /// by the last [`sync`](Self::sync). Returns the number of entries
    /// dropped.
    pub fn undo(&mut self) -> usize {
        let dropped = self.cache.undo();
        self.root = self.prev_root.clone();
        dropped
    }

    /// Whether the current root resolves to a stored node, through the
    /// cache or the backing store. Empty and inline roots are trivially
    /// valid.
    pub fn validate(&self) -> bool {
        match &self.root {
            NodeRef::Empty | NodeRef::Bytes(_) => true,
            NodeRef::Digest(digest) => self.cache.contains(digest),
        }
    }

    /// Number of entries currently held in the node cache.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Handle to the backing store this trie reads through.
    pub fn store(&self) -> Arc<dyn NodeStore> {
        self.cache.store().clone()
    }

    /// In-order iterator over `(key, value)` pairs.
    pub fn iter(&self) -> TrieIterator<'_> {
        TrieIterator::new(self)
    }

    /// Garbage-collects cache entries no longer reachable from the
    /// current root. Returns the number of entries removed.
    ///
    /// Mutation leaves the nodes of superseded roots in the cache; this
    /// scans the live tree and sweeps the rest. Not safe against
    /// concurrent mutation; the store is never touched.
    pub fn clean_cache(&mut self) -> Result<usize, Error> {
        let mut reachable = HashSet::new();
        if let NodeRef::Digest(digest) = &self.root {
            self.scan_tree(digest, &mut |digest, _| {
                reachable.insert(digest);
            })?;
        }
        let stale: Vec<B256> = self
            .cache
            .cached_digests()
            .into_iter()
            .filter(|digest| !reachable.contains(digest))
            .collect();
        for digest in &stale {
            self.cache.remove(digest);
        }
        info!(removed = stale.len(), live = self.cache.len(), "garbage collected trie cache");
        Ok(stale.len())
    }

    /// Renders the root and every reachable cached node, one line each.
    pub fn trie_dump(&self) -> Result<String, Error> {
        let mut out = format!("root: {}\n", self.root_hash());
        if let NodeRef::Digest(digest) = &self.root {
            self.scan_tree(digest, &mut |digest, node| {
                out.push_str(&format!("{digest} => {node:?}\n"));
            })?;
        }
        Ok(out)
    }

    /// Walks every node reachable from `digest` through the cache,
    /// invoking `visit` with each digest and its decoded node. Inline
    /// children live inside their parent's encoding and are not visited
    /// separately.
    fn scan_tree(&self, digest: &B256, visit: &mut impl FnMut(B256, &Node)) -> Result<(), Error> {
        let node = self.cache.get(digest)?;
        match &node {
            Node::Leaf { .. } => {}
            Node::Extension { child, .. } => {
                if let NodeRef::Digest(child_digest) = child {
                    self.scan_tree(child_digest, visit)?;
                }
            }
            Node::Branch { children, .. } => {
                for child in children {
                    if let NodeRef::Digest(child_digest) = child {
                        self.scan_tree(child_digest, visit)?;
                    }
                }
            }
        }
        visit(*digest, &node);
        Ok(())
    }

    /// Loads the node behind a reference; `Empty` resolves to `None`.
    pub(crate) fn resolve(&self, node: &NodeRef) -> Result<Option<Node>, Error> {
        match node {
            NodeRef::Empty => Ok(None),
            NodeRef::Bytes(rlp) => Node::decode(rlp).map(Some),
            NodeRef::Digest(digest) => self.cache.get(digest).map(Some),
        }
    }

    fn get_at(&self, node: &NodeRef, key_nibs: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let Some(node) = self.resolve(node)? else {
            return Ok(None);
        };
        match node {
            Node::Leaf { path, value } => Ok((path.as_slice() == key_nibs).then_some(value)),
            Node::Extension { path, child } => match key_nibs.strip_prefix(path.as_slice()) {
                Some(tail) => self.get_at(&child, tail),
                None => Ok(None),
            },
            Node::Branch { children, value } => match key_nibs.split_first() {
                Some((i, tail)) => self.get_at(&children[*i as usize], tail),
                None => Ok(value),
            },
        }
    }

    /// Descend-and-rebuild insertion: returns the reference to the new
    /// subtree, caching every rebuilt node along the way.
    fn insert_at(&self, node: &NodeRef, key_nibs: &[u8], value: &[u8]) -> Result<NodeRef, Error> {
        let Some(node) = self.resolve(node)? else {
            return Ok(self.cache.put(&Node::Leaf {
                path: Nibbles::from_slice(key_nibs),
                value: value.to_vec(),
            }));
        };
        match node {
            Node::Leaf { path, value: old_value } => {
                if path.as_slice() == key_nibs {
                    return Ok(self.cache.put(&Node::Leaf { path, value: value.to_vec() }));
                }

                // Split into a branch holding both remainders. A remainder
                // that is fully consumed lands in the branch's value slot.
                let common = lcp(&path, key_nibs);
                let mut children: [NodeRef; 16] = Default::default();
                let mut branch_value = None;

                if common == path.len() {
                    branch_value = Some(old_value);
                } else {
                    children[path[common] as usize] = self.cache.put(&Node::Leaf {
                        path: Nibbles::from_slice(&path[common + 1..]),
                        value: old_value,
                    });
                }
                if common == key_nibs.len() {
                    branch_value = Some(value.to_vec());
                } else {
                    children[key_nibs[common] as usize] = self.cache.put(&Node::Leaf {
                        path: Nibbles::from_slice(&key_nibs[common + 1..]),
                        value: value.to_vec(),
                    });
                }

                let branch = self.cache.put(&Node::Branch { children, value: branch_value });
                Ok(self.wrap_prefix(&key_nibs[..common], branch))
            }
            Node::Extension { path, child } => {
                let common = lcp(&path, key_nibs);
                if common == path.len() {
                    let new_child = self.insert_at(&child, &key_nibs[common..], value)?;
                    return Ok(self.wrap_prefix(&path, new_child));
                }

                let mut children: [NodeRef; 16] = Default::default();
                let mut branch_value = None;

                children[path[common] as usize] = if common + 1 < path.len() {
                    self.cache.put(&Node::Extension {
                        path: Nibbles::from_slice(&path[common + 1..]),
                        child,
                    })
                } else {
                    // the residual path is exhausted, hang the subtree
                    // directly off the branch
                    child
                };
                if common == key_nibs.len() {
                    branch_value = Some(value.to_vec());
                } else {
                    children[key_nibs[common] as usize] = self.cache.put(&Node::Leaf {
                        path: Nibbles::from_slice(&key_nibs[common + 1..]),
                        value: value.to_vec(),
                    });
                }

                let branch = self.cache.put(&Node::Branch { children, value: branch_value });
                Ok(self.wrap_prefix(&key_nibs[..common], branch))
            }
            Node::Branch { mut children, value: branch_value } => match key_nibs.split_first() {
                Some((i, tail)) => {
                    children[*i as usize] = self.insert_at(&children[*i as usize], tail, value)?;
                    Ok(self.cache.put(&Node::Branch { children, value: branch_value }))
                }
                None => {
                    Ok(self.cache.put(&Node::Branch { children, value: Some(value.to_vec()) }))
                }
            },
        }
    }

    /// Descend-and-rebuild deletion, collapsing on the way back up so the
    /// canonical shape is restored.
    fn delete_at(&self, node: &NodeRef, key_nibs: &[u8]) -> Result<NodeRef, Error> {
        let Some(current) = self.resolve(node)? else {
            return Ok(NodeRef::Empty);
        };
        match current {
            Node::Leaf { path, .. } => {
                if path.as_slice() == key_nibs {
                    Ok(NodeRef::Empty)
                } else {
                    Ok(node.clone())
                }
            }
            Node::Extension { path, child } => {
                let Some(tail) = key_nibs.strip_prefix(path.as_slice()) else {
                    return Ok(node.clone());
                };
                let new_child = self.delete_at(&child, tail)?;

                // an extension may only point at a branch; merge anything
                // the collapse produced below it
                match self.resolve(&new_child)? {
                    None => Ok(NodeRef::Empty),
                    Some(Node::Leaf { path: child_path, value }) => Ok(self.cache.put(&Node::Leaf {
                        path: concat_paths(&path, &child_path),
                        value,
                    })),
                    Some(Node::Extension { path: child_path, child: grandchild }) => {
                        Ok(self.cache.put(&Node::Extension {
                            path: concat_paths(&path, &child_path),
                            child: grandchild,
                        }))
                    }
                    Some(Node::Branch { .. }) => {
                        Ok(self.cache.put(&Node::Extension { path, child: new_child }))
                    }
                }
            }
            Node::Branch { mut children, mut value } => {
                match key_nibs.split_first() {
                    Some((i, tail)) => {
                        children[*i as usize] = self.delete_at(&children[*i as usize], tail)?;
                    }
                    None => {
                        if value.is_none() {
                            return Ok(node.clone());
                        }
                        value = None;
                    }
                }
                self.collapse_branch(children, value)
            }
        }
    }

    /// Rebuilds a branch after a removal. A branch with a single occupant
    /// is not canonical and collapses into a leaf or extension.
    fn collapse_branch(
        &self,
        children: [NodeRef; 16],
        value: Option<Vec<u8>>,
    ) -> Result<NodeRef, Error> {
        let mut occupied =
            children.iter().enumerate().filter(|(_, child)| !child.is_empty()).map(|(slot, _)| slot);
        let slot = match (occupied.next(), occupied.next()) {
            (None, _) => {
                return Ok(match value {
                    // only the value slot survived: a leaf whose path is
                    // already exhausted
                    Some(value) => self.cache.put(&Node::Leaf { path: Nibbles::new(), value }),
                    None => NodeRef::Empty,
                });
            }
            (Some(slot), None) if value.is_none() => slot,
            _ => {
                return Ok(self.cache.put(&Node::Branch { children, value }));
            }
        };

        // a single child remains; absorb it
        let child_ref = &children[slot];
        let Some(child) = self.resolve(child_ref)? else {
            unreachable!("occupied slot resolved to empty");
        };
        Ok(match child {
            Node::Leaf { path, value } => self.cache.put(&Node::Leaf {
                path: prepend_nib(slot as u8, &path),
                value,
            }),
            Node::Extension { path, child } => self.cache.put(&Node::Extension {
                path: prepend_nib(slot as u8, &path),
                child,
            }),
            Node::Branch { .. } => self.cache.put(&Node::Extension {
                path: Nibbles::from_slice(&[slot as u8]),
                child: child_ref.clone(),
            }),
        })
    }

    /// Re-wraps a rebuilt subtree under its path prefix; an empty prefix
    /// passes the subtree through unchanged.
    fn wrap_prefix(&self, prefix: &[u8], child: NodeRef) -> NodeRef {
        if prefix.is_empty() {
            return child;
        }
        self.cache.put(&Node::Extension { path: Nibbles::from_slice(prefix), child })
    }
}

impl PartialEq for Trie {
    /// Tries compare equal when their root hashes match, regardless of
    /// cache or store contents.
    fn eq(&self, other: &Self) -> bool {
        self.root_hash() == other.root_hash()
    }
}

fn ref_for(hash: B256) -> NodeRef {
    if hash == EMPTY_ROOT {
        NodeRef::Empty
    } else {
        NodeRef::Digest(hash)
    }
}

fn prepend_nib(nib: u8, path: &[u8]) -> Nibbles {
    let mut nibs = Nibbles::with_capacity(1 + path.len());
    nibs.push(nib);
    nibs.extend_from_slice(path);
    nibs
}

fn concat_paths(a: &[u8], b: &[u8]) -> Nibbles {
    let mut nibs = Nibbles::with_capacity(a.len() + b.len());
    nibs.extend_from_slice(a);
    nibs.extend_from_slice(b);
    nibs
}
