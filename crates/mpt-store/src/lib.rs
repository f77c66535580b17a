//! Persistent Merkle Patricia Trie over a content-addressed node store.
//!
//! The trie maps arbitrary-length byte keys to arbitrary-length byte
//! values. Its defining contract: any set of key/value pairs reduces to a
//! single 32-byte Keccak-256 root digest, the same digest for the same set
//! regardless of insertion order, and a different digest for any other
//! set. Nodes are RLP-encoded and content-addressed by the hash of their
//! encoding; children whose encoding is shorter than 32 bytes are inlined
//! into their parent instead.
//!
//! Mutations go through an in-memory write-through cache. Nothing touches
//! the backing [`NodeStore`] until [`Trie::sync`]; [`Trie::undo`] rolls
//! uncommitted work back to the last synced root, and
//! [`Trie::clean_cache`] sweeps cache entries orphaned by superseded
//! roots.
//!
//! ```
//! use mpt_store::{MemoryStore, Trie};
//!
//! let mut trie = Trie::new(MemoryStore::new());
//! trie.update(b"dog", b"puppy")?;
//! assert_eq!(trie.get(b"dog")?, Some(b"puppy".to_vec()));
//!
//! assert_ne!(trie.root_hash(), mpt_store::EMPTY_ROOT);
//! trie.sync()?;
//! # Ok::<(), mpt_store::Error>(())
//! ```
//!
//! The trie is single-writer and deliberately not `Sync`; callers that
//! need shared access wrap it themselves.

pub mod error;
pub mod hp;
pub mod node;
pub mod store;
pub mod trie;

mod cache;
mod iter;

pub use error::Error;
pub use iter::TrieIterator;
pub use node::{Node, NodeRef};
pub use store::{MemoryStore, NodeStore};
pub use trie::{Trie, EMPTY_ROOT};
