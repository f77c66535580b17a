//! Error types for trie operations.

use revm_primitives::B256;
use thiserror::Error as ThisError;

/// Custom error types for the persistent Merkle Patricia Trie.
///
/// Looking up a key that was never inserted is not an error; reads return
/// `Ok(None)` for such misses. The variants here all signal corruption or
/// infrastructure failure.
#[derive(Debug, ThisError)]
pub enum Error {
    /// A node digest resolved to nothing in either the cache or the
    /// backing store. The trie structure references data that no longer
    /// exists.
    #[error("dangling node reference: {0}")]
    DanglingReference(B256),
    /// Represents errors related to the RLP encoding and decoding of a
    /// cached or persisted node.
    #[error("rlp decode error: {0}")]
    Decode(#[from] alloy_rlp::Error),
    /// The backing store reported a failure.
    #[error("backing store error: {0}")]
    Store(String),
}
