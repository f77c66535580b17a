//! Backing store for persisted trie nodes.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use revm_primitives::B256;

use crate::error::Error;

/// Byte-addressable persistent store mapping node digests to their RLP
/// encodings.
///
/// Every persisted entry satisfies `key == keccak256(value)`; the empty
/// trie is represented by its well-known constant hash and never written.
/// Durability semantics are the implementation's concern.
pub trait NodeStore: Send + Sync {
    /// Returns the encoded node stored under `key`, if any.
    fn get(&self, key: &B256) -> Result<Option<Vec<u8>>, Error>;
    /// Stores an encoded node under `key`.
    fn put(&self, key: B256, value: Vec<u8>) -> Result<(), Error>;
    /// Removes the entry stored under `key`.
    fn delete(&self, key: &B256) -> Result<(), Error>;
}

/// In-memory reference store, for tests and ephemeral tries.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<B256, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty store behind a shareable handle.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of persisted entries.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<B256, Vec<u8>>>, Error> {
        self.entries.lock().map_err(|_| Error::Store("store mutex poisoned".into()))
    }
}

impl NodeStore for MemoryStore {
    fn get(&self, key: &B256) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, key: B256, value: Vec<u8>) -> Result<(), Error> {
        self.lock()?.insert(key, value);
        Ok(())
    }

    fn delete(&self, key: &B256) -> Result<(), Error> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revm_primitives::keccak256;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let value = b"node bytes".to_vec();
        let key = keccak256(&value);

        assert_eq!(store.get(&key).unwrap(), None);
        store.put(key, value.clone()).unwrap();
        assert_eq!(store.get(&key).unwrap(), Some(value));
        assert_eq!(store.len(), 1);

        store.delete(&key).unwrap();
        assert!(store.is_empty());
    }
}
