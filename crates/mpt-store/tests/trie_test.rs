use mpt_store::{Error, MemoryStore, NodeStore, Trie, EMPTY_ROOT};
use revm_primitives::keccak256;

/// Pseudo-random key generator (deterministic, no external deps).
fn pseudo_random_key(seed: u64) -> [u8; 32] {
    let mut state = seed;
    let mut key = [0u8; 32];
    for byte in key.iter_mut() {
        // Simple LCG: state = state * 6364136223846793005 + 1
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        *byte = (state >> 33) as u8;
    }
    key
}

fn value_for(seed: u64) -> Vec<u8> {
    let key = pseudo_random_key(seed.wrapping_add(0xbeef));
    key[..((seed % 24) + 8) as usize].to_vec()
}

#[test]
fn sync_then_undo_is_a_noop() {
    let mut trie = Trie::new(MemoryStore::new());
    trie.update(b"k", b"v").unwrap();
    trie.sync().unwrap();
    let synced_root = trie.root_hash();

    assert_eq!(trie.undo(), 0);
    assert_eq!(trie.root_hash(), synced_root);
    assert_eq!(trie.get(b"k").unwrap().unwrap(), b"v");
}

#[test]
fn undo_rolls_back_to_last_synced_root() {
    let mut trie = Trie::new(MemoryStore::new());
    trie.update(b"k", b"v").unwrap();
    trie.sync().unwrap();
    let synced_root = trie.root_hash();

    trie.update(b"k", b"w").unwrap();
    assert_eq!(trie.get(b"k").unwrap().unwrap(), b"w");
    assert_ne!(trie.root_hash(), synced_root);

    trie.undo();
    assert_eq!(trie.root_hash(), synced_root);
    assert_eq!(trie.get(b"k").unwrap().unwrap(), b"v");
}

#[test]
fn undo_without_any_sync_restores_the_empty_trie() {
    let mut trie = Trie::new(MemoryStore::new());
    for i in 0u64..32 {
        trie.update(&pseudo_random_key(i), &value_for(i)).unwrap();
    }
    trie.undo();
    assert_eq!(trie.root_hash(), EMPTY_ROOT);
    assert_eq!(trie.cache_len(), 0);
}

#[test]
fn nothing_reaches_the_store_before_sync() {
    let store = MemoryStore::new();
    let mut trie = Trie::new(store.clone());
    for i in 0u64..64 {
        trie.update(&pseudo_random_key(i), &value_for(i)).unwrap();
    }
    assert!(store.is_empty());

    let written = trie.sync().unwrap();
    assert!(written > 0);
    assert_eq!(store.len(), written);
}

#[test]
fn reopen_from_synced_root() {
    let store = MemoryStore::new();
    let mut trie = Trie::new(store.clone());
    for i in 0u64..128 {
        trie.update(&pseudo_random_key(i), &value_for(i)).unwrap();
    }
    trie.sync().unwrap();
    let root = trie.root_hash();

    let reopened = Trie::with_root(store.clone(), root);
    assert!(reopened.validate());
    assert_eq!(reopened.root_hash(), root);
    for i in 0u64..128 {
        assert_eq!(reopened.get(&pseudo_random_key(i)).unwrap().unwrap(), value_for(i));
    }
    assert_eq!(reopened.get(&pseudo_random_key(9999)).unwrap(), None);
}

#[test]
fn persisted_entries_are_content_addressed() {
    let store = MemoryStore::new();
    let mut trie = Trie::new(store.clone());
    for i in 0u64..64 {
        trie.update(&pseudo_random_key(i), &value_for(i)).unwrap();
    }
    trie.sync().unwrap();

    let root = trie.root_hash();
    let root_rlp = store.get(&root).unwrap().expect("root node must be persisted");
    assert_eq!(keccak256(&root_rlp), root);
}

#[test]
fn clean_cache_keeps_every_live_key() {
    let mut trie = Trie::new(MemoryStore::new());
    for i in 0u64..1000 {
        trie.update(&pseudo_random_key(i), &value_for(i)).unwrap();
    }
    let root = trie.root_hash();

    let removed = trie.clean_cache().unwrap();
    assert!(removed > 0);
    assert_eq!(trie.root_hash(), root);

    for i in 0u64..1000 {
        assert_eq!(trie.get(&pseudo_random_key(i)).unwrap().unwrap(), value_for(i));
    }
}

#[test]
fn clean_cache_after_sync_reloads_from_the_store() {
    let store = MemoryStore::new();
    let mut trie = Trie::new(store.clone());
    for i in 0u64..256 {
        trie.update(&pseudo_random_key(i), &value_for(i)).unwrap();
    }
    trie.sync().unwrap();
    trie.clean_cache().unwrap();

    for i in 0u64..256 {
        assert_eq!(trie.get(&pseudo_random_key(i)).unwrap().unwrap(), value_for(i));
    }
}

#[test]
fn copies_share_the_store_but_not_the_cache() {
    let store = MemoryStore::new();
    let mut trie = Trie::new(store.clone());
    trie.update(b"shared", b"before copy").unwrap();

    let mut copy = trie.clone();
    assert_eq!(trie, copy);

    copy.update(b"only-in-copy", b"yes").unwrap();
    assert_ne!(trie, copy);
    assert_eq!(trie.get(b"only-in-copy").unwrap(), None);
    assert_eq!(copy.get(b"shared").unwrap().unwrap(), b"before copy");

    trie.update(b"only-in-original", b"yes").unwrap();
    assert_eq!(copy.get(b"only-in-original").unwrap(), None);
}

#[test]
fn equal_key_sets_compare_equal() {
    let pairs: [(&[u8], &[u8]); 4] =
        [(b"do", b"verb"), (b"dog", b"puppy"), (b"doge", b"coin"), (b"horse", b"stallion")];

    let mut forward = Trie::new(MemoryStore::new());
    for (key, value) in pairs {
        forward.update(key, value).unwrap();
    }
    let mut backward = Trie::new(MemoryStore::new());
    for (key, value) in pairs.iter().rev() {
        backward.update(key, value).unwrap();
    }
    assert_eq!(forward, backward);

    backward.delete(b"horse").unwrap();
    assert_ne!(forward, backward);
}

#[test]
fn set_root_switches_between_synced_snapshots() {
    let store = MemoryStore::new();
    let mut trie = Trie::new(store.clone());

    trie.update(b"always", b"here").unwrap();
    trie.sync().unwrap();
    let first_root = trie.root_hash();

    trie.update(b"later", b"addition").unwrap();
    trie.sync().unwrap();
    let second_root = trie.root_hash();

    trie.set_root(first_root);
    assert_eq!(trie.get(b"always").unwrap().unwrap(), b"here");
    assert_eq!(trie.get(b"later").unwrap(), None);

    trie.set_root(second_root);
    assert_eq!(trie.get(b"later").unwrap().unwrap(), b"addition");
}

#[test]
fn dangling_root_is_invalid_and_errors_on_read() {
    let trie = Trie::with_root(MemoryStore::new(), keccak256(b"nobody stored this"));
    assert!(!trie.validate());
    assert!(matches!(trie.get(b"key"), Err(Error::DanglingReference(_))));
}

#[test]
fn iterator_round_trips_the_key_set() {
    let mut trie = Trie::new(MemoryStore::new());
    let mut expected = Vec::new();
    for i in 0u64..200 {
        let key = pseudo_random_key(i);
        let value = value_for(i);
        trie.update(&key, &value).unwrap();
        expected.push((key.to_vec(), value));
    }
    expected.sort();

    let mut collected: Vec<(Vec<u8>, Vec<u8>)> =
        trie.iter().collect::<Result<_, _>>().unwrap();
    collected.sort();
    assert_eq!(collected, expected);
}
