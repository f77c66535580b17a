//! Hex-prefix (HP) helpers and nibble utilities for trie paths.
use smallvec::SmallVec;

use crate::error::Error;

/// Compact vector for nibble sequences used in key traversal.
pub(crate) type Nibbles = SmallVec<[u8; 64]>;

// Hex-prefix (HP) encoding flags for trie paths
pub(crate) const HP_FLAG_ODD: u8 = 0x10; // path has odd number of nibbles; low nibble of first byte is data
pub(crate) const HP_FLAG_LEAF: u8 = 0x20; // node is a leaf (vs extension)

/// Length of the common prefix (in nibbles) of two nibble slices.
#[inline]
pub(crate) fn lcp(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(a, b)| a == b).count()
}

/// Splits a byte key into its nibble sequence, high nibble first. A key of
/// k bytes always yields exactly 2k nibbles.
#[inline]
pub(crate) fn to_nibs(key: &[u8]) -> Nibbles {
    key.iter().flat_map(|byte| [byte >> 4, byte & 0x0f]).collect()
}

/// Reassembles an even-length nibble sequence into its byte form.
/// Inverse of [`to_nibs`]; byte keys always produce an even nibble count.
#[inline]
pub(crate) fn nibs_to_bytes(nibs: &[u8]) -> Vec<u8> {
    debug_assert!(nibs.len() % 2 == 0);
    nibs.chunks_exact(2).map(|pair| (pair[0] << 4) | pair[1]).collect()
}

/// Encodes nibbles into the standard hex-prefix format, with the leaf flag
/// marking a terminated path.
#[inline]
pub(crate) fn to_encoded_path(nibs: &[u8], is_leaf: bool) -> SmallVec<[u8; 64]> {
    let is_odd = nibs.len() % 2 != 0;
    // Max path is 64 nibs (32 bytes) + 1 prefix byte = 33 bytes; 64 is the
    // nearest inline capacity smallvec provides, so this stays on the stack.
    let mut encoded = SmallVec::<[u8; 64]>::new();

    let mut prefix = if is_leaf { HP_FLAG_LEAF } else { 0x00 };
    if is_odd {
        prefix |= HP_FLAG_ODD;
        encoded.push(prefix | nibs[0]);
        for i in (1..nibs.len()).step_by(2) {
            encoded.push((nibs[i] << 4) | nibs[i + 1]);
        }
    } else {
        encoded.push(prefix);
        for i in (0..nibs.len()).step_by(2) {
            encoded.push((nibs[i] << 4) | nibs[i + 1]);
        }
    }
    encoded
}

/// Decodes a compact hex-prefix-encoded path into its nibble sequence and
/// the leaf flag. Exact inverse of [`to_encoded_path`].
///
/// Every well-formed path carries at least its flag byte, so a zero-length
/// item can only come from a corrupted node.
#[inline]
pub(crate) fn decode_path(encoded: &[u8]) -> Result<(Nibbles, bool), Error> {
    let Some((&first, rest)) = encoded.split_first() else {
        return Err(Error::Decode(alloy_rlp::Error::Custom("empty hex-prefix path")));
    };
    let is_odd = (first & HP_FLAG_ODD) != 0;
    let is_leaf = (first & HP_FLAG_LEAF) != 0;

    // the flag byte holds one data nibble when the count is odd; every
    // remaining byte holds two
    let mut nibs = Nibbles::with_capacity(2 * rest.len() + usize::from(is_odd));
    if is_odd {
        nibs.push(first & 0x0f);
    }
    for &byte in rest {
        nibs.push(byte >> 4);
        nibs.push(byte & 0x0f);
    }

    Ok((nibs, is_leaf))
}
