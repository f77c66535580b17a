//! Trie node algebra and its RLP wire form.
//!
//! A node is one of three shapes: a leaf carrying a terminated path and a
//! value, an extension carrying a shared path prefix and a single child, or
//! a 16-way branch with an optional value for the key terminating at it.
//! Children are embedded as [`NodeRef`]s: inline when the child's encoding
//! is shorter than 32 bytes, by Keccak-256 digest otherwise.

use alloy_rlp::{Buf, Encodable, Header, EMPTY_STRING_CODE};
use revm_primitives::B256;
use smallvec::SmallVec;

use crate::{
    error::Error,
    hp::{decode_path, to_encoded_path, Nibbles},
};

/// Represents the ways in which one node can reference another node inside
/// the trie.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum NodeRef {
    /// Absence of a child. Encoded as the empty string.
    #[default]
    Empty,
    /// Direct reference to another node using its byte encoding, spliced
    /// into the parent verbatim. Only used for encodings that are less
    /// than 32 bytes in length.
    Bytes(Vec<u8>),
    /// Indirect reference to another node using the Keccak-256 hash of its
    /// encoding. Used for encodings that are not less than 32 bytes in
    /// length; resolved through the node cache.
    Digest(B256),
}

impl NodeRef {
    /// Whether this is the empty sentinel.
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, NodeRef::Empty)
    }

    /// Parses a child slot from its raw RLP item (header included).
    pub(crate) fn from_rlp_item(item: &[u8]) -> Result<Self, Error> {
        if item == [EMPTY_STRING_CODE] {
            Ok(NodeRef::Empty)
        } else if item.len() == 33 && item[0] == EMPTY_STRING_CODE + 32 {
            Ok(NodeRef::Digest(B256::from_slice(&item[1..])))
        } else if item.len() < 32 {
            Ok(NodeRef::Bytes(item.to_vec()))
        } else {
            Err(Error::Decode(alloy_rlp::Error::Custom("malformed child reference")))
        }
    }

    /// Length of this reference inside a parent node's RLP payload.
    #[inline]
    pub(crate) fn encoded_len(&self) -> usize {
        match self {
            NodeRef::Empty => 1,
            NodeRef::Bytes(bytes) => bytes.len(),
            NodeRef::Digest(_) => 1 + 32,
        }
    }

    /// Writes this reference into a parent node's RLP payload.
    #[inline]
    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            NodeRef::Empty => out.push(EMPTY_STRING_CODE),
            // an inline child is already RLP, copy it directly
            NodeRef::Bytes(bytes) => out.extend_from_slice(bytes),
            // a digest encodes as a 32-byte string with its fixed known length
            NodeRef::Digest(digest) => {
                out.push(EMPTY_STRING_CODE + 32);
                out.extend_from_slice(digest.as_slice());
            }
        }
    }
}

/// A decoded trie node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// Terminated path plus the value stored under it.
    Leaf { path: Nibbles, value: Vec<u8> },
    /// Shared path prefix continuing into a single child.
    Extension { path: Nibbles, child: NodeRef },
    /// Sixteen children keyed by the next nibble, plus the value of the key
    /// that terminates at this node.
    Branch { children: [NodeRef; 16], value: Option<Vec<u8>> },
}

impl Node {
    /// Canonical RLP encoding: leaf and extension as 2-item lists, branch
    /// as a 17-item list with the value slot last.
    pub(crate) fn rlp_encoded(&self) -> Vec<u8> {
        match self {
            Node::Leaf { path, value } => {
                let path = to_encoded_path(path, true);
                let payload_length = path.as_slice().length() + value.as_slice().length();
                let mut out = Self::list_header(payload_length);
                path.as_slice().encode(&mut out);
                value.as_slice().encode(&mut out);
                out
            }
            Node::Extension { path, child } => {
                let path = to_encoded_path(path, false);
                let payload_length = path.as_slice().length() + child.encoded_len();
                let mut out = Self::list_header(payload_length);
                path.as_slice().encode(&mut out);
                child.encode_into(&mut out);
                out
            }
            Node::Branch { children, value } => {
                let payload_length = children.iter().map(NodeRef::encoded_len).sum::<usize>()
                    + value.as_ref().map_or(1, |value| value.as_slice().length());
                let mut out = Self::list_header(payload_length);
                for child in children {
                    child.encode_into(&mut out);
                }
                match value {
                    Some(value) => value.as_slice().encode(&mut out),
                    None => out.push(EMPTY_STRING_CODE),
                }
                out
            }
        }
    }

    fn list_header(payload_length: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload_length + alloy_rlp::length_of_length(payload_length));
        Header { list: true, payload_length }.encode(&mut out);
        out
    }

    /// Decodes a node from its canonical RLP encoding.
    pub(crate) fn decode(mut buf: &[u8]) -> Result<Self, Error> {
        let header = Header::decode(&mut buf)?;
        if !header.list {
            return Err(Error::Decode(alloy_rlp::Error::Custom("expected list node")));
        }
        if buf.len() != header.payload_length {
            return Err(Error::Decode(alloy_rlp::Error::Custom("trailing bytes after node")));
        }

        let mut items: SmallVec<[&[u8]; 17]> = SmallVec::new();
        while !buf.is_empty() {
            if items.len() == 17 {
                return Err(Error::Decode(alloy_rlp::Error::Custom("node with too many items")));
            }
            items.push(take_item(&mut buf)?);
        }

        match items.len() {
            2 => {
                let (path, is_leaf) = decode_path(string_payload(items[0])?)?;
                if is_leaf {
                    Ok(Node::Leaf { path, value: string_payload(items[1])?.to_vec() })
                } else {
                    Ok(Node::Extension { path, child: NodeRef::from_rlp_item(items[1])? })
                }
            }
            17 => {
                let mut children: [NodeRef; 16] = Default::default();
                for (slot, item) in items[..16].iter().enumerate() {
                    children[slot] = NodeRef::from_rlp_item(item)?;
                }
                let value = string_payload(items[16])?;
                let value = (!value.is_empty()).then(|| value.to_vec());
                Ok(Node::Branch { children, value })
            }
            _ => Err(Error::Decode(alloy_rlp::Error::Custom("invalid node item count"))),
        }
    }
}

/// Splits the next RLP item (header included) off the front of `buf`.
fn take_item<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], Error> {
    let start = *buf;
    let header = Header::decode(buf)?;
    if buf.len() < header.payload_length {
        return Err(Error::Decode(alloy_rlp::Error::InputTooShort));
    }
    buf.advance(header.payload_length);
    Ok(&start[..start.len() - buf.len()])
}

/// Payload of a string item; lists are rejected.
fn string_payload(mut item: &[u8]) -> Result<&[u8], Error> {
    let header = Header::decode(&mut item)?;
    if header.list {
        return Err(Error::Decode(alloy_rlp::Error::Custom("expected string item")));
    }
    Ok(&item[..header.payload_length])
}
