// SPDX-License-Identifier: Apache-2.0

//! Deterministic, byte-for-byte reproducible encoding of a single node.
//!
//! Layout (spec.md §4.2):
//! `node_hash ∥ kv_hash ∥ left_height(u8) ∥ right_height(u8) ∥ varlen(key) ∥
//! varlen(value) ∥ varlen(left_ref) ∥ varlen(right_ref) ∥ varlen(parent_ref)`.
//!
//! Nodes are key-addressed (spec.md's recommended mode, see DESIGN.md): a
//! child/parent reference is the referenced node's key, or the empty byte
//! string as the "none" sentinel — keys are never empty by invariant, so
//! the empty string cannot collide with a real reference.

use amt_hash::{decode_len_prefixed, encode_len_prefixed, hash_parts, Digest, ZERO_DIGEST};
use thiserror::Error;

/// A reference to a node: the referenced node's key. `None` is the "no
/// child" / "no parent" sentinel.
pub type NodeRef = Vec<u8>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("corrupt node: {0}")]
    CorruptNode(String),
    #[error("backing store error: {0}")]
    Backing(#[from] anyhow::Error),
}

impl From<amt_hash::CodecError> for StoreError {
    fn from(e: amt_hash::CodecError) -> Self {
        StoreError::CorruptNode(e.to_string())
    }
}

/// The atomic unit of persistence (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub kv_hash: Digest,
    pub left_height: u8,
    pub right_height: u8,
    pub left_ref: Option<NodeRef>,
    pub right_ref: Option<NodeRef>,
    pub parent_ref: Option<NodeRef>,
    pub node_hash: Digest,
}

impl Node {
    /// Builds a fresh leaf node for `key`/`value`, with correct `kv_hash`
    /// and `node_hash` already computed (both children absent).
    pub fn new_leaf(key: Vec<u8>, value: Vec<u8>) -> Self {
        let kv_hash = kv_hash(&key, &value);
        let node_hash = node_hash(&ZERO_DIGEST, &ZERO_DIGEST, &kv_hash);
        Node {
            key,
            value,
            kv_hash,
            left_height: 0,
            right_height: 0,
            left_ref: None,
            right_ref: None,
            parent_ref: None,
            node_hash,
        }
    }

    pub fn height(&self) -> u8 {
        1 + self.left_height.max(self.right_height)
    }

    /// `right_height - left_height`, per spec.md §4.4.3.
    pub fn balance(&self) -> i16 {
        self.right_height as i16 - self.left_height as i16
    }

    /// Recomputes `kv_hash` from the current `key`/`value` — callers should
    /// do this after changing `value`, then also recompute `node_hash`.
    pub fn recompute_kv_hash(&mut self) {
        self.kv_hash = kv_hash(&self.key, &self.value);
    }

    /// Recomputes `node_hash` given the caller-supplied hashes of the two
    /// children (use [`amt_hash::ZERO_DIGEST`] for an absent child).
    pub fn recompute_node_hash(&mut self, left_hash: &Digest, right_hash: &Digest) {
        self.node_hash = node_hash(left_hash, right_hash, &self.kv_hash);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.node_hash.as_ref());
        buf.extend_from_slice(self.kv_hash.as_ref());
        buf.push(self.left_height);
        buf.push(self.right_height);
        encode_len_prefixed(&mut buf, &self.key);
        encode_len_prefixed(&mut buf, &self.value);
        encode_len_prefixed(&mut buf, self.left_ref.as_deref().unwrap_or(&[]));
        encode_len_prefixed(&mut buf, self.right_ref.as_deref().unwrap_or(&[]));
        encode_len_prefixed(&mut buf, self.parent_ref.as_deref().unwrap_or(&[]));
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let mut pos = 0usize;
        let digest_at = |buf: &[u8], pos: &mut usize| -> Result<Digest, StoreError> {
            let end = pos.checked_add(amt_hash::DIGEST_LEN).ok_or_else(|| {
                StoreError::CorruptNode("truncated digest".to_string())
            })?;
            let slice = buf
                .get(*pos..end)
                .ok_or_else(|| StoreError::CorruptNode("truncated digest".to_string()))?;
            let digest = Digest::from_slice(slice)?;
            *pos = end;
            Ok(digest)
        };

        let node_hash = digest_at(bytes, &mut pos)?;
        let kv_hash = digest_at(bytes, &mut pos)?;
        let left_height = *bytes
            .get(pos)
            .ok_or_else(|| StoreError::CorruptNode("truncated left_height".to_string()))?;
        pos += 1;
        let right_height = *bytes
            .get(pos)
            .ok_or_else(|| StoreError::CorruptNode("truncated right_height".to_string()))?;
        pos += 1;

        let key = decode_len_prefixed(bytes, &mut pos)?;
        let value = decode_len_prefixed(bytes, &mut pos)?;
        let left_ref = none_if_empty(decode_len_prefixed(bytes, &mut pos)?);
        let right_ref = none_if_empty(decode_len_prefixed(bytes, &mut pos)?);
        let parent_ref = none_if_empty(decode_len_prefixed(bytes, &mut pos)?);

        if key.is_empty() {
            return Err(StoreError::CorruptNode("empty key".to_string()));
        }
        if left_height == 0 && left_ref.is_some() {
            return Err(StoreError::CorruptNode(
                "left_height is 0 but left_ref is present".to_string(),
            ));
        }
        if right_height == 0 && right_ref.is_some() {
            return Err(StoreError::CorruptNode(
                "right_height is 0 but right_ref is present".to_string(),
            ));
        }

        Ok(Node {
            key,
            value,
            kv_hash,
            left_height,
            right_height,
            left_ref,
            right_ref,
            parent_ref,
            node_hash,
        })
    }
}

fn none_if_empty(bytes: Vec<u8>) -> Option<Vec<u8>> {
    if bytes.is_empty() {
        None
    } else {
        Some(bytes)
    }
}

/// `kv_hash = H(enc(key) ∥ enc(value))`.
pub fn kv_hash(key: &[u8], value: &[u8]) -> Digest {
    hash_parts(&[key, value])
}

/// `node_hash = H(left_child_hash ∥ right_child_hash ∥ kv_hash)`.
pub fn node_hash(left: &Digest, right: &Digest, kv_hash: &Digest) -> Digest {
    hash_parts(&[left.as_ref(), right.as_ref(), kv_hash.as_ref()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_roundtrips_through_codec() {
        let node = Node::new_leaf(b"foo".to_vec(), b"bar".to_vec());
        let encoded = node.encode();
        let decoded = Node::decode(&encoded).unwrap();
        assert_eq!(node, decoded);
    }

    #[test]
    fn decode_rejects_truncated_input() {
        let node = Node::new_leaf(b"foo".to_vec(), b"bar".to_vec());
        let mut encoded = node.encode();
        encoded.truncate(encoded.len() - 1);
        assert!(matches!(
            Node::decode(&encoded),
            Err(StoreError::CorruptNode(_))
        ));
    }

    #[test]
    fn decode_rejects_height_zero_with_ref_present() {
        let mut node = Node::new_leaf(b"foo".to_vec(), b"bar".to_vec());
        node.left_ref = Some(b"child".to_vec());
        // left_height stays 0 — impossible combination per spec.md §7.
        let encoded = node.encode();
        assert!(matches!(
            Node::decode(&encoded),
            Err(StoreError::CorruptNode(_))
        ));
    }

    #[test]
    fn leaf_node_hash_matches_recurrence() {
        let node = Node::new_leaf(b"foo".to_vec(), b"bar".to_vec());
        let expected = node_hash(&ZERO_DIGEST, &ZERO_DIGEST, &node.kv_hash);
        assert_eq!(node.node_hash, expected);
    }
}
