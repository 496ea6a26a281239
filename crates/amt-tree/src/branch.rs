// SPDX-License-Identifier: Apache-2.0

//! Sparse "proof tree" materialization (spec.md §4.4.5, §4.5.4, §4.5.5):
//! the minimal subtree needed to prove a key set or a contiguous range,
//! with uninteresting subtrees folded down to their `node_hash`. `amt-proof`
//! flattens a [`Branch`] into the stack-based token grammar.

use amt_hash::{Digest, ZERO_DIGEST};
use amt_store::node::{kv_hash, node_hash};
use amt_store::store::get_from_snapshot;
use amt_store::{NodeRef, Snapshot};

use crate::error::TreeError;

#[derive(Debug, Clone)]
pub enum Branch {
    /// An unopened subtree, known only by its hash.
    Hash(Digest),
    /// A node on the path but outside the selector: key/value withheld,
    /// children materialized further.
    KvHash {
        kv_hash: Digest,
        left: Box<Branch>,
        right: Box<Branch>,
    },
    /// A node whose key/value are exposed in full.
    Kv {
        key: Vec<u8>,
        value: Vec<u8>,
        left: Box<Branch>,
        right: Box<Branch>,
    },
}

impl Branch {
    pub fn node_hash(&self) -> Digest {
        match self {
            Branch::Hash(h) => *h,
            Branch::KvHash { kv_hash, left, right } => {
                node_hash(&left.node_hash(), &right.node_hash(), kv_hash)
            }
            Branch::Kv { key, value, left, right } => {
                node_hash(&left.node_hash(), &right.node_hash(), &kv_hash(key, value))
            }
        }
    }
}

fn subtree_hash<Sn: Snapshot>(snapshot: &Sn, child: Option<&[u8]>) -> Result<Digest, TreeError> {
    match child {
        None => Ok(ZERO_DIGEST),
        Some(key) => Ok(get_from_snapshot(snapshot, key)?
            .ok_or_else(|| TreeError::dangling(key))?
            .node_hash),
    }
}

/// Key-set generation (spec.md §4.5.4). `keys` must be sorted and unique.
pub(crate) fn branch_keys<Sn: Snapshot>(
    snapshot: &Sn,
    root: Option<&NodeRef>,
    keys: &[Vec<u8>],
) -> Result<Option<Branch>, TreeError> {
    match root {
        None => Ok(None),
        Some(root_key) => Ok(Some(branch_keys_at(snapshot, root_key, keys)?)),
    }
}

fn branch_keys_at<Sn: Snapshot>(
    snapshot: &Sn,
    node_key: &[u8],
    keys: &[Vec<u8>],
) -> Result<Branch, TreeError> {
    let node = get_from_snapshot(snapshot, node_key)?.ok_or_else(|| TreeError::dangling(node_key))?;

    let split = keys.partition_point(|k| k.as_slice() < node.key.as_slice());
    let (left_keys, rest) = keys.split_at(split);
    let (matched, right_keys) = match rest.first() {
        Some(k) if k.as_slice() == node.key.as_slice() => (true, &rest[1..]),
        _ => (false, rest),
    };

    let left = branch_keys_side(snapshot, node.left_ref.as_deref(), left_keys)?;
    let right = branch_keys_side(snapshot, node.right_ref.as_deref(), right_keys)?;

    if matched {
        Ok(Branch::Kv {
            key: node.key,
            value: node.value,
            left: Box::new(left),
            right: Box::new(right),
        })
    } else if left_keys.is_empty() && right_keys.is_empty() {
        Ok(Branch::Hash(node.node_hash))
    } else {
        Ok(Branch::KvHash {
            kv_hash: node.kv_hash,
            left: Box::new(left),
            right: Box::new(right),
        })
    }
}

fn branch_keys_side<Sn: Snapshot>(
    snapshot: &Sn,
    child: Option<&[u8]>,
    keys: &[Vec<u8>],
) -> Result<Branch, TreeError> {
    match child {
        None => Ok(Branch::Hash(ZERO_DIGEST)),
        Some(child_key) => {
            if keys.is_empty() {
                Ok(Branch::Hash(subtree_hash(snapshot, Some(child_key))?))
            } else {
                branch_keys_at(snapshot, child_key, keys)
            }
        }
    }
}

/// Contiguous-range generation (spec.md §4.4.5).
pub(crate) fn branch_range<Sn: Snapshot>(
    snapshot: &Sn,
    root: Option<&NodeRef>,
    from: &[u8],
    to: &[u8],
) -> Result<Option<Branch>, TreeError> {
    match root {
        None => Ok(None),
        Some(root_key) => Ok(Some(branch_range_at(snapshot, root_key, from, to)?)),
    }
}

fn branch_range_at<Sn: Snapshot>(
    snapshot: &Sn,
    node_key: &[u8],
    from: &[u8],
    to: &[u8],
) -> Result<Branch, TreeError> {
    let node = get_from_snapshot(snapshot, node_key)?.ok_or_else(|| TreeError::dangling(node_key))?;

    if node.key.as_slice() < from {
        let left_hash = subtree_hash(snapshot, node.left_ref.as_deref())?;
        match node.right_ref.as_deref() {
            None => Ok(Branch::Hash(node.node_hash)),
            Some(right_key) => {
                let right = branch_range_at(snapshot, right_key, from, to)?;
                Ok(Branch::KvHash {
                    kv_hash: node.kv_hash,
                    left: Box::new(Branch::Hash(left_hash)),
                    right: Box::new(right),
                })
            }
        }
    } else if node.key.as_slice() > to {
        let right_hash = subtree_hash(snapshot, node.right_ref.as_deref())?;
        match node.left_ref.as_deref() {
            None => Ok(Branch::Hash(node.node_hash)),
            Some(left_key) => {
                let left = branch_range_at(snapshot, left_key, from, to)?;
                Ok(Branch::KvHash {
                    kv_hash: node.kv_hash,
                    left: Box::new(left),
                    right: Box::new(Branch::Hash(right_hash)),
                })
            }
        }
    } else {
        let left = branch_range_side(snapshot, node.left_ref.as_deref(), from, to)?;
        let right = branch_range_side(snapshot, node.right_ref.as_deref(), from, to)?;
        Ok(Branch::Kv {
            key: node.key,
            value: node.value,
            left: Box::new(left),
            right: Box::new(right),
        })
    }
}

fn branch_range_side<Sn: Snapshot>(
    snapshot: &Sn,
    child: Option<&[u8]>,
    from: &[u8],
    to: &[u8],
) -> Result<Branch, TreeError> {
    match child {
        None => Ok(Branch::Hash(ZERO_DIGEST)),
        Some(key) => branch_range_at(snapshot, key, from, to),
    }
}
