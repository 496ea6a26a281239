// SPDX-License-Identifier: Apache-2.0

//! The mutation algorithms of spec.md §4.4.2-§4.4.3, written once against a
//! small [`NodeOps`] seam so both the single-key path (backed by an
//! `amt_store::StoreTransaction`) and the batch path (backed by an
//! in-memory [`crate::batch::WriteSet`]) share one implementation.

use std::cmp::Ordering;

use amt_hash::{Digest, ZERO_DIGEST};
use amt_store::node::Node;
use amt_store::store::StoreTransaction;
use amt_store::{BackingStore, NodeRef};
use tracing::trace;

use crate::error::TreeError;
use crate::metrics::TreeMetrics;

/// A place nodes can be read from and staged into, independent of whether
/// the underlying accumulation is a real transaction or an in-memory batch.
pub(crate) trait NodeOps {
    fn load(&self, key: &[u8]) -> Result<Node, TreeError>;
    fn put(&mut self, node: &Node);
    fn remove(&mut self, key: &[u8]);
}

impl<S: BackingStore> NodeOps for StoreTransaction<'_, S> {
    fn load(&self, key: &[u8]) -> Result<Node, TreeError> {
        self.get(key)?.ok_or_else(|| TreeError::dangling(key))
    }

    fn put(&mut self, node: &Node) {
        self.put_node(node);
    }

    fn remove(&mut self, key: &[u8]) {
        self.delete_node(key);
    }
}

pub(crate) fn child_hash<O: NodeOps>(ops: &O, child: Option<&[u8]>) -> Result<Digest, TreeError> {
    match child {
        None => Ok(ZERO_DIGEST),
        Some(key) => Ok(ops.load(key)?.node_hash),
    }
}

pub(crate) fn child_height<O: NodeOps>(ops: &O, child: Option<&[u8]>) -> Result<u8, TreeError> {
    match child {
        None => Ok(0),
        Some(key) => Ok(ops.load(key)?.height()),
    }
}

pub(crate) fn recompute_node_hash<O: NodeOps>(ops: &O, node: &mut Node) -> Result<(), TreeError> {
    let left = child_hash(ops, node.left_ref.as_deref())?;
    let right = child_hash(ops, node.right_ref.as_deref())?;
    node.recompute_node_hash(&left, &right);
    Ok(())
}

/// A single rotation (spec.md §4.4.3): re-parents three roles, clears the
/// rotating child's `parent_ref` before re-linking, and recomputes hashes
/// bottom-up. Returns the new subtree root's key.
///
/// `node` is staged via `ops.put` as soon as its own hash is final, *before*
/// `right`'s hash is computed — `recompute_node_hash` resolves a child's hash
/// by re-loading it through `ops` by key, so if `right`'s hash were computed
/// while `node` was still only held in memory, it would read `node`'s stale
/// pre-rotation persisted hash instead of the one just recomputed above.
pub(crate) fn rotate_left<O: NodeOps>(
    ops: &mut O,
    mut node: Node,
    metrics: Option<&TreeMetrics>,
) -> Result<NodeRef, TreeError> {
    let right_key = node
        .right_ref
        .clone()
        .ok_or_else(|| TreeError::invariant(&node.key, "rotate_left requires a right child"))?;
    let mut right = ops.load(&right_key)?;

    let moved_key = right.left_ref.take();
    let moved_height = right.left_height;

    node.right_ref = moved_key.clone();
    node.right_height = moved_height;
    recompute_node_hash(ops, &mut node)?;

    right.left_ref = Some(node.key.clone());
    right.left_height = node.height();
    right.parent_ref = node.parent_ref.take();
    node.parent_ref = Some(right.key.clone());

    ops.put(&node);
    recompute_node_hash(ops, &mut right)?;

    if let Some(moved_key) = moved_key {
        let mut moved = ops.load(&moved_key)?;
        moved.parent_ref = Some(node.key.clone());
        ops.put(&moved);
    }
    ops.put(&right);
    if let Some(metrics) = metrics {
        metrics.rotations.with_label_values(&["left"]).inc();
    }
    trace!(pivot = %hex::encode(&right.key), "rotate_left");
    Ok(right.key)
}

/// Mirror image of [`rotate_left`] — see its doc comment for why `node` must
/// be staged before `left`'s hash is recomputed.
pub(crate) fn rotate_right<O: NodeOps>(
    ops: &mut O,
    mut node: Node,
    metrics: Option<&TreeMetrics>,
) -> Result<NodeRef, TreeError> {
    let left_key = node
        .left_ref
        .clone()
        .ok_or_else(|| TreeError::invariant(&node.key, "rotate_right requires a left child"))?;
    let mut left = ops.load(&left_key)?;

    let moved_key = left.right_ref.take();
    let moved_height = left.right_height;

    node.left_ref = moved_key.clone();
    node.left_height = moved_height;
    recompute_node_hash(ops, &mut node)?;

    left.right_ref = Some(node.key.clone());
    left.right_height = node.height();
    left.parent_ref = node.parent_ref.take();
    node.parent_ref = Some(left.key.clone());

    ops.put(&node);
    recompute_node_hash(ops, &mut left)?;

    if let Some(moved_key) = moved_key {
        let mut moved = ops.load(&moved_key)?;
        moved.parent_ref = Some(node.key.clone());
        ops.put(&moved);
    }
    ops.put(&left);
    if let Some(metrics) = metrics {
        metrics.rotations.with_label_values(&["right"]).inc();
    }
    trace!(pivot = %hex::encode(&left.key), "rotate_right");
    Ok(left.key)
}

/// Recomputes `node`'s own hash, then rotates at most twice if its balance
/// factor has drifted outside `[-1, 1]` (spec.md §4.4.3). `node.left_height`/
/// `right_height` must already reflect the (possibly just-rebuilt) children.
pub(crate) fn rebalance<O: NodeOps>(
    ops: &mut O,
    mut node: Node,
    metrics: Option<&TreeMetrics>,
) -> Result<NodeRef, TreeError> {
    recompute_node_hash(ops, &mut node)?;
    let balance = node.balance();

    if balance > 1 {
        let right = ops.load(node.right_ref.as_ref().expect("right-heavy node has a right child"))?;
        if right.balance() < 0 {
            let rotated_key = rotate_right(ops, right, metrics)?;
            let rotated = ops.load(&rotated_key)?;
            node.right_height = rotated.height();
            node.right_ref = Some(rotated.key);
        }
        rotate_left(ops, node, metrics)
    } else if balance < -1 {
        let left = ops.load(node.left_ref.as_ref().expect("left-heavy node has a left child"))?;
        if left.balance() > 0 {
            let rotated_key = rotate_left(ops, left, metrics)?;
            let rotated = ops.load(&rotated_key)?;
            node.left_height = rotated.height();
            node.left_ref = Some(rotated.key);
        }
        rotate_right(ops, node, metrics)
    } else {
        let key = node.key.clone();
        ops.put(&node);
        Ok(key)
    }
}

/// Single-key insert (spec.md §4.4.2). Builds a fresh leaf when descending
/// into an empty slot; updates value/`kv_hash` in place on an exact match.
pub(crate) fn put_into<O: NodeOps>(
    ops: &mut O,
    node_key: Option<NodeRef>,
    parent: Option<NodeRef>,
    key: &[u8],
    value: &[u8],
    metrics: Option<&TreeMetrics>,
) -> Result<NodeRef, TreeError> {
    let Some(node_key) = node_key else {
        let mut leaf = Node::new_leaf(key.to_vec(), value.to_vec());
        leaf.parent_ref = parent;
        ops.put(&leaf);
        return Ok(leaf.key);
    };

    let mut node = ops.load(&node_key)?;
    match key.cmp(node.key.as_slice()) {
        Ordering::Equal => {
            node.value = value.to_vec();
            node.recompute_kv_hash();
            recompute_node_hash(ops, &mut node)?;
            ops.put(&node);
            Ok(node.key)
        }
        Ordering::Less => {
            let new_left = put_into(
                ops,
                node.left_ref.clone(),
                Some(node.key.clone()),
                key,
                value,
                metrics,
            )?;
            node.left_height = ops.load(&new_left)?.height();
            node.left_ref = Some(new_left);
            rebalance(ops, node, metrics)
        }
        Ordering::Greater => {
            let new_right = put_into(
                ops,
                node.right_ref.clone(),
                Some(node.key.clone()),
                key,
                value,
                metrics,
            )?;
            node.right_height = ops.load(&new_right)?.height();
            node.right_ref = Some(new_right);
            rebalance(ops, node, metrics)
        }
    }
}

/// Single-key delete (spec.md §4.4.2). Returns `NotFound` by descending off
/// the edge of the tree, never by a dedicated existence check up front.
pub(crate) fn delete_from<O: NodeOps>(
    ops: &mut O,
    node_key: NodeRef,
    key: &[u8],
    metrics: Option<&TreeMetrics>,
) -> Result<Option<NodeRef>, TreeError> {
    let node = ops.load(&node_key)?;
    match key.cmp(node.key.as_slice()) {
        Ordering::Less => {
            let left_key = node.left_ref.clone().ok_or(TreeError::NotFound)?;
            let new_left = delete_from(ops, left_key, key, metrics)?;
            let mut node = node;
            node.left_height = child_height(ops, new_left.as_deref())?;
            node.left_ref = new_left.clone();
            if let Some(ref k) = new_left {
                let mut n = ops.load(k)?;
                n.parent_ref = Some(node.key.clone());
                ops.put(&n);
            }
            Ok(Some(rebalance(ops, node, metrics)?))
        }
        Ordering::Greater => {
            let right_key = node.right_ref.clone().ok_or(TreeError::NotFound)?;
            let new_right = delete_from(ops, right_key, key, metrics)?;
            let mut node = node;
            node.right_height = child_height(ops, new_right.as_deref())?;
            node.right_ref = new_right.clone();
            if let Some(ref k) = new_right {
                let mut n = ops.load(k)?;
                n.parent_ref = Some(node.key.clone());
                ops.put(&n);
            }
            Ok(Some(rebalance(ops, node, metrics)?))
        }
        Ordering::Equal => {
            let parent_ref = node.parent_ref.clone();
            let left_ref = node.left_ref.clone();
            let right_ref = node.right_ref.clone();
            ops.remove(&node.key);
            splice_children(ops, parent_ref, left_ref, right_ref, metrics)
        }
    }
}

/// Joins a deleted node's two (possibly already-rebuilt) children back into
/// one subtree, promoting a successor from the taller side (ties break
/// left, spec.md §4.4.2) rather than copying key/value in place — key-
/// addressed nodes are identified by their key, so "splicing the successor
/// into the deleted node's position" means reparenting, not overwriting.
pub(crate) fn splice_children<O: NodeOps>(
    ops: &mut O,
    parent_ref: Option<NodeRef>,
    left_ref: Option<NodeRef>,
    right_ref: Option<NodeRef>,
    metrics: Option<&TreeMetrics>,
) -> Result<Option<NodeRef>, TreeError> {
    match (left_ref, right_ref) {
        (None, None) => Ok(None),
        (Some(only), None) | (None, Some(only)) => {
            let mut child = ops.load(&only)?;
            child.parent_ref = parent_ref;
            ops.put(&child);
            Ok(Some(child.key))
        }
        (Some(left_key), Some(right_key)) => {
            let left_height = ops.load(&left_key)?.height();
            let right_height = ops.load(&right_key)?.height();

            let mut succ = if left_height >= right_height {
                let (new_left, mut succ) = remove_max(ops, left_key, metrics)?;
                succ.left_ref = new_left.clone();
                succ.left_height = child_height(ops, new_left.as_deref())?;
                if let Some(ref k) = new_left {
                    let mut n = ops.load(k)?;
                    n.parent_ref = Some(succ.key.clone());
                    ops.put(&n);
                }
                let mut right_node = ops.load(&right_key)?;
                succ.right_height = right_node.height();
                succ.right_ref = Some(right_key);
                right_node.parent_ref = Some(succ.key.clone());
                ops.put(&right_node);
                succ
            } else {
                let (new_right, mut succ) = remove_min(ops, right_key, metrics)?;
                succ.right_ref = new_right.clone();
                succ.right_height = child_height(ops, new_right.as_deref())?;
                if let Some(ref k) = new_right {
                    let mut n = ops.load(k)?;
                    n.parent_ref = Some(succ.key.clone());
                    ops.put(&n);
                }
                let mut left_node = ops.load(&left_key)?;
                succ.left_height = left_node.height();
                succ.left_ref = Some(left_key);
                left_node.parent_ref = Some(succ.key.clone());
                ops.put(&left_node);
                succ
            };

            succ.parent_ref = parent_ref;
            Ok(Some(rebalance(ops, succ, metrics)?))
        }
    }
}

/// Detaches and returns the minimum-key node of the subtree rooted at
/// `node_key`, rebalancing on unwind. Used to promote a successor from a
/// right subtree during two-child delete.
pub(crate) fn remove_min<O: NodeOps>(
    ops: &mut O,
    node_key: NodeRef,
    metrics: Option<&TreeMetrics>,
) -> Result<(Option<NodeRef>, Node), TreeError> {
    let mut node = ops.load(&node_key)?;
    match node.left_ref.clone() {
        None => {
            ops.remove(&node.key);
            if let Some(right_key) = node.right_ref.clone() {
                let mut right = ops.load(&right_key)?;
                right.parent_ref = node.parent_ref.clone();
                ops.put(&right);
                Ok((Some(right.key.clone()), node))
            } else {
                Ok((None, node))
            }
        }
        Some(left_key) => {
            let (new_left, removed) = remove_min(ops, left_key, metrics)?;
            node.left_height = child_height(ops, new_left.as_deref())?;
            node.left_ref = new_left.clone();
            if let Some(ref k) = new_left {
                let mut n = ops.load(k)?;
                n.parent_ref = Some(node.key.clone());
                ops.put(&n);
            }
            let new_root = rebalance(ops, node, metrics)?;
            Ok((Some(new_root), removed))
        }
    }
}

/// Mirror image of [`remove_min`], detaching the maximum-key node.
pub(crate) fn remove_max<O: NodeOps>(
    ops: &mut O,
    node_key: NodeRef,
    metrics: Option<&TreeMetrics>,
) -> Result<(Option<NodeRef>, Node), TreeError> {
    let mut node = ops.load(&node_key)?;
    match node.right_ref.clone() {
        None => {
            ops.remove(&node.key);
            if let Some(left_key) = node.left_ref.clone() {
                let mut left = ops.load(&left_key)?;
                left.parent_ref = node.parent_ref.clone();
                ops.put(&left);
                Ok((Some(left.key.clone()), node))
            } else {
                Ok((None, node))
            }
        }
        Some(right_key) => {
            let (new_right, removed) = remove_max(ops, right_key, metrics)?;
            node.right_height = child_height(ops, new_right.as_deref())?;
            node.right_ref = new_right.clone();
            if let Some(ref k) = new_right {
                let mut n = ops.load(k)?;
                n.parent_ref = Some(node.key.clone());
                ops.put(&n);
            }
            let new_root = rebalance(ops, node, metrics)?;
            Ok((Some(new_root), removed))
        }
    }
}
