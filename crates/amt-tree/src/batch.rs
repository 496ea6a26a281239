// SPDX-License-Identifier: Apache-2.0

//! Batch apply (spec.md §4.4.4, "the concurrent core"). The recursion reads
//! exclusively through an immutable [`Snapshot`], so the two independent
//! left/right recursions at every node touch disjoint node keys and can run
//! on separate `rayon` threads with no shared mutable state; each side
//! returns its own write-set, merged by the caller after the fork joins.

use std::collections::{HashMap, HashSet};

use amt_store::node::Node;
use amt_store::store::{get_from_snapshot, StoreTransaction};
use amt_store::{BackingStore, NodeRef, Snapshot};

use crate::error::TreeError;
use crate::metrics::TreeMetrics;
use crate::node_ops::{
    child_height, put_into, recompute_node_hash, rebalance, splice_children, NodeOps,
};

/// A single operation against one key, as supplied to [`apply`].
#[derive(Debug, Clone)]
pub enum Op {
    Put(Vec<u8>),
    Delete,
}

#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub key: Vec<u8>,
    pub op: Op,
}

/// An atomic, ordered set of `(key, op)` pairs (spec.md §4.4.4).
#[derive(Debug, Clone, Default)]
pub struct Batch {
    entries: Vec<BatchEntry>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// The unchecked fast path: the caller guarantees `entries` is already
    /// sorted ascending by key with no duplicates (spec.md §4.4.4, §5).
    pub fn from_sorted_unchecked(entries: Vec<BatchEntry>) -> Self {
        Batch { entries }
    }

    /// The checked path: sorts and validates, rejecting duplicate or empty
    /// keys with `InvalidBatch` (spec.md §5, §7, §8 scenario S6).
    pub fn from_unsorted(mut entries: Vec<BatchEntry>) -> Result<Self, TreeError> {
        if entries.iter().any(|e| e.key.is_empty()) {
            return Err(TreeError::InvalidBatch("empty key".to_string()));
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        for pair in entries.windows(2) {
            if pair[0].key == pair[1].key {
                return Err(TreeError::InvalidBatch(format!(
                    "duplicate key {}",
                    hex::encode(&pair[0].key)
                )));
            }
        }
        Ok(Batch { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }
}

/// The set of node writes/deletes accumulated by one `apply` recursion (or
/// one branch of it, before merge).
#[derive(Default)]
pub(crate) struct BatchWrites {
    puts: HashMap<NodeRef, Node>,
    deletes: HashSet<NodeRef>,
}

impl BatchWrites {
    fn put(&mut self, node: Node) {
        self.deletes.remove(&node.key);
        self.puts.insert(node.key.clone(), node);
    }

    fn delete(&mut self, key: NodeRef) {
        self.puts.remove(&key);
        self.deletes.insert(key);
    }

    fn get(&self, key: &[u8]) -> Option<&Node> {
        self.puts.get(key)
    }

    pub(crate) fn merge(mut self, other: BatchWrites) -> Self {
        self.puts.extend(other.puts);
        self.deletes.extend(other.deletes);
        self
    }

    pub(crate) fn stage_into<S: BackingStore>(self, tx: &mut StoreTransaction<'_, S>) {
        for key in self.deletes {
            tx.delete_node(&key);
        }
        for node in self.puts.into_values() {
            tx.put_node(&node);
        }
    }
}

/// A [`NodeOps`] seam over a read-only snapshot plus the writes accumulated
/// so far at one level of the batch recursion.
struct WriteSet<'s, Sn: Snapshot> {
    snapshot: &'s Sn,
    writes: BatchWrites,
}

impl<'s, Sn: Snapshot> WriteSet<'s, Sn> {
    fn new(snapshot: &'s Sn) -> Self {
        Self {
            snapshot,
            writes: BatchWrites::default(),
        }
    }

    fn with_writes(snapshot: &'s Sn, writes: BatchWrites) -> Self {
        Self { snapshot, writes }
    }

    fn into_writes(self) -> BatchWrites {
        self.writes
    }
}

impl<'s, Sn: Snapshot> NodeOps for WriteSet<'s, Sn> {
    fn load(&self, key: &[u8]) -> Result<Node, TreeError> {
        if let Some(node) = self.writes.get(key) {
            return Ok(node.clone());
        }
        get_from_snapshot(self.snapshot, key)?.ok_or_else(|| TreeError::dangling(key))
    }

    fn put(&mut self, node: &Node) {
        self.writes.put(node.clone());
    }

    fn remove(&mut self, key: &[u8]) {
        self.writes.delete(key.to_vec());
    }
}

/// Runs `apply`'s recursive algorithm against a snapshot of the tree as it
/// stood before the batch, returning the new subtree root (if any) and the
/// accumulated writes. `parallel` gates whether disjoint left/right
/// recursions fork across `rayon::join` or run sequentially in-line
/// (`TreeConfig::parallel_batch_apply`).
pub(crate) fn apply_recursive<Sn: Snapshot>(
    snapshot: &Sn,
    node_key: Option<NodeRef>,
    parent: Option<NodeRef>,
    batch: &[BatchEntry],
    parallel: bool,
    metrics: Option<&TreeMetrics>,
) -> Result<(Option<NodeRef>, BatchWrites), TreeError> {
    if batch.is_empty() {
        return Ok((node_key, BatchWrites::default()));
    }

    let Some(node_key) = node_key else {
        // Every key here targets a previously-empty slot: build a fresh
        // subtree by repeated single-key insertion. A `Delete` of a key
        // that was never present is a no-op, matching the effect (if not
        // the error behavior) of applying each operation sequentially.
        let mut ws = WriteSet::new(snapshot);
        let mut root = None;
        for entry in batch {
            if let Op::Put(value) = &entry.op {
                root = Some(put_into(
                    &mut ws,
                    root.take(),
                    parent.clone(),
                    &entry.key,
                    value,
                    metrics,
                )?);
            }
        }
        return Ok((root, ws.into_writes()));
    };

    let node =
        get_from_snapshot(snapshot, &node_key)?.ok_or_else(|| TreeError::dangling(&node_key))?;

    let split = batch.partition_point(|e| e.key.as_slice() < node.key.as_slice());
    let (left_batch, rest) = batch.split_at(split);
    let (matched_op, right_batch) = match rest.first() {
        Some(entry) if entry.key == node.key => (Some(entry.op.clone()), &rest[1..]),
        _ => (None, rest),
    };

    let left_ref = node.left_ref.clone();
    let right_ref = node.right_ref.clone();
    let this_key = node.key.clone();

    let ((new_left, left_writes), (new_right, right_writes)) =
        if parallel && !left_batch.is_empty() && !right_batch.is_empty() {
            let (left_result, right_result) = rayon::join(
                || {
                    apply_recursive(
                        snapshot,
                        left_ref,
                        Some(this_key.clone()),
                        left_batch,
                        parallel,
                        metrics,
                    )
                },
                || {
                    apply_recursive(
                        snapshot,
                        right_ref,
                        Some(this_key.clone()),
                        right_batch,
                        parallel,
                        metrics,
                    )
                },
            );
            (left_result?, right_result?)
        } else {
            (
                apply_recursive(
                    snapshot,
                    left_ref,
                    Some(this_key.clone()),
                    left_batch,
                    parallel,
                    metrics,
                )?,
                apply_recursive(
                    snapshot,
                    right_ref,
                    Some(this_key.clone()),
                    right_batch,
                    parallel,
                    metrics,
                )?,
            )
        };

    let merged = left_writes.merge(right_writes);
    let mut ws = WriteSet::with_writes(snapshot, merged);

    let new_root = match matched_op {
        None => {
            let mut updated = node;
            updated.left_ref = new_left.clone();
            updated.right_ref = new_right.clone();
            updated.left_height = child_height(&ws, new_left.as_deref())?;
            updated.right_height = child_height(&ws, new_right.as_deref())?;
            recompute_node_hash(&ws, &mut updated)?;
            Some(rebalance(&mut ws, updated, metrics)?)
        }
        Some(Op::Put(value)) => {
            let mut updated = node;
            updated.value = value;
            updated.recompute_kv_hash();
            updated.left_ref = new_left.clone();
            updated.right_ref = new_right.clone();
            updated.left_height = child_height(&ws, new_left.as_deref())?;
            updated.right_height = child_height(&ws, new_right.as_deref())?;
            recompute_node_hash(&ws, &mut updated)?;
            Some(rebalance(&mut ws, updated, metrics)?)
        }
        Some(Op::Delete) => {
            ws.remove(&node.key);
            splice_children(&mut ws, parent, new_left, new_right, metrics)?
        }
    };

    Ok((new_root, ws.into_writes()))
}
