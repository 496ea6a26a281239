// SPDX-License-Identifier: Apache-2.0

//! The AVL+Merkle tree engine (spec.md §4.4): search, single-key mutation,
//! batch apply, iteration, and proof-tree materialization, all addressed
//! through explicit root references rather than owning any mutable state
//! itself — the root controller (`amt` crate) owns the write lock and the
//! persisted `:root` reference.

use std::cmp::Ordering;
use std::sync::Arc;

use amt_store::node::Node;
use amt_store::store::{get_from_snapshot, StoreTransaction};
use amt_store::{BackingStore, NodeRef, NodeStore, Snapshot};
use tracing::warn;

use crate::batch::{apply_recursive, Batch};
use crate::branch::{self, Branch};
use crate::config::TreeConfig;
use crate::error::TreeError;
use crate::metrics::TreeMetrics;
use crate::node_ops::{delete_from, put_into};

/// The outcome of [`TreeEngine::search`]: either the matching node, or the
/// last node visited on the path to where it would have been (spec.md
/// §4.4.1) — used both to answer `get` and to anchor insertion.
pub enum SearchOutcome {
    Found(Node),
    NotFound { last_visited: Option<Node> },
}

pub struct TreeEngine<S: BackingStore> {
    store: NodeStore<S>,
    config: TreeConfig,
    metrics: Option<Arc<TreeMetrics>>,
}

impl<S: BackingStore> TreeEngine<S> {
    pub fn new(store: NodeStore<S>, config: TreeConfig, metrics: Option<Arc<TreeMetrics>>) -> Self {
        Self {
            store,
            config,
            metrics,
        }
    }

    pub fn store(&self) -> &NodeStore<S> {
        &self.store
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn metrics(&self) -> Option<&TreeMetrics> {
        self.metrics.as_deref()
    }

    /// Read path (spec.md §4.4.1). Descends from `root`, comparing lexically
    /// at each node.
    pub fn search<Sn: Snapshot>(
        &self,
        snapshot: &Sn,
        root: Option<&NodeRef>,
        key: &[u8],
    ) -> Result<SearchOutcome, TreeError> {
        let mut current = root.cloned();
        let mut last = None;
        while let Some(node_key) = current {
            let node =
                get_from_snapshot(snapshot, &node_key)?.ok_or_else(|| TreeError::dangling(&node_key))?;
            match key.cmp(node.key.as_slice()) {
                Ordering::Equal => return Ok(SearchOutcome::Found(node)),
                Ordering::Less => {
                    current = node.left_ref.clone();
                    last = Some(node);
                }
                Ordering::Greater => {
                    current = node.right_ref.clone();
                    last = Some(node);
                }
            }
        }
        Ok(SearchOutcome::NotFound { last_visited: last })
    }

    pub fn get<Sn: Snapshot>(
        &self,
        snapshot: &Sn,
        root: Option<&NodeRef>,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, TreeError> {
        match self.search(snapshot, root, key)? {
            SearchOutcome::Found(node) => Ok(Some(node.value)),
            SearchOutcome::NotFound { .. } => Ok(None),
        }
    }

    pub fn contains_key<Sn: Snapshot>(
        &self,
        snapshot: &Sn,
        root: Option<&NodeRef>,
        key: &[u8],
    ) -> Result<bool, TreeError> {
        match self.search(snapshot, root, key)? {
            SearchOutcome::Found(_) => Ok(true),
            SearchOutcome::NotFound { .. } => Ok(false),
        }
    }

    /// Single-key insert/update (spec.md §4.4.2, §6 "exists primarily for
    /// convenience").
    pub fn put(
        &self,
        tx: &mut StoreTransaction<'_, S>,
        root: Option<NodeRef>,
        key: Vec<u8>,
        value: Vec<u8>,
    ) -> Result<NodeRef, TreeError> {
        if key.is_empty() {
            return Err(TreeError::InvalidBatch("empty key".to_string()));
        }
        put_into(tx, root, None, &key, &value, self.metrics.as_deref())
    }

    /// Single-key delete (spec.md §4.4.2).
    pub fn delete(
        &self,
        tx: &mut StoreTransaction<'_, S>,
        root: Option<NodeRef>,
        key: &[u8],
    ) -> Result<Option<NodeRef>, TreeError> {
        let root_key = root.ok_or(TreeError::NotFound)?;
        delete_from(tx, root_key, key, self.metrics.as_deref())
    }

    /// Batch apply (spec.md §4.4.4). `snapshot` must reflect the tree's
    /// state as of `root` — the caller takes it before staging any writes
    /// into `tx`. Honors `TreeConfig::parallel_batch_apply`.
    pub fn apply<Sn: Snapshot>(
        &self,
        tx: &mut StoreTransaction<'_, S>,
        snapshot: &Sn,
        root: Option<NodeRef>,
        batch: Batch,
    ) -> Result<Option<NodeRef>, TreeError> {
        if batch.is_empty() {
            return Ok(root);
        }
        if let Some(metrics) = &self.metrics {
            let path = if self.config.parallel_batch_apply {
                "parallel"
            } else {
                "sequential"
            };
            metrics
                .batch_sizes
                .with_label_values(&[path])
                .observe(batch.len() as f64);
        }
        let (new_root, writes) = apply_recursive(
            snapshot,
            root,
            None,
            batch.entries(),
            self.config.parallel_batch_apply,
            self.metrics.as_deref(),
        )?;
        writes.stage_into(tx);
        Ok(new_root)
    }

    /// Ascending, restartable iteration from the least key `>= start`
    /// (spec.md §4.4.1), riding the backing store's own ordered cursor.
    pub fn iter_from<'a, Sn: Snapshot>(
        &self,
        snapshot: &'a Sn,
        start: &[u8],
    ) -> impl Iterator<Item = Result<(Vec<u8>, Vec<u8>), TreeError>> + 'a {
        amt_store::store::iter_nodes_from(snapshot, start)
            .map(|r| r.map(|n| (n.key, n.value)).map_err(TreeError::from))
    }

    pub fn iter_all<'a, Sn: Snapshot>(
        &self,
        snapshot: &'a Sn,
    ) -> impl Iterator<Item = Result<(Vec<u8>, Vec<u8>), TreeError>> + 'a {
        self.iter_from(snapshot, &[])
    }

    pub fn keys_in_range<'a, Sn: Snapshot>(
        &self,
        snapshot: &'a Sn,
        from: &'a [u8],
        to: &'a [u8],
    ) -> impl Iterator<Item = Result<(Vec<u8>, Vec<u8>), TreeError>> + 'a {
        self.iter_from(snapshot, from)
            .take_while(move |item| matches!(item, Ok((k, _)) if k.as_slice() <= to))
    }

    /// Sparse proof-tree materialization over a key set (spec.md §4.5.4).
    /// `keys` must be sorted and unique.
    pub fn branch_keys<Sn: Snapshot>(
        &self,
        snapshot: &Sn,
        root: Option<&NodeRef>,
        keys: &[Vec<u8>],
    ) -> Result<Option<Branch>, TreeError> {
        branch::branch_keys(snapshot, root, keys)
    }

    /// Sparse proof-tree materialization over a contiguous range (spec.md
    /// §4.4.5).
    pub fn branch_range<Sn: Snapshot>(
        &self,
        snapshot: &Sn,
        root: Option<&NodeRef>,
        from: &[u8],
        to: &[u8],
    ) -> Result<Option<Branch>, TreeError> {
        branch::branch_range(snapshot, root, from, to)
    }

    /// Walks every node reachable from `root`, verifying BST order, AVL
    /// balance, height consistency, hash consistency, and parent back-
    /// references (spec.md §3, invariants 1-5). Library code gated behind
    /// `self-check`/`test` so an embedder can run it in a debug build
    /// without pulling in `proptest` (SPEC_FULL.md, supplemented feature 5).
    #[cfg(any(test, feature = "self-check"))]
    pub fn check_invariants<Sn: Snapshot>(
        &self,
        snapshot: &Sn,
        root: Option<&NodeRef>,
    ) -> Result<(), TreeError> {
        use amt_hash::ZERO_DIGEST;

        fn walk<Sn: Snapshot>(
            snapshot: &Sn,
            node_key: &[u8],
            parent: Option<&[u8]>,
            lower: Option<&[u8]>,
            upper: Option<&[u8]>,
        ) -> Result<(), TreeError> {
            let node =
                get_from_snapshot(snapshot, node_key)?.ok_or_else(|| TreeError::dangling(node_key))?;

            if let Some(lower) = lower {
                if node.key.as_slice() <= lower {
                    return Err(report(&node.key, "BST order violated on the left bound"));
                }
            }
            if let Some(upper) = upper {
                if node.key.as_slice() >= upper {
                    return Err(report(&node.key, "BST order violated on the right bound"));
                }
            }

            if (node.balance()).unsigned_abs() > 1 {
                return Err(report(&node.key, "AVL balance factor exceeds 1"));
            }

            if node.parent_ref.as_deref() != parent {
                return Err(report(&node.key, "parent_ref does not match actual parent"));
            }

            let mut expected_kv_hash = node.clone();
            expected_kv_hash.recompute_kv_hash();
            if expected_kv_hash.kv_hash != node.kv_hash {
                return Err(report(&node.key, "kv_hash does not match its recurrence"));
            }

            let left_hash = match node.left_ref.as_deref() {
                Some(k) => {
                    let child = get_from_snapshot(snapshot, k)?.ok_or_else(|| TreeError::dangling(k))?;
                    if child.height() != node.left_height {
                        return Err(report(&node.key, "left_height inconsistent with child"));
                    }
                    walk(snapshot, k, Some(&node.key), lower, Some(node.key.as_slice()))?;
                    child.node_hash
                }
                None => {
                    if node.left_height != 0 {
                        return Err(report(&node.key, "left_height nonzero with no left child"));
                    }
                    ZERO_DIGEST
                }
            };

            let right_hash = match node.right_ref.as_deref() {
                Some(k) => {
                    let child = get_from_snapshot(snapshot, k)?.ok_or_else(|| TreeError::dangling(k))?;
                    if child.height() != node.right_height {
                        return Err(report(&node.key, "right_height inconsistent with child"));
                    }
                    walk(snapshot, k, Some(&node.key), Some(node.key.as_slice()), upper)?;
                    child.node_hash
                }
                None => {
                    if node.right_height != 0 {
                        return Err(report(&node.key, "right_height nonzero with no right child"));
                    }
                    ZERO_DIGEST
                }
            };

            let expected_node_hash =
                amt_store::node::node_hash(&left_hash, &right_hash, &node.kv_hash);
            if expected_node_hash != node.node_hash {
                return Err(report(&node.key, "node_hash does not match its recurrence"));
            }

            Ok(())
        }

        fn report(node: &[u8], detail: &str) -> TreeError {
            warn!(node = %hex::encode(node), detail, "self-check invariant violated");
            TreeError::invariant(node, detail)
        }

        match root {
            None => Ok(()),
            Some(root_key) => walk(snapshot, root_key, None, None, None),
        }
    }
}
