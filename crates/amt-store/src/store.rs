// SPDX-License-Identifier: Apache-2.0

//! `NodeStore`: `get(ref) -> Node | Absent`, `put(node)`, `del(ref)`,
//! threaded through an explicit transaction handle (spec.md §4.3). Reads
//! issued through an open transaction see that transaction's own writes
//! before it commits; reads issued against a [`Snapshot`] never do.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace};

use crate::backing::{BackingStore, Snapshot, WriteBatch};
use crate::metrics::StoreMetrics;
use crate::node::{Node, NodeRef, StoreError};

const NODE_PREFIX: u8 = b'n';
const META_PREFIX: u8 = b':';
const ROOT_META_NAME: &[u8] = b"root";

fn node_key(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 1);
    out.push(NODE_PREFIX);
    out.extend_from_slice(key);
    out
}

fn meta_key(name: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + 1);
    out.push(META_PREFIX);
    out.extend_from_slice(name);
    out
}

pub struct NodeStore<S: BackingStore> {
    backing: S,
    metrics: Option<Arc<StoreMetrics>>,
}

impl<S: BackingStore> NodeStore<S> {
    pub fn new(backing: S, metrics: Option<Arc<StoreMetrics>>) -> Self {
        Self { backing, metrics }
    }

    pub fn backing(&self) -> &S {
        &self.backing
    }

    /// Reads a node directly from the backing store (bypassing any
    /// in-flight transaction). Used for snapshot-isolated read paths.
    pub fn get(&self, key: &[u8]) -> Result<Option<Node>, StoreError> {
        let raw = self.backing.get(&node_key(key))?;
        self.record_read(raw.is_some());
        raw.as_deref().map(Node::decode).transpose()
    }

    pub fn root_ref(&self) -> Result<Option<NodeRef>, StoreError> {
        self.backing.get(&meta_key(ROOT_META_NAME))
    }

    pub fn begin(&self) -> StoreTransaction<'_, S> {
        StoreTransaction {
            store: self,
            batch: WriteBatch::new(),
            pending: HashMap::new(),
        }
    }

    fn record_read(&self, found: bool) {
        if let Some(metrics) = &self.metrics {
            metrics
                .node_reads
                .with_label_values(&[if found { "hit" } else { "miss" }])
                .inc();
        }
    }
}

/// Reads a node through a read-consistent [`Snapshot`], for the read path
/// (spec.md §4.4.1) and proof generation, which must never block writers.
pub fn get_from_snapshot<Sn: Snapshot + ?Sized>(
    snap: &Sn,
    key: &[u8],
) -> Result<Option<Node>, StoreError> {
    snap.get(&node_key(key))?
        .as_deref()
        .map(Node::decode)
        .transpose()
}

pub fn root_ref_from_snapshot<Sn: Snapshot + ?Sized>(
    snap: &Sn,
) -> Result<Option<NodeRef>, StoreError> {
    snap.get(&meta_key(ROOT_META_NAME))
}

/// In-order iteration over nodes whose key is `>= start`, riding the
/// backing store's own ordered cursor (spec.md §4.4.1, the preferred
/// implementation of `iter_from`).
pub fn iter_nodes_from<'a, Sn: Snapshot + ?Sized>(
    snap: &'a Sn,
    start: &[u8],
) -> impl Iterator<Item = Result<Node, StoreError>> + 'a {
    snap.iter_from(&node_key(start))
        .take_while(|item| {
            // The node namespace is a contiguous prefix range; stop once we
            // fall off the `n…` prefix into `:`-prefixed meta keys (there is
            // nothing after `n` lexicographically within this store, but
            // being explicit keeps this correct regardless of key layout).
            matches!(item, Ok((k, _)) if k.first() == Some(&NODE_PREFIX))
        })
        .map(|item| item.and_then(|(_, v)| Node::decode(&v)))
}

/// An atomic batch against the node store (spec.md §4.3's "transaction").
pub struct StoreTransaction<'a, S: BackingStore> {
    store: &'a NodeStore<S>,
    batch: WriteBatch,
    pending: HashMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a, S: BackingStore> StoreTransaction<'a, S> {
    /// Reads a node, seeing this transaction's own uncommitted writes.
    pub fn get(&self, key: &[u8]) -> Result<Option<Node>, StoreError> {
        let raw = match self.pending.get(&node_key(key)) {
            Some(pending) => pending.clone(),
            None => self.store.backing.get(&node_key(key))?,
        };
        raw.as_deref().map(Node::decode).transpose()
    }

    pub fn put_node(&mut self, node: &Node) {
        let key = node_key(&node.key);
        let bytes = node.encode();
        self.pending.insert(key.clone(), Some(bytes.clone()));
        self.batch.put(key, bytes);
        if let Some(metrics) = &self.store.metrics {
            metrics.node_writes.with_label_values(&["put"]).inc();
        }
        trace!(key = %hex::encode(&node.key), "staged node put");
    }

    pub fn delete_node(&mut self, key: &[u8]) {
        let nkey = node_key(key);
        self.pending.insert(nkey.clone(), None);
        self.batch.delete(nkey);
        if let Some(metrics) = &self.store.metrics {
            metrics.node_writes.with_label_values(&["delete"]).inc();
        }
    }

    pub fn set_root(&mut self, root: Option<&NodeRef>) {
        let key = meta_key(ROOT_META_NAME);
        match root {
            Some(root) => {
                self.pending.insert(key.clone(), Some(root.clone()));
                self.batch.put(key, root.clone());
            }
            None => {
                self.pending.insert(key.clone(), None);
                self.batch.delete(key);
            }
        }
    }

    /// Commits the batch atomically. On error the backing store guarantees
    /// the batch was not partially applied (spec.md §4.4.4).
    pub fn commit(self) -> Result<(), StoreError> {
        let started = Instant::now();
        let is_empty = self.batch.is_empty();
        let result = if is_empty {
            Ok(())
        } else {
            self.store.backing.write_batch(self.batch)
        };
        if let Some(metrics) = &self.store.metrics {
            let outcome = if result.is_ok() { "committed" } else { "failed" };
            metrics.commits.with_label_values(&[outcome]).inc();
            metrics
                .commit_latency_seconds
                .with_label_values(&[outcome])
                .observe(started.elapsed().as_secs_f64());
        }
        if result.is_ok() {
            debug!("transaction committed");
        }
        result
    }
}
