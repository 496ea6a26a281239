// SPDX-License-Identifier: Apache-2.0

//! The backing key/value store interface (spec.md §6, "Backing store
//! (inbound dependency)"). This is the boundary the core treats as an
//! external collaborator — an ordered persistent map with atomic batches
//! and a read-consistent snapshot. Everything past this trait (compaction,
//! WAL, SST layout) is someone else's problem; we only need point get,
//! atomic batch write, and an ordered iterator.

use crate::node::StoreError;

/// An atomic set of point writes. `None` marks a delete. Applied all-or-
/// nothing by [`BackingStore::write_batch`].
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    ops: Vec<(Vec<u8>, Option<Vec<u8>>)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push((key, Some(value)));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push((key, None));
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Vec<u8>, Option<Vec<u8>>)> {
        self.ops.iter()
    }

    pub fn into_ops(self) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
        self.ops
    }
}

/// A read-consistent view of the backing store at a commit point
/// (spec.md GLOSSARY, "Snapshot").
pub trait Snapshot: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Ascending iteration over keys `>= start`, terminating at the end of
    /// the namespace — used by `iter_from` (spec.md §4.4.1) to ride the
    /// backing store's own ordered cursor instead of walking `parent_ref`.
    fn iter_from<'a>(
        &'a self,
        start: &[u8],
    ) -> Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>), StoreError>> + 'a>;
}

/// The ordered, byte-keyed store with atomic batch writes and snapshots.
///
/// A `'static` output type would force every implementation into `Arc`-
/// wrapped interior state; tying the snapshot's lifetime to `&self` via a
/// GAT lets the RocksDB-backed implementation hand out a real
/// `rocksdb::Snapshot<'_>` with no unsafe lifetime erasure, and costs the
/// in-memory implementation nothing.
pub trait BackingStore: Send + Sync {
    type Snap<'a>: Snapshot + 'a
    where
        Self: 'a;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError>;

    fn snapshot(&self) -> Self::Snap<'_>;
}
