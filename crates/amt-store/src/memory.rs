// SPDX-License-Identifier: Apache-2.0

//! An in-memory [`BackingStore`], grounded on the teacher's
//! `MockTreeStore` (`jellyfish_merkle/mock_tree_store.rs`): a
//! `parking_lot::RwLock`-guarded ordered map, good enough for unit tests
//! and `proptest` properties but not a production backend — a real
//! deployment plugs in something like RocksDB (see [`crate::rocks`]).

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::backing::{BackingStore, Snapshot, WriteBatch};
use crate::node::StoreError;

#[derive(Default)]
pub struct MemoryBackingStore {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryBackingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct MemorySnapshot {
    // A snapshot is a point-in-time copy rather than a shared-state
    // cursor: readers must never observe writes committed after they
    // started, and a plain clone of a BTreeMap is cheap enough here.
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl Snapshot for MemorySnapshot {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn iter_from<'a>(
        &'a self,
        start: &[u8],
    ) -> Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>), StoreError>> + 'a> {
        Box::new(
            self.data
                .range(start.to_vec()..)
                .map(|(k, v)| Ok((k.clone(), v.clone()))),
        )
    }
}

impl BackingStore for MemoryBackingStore {
    type Snap<'a> = MemorySnapshot;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.read().get(key).cloned())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut guard = self.data.write();
        for (key, value) in batch.into_ops() {
            match value {
                Some(value) => {
                    guard.insert(key, value);
                }
                None => {
                    guard.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            data: self.data.read().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_batch_is_all_or_nothing_visible_after_commit() {
        let store = MemoryBackingStore::new();
        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), b"1".to_vec());
        batch.put(b"b".to_vec(), b"2".to_vec());
        store.write_batch(batch).unwrap();

        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn snapshot_does_not_see_later_writes() {
        let store = MemoryBackingStore::new();
        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), b"1".to_vec());
        store.write_batch(batch).unwrap();

        let snap = store.snapshot();

        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), b"2".to_vec());
        store.write_batch(batch).unwrap();

        assert_eq!(snap.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"a").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn iter_from_is_ascending_and_restartable() {
        let store = MemoryBackingStore::new();
        let mut batch = WriteBatch::new();
        for k in ["a", "b", "c", "d"] {
            batch.put(k.as_bytes().to_vec(), k.as_bytes().to_vec());
        }
        store.write_batch(batch).unwrap();

        let snap = store.snapshot();
        let collected: Vec<_> = snap
            .iter_from(b"b")
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(collected, vec![b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);

        // Restartable: a fresh iterator from the same snapshot sees the same sequence.
        let collected_again: Vec<_> = snap.iter_from(b"b").map(|r| r.unwrap().0).collect();
        assert_eq!(collected, collected_again);
    }
}
