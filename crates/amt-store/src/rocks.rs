// SPDX-License-Identifier: Apache-2.0

//! A [`BackingStore`] backed by RocksDB — the production path. Grounded on
//! the teacher's `raw-store`/`accumulator` pairing: `accumulator`'s
//! `AccumulatorTreeStore` trait is implemented once against `rocksdb`
//! directly, and `raw-store` layers metrics on top. We fold that into one
//! crate here since the backing store is out of scope per the design; this
//! implementation exists to demonstrate the trait is satisfiable by a real
//! log-structured merge engine, not as the tuned production backend.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{IteratorMode, Options, DB};

use crate::backing::{BackingStore, Snapshot, WriteBatch};
use crate::node::StoreError;

pub struct RocksBackingStore {
    db: Arc<DB>,
}

impl RocksBackingStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path).map_err(|e| StoreError::Backing(e.into()))?;
        Ok(Self { db: Arc::new(db) })
    }
}

impl BackingStore for RocksBackingStore {
    type Snap<'a> = RocksSnapshot<'a>;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.db.get(key).map_err(|e| StoreError::Backing(e.into()))
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut wb = rocksdb::WriteBatch::default();
        for (key, value) in batch.into_ops() {
            match value {
                Some(value) => wb.put(&key, &value),
                None => wb.delete(&key),
            }
        }
        self.db.write(wb).map_err(|e| StoreError::Backing(e.into()))
    }

    fn snapshot(&self) -> RocksSnapshot<'_> {
        RocksSnapshot {
            snapshot: self.db.snapshot(),
        }
    }
}

pub struct RocksSnapshot<'a> {
    snapshot: rocksdb::Snapshot<'a>,
}

impl<'a> Snapshot for RocksSnapshot<'a> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.snapshot
            .get(key)
            .map_err(|e| StoreError::Backing(e.into()))
    }

    fn iter_from<'b>(
        &'b self,
        start: &[u8],
    ) -> Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>), StoreError>> + 'b> {
        let mode = IteratorMode::From(start, rocksdb::Direction::Forward);
        Box::new(self.snapshot.iterator(mode).map(|item| {
            item.map(|(k, v)| (k.to_vec(), v.to_vec()))
                .map_err(|e| StoreError::Backing(e.into()))
        }))
    }
}
