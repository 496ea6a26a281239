// SPDX-License-Identifier: Apache-2.0

//! The root controller and public Caller API (spec.md §4.6, §6): a
//! thread-safe facade over the node store, tree engine, and proof engine.
//! Holds the current root reference, a persisted copy of the same under
//! the backing store's `:root` meta key, and a lock that serializes
//! mutators; readers work off a snapshot and never block on that lock.

mod error;

use amt_store::store::get_from_snapshot;
use amt_store::{NodeRef, NodeStore};
use amt_tree::{SearchOutcome, TreeEngine, TreeError, TreeMetrics};
use parking_lot::{Mutex, RwLock};
use prometheus::Registry;

pub use amt_hash::Digest;
pub use amt_proof::{
    chunk_tokens, decode, encode, gen_key_proof, gen_range_proof, verify, ProofError, ProofToken,
    Selector,
};
pub use amt_store::memory::MemoryBackingStore;
pub use amt_store::metrics::StoreMetrics;
pub use amt_store::{BackingStore, Snapshot};
pub use amt_tree::{Batch, BatchEntry, Op, TreeConfig};
pub use error::Error;

/// Read-only diagnostics over the current tree (SPEC_FULL.md supplemented
/// feature 4). `count` is a full scan (`O(n)`); `height` is an `O(1)` read
/// of the root node's cached height field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeStats {
    pub count: u64,
    pub height: u32,
    pub root_hash: Option<Digest>,
}

pub struct Tree<S: BackingStore> {
    engine: TreeEngine<S>,
    root: RwLock<Option<NodeRef>>,
    mutate_lock: Mutex<()>,
}

impl<S: BackingStore> Tree<S> {
    /// Opens a tree over `backing`, loading `:root` if present, with
    /// default configuration and no metrics.
    pub fn open(backing: S) -> Result<Self, Error> {
        Self::open_with(backing, TreeConfig::default(), None)
    }

    pub fn open_with(backing: S, config: TreeConfig, registry: Option<&Registry>) -> Result<Self, Error> {
        let store_metrics = registry.map(StoreMetrics::new);
        let tree_metrics = registry.map(TreeMetrics::new);
        let store = NodeStore::new(backing, store_metrics);
        let root = store.root_ref().map_err(TreeError::from)?;
        let engine = TreeEngine::new(store, config, tree_metrics);
        Ok(Self {
            engine,
            root: RwLock::new(root),
            mutate_lock: Mutex::new(()),
        })
    }

    fn current_root(&self) -> Option<NodeRef> {
        self.root.read().clone()
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let snap = self.engine.store().backing().snapshot();
        Ok(self.engine.get(&snap, self.current_root().as_ref(), key)?)
    }

    /// Cheap existence check that never copies the value (SPEC_FULL.md
    /// supplemented feature 2).
    pub fn contains_key(&self, key: &[u8]) -> Result<bool, Error> {
        let snap = self.engine.store().backing().snapshot();
        Ok(self.engine.contains_key(&snap, self.current_root().as_ref(), key)?)
    }

    /// Single-key insert/update; exists primarily for convenience (spec.md
    /// §6). Serializes with every other mutator via `mutate_lock`.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), Error> {
        let _guard = self.mutate_lock.lock();
        let root = self.current_root();
        let mut tx = self.engine.store().begin();
        let new_root = self.engine.put(&mut tx, root, key, value)?;
        tx.set_root(Some(&new_root));
        tx.commit().map_err(TreeError::from)?;
        *self.root.write() = Some(new_root);
        Ok(())
    }

    /// Single-key delete. Raises `TreeError::NotFound` (not rolled back
    /// into a no-op silently) when the key is absent, per spec.md §7.
    pub fn delete(&self, key: &[u8]) -> Result<(), Error> {
        let _guard = self.mutate_lock.lock();
        let root = self.current_root();
        let mut tx = self.engine.store().begin();
        let new_root = self.engine.delete(&mut tx, root, key)?;
        tx.set_root(new_root.as_ref());
        tx.commit().map_err(TreeError::from)?;
        *self.root.write() = new_root;
        Ok(())
    }

    /// Atomic batch apply (spec.md §4.4.4). All node writes produced during
    /// the recursion are staged in a single transaction; on error nothing
    /// is committed and the in-memory root is left untouched.
    pub fn apply(&self, batch: Batch) -> Result<(), Error> {
        let _guard = self.mutate_lock.lock();
        let root = self.current_root();
        let snap = self.engine.store().backing().snapshot();
        let mut tx = self.engine.store().begin();
        let new_root = self.engine.apply(&mut tx, &snap, root, batch)?;
        tx.set_root(new_root.as_ref());
        tx.commit().map_err(TreeError::from)?;
        *self.root.write() = new_root;
        Ok(())
    }

    pub fn root_hash(&self) -> Result<Option<[u8; 32]>, Error> {
        Ok(self.root_hash_digest()?.map(|d| *d.as_bytes()))
    }

    /// Typed counterpart to [`Tree::root_hash`] (SPEC_FULL.md supplemented
    /// feature 1), avoiding a round trip through `[u8; 32]` for callers
    /// already inside this workspace.
    pub fn root_hash_digest(&self) -> Result<Option<Digest>, Error> {
        match self.current_root() {
            None => Ok(None),
            Some(root) => {
                let snap = self.engine.store().backing().snapshot();
                let node = get_from_snapshot(&snap, &root)
                    .map_err(TreeError::from)?
                    .ok_or_else(|| dangling_root(&root))?;
                Ok(Some(node.node_hash))
            }
        }
    }

    pub fn prove_keys(&self, mut keys: Vec<Vec<u8>>) -> Result<Vec<u8>, Error> {
        keys.sort();
        keys.dedup();
        let snap = self.engine.store().backing().snapshot();
        let branch = self.engine.branch_keys(&snap, self.current_root().as_ref(), &keys)?;
        Ok(encode(&gen_key_proof(branch.as_ref(), self.engine.metrics())))
    }

    pub fn prove_range(&self, from: &[u8], to: &[u8]) -> Result<Vec<u8>, Error> {
        let snap = self.engine.store().backing().snapshot();
        let branch = self.engine.branch_range(&snap, self.current_root().as_ref(), from, to)?;
        Ok(encode(&gen_range_proof(branch.as_ref(), self.engine.metrics())))
    }

    /// Like [`Tree::prove_range`] but splits the encoded proof into chunks of
    /// at most `TreeConfig::proof_chunk_size` in-range nodes each, bounding
    /// how much of the proof a caller must hold in memory at once
    /// (SPEC_FULL.md §4.5.5). Concatenating the returned byte strings decodes
    /// to the exact same token stream `prove_range` would produce.
    pub fn prove_range_chunked(&self, from: &[u8], to: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
        let snap = self.engine.store().backing().snapshot();
        let branch = self.engine.branch_range(&snap, self.current_root().as_ref(), from, to)?;
        let tokens = gen_range_proof(branch.as_ref(), self.engine.metrics());
        let chunk_size = self.engine.config().proof_chunk_size;
        Ok(chunk_tokens(tokens, chunk_size)
            .into_iter()
            .map(|chunk| encode(&chunk))
            .collect())
    }

    /// In-order iteration from the least key `>= start` (spec.md §4.4.1).
    /// Materialized eagerly for facade convenience; `amt_tree::TreeEngine`
    /// exposes the lazy, snapshot-borrowing version this wraps.
    pub fn iter_from(&self, start: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let snap = self.engine.store().backing().snapshot();
        self.engine
            .iter_from(&snap, start)
            .collect::<Result<Vec<_>, TreeError>>()
            .map_err(Error::from)
    }

    /// Alias for `iter_from` from the minimum key (SPEC_FULL.md
    /// supplemented feature 3).
    pub fn iter_all(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        self.iter_from(&[])
    }

    pub fn keys_in_range(&self, from: &[u8], to: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let snap = self.engine.store().backing().snapshot();
        self.engine
            .keys_in_range(&snap, from, to)
            .collect::<Result<Vec<_>, TreeError>>()
            .map_err(Error::from)
    }

    /// Read-only diagnostics (SPEC_FULL.md supplemented feature 4).
    pub fn stats(&self) -> Result<TreeStats, Error> {
        let root = self.current_root();
        let snap = self.engine.store().backing().snapshot();
        let height = match &root {
            None => 0,
            Some(r) => get_from_snapshot(&snap, r)
                .map_err(TreeError::from)?
                .ok_or_else(|| dangling_root(r))?
                .height() as u32,
        };
        let mut count: u64 = 0;
        for item in self.engine.iter_all(&snap) {
            item?;
            count += 1;
        }
        Ok(TreeStats {
            count,
            height,
            root_hash: self.root_hash_digest()?,
        })
    }

    /// Walks every reachable node checking BST order, AVL balance, height
    /// consistency, hash consistency, and parent back-references (spec.md
    /// §3, invariants 1-5; SPEC_FULL.md supplemented feature 5). Gated the
    /// same way as `TreeEngine::check_invariants`.
    #[cfg(any(test, feature = "self-check"))]
    pub fn check_invariants(&self) -> Result<(), Error> {
        let snap = self.engine.store().backing().snapshot();
        self.engine
            .check_invariants(&snap, self.current_root().as_ref())
            .map_err(Error::from)
    }
}

/// Disambiguates the generic `SearchOutcome` surfaced by `TreeEngine` for
/// callers who want the last-visited node on a miss (rare — most callers
/// use `get`/`contains_key`).
impl<S: BackingStore> Tree<S> {
    pub fn search(&self, key: &[u8]) -> Result<SearchOutcome, Error> {
        let snap = self.engine.store().backing().snapshot();
        Ok(self.engine.search(&snap, self.current_root().as_ref(), key)?)
    }
}

fn dangling_root(root: &[u8]) -> TreeError {
    TreeError::CorruptNode(format!(
        "root reference {} points to a missing node",
        hex::encode(root)
    ))
}

#[cfg(test)]
mod tests;
