// SPDX-License-Identifier: Apache-2.0

//! The node codec and node store: a thin layer over a pluggable backing
//! key/value store (out of scope per the design — see `BackingStore`) that
//! converts "not found" into a typed absent result and namespaces keys with
//! a single-byte prefix (`n` for nodes, `:` for meta-keys).

pub mod backing;
pub mod memory;
pub mod metrics;
pub mod node;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod store;

pub use amt_hash::Digest;
pub use backing::{BackingStore, Snapshot, WriteBatch};
pub use memory::MemoryBackingStore;
pub use node::{Node, NodeRef, StoreError};
pub use store::{NodeStore, StoreTransaction};
