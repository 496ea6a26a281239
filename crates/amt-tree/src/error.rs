// SPDX-License-Identifier: Apache-2.0

//! The data plane's user-facing error enum (spec.md §7).

use amt_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("key not found")]
    NotFound,

    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    #[error("corrupt node: {0}")]
    CorruptNode(String),

    #[error("invariant violated at node {node}: {detail}")]
    InvariantViolated { node: String, detail: String },

    #[error("backing store error: {0}")]
    BackingStore(#[from] anyhow::Error),

    #[error("operation cancelled")]
    Cancelled,
}

/// `StoreError` is split between `CorruptNode` (a codec-level problem) and
/// `BackingStore` (the dependency itself failed) rather than wrapped whole,
/// so callers can match on the two differently per spec.md §7.
impl From<StoreError> for TreeError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::CorruptNode(msg) => TreeError::CorruptNode(msg),
            StoreError::Backing(err) => TreeError::BackingStore(err),
        }
    }
}

impl TreeError {
    pub(crate) fn dangling(key: &[u8]) -> Self {
        TreeError::CorruptNode(format!("dangling node reference {}", hex::encode(key)))
    }

    pub(crate) fn invariant(node: &[u8], detail: impl Into<String>) -> Self {
        TreeError::InvariantViolated {
            node: hex::encode(node),
            detail: detail.into(),
        }
    }
}
