// SPDX-License-Identifier: Apache-2.0

//! The proof engine's error enum (spec.md §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProofError {
    #[error("proof root hash does not match the expected root")]
    RootMismatch,

    #[error("proof stack underflowed")]
    Underflow,

    #[error("attempted to attach a child into an already-occupied slot")]
    ChildOverwrite,

    #[error("proof ended with {0} elements on the stack, expected exactly 1")]
    Unfinished(usize),

    #[error("range proof does not bracket the requested range at the {0} edge")]
    RangeGap(&'static str),

    #[error("malformed proof encoding: {0}")]
    Malformed(String),

    #[error("tree error: {0}")]
    Tree(#[from] amt_tree::TreeError),
}
