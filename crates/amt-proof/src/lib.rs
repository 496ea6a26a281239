// SPDX-License-Identifier: Apache-2.0

//! The proof engine (spec.md §4.5): a compact, stack-based token grammar
//! for proving a key set or a contiguous range against a tree's root hash,
//! plus pure verification that never touches the backing store.
//!
//! Generation (`gen_key_proof`/`gen_range_proof`) flattens the sparse
//! `amt_tree::Branch` the tree engine already knows how to carve out;
//! verification (`verify`) replays the token stream against a stack
//! machine and checks the resulting root hash.

mod error;
mod generate;
mod token;
mod verify;

pub use error::ProofError;
pub use generate::{chunk_tokens, gen_key_proof, gen_range_proof};
pub use token::{decode, encode, ProofToken};
pub use verify::{verify, Selector};
