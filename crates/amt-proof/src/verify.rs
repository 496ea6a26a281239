// SPDX-License-Identifier: Apache-2.0

//! Stack-based proof verification (spec.md §4.5.3). Pure: takes only the
//! expected root hash, the token stream, and the selector the proof claims
//! to answer — no store access.

use std::collections::BTreeMap;

use amt_hash::{Digest, ZERO_DIGEST};
use amt_store::node::{kv_hash, node_hash};

use crate::error::ProofError;
use crate::token::ProofToken;

/// What the caller asked `gen_*_proof` to prove, carried alongside the
/// proof so `verify` can restrict its output and check range brackets.
#[derive(Debug, Clone)]
pub enum Selector {
    Keys(Vec<Vec<u8>>),
    Range { from: Vec<u8>, to: Vec<u8> },
}

/// A partial node materialized on the verifier's stack. `kv_hash` is `None`
/// for a `PushHash` entry: an opaque, already-closed subtree that can never
/// itself receive a `Parent`/`Child` attach.
struct StackNode {
    kv: Option<(Vec<u8>, Vec<u8>)>,
    kv_hash: Option<Digest>,
    left_hash: Digest,
    right_hash: Digest,
    left_set: bool,
    right_set: bool,
    node_hash: Digest,
}

impl StackNode {
    fn push_hash(h: Digest) -> Self {
        Self {
            kv: None,
            kv_hash: None,
            left_hash: ZERO_DIGEST,
            right_hash: ZERO_DIGEST,
            left_set: false,
            right_set: false,
            node_hash: h,
        }
    }

    fn push_kv_hash(h: Digest) -> Self {
        Self {
            kv: None,
            kv_hash: Some(h),
            left_hash: ZERO_DIGEST,
            right_hash: ZERO_DIGEST,
            left_set: false,
            right_set: false,
            node_hash: node_hash(&ZERO_DIGEST, &ZERO_DIGEST, &h),
        }
    }

    fn push_kv(key: Vec<u8>, value: Vec<u8>) -> Self {
        let kvh = kv_hash(&key, &value);
        Self {
            kv: Some((key, value)),
            kv_hash: Some(kvh),
            left_hash: ZERO_DIGEST,
            right_hash: ZERO_DIGEST,
            left_set: false,
            right_set: false,
            node_hash: node_hash(&ZERO_DIGEST, &ZERO_DIGEST, &kvh),
        }
    }

    fn attach_left(&mut self, child_hash: Digest) -> Result<(), ProofError> {
        let kvh = self.kv_hash.ok_or(ProofError::ChildOverwrite)?;
        if self.left_set {
            return Err(ProofError::ChildOverwrite);
        }
        self.left_hash = child_hash;
        self.left_set = true;
        self.node_hash = node_hash(&self.left_hash, &self.right_hash, &kvh);
        Ok(())
    }

    fn attach_right(&mut self, child_hash: Digest) -> Result<(), ProofError> {
        let kvh = self.kv_hash.ok_or(ProofError::ChildOverwrite)?;
        if self.right_set {
            return Err(ProofError::ChildOverwrite);
        }
        self.right_hash = child_hash;
        self.right_set = true;
        self.node_hash = node_hash(&self.left_hash, &self.right_hash, &kvh);
        Ok(())
    }
}

pub fn verify(
    expected_root: Digest,
    tokens: &[ProofToken],
    selector: &Selector,
) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, ProofError> {
    if tokens.is_empty() {
        // An empty tree has no proof to walk; the caller proves emptiness by
        // pairing a zero-length token stream with the zero-digest root.
        return if expected_root == ZERO_DIGEST {
            Ok(BTreeMap::new())
        } else {
            Err(ProofError::RootMismatch)
        };
    }

    let mut stack: Vec<StackNode> = Vec::new();
    let mut results = BTreeMap::new();

    for token in tokens {
        match token {
            ProofToken::PushHash(h) => stack.push(StackNode::push_hash(*h)),
            ProofToken::PushKvHash(h) => stack.push(StackNode::push_kv_hash(*h)),
            ProofToken::PushKv(k, v) => {
                results.insert(k.clone(), v.clone());
                stack.push(StackNode::push_kv(k.clone(), v.clone()));
            }
            ProofToken::Parent => {
                let child = stack.pop().ok_or(ProofError::Underflow)?;
                let mut parent = stack.pop().ok_or(ProofError::Underflow)?;
                parent.attach_left(child.node_hash)?;
                stack.push(parent);
            }
            ProofToken::Child => {
                let child = stack.pop().ok_or(ProofError::Underflow)?;
                let mut parent = stack.pop().ok_or(ProofError::Underflow)?;
                parent.attach_right(child.node_hash)?;
                stack.push(parent);
            }
        }
    }

    if stack.len() != 1 {
        return Err(ProofError::Unfinished(stack.len()));
    }
    let root = stack.pop().unwrap();
    if root.node_hash != expected_root {
        return Err(ProofError::RootMismatch);
    }

    match selector {
        Selector::Keys(keys) => {
            results.retain(|k, _| keys.iter().any(|wanted| wanted == k));
        }
        Selector::Range { from, to } => {
            check_range_brackets(tokens, from, to)?;
            results.retain(|k, _| k.as_slice() >= from.as_slice() && k.as_slice() <= to.as_slice());
        }
    }

    Ok(results)
}

/// The first and last key-bearing nodes in the stream must bracket the
/// range (spec.md §4.5.3): if the proven edge key is strictly inside
/// `[from, to]`, the node just outside that edge must appear explicitly as
/// `PushKvHash`, not be folded away into an opaque `PushHash`.
fn check_range_brackets(tokens: &[ProofToken], from: &[u8], to: &[u8]) -> Result<(), ProofError> {
    let kv_positions: Vec<(usize, &[u8])> = tokens
        .iter()
        .enumerate()
        .filter_map(|(i, t)| match t {
            ProofToken::PushKv(k, _) => Some((i, k.as_slice())),
            _ => None,
        })
        .collect();

    if let Some(&(first_idx, first_key)) = kv_positions.first() {
        if first_key > from
            && !tokens[..first_idx]
                .iter()
                .any(|t| matches!(t, ProofToken::PushKvHash(_)))
        {
            return Err(ProofError::RangeGap("left"));
        }
    }
    if let Some(&(last_idx, last_key)) = kv_positions.last() {
        if last_key < to
            && !tokens[last_idx + 1..]
                .iter()
                .any(|t| matches!(t, ProofToken::PushKvHash(_)))
        {
            return Err(ProofError::RangeGap("right"));
        }
    }
    Ok(())
}
