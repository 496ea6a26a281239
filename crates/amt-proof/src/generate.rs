// SPDX-License-Identifier: Apache-2.0

//! Flattens an `amt_tree::Branch` (the sparse proof tree the tree engine
//! already knows how to materialize, spec.md §4.4.5/§4.5.4/§4.5.5) into the
//! stack-based token grammar `verify` consumes.
//!
//! The tree engine's `Branch::{Hash, KvHash, Kv}` already IS the minimal
//! proof structure for either a key set or a contiguous range — key-set vs.
//! range generation differ only in how that `Branch` was carved out
//! (`TreeEngine::branch_keys` vs `TreeEngine::branch_range`), not in how it
//! is flattened to tokens.

use amt_tree::{Branch, TreeMetrics};

use crate::token::ProofToken;

/// Flattens `branch` bottom-up: `Parent` closes the left subtree, `Child`
/// closes the right, mirroring `verify`'s stack machine exactly.
pub fn flatten(branch: &Branch) -> Vec<ProofToken> {
    let mut out = Vec::new();
    flatten_into(branch, &mut out);
    out
}

fn flatten_into(branch: &Branch, out: &mut Vec<ProofToken>) {
    match branch {
        Branch::Hash(h) => out.push(ProofToken::PushHash(*h)),
        Branch::KvHash { kv_hash, left, right } => {
            out.push(ProofToken::PushKvHash(*kv_hash));
            flatten_into(left, out);
            out.push(ProofToken::Parent);
            flatten_into(right, out);
            out.push(ProofToken::Child);
        }
        Branch::Kv { key, value, left, right } => {
            out.push(ProofToken::PushKv(key.clone(), value.clone()));
            flatten_into(left, out);
            out.push(ProofToken::Parent);
            flatten_into(right, out);
            out.push(ProofToken::Child);
        }
    }
}

/// Key-set proof generation (spec.md §4.5.4): `branch` must come from
/// `TreeEngine::branch_keys`. `None` means the tree is empty.
pub fn gen_key_proof(branch: Option<&Branch>, metrics: Option<&TreeMetrics>) -> Vec<ProofToken> {
    let tokens = match branch {
        None => Vec::new(),
        Some(b) => flatten(b),
    };
    record_tokens_emitted(metrics, "keys", tokens.len());
    tokens
}

/// Range proof generation (spec.md §4.5.5): `branch` must come from
/// `TreeEngine::branch_range`. `None` means the tree is empty.
pub fn gen_range_proof(branch: Option<&Branch>, metrics: Option<&TreeMetrics>) -> Vec<ProofToken> {
    let tokens = match branch {
        None => Vec::new(),
        Some(b) => flatten(b),
    };
    record_tokens_emitted(metrics, "range", tokens.len());
    tokens
}

fn record_tokens_emitted(metrics: Option<&TreeMetrics>, selector: &str, count: usize) {
    if let Some(metrics) = metrics {
        metrics
            .proof_tokens_emitted
            .with_label_values(&[selector])
            .inc_by(count as u64);
    }
}

/// Splits a flattened token stream into chunks of at most `chunk_size`
/// proof-bearing nodes (`PushHash`/`PushKvHash`/`PushKv`) each — the
/// `Parent`/`Child` control tokens that close a node stay in the chunk that
/// opened it. Concatenating the chunks in order reproduces `tokens` exactly,
/// so this only bounds how much of a range proof a caller must hold in
/// memory at once while serializing it (`TreeConfig::proof_chunk_size`,
/// spec.md §4.5.5); it does not change what the proof proves. `chunk_size ==
/// 0` disables chunking (a single chunk holding every token).
pub fn chunk_tokens(tokens: Vec<ProofToken>, chunk_size: usize) -> Vec<Vec<ProofToken>> {
    if chunk_size == 0 {
        return vec![tokens];
    }

    let mut chunks = Vec::new();
    let mut current = Vec::new();
    let mut nodes_in_chunk = 0usize;

    for token in tokens {
        let is_node = matches!(
            token,
            ProofToken::PushHash(_) | ProofToken::PushKvHash(_) | ProofToken::PushKv(_, _)
        );
        if is_node && nodes_in_chunk == chunk_size {
            chunks.push(std::mem::take(&mut current));
            nodes_in_chunk = 0;
        }
        if is_node {
            nodes_in_chunk += 1;
        }
        current.push(token);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::{verify, Selector};
    use amt_hash::ZERO_DIGEST;
    use amt_store::memory::MemoryBackingStore;
    use amt_store::NodeStore;
    use amt_tree::{Batch, BatchEntry, Op, TreeConfig, TreeEngine};

    fn build_tree(pairs: &[(&str, &str)]) -> (TreeEngine<MemoryBackingStore>, Option<Vec<u8>>) {
        let store = NodeStore::new(MemoryBackingStore::new(), None);
        let engine = TreeEngine::new(store, TreeConfig::default(), None);
        let entries = pairs
            .iter()
            .map(|(k, v)| BatchEntry {
                key: k.as_bytes().to_vec(),
                op: Op::Put(v.as_bytes().to_vec()),
            })
            .collect();
        let batch = Batch::from_unsorted(entries).unwrap();
        let snap = engine.store().backing().snapshot();
        let mut tx = engine.store().begin();
        let root = engine.apply(&mut tx, &snap, None, batch).unwrap();
        tx.commit().unwrap();
        (engine, root)
    }

    #[test]
    fn key_proof_round_trips_present_and_absent_keys() {
        let (engine, root) = build_tree(&[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]);
        let snap = engine.store().backing().snapshot();
        let expected_root = root
            .as_ref()
            .map(|r| amt_store::store::get_from_snapshot(&snap, r).unwrap().unwrap().node_hash)
            .unwrap_or(ZERO_DIGEST);

        let keys = vec![b"b".to_vec(), b"z".to_vec()];
        let branch = engine.branch_keys(&snap, root.as_ref(), &keys).unwrap();
        let tokens = gen_key_proof(branch.as_ref(), None);

        let out = verify(expected_root, &tokens, &Selector::Keys(keys)).unwrap();
        assert_eq!(out.get(b"b".as_slice()), Some(&b"2".to_vec()));
        assert_eq!(out.get(b"z".as_slice()), None);
    }

    #[test]
    fn range_proof_round_trips_and_excludes_out_of_range_keys() {
        let (engine, root) = build_tree(&[
            ("a", "1"), ("b", "2"), ("c", "3"), ("d", "4"), ("e", "5"), ("f", "6"),
        ]);
        let snap = engine.store().backing().snapshot();
        let expected_root = root
            .as_ref()
            .map(|r| amt_store::store::get_from_snapshot(&snap, r).unwrap().unwrap().node_hash)
            .unwrap_or(ZERO_DIGEST);

        let branch = engine
            .branch_range(&snap, root.as_ref(), b"b", b"d")
            .unwrap();
        let tokens = gen_range_proof(branch.as_ref(), None);

        let out = verify(
            expected_root,
            &tokens,
            &Selector::Range { from: b"b".to_vec(), to: b"d".to_vec() },
        )
        .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.get(b"b".as_slice()), Some(&b"2".to_vec()));
        assert_eq!(out.get(b"c".as_slice()), Some(&b"3".to_vec()));
        assert_eq!(out.get(b"d".as_slice()), Some(&b"4".to_vec()));
        assert!(!out.contains_key(b"a".as_slice()));
        assert!(!out.contains_key(b"e".as_slice()));
    }

    #[test]
    fn bit_flip_in_encoded_value_fails_verification() {
        let key = b"foo".to_vec();
        let value = b"bar".to_vec();
        let kvh = amt_hash::hash_parts(&[key.as_slice(), value.as_slice()]);
        let expected_root = amt_hash::hash_parts(&[ZERO_DIGEST.as_ref(), ZERO_DIGEST.as_ref(), kvh.as_ref()]);

        let tokens = vec![ProofToken::PushKv(key.clone(), value)];
        let mut bytes = crate::token::encode(&tokens);
        // Encoding ends with the value's raw bytes, so flipping the last
        // byte corrupts only the value's content, not the length prefixes.
        *bytes.last_mut().unwrap() ^= 0x01;
        let flipped = crate::token::decode(&bytes).unwrap();

        let result = verify(expected_root, &flipped, &Selector::Keys(vec![key]));
        assert!(matches!(result, Err(crate::error::ProofError::RootMismatch)));
    }

    #[test]
    fn chunk_tokens_reassembles_to_the_original_stream() {
        let (engine, root) = build_tree(&[
            ("a", "1"), ("b", "2"), ("c", "3"), ("d", "4"), ("e", "5"), ("f", "6"), ("g", "7"),
        ]);
        let snap = engine.store().backing().snapshot();
        let branch = engine
            .branch_range(&snap, root.as_ref(), b"a", b"g")
            .unwrap();
        let tokens = gen_range_proof(branch.as_ref(), None);

        let chunks = chunk_tokens(tokens.clone(), 2);
        assert!(chunks.len() > 1, "expected more than one chunk for 7 keys at chunk_size 2");
        for chunk in &chunks {
            let nodes = chunk
                .iter()
                .filter(|t| {
                    matches!(t, ProofToken::PushHash(_) | ProofToken::PushKvHash(_) | ProofToken::PushKv(_, _))
                })
                .count();
            assert!(nodes <= 2);
        }
        let reassembled: Vec<ProofToken> = chunks.into_iter().flatten().collect();
        assert_eq!(reassembled, tokens);
    }

    #[test]
    fn chunk_tokens_with_zero_size_returns_a_single_chunk() {
        let tokens = vec![ProofToken::PushHash(ZERO_DIGEST)];
        let chunks = chunk_tokens(tokens.clone(), 0);
        assert_eq!(chunks, vec![tokens]);
    }

    #[test]
    fn empty_tree_key_proof_is_empty_and_verifies_against_zero_root() {
        let store = NodeStore::new(MemoryBackingStore::new(), None);
        let engine = TreeEngine::new(store, TreeConfig::default(), None);
        let snap = engine.store().backing().snapshot();
        let branch = engine.branch_keys(&snap, None, &[b"x".to_vec()]).unwrap();
        assert!(branch.is_none());
        let tokens = gen_key_proof(branch.as_ref(), None);
        assert!(tokens.is_empty());
        let out = verify(ZERO_DIGEST, &tokens, &Selector::Keys(vec![b"x".to_vec()])).unwrap();
        assert!(out.is_empty());
    }
}
