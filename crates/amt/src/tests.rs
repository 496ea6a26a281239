// SPDX-License-Identifier: Apache-2.0

use amt_hash::{hash_parts, ZERO_DIGEST};
use proptest::prelude::*;

use crate::{Batch, BatchEntry, Error, MemoryBackingStore, Op, Selector, Tree};

fn fresh_tree() -> Tree<MemoryBackingStore> {
    Tree::open(MemoryBackingStore::new()).unwrap()
}

#[test]
fn s1_single_put_produces_expected_root_hash() {
    let tree = fresh_tree();
    tree.put(b"foo".to_vec(), b"bar".to_vec()).unwrap();

    assert_eq!(tree.get(b"foo").unwrap(), Some(b"bar".to_vec()));

    let expected_kv_hash = hash_parts(&[b"foo".as_slice(), b"bar".as_slice()]);
    let expected_root = hash_parts(&[ZERO_DIGEST.as_ref(), ZERO_DIGEST.as_ref(), expected_kv_hash.as_ref()]);
    assert_eq!(tree.root_hash_digest().unwrap(), Some(expected_root));
}

#[test]
fn s2_sequential_inserts_stay_balanced_and_ordered() {
    let tree = fresh_tree();
    for i in 0..1000u32 {
        tree.put(i.to_string().into_bytes(), b"v".to_vec()).unwrap();
    }
    tree.check_invariants().unwrap();

    let keys: Vec<_> = tree.iter_all().unwrap().into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys.len(), 1000);
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
    assert_eq!(keys.last().unwrap(), b"999");

    tree.put(b"888".to_vec(), b"lol".to_vec()).unwrap();
    assert_eq!(tree.get(b"888").unwrap(), Some(b"lol".to_vec()));
    tree.check_invariants().unwrap();
}

#[test]
fn s5_insert_then_delete_everything_empties_the_tree() {
    let keys: Vec<Vec<u8>> = [
        "m7", "a2", "zz", "q1", "b9", "k3", "x0", "c5", "d8", "e4", "f6", "g1", "h2", "i3", "j4",
        "l5", "n6", "o7", "p8", "root",
    ]
    .iter()
    .map(|s| s.as_bytes().to_vec())
    .collect();

    let tree = fresh_tree();
    for key in &keys {
        tree.put(key.clone(), b"v".to_vec()).unwrap();
    }
    for key in &keys {
        tree.delete(key).unwrap();
    }

    assert_eq!(tree.root_hash().unwrap(), None);
    assert_eq!(tree.stats().unwrap().count, 0);
}

#[test]
fn s6_duplicate_key_in_checked_batch_is_rejected_and_store_unchanged() {
    let tree = fresh_tree();
    tree.put(b"a".to_vec(), b"1".to_vec()).unwrap();

    let entries = vec![
        BatchEntry { key: b"b".to_vec(), op: Op::Put(b"2".to_vec()) },
        BatchEntry { key: b"b".to_vec(), op: Op::Put(b"3".to_vec()) },
    ];
    assert!(Batch::from_unsorted(entries).is_err());

    assert_eq!(tree.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(tree.get(b"b").unwrap(), None);
}

#[test]
fn delete_of_absent_key_surfaces_not_found() {
    let tree = fresh_tree();
    tree.put(b"a".to_vec(), b"1".to_vec()).unwrap();
    let err = tree.delete(b"z").unwrap_err();
    assert!(matches!(err, Error::Tree(amt_tree::TreeError::NotFound)));
}

#[test]
fn key_proof_round_trips_through_the_facade() {
    let tree = fresh_tree();
    for (k, v) in [("a", "1"), ("b", "2"), ("c", "3"), ("d", "4"), ("e", "5")] {
        tree.put(k.as_bytes().to_vec(), v.as_bytes().to_vec()).unwrap();
    }

    let root = tree.root_hash().unwrap().unwrap();
    let keys = vec![b"b".to_vec(), b"d".to_vec(), b"zz".to_vec()];
    let proof = tree.prove_keys(keys.clone()).unwrap();

    let tokens = crate::decode(&proof).unwrap();
    let out = crate::verify(amt_hash::Digest::from_bytes(root), &tokens, &Selector::Keys(keys)).unwrap();
    assert_eq!(out.get(b"b".as_slice()), Some(&b"2".to_vec()));
    assert_eq!(out.get(b"d".as_slice()), Some(&b"4".to_vec()));
    assert_eq!(out.get(b"zz".as_slice()), None);
}

#[test]
fn range_proof_round_trips_through_the_facade() {
    let tree = fresh_tree();
    for (k, v) in [("a", "1"), ("b", "2"), ("c", "3"), ("d", "4"), ("e", "5"), ("f", "6")] {
        tree.put(k.as_bytes().to_vec(), v.as_bytes().to_vec()).unwrap();
    }

    let root = tree.root_hash().unwrap().unwrap();
    let proof = tree.prove_range(b"b", b"d").unwrap();

    let tokens = crate::decode(&proof).unwrap();
    let out = crate::verify(
        amt_hash::Digest::from_bytes(root),
        &tokens,
        &Selector::Range { from: b"b".to_vec(), to: b"d".to_vec() },
    )
    .unwrap();
    assert_eq!(out.len(), 3);
    assert!(out.contains_key(b"b".as_slice()));
    assert!(out.contains_key(b"c".as_slice()));
    assert!(out.contains_key(b"d".as_slice()));
}

#[test]
fn bit_flip_in_a_stored_proof_fails_verification() {
    let tree = fresh_tree();
    for (k, v) in [("a", "1"), ("b", "2"), ("c", "3")] {
        tree.put(k.as_bytes().to_vec(), v.as_bytes().to_vec()).unwrap();
    }
    let root = tree.root_hash().unwrap().unwrap();
    let mut proof = tree.prove_keys(vec![b"b".to_vec()]).unwrap();
    *proof.last_mut().unwrap() ^= 0x01;

    let tokens = crate::decode(&proof);
    let result = tokens.and_then(|t| {
        crate::verify(amt_hash::Digest::from_bytes(root), &t, &Selector::Keys(vec![b"b".to_vec()]))
    });
    assert!(result.is_err());
}

#[test]
fn chunked_range_proof_reassembles_to_the_same_verified_result() {
    let tree = Tree::open_with(
        MemoryBackingStore::new(),
        amt_tree::TreeConfig { proof_chunk_size: 2, ..Default::default() },
        None,
    )
    .unwrap();
    for (k, v) in [
        ("a", "1"), ("b", "2"), ("c", "3"), ("d", "4"), ("e", "5"), ("f", "6"), ("g", "7"),
    ] {
        tree.put(k.as_bytes().to_vec(), v.as_bytes().to_vec()).unwrap();
    }

    let root = tree.root_hash().unwrap().unwrap();
    let whole = tree.prove_range(b"a", b"g").unwrap();
    let chunks = tree.prove_range_chunked(b"a", b"g").unwrap();
    assert!(chunks.len() > 1, "expected chunking to kick in at proof_chunk_size 2 for 7 keys");

    let reassembled: Vec<u8> = chunks.into_iter().flatten().collect();
    assert_eq!(reassembled, whole);

    let tokens = crate::decode(&reassembled).unwrap();
    let out = crate::verify(
        amt_hash::Digest::from_bytes(root),
        &tokens,
        &Selector::Range { from: b"a".to_vec(), to: b"g".to_vec() },
    )
    .unwrap();
    assert_eq!(out.len(), 7);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn apply_then_read_matches_sequential_application(
        keys in proptest::collection::vec("[a-f]{1,2}", 1..20),
    ) {
        let sequential = fresh_tree();
        for key in &keys {
            sequential.put(key.clone().into_bytes(), b"v".to_vec()).unwrap();
        }

        let batched = fresh_tree();
        let entries: Vec<_> = {
            let mut seen = std::collections::BTreeMap::new();
            for key in &keys {
                seen.insert(key.clone(), b"v".to_vec());
            }
            seen.into_iter()
                .map(|(k, v)| BatchEntry { key: k.into_bytes(), op: Op::Put(v) })
                .collect()
        };
        let batch = Batch::from_unsorted(entries).unwrap();
        batched.apply(batch).unwrap();

        for key in &keys {
            prop_assert_eq!(
                sequential.get(key.as_bytes()).unwrap(),
                batched.get(key.as_bytes()).unwrap()
            );
        }
        prop_assert_eq!(sequential.root_hash().unwrap(), batched.root_hash().unwrap());
    }
}
