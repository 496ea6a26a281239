// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use amt_hash::{hash_parts, Digest, ZERO_DIGEST};
use amt_store::memory::MemoryBackingStore;
use amt_store::{NodeRef, NodeStore};
use proptest::prelude::*;

use crate::batch::{Batch, BatchEntry, Op};
use crate::config::TreeConfig;
use crate::engine::{SearchOutcome, TreeEngine};
use crate::error::TreeError;

fn fresh_engine() -> TreeEngine<MemoryBackingStore> {
    let store = NodeStore::new(MemoryBackingStore::new(), None);
    TreeEngine::new(store, TreeConfig::default(), None)
}

fn root_hash<S: amt_store::BackingStore>(
    engine: &TreeEngine<S>,
    root: Option<&NodeRef>,
) -> Option<Digest> {
    let snap = engine.store().backing().snapshot();
    root.map(|r| {
        amt_store::store::get_from_snapshot(&snap, r)
            .unwrap()
            .unwrap()
            .node_hash
    })
}

#[test]
fn s1_single_put_produces_expected_root_hash() {
    let engine = fresh_engine();
    let mut tx = engine.store().begin();
    let root = engine
        .put(&mut tx, None, b"foo".to_vec(), b"bar".to_vec())
        .unwrap();
    tx.commit().unwrap();

    let snap = engine.store().backing().snapshot();
    assert_eq!(
        engine.get(&snap, Some(&root), b"foo").unwrap(),
        Some(b"bar".to_vec())
    );

    let expected_kv_hash = hash_parts(&[b"foo".as_slice(), b"bar".as_slice()]);
    let expected_root = hash_parts(&[
        ZERO_DIGEST.as_ref(),
        ZERO_DIGEST.as_ref(),
        expected_kv_hash.as_ref(),
    ]);
    assert_eq!(root_hash(&engine, Some(&root)), Some(expected_root));
}

#[test]
fn s2_sequential_inserts_stay_balanced_and_ordered() {
    let engine = fresh_engine();
    let mut tx = engine.store().begin();
    let mut root = None;
    for i in 0..1000u32 {
        root = Some(
            engine
                .put(&mut tx, root.take(), i.to_string().into_bytes(), b"v".to_vec())
                .unwrap(),
        );
    }
    tx.commit().unwrap();

    let snap = engine.store().backing().snapshot();
    engine.check_invariants(&snap, root.as_ref()).unwrap();

    let keys: Vec<_> = engine
        .iter_from(&snap, b"")
        .map(|r| r.unwrap().0)
        .collect();
    assert_eq!(keys.len(), 1000);
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted, "iteration must be in ascending key order");
    assert_eq!(keys.last().unwrap(), b"999");

    let mut tx = engine.store().begin();
    let root = engine
        .put(&mut tx, root, b"888".to_vec(), b"lol".to_vec())
        .unwrap();
    tx.commit().unwrap();

    let snap = engine.store().backing().snapshot();
    assert_eq!(
        engine.get(&snap, Some(&root), b"888").unwrap(),
        Some(b"lol".to_vec())
    );
    engine.check_invariants(&snap, Some(&root)).unwrap();
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

    let engine = fresh_engine();
    let mut root = None;
    for key in &keys {
        let mut tx = engine.store().begin();
        root = Some(engine.put(&mut tx, root.take(), key.clone(), b"v".to_vec()).unwrap());
        tx.commit().unwrap();
    }

    for key in &keys {
        let mut tx = engine.store().begin();
        root = engine.delete(&mut tx, root.take(), key).unwrap();
        tx.commit().unwrap();
    }

    assert!(root.is_none());
    assert_eq!(root_hash(&engine, root.as_ref()), None);
}

#[test]
fn s6_duplicate_key_in_checked_batch_is_rejected_and_store_unchanged() {
    let engine = fresh_engine();
    let mut tx = engine.store().begin();
    let root = engine
        .put(&mut tx, None, b"a".to_vec(), b"1".to_vec())
        .unwrap();
    tx.commit().unwrap();

    let entries = vec![
        BatchEntry { key: b"b".to_vec(), op: Op::Put(b"2".to_vec()) },
        BatchEntry { key: b"b".to_vec(), op: Op::Put(b"3".to_vec()) },
    ];
    let err = Batch::from_unsorted(entries).unwrap_err();
    assert!(matches!(err, TreeError::InvalidBatch(_)));

    // The rejection happens before any transaction is opened, so the store
    // holding "a" is untouched.
    let snap = engine.store().backing().snapshot();
    assert_eq!(engine.get(&snap, Some(&root), b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(engine.get(&snap, Some(&root), b"b").unwrap(), None);
}

#[test]
fn delete_of_absent_key_is_not_found() {
    let engine = fresh_engine();
    let mut tx = engine.store().begin();
    let root = engine
        .put(&mut tx, None, b"a".to_vec(), b"1".to_vec())
        .unwrap();
    tx.commit().unwrap();

    let mut tx = engine.store().begin();
    let err = engine.delete(&mut tx, Some(root), b"z").unwrap_err();
    assert!(matches!(err, TreeError::NotFound));
}

#[test]
fn apply_matches_sequential_single_key_application() {
    let sequential_engine = fresh_engine();
    let mut seq_root = None;
    let ops: Vec<(&str, Option<&str>)> = vec![
        ("b", Some("1")),
        ("d", Some("2")),
        ("a", Some("3")),
        ("c", Some("4")),
        ("b", None), // delete
    ];
    for (key, value) in &ops {
        let mut tx = sequential_engine.store().begin();
        seq_root = match value {
            Some(v) => Some(
                sequential_engine
                    .put(&mut tx, seq_root.take(), key.as_bytes().to_vec(), v.as_bytes().to_vec())
                    .unwrap(),
            ),
            None => sequential_engine.delete(&mut tx, seq_root.take(), key.as_bytes()).unwrap(),
        };
        tx.commit().unwrap();
    }

    let batch_engine = fresh_engine();
    let mut tx = batch_engine.store().begin();
    let root = batch_engine
        .put(&mut tx, None, b"b".to_vec(), b"1".to_vec())
        .unwrap();
    tx.commit().unwrap();

    let entries = vec![
        BatchEntry { key: b"a".to_vec(), op: Op::Put(b"3".to_vec()) },
        BatchEntry { key: b"b".to_vec(), op: Op::Delete },
        BatchEntry { key: b"c".to_vec(), op: Op::Put(b"4".to_vec()) },
        BatchEntry { key: b"d".to_vec(), op: Op::Put(b"2".to_vec()) },
    ];
    let batch = Batch::from_unsorted(entries).unwrap();
    let snap = batch_engine.store().backing().snapshot();
    let mut tx = batch_engine.store().begin();
    let new_root = batch_engine.apply(&mut tx, &snap, Some(root), batch).unwrap();
    tx.commit().unwrap();

    let seq_snap = sequential_engine.store().backing().snapshot();
    let batch_snap = batch_engine.store().backing().snapshot();
    for key in ["a", "b", "c", "d"] {
        assert_eq!(
            sequential_engine.get(&seq_snap, seq_root.as_ref(), key.as_bytes()).unwrap(),
            batch_engine.get(&batch_snap, new_root.as_ref(), key.as_bytes()).unwrap(),
            "key {key} disagrees between sequential and batch application"
        );
    }
    assert_eq!(root_hash(&sequential_engine, seq_root.as_ref()), root_hash(&batch_engine, new_root.as_ref()));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn put_delete_matches_reference_map(ops in proptest::collection::vec(
        (proptest::sample::select(vec!["a","b","c","d","e","f","g","h"]), proptest::bool::ANY),
        1..80,
    )) {
        let engine = fresh_engine();
        let mut root = None;
        let mut reference: BTreeMap<&str, Vec<u8>> = BTreeMap::new();

        for (key, is_put) in &ops {
            let mut tx = engine.store().begin();
            if *is_put {
                root = Some(engine.put(&mut tx, root.take(), key.as_bytes().to_vec(), b"v".to_vec()).unwrap());
                reference.insert(key, b"v".to_vec());
            } else {
                match engine.delete(&mut tx, root.take(), key.as_bytes()) {
                    Ok(new_root) => { root = new_root; reference.remove(key); }
                    Err(TreeError::NotFound) => { prop_assert!(!reference.contains_key(key)); }
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
            tx.commit().unwrap();

            let snap = engine.store().backing().snapshot();
            engine.check_invariants(&snap, root.as_ref()).unwrap();
        }

        let snap = engine.store().backing().snapshot();
        for key in ["a","b","c","d","e","f","g","h"] {
            let expected = reference.get(key).cloned();
            let actual = engine.get(&snap, root.as_ref(), key.as_bytes()).unwrap();
            prop_assert_eq!(expected, actual);
        }
    }

    #[test]
    fn root_hash_is_order_independent(mut keys in proptest::collection::vec("[a-d]{1,2}", 1..12)) {
        keys.sort();
        keys.dedup();

        let forward = fresh_engine();
        let mut forward_root = None;
        for key in &keys {
            let mut tx = forward.store().begin();
            forward_root = Some(forward.put(&mut tx, forward_root.take(), key.clone().into_bytes(), b"v".to_vec()).unwrap());
            tx.commit().unwrap();
        }

        let reversed = fresh_engine();
        let mut reversed_root = None;
        for key in keys.iter().rev() {
            let mut tx = reversed.store().begin();
            reversed_root = Some(reversed.put(&mut tx, reversed_root.take(), key.clone().into_bytes(), b"v".to_vec()).unwrap());
            tx.commit().unwrap();
        }

        prop_assert_eq!(
            root_hash(&forward, forward_root.as_ref()),
            root_hash(&reversed, reversed_root.as_ref())
        );
    }
}
