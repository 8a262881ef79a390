use std::sync::Arc;

use pchaind_storage::memory::MemoryStore;
use pchaind_storage::{Column, KeyValueStore, WriteBatch};
use pchaind_trie::{build_trie, empty_root_hash, NodeIterator, TrieError, WalkedNode};

fn seed(store: &MemoryStore, entries: Vec<(Vec<u8>, Vec<u8>)>) -> [u8; 32] {
    let mut batch = WriteBatch::new();
    let root = build_trie(&mut batch, entries).expect("build");
    store.write_batch(&batch).expect("commit");
    root
}

#[test]
fn empty_trie_yields_nothing() {
    let store = MemoryStore::new();
    let mut batch = WriteBatch::new();
    let root = build_trie(&mut batch, Vec::new()).expect("build");
    assert_eq!(root, empty_root_hash());
    assert_eq!(batch.len(), 0);

    assert_eq!(NodeIterator::new(&store, root).count(), 0);
}

#[test]
fn single_entry_trie_is_one_leaf() {
    let store = MemoryStore::new();
    let root = seed(&store, vec![(vec![0xab, 0xcd], b"v".to_vec())]);

    let nodes: Vec<_> = NodeIterator::new(&store, root)
        .collect::<Result<_, _>>()
        .expect("walk");
    assert_eq!(nodes.len(), 1);
    match &nodes[0] {
        WalkedNode::Leaf { key, value, .. } => {
            assert_eq!(key, &vec![0xab, 0xcd]);
            assert_eq!(value, &b"v".to_vec());
        }
        other => panic!("expected leaf, got {other:?}"),
    }
}

#[test]
fn walk_is_preorder_with_leaves_in_key_order() {
    let store = MemoryStore::new();
    // Keys diverge on the first nibble: 0x1_, 0x2_, 0xf_.
    let root = seed(
        &store,
        vec![
            (vec![0xf0, 0x00], b"c".to_vec()),
            (vec![0x10, 0x00], b"a".to_vec()),
            (vec![0x20, 0x00], b"b".to_vec()),
        ],
    );

    let nodes: Vec<_> = NodeIterator::new(&store, root)
        .collect::<Result<_, _>>()
        .expect("walk");
    // Root branch first, then the three leaves in ascending key order.
    assert_eq!(nodes.len(), 4);
    match &nodes[0] {
        WalkedNode::Internal { hash, .. } => assert_eq!(*hash, root),
        other => panic!("expected root branch, got {other:?}"),
    }
    let leaf_values: Vec<_> = nodes[1..]
        .iter()
        .map(|node| match node {
            WalkedNode::Leaf { value, .. } => value.clone(),
            other => panic!("expected leaf, got {other:?}"),
        })
        .collect();
    assert_eq!(leaf_values, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
}

#[test]
fn shared_prefix_produces_branch_chain() {
    let store = MemoryStore::new();
    // Diverge only at the fourth nibble.
    let root = seed(
        &store,
        vec![
            (vec![0x11, 0x12], b"x".to_vec()),
            (vec![0x11, 0x1f], b"y".to_vec()),
        ],
    );

    let nodes: Vec<_> = NodeIterator::new(&store, root)
        .collect::<Result<_, _>>()
        .expect("walk");
    let internal = nodes
        .iter()
        .filter(|node| matches!(node, WalkedNode::Internal { .. }))
        .count();
    let leaves = nodes.len() - internal;
    assert_eq!(leaves, 2);
    // One branch per shared nibble plus the diverging one.
    assert_eq!(internal, 4);
}

#[test]
fn missing_node_aborts_walk() {
    let store = Arc::new(MemoryStore::new());
    let root = seed(
        &store,
        vec![
            (vec![0x10], b"a".to_vec()),
            (vec![0x20], b"b".to_vec()),
            (vec![0x30], b"c".to_vec()),
        ],
    );

    // Find a leaf hash and delete it out from under the walker.
    let victim = NodeIterator::new(store.as_ref(), root)
        .filter_map(|node| match node {
            Ok(WalkedNode::Leaf { hash, .. }) => Some(hash),
            _ => None,
        })
        .next()
        .expect("leaf");
    store.delete(Column::State, &victim).expect("delete");

    let mut iter = NodeIterator::new(store.as_ref(), root);
    let mut saw_missing = false;
    for node in &mut iter {
        match node {
            Ok(_) => {}
            Err(TrieError::NodeMissing(hash)) => {
                assert_eq!(hash, victim);
                saw_missing = true;
            }
            Err(other) => panic!("unexpected error {other}"),
        }
    }
    assert!(saw_missing);
    // Iterator is spent after the failure.
    assert!(iter.next().is_none());
}

#[test]
fn build_rejects_bad_keys() {
    let mut batch = WriteBatch::new();
    let err = build_trie(
        &mut batch,
        vec![(vec![0x01], b"a".to_vec()), (vec![0x01], b"b".to_vec())],
    )
    .expect_err("duplicate");
    assert!(matches!(err, TrieError::DuplicateKey(_)));

    let mut batch = WriteBatch::new();
    let err = build_trie(
        &mut batch,
        vec![(vec![0x01], b"a".to_vec()), (vec![0x01, 0x02], b"b".to_vec())],
    )
    .expect_err("prefix");
    assert!(matches!(err, TrieError::KeyIsPrefix(_)));
}

#[test]
fn identical_content_has_identical_root() {
    let store_a = MemoryStore::new();
    let store_b = MemoryStore::new();
    let entries = vec![
        (vec![0x51, 0x01], b"one".to_vec()),
        (vec![0x52, 0x02], b"two".to_vec()),
    ];
    let root_a = seed(&store_a, entries.clone());
    let root_b = seed(&store_b, entries);
    assert_eq!(root_a, root_b);
}
