use std::sync::Arc;

use pchaind_chainstate::genesis::{setup_genesis, GenesisError, GenesisSpec};
use pchaind_chainstate::index::ChainIndex;
use pchaind_storage::memory::MemoryStore;

const SPEC_JSON: &str = r#"{
  "name": "testchain",
  "chain_id": 7,
  "timestamp": 1500000000,
  "alloc": {
    "0x00000000000000000000000000000000000000aa": { "balance": "1000000000000", "nonce": 1 },
    "0x00000000000000000000000000000000000000bb": { "balance": "5" }
  }
}"#;

fn spec() -> GenesisSpec {
    GenesisSpec::from_json(SPEC_JSON.as_bytes()).expect("decode spec")
}

#[test]
fn genesis_is_idempotent() {
    let index = ChainIndex::new(Arc::new(MemoryStore::new()));
    let first = setup_genesis(&index, &spec()).expect("first setup");
    let second = setup_genesis(&index, &spec()).expect("second setup");
    assert_eq!(first, second);

    let block = index.block_by_height(0).expect("get").expect("genesis");
    assert_eq!(block.hash(), first);
    assert_eq!(block.header.height, 0);
}

#[test]
fn genesis_hash_matches_across_databases() {
    let full = ChainIndex::new(Arc::new(MemoryStore::new()));
    let light = ChainIndex::new(Arc::new(MemoryStore::new()));
    let full_hash = setup_genesis(&full, &spec()).expect("full");
    let light_hash = setup_genesis(&light, &spec()).expect("light");
    assert_eq!(full_hash, light_hash);
}

#[test]
fn mismatched_genesis_is_rejected() {
    let index = ChainIndex::new(Arc::new(MemoryStore::new()));
    setup_genesis(&index, &spec()).expect("setup");

    let mut other = spec();
    other.timestamp += 1;
    match setup_genesis(&index, &other) {
        Err(GenesisError::Mismatch { stored, computed }) => assert_ne!(stored, computed),
        other => panic!("expected mismatch, got {other:?}"),
    }
}

#[test]
fn bad_alloc_entries_are_spec_errors() {
    let index = ChainIndex::new(Arc::new(MemoryStore::new()));

    let mut bad_address = spec();
    let account = bad_address.alloc["0x00000000000000000000000000000000000000aa"].clone();
    bad_address
        .alloc
        .insert("0xnotanaddress".to_string(), account);
    assert!(matches!(
        setup_genesis(&index, &bad_address),
        Err(GenesisError::Spec(_))
    ));

    let mut bad_balance = spec();
    if let Some(account) = bad_balance
        .alloc
        .get_mut("0x00000000000000000000000000000000000000aa")
    {
        account.balance = "lots".to_string();
    }
    assert!(matches!(
        setup_genesis(&index, &bad_balance),
        Err(GenesisError::Spec(_))
    ));

    // Nothing was initialized by the failed attempts above on a fresh store.
    let fresh = ChainIndex::new(Arc::new(MemoryStore::new()));
    assert!(matches!(
        setup_genesis(&fresh, &bad_balance),
        Err(GenesisError::Spec(_))
    ));
    assert!(fresh.best_block().expect("best").is_none());
}

#[test]
fn empty_alloc_is_valid() {
    let index = ChainIndex::new(Arc::new(MemoryStore::new()));
    let spec = GenesisSpec::from_json(
        r#"{ "name": "bare", "chain_id": 1, "alloc": {} }"#.as_bytes(),
    )
    .expect("decode");
    let hash = setup_genesis(&index, &spec).expect("setup");
    let block = index.block_by_hash(&hash).expect("get").expect("block");
    assert_eq!(block.header.state_root, pchaind_trie::empty_root_hash());
}
